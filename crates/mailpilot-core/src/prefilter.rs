//! Deterministic rule pre-filter
//!
//! Runs before every classifier call. Cheap header-level rules either
//! annotate the message with hints (fed into the classifier context) or,
//! for an explicit domain blacklist only, short-circuit classification
//! entirely. Whitelist hits stay hints: trusting a sender says nothing
//! about a message's category or priority.

use regex::Regex;

use crate::error::Result;
use crate::models::{
    domain_of, Category, ClassificationResult, KeyEntities, SuggestedAction, TrustOverride,
};

/// Header-level signals a hint rule can see
#[derive(Debug, Clone, Copy)]
pub struct MessageSignals<'a> {
    pub from_address: &'a str,
    pub list_unsubscribe: Option<&'a str>,
    pub precedence: Option<&'a str>,
}

/// A deterministic observation about a message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrefilterHint {
    /// Sender shares the account's own domain
    SameDomain,
    /// Sender matches a known transactional/automated pattern
    TransactionalSender,
    /// List-Unsubscribe header or bulk precedence present
    BulkMail,
    /// Sender domain carries an explicit trusted override
    WhitelistedDomain,
}

impl PrefilterHint {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SameDomain => "same_domain",
            Self::TransactionalSender => "transactional_sender",
            Self::BulkMail => "bulk_mail",
            Self::WhitelistedDomain => "whitelisted_domain",
        }
    }
}

/// Outcome of the pre-filter pass
#[derive(Debug, Clone)]
pub struct PrefilterOutcome {
    pub hints: Vec<PrefilterHint>,
    /// Set only on an explicit blacklist hit; skips the classifier
    pub short_circuit: Option<ClassificationResult>,
}

/// Compiled rule set, built once and shared
pub struct PreFilter {
    transactional_patterns: Vec<Regex>,
}

impl PreFilter {
    pub fn new() -> Result<Self> {
        let patterns = [
            r"(?i)^(no-?reply|do-not-reply|donotreply)@",
            r"(?i)^(notifications?|alerts?|updates?)@",
            r"(?i)^(billing|invoices?|receipts?|statements?|payments?)@",
            r"(?i)^(orders?|shipping|tracking|confirmations?)@",
        ];

        let mut transactional_patterns = Vec::with_capacity(patterns.len());
        for pattern in patterns {
            transactional_patterns.push(Regex::new(pattern)?);
        }

        Ok(Self {
            transactional_patterns,
        })
    }

    /// Evaluate one message. Pure: same inputs, same outcome.
    pub fn evaluate(
        &self,
        signals: MessageSignals,
        user_domain: Option<&str>,
        domain_override: Option<TrustOverride>,
    ) -> PrefilterOutcome {
        if domain_override == Some(TrustOverride::Untrusted) {
            return PrefilterOutcome {
                hints: Vec::new(),
                short_circuit: Some(blacklist_result()),
            };
        }

        let mut hints = Vec::new();
        let sender_domain = domain_of(signals.from_address);

        if let (Some(user), Some(sender)) = (user_domain, sender_domain.as_deref()) {
            if user.eq_ignore_ascii_case(sender) {
                hints.push(PrefilterHint::SameDomain);
            }
        }

        if self
            .transactional_patterns
            .iter()
            .any(|p| p.is_match(signals.from_address))
        {
            hints.push(PrefilterHint::TransactionalSender);
        }

        let bulk_precedence = signals
            .precedence
            .map(|p| {
                let p = p.trim();
                p.eq_ignore_ascii_case("bulk") || p.eq_ignore_ascii_case("list")
            })
            .unwrap_or(false);
        if signals.list_unsubscribe.is_some() || bulk_precedence {
            hints.push(PrefilterHint::BulkMail);
        }

        if domain_override == Some(TrustOverride::Trusted) {
            hints.push(PrefilterHint::WhitelistedDomain);
        }

        PrefilterOutcome {
            hints,
            short_circuit: None,
        }
    }
}

/// Deterministic verdict for mail from a blacklisted domain
fn blacklist_result() -> ClassificationResult {
    ClassificationResult {
        category: Category::Spam,
        priority: 5,
        confidence: 1.0,
        summary: "Sender domain is blacklisted".to_string(),
        needs_reply: false,
        deadline: None,
        suggested_action: SuggestedAction::Delete,
        key_entities: KeyEntities::default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signals(from: &str) -> MessageSignals {
        MessageSignals {
            from_address: from,
            list_unsubscribe: None,
            precedence: None,
        }
    }

    #[test]
    fn test_blacklist_short_circuits_to_spam() {
        let filter = PreFilter::new().unwrap();
        let outcome = filter.evaluate(
            signals("anyone@bad.example"),
            Some("example.com"),
            Some(TrustOverride::Untrusted),
        );

        let result = outcome.short_circuit.unwrap();
        assert_eq!(result.category, Category::Spam);
        assert_eq!(result.confidence, 1.0);
        assert!(!result.needs_reply);
    }

    #[test]
    fn test_whitelist_is_hint_only() {
        let filter = PreFilter::new().unwrap();
        let outcome = filter.evaluate(
            signals("boss@corp.example"),
            None,
            Some(TrustOverride::Trusted),
        );

        assert!(outcome.short_circuit.is_none());
        assert!(outcome.hints.contains(&PrefilterHint::WhitelistedDomain));
    }

    #[test]
    fn test_same_domain_hint() {
        let filter = PreFilter::new().unwrap();
        let outcome = filter.evaluate(
            signals("colleague@Example.COM"),
            Some("example.com"),
            None,
        );
        assert!(outcome.hints.contains(&PrefilterHint::SameDomain));

        let outcome = filter.evaluate(signals("other@elsewhere.net"), Some("example.com"), None);
        assert!(!outcome.hints.contains(&PrefilterHint::SameDomain));
    }

    #[test]
    fn test_transactional_sender_patterns() {
        let filter = PreFilter::new().unwrap();

        for sender in [
            "noreply@shop.example",
            "no-reply@bank.example",
            "billing@service.example",
            "receipts@store.example",
            "order-confirmation@x.example", // no match: "orders?@" only
        ] {
            let outcome = filter.evaluate(signals(sender), None, None);
            let expected = !sender.starts_with("order-confirmation");
            assert_eq!(
                outcome.hints.contains(&PrefilterHint::TransactionalSender),
                expected,
                "sender: {}",
                sender
            );
        }
    }

    #[test]
    fn test_bulk_mail_signals() {
        let filter = PreFilter::new().unwrap();

        let with_unsub = MessageSignals {
            from_address: "news@letter.example",
            list_unsubscribe: Some("<https://letter.example/unsub>"),
            precedence: None,
        };
        assert!(filter
            .evaluate(with_unsub, None, None)
            .hints
            .contains(&PrefilterHint::BulkMail));

        let with_precedence = MessageSignals {
            from_address: "digest@list.example",
            list_unsubscribe: None,
            precedence: Some("Bulk"),
        };
        assert!(filter
            .evaluate(with_precedence, None, None)
            .hints
            .contains(&PrefilterHint::BulkMail));

        assert!(!filter
            .evaluate(signals("friend@personal.example"), None, None)
            .hints
            .contains(&PrefilterHint::BulkMail));
    }

    #[test]
    fn test_evaluate_is_deterministic() {
        let filter = PreFilter::new().unwrap();
        let a = filter.evaluate(signals("noreply@shop.example"), Some("shop.example"), None);
        let b = filter.evaluate(signals("noreply@shop.example"), Some("shop.example"), None);
        assert_eq!(a.hints, b.hints);
    }
}
