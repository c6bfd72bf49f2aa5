//! User feedback loop
//!
//! A correction does three things: appends to the immutable feedback log,
//! updates the one corrected email, and nudges sender reputation when the
//! correction crosses the spam boundary. It never reclassifies other mail;
//! future messages pick up the signal through reputation context.

use tracing::info;

use crate::db::Database;
use crate::error::Result;
use crate::models::{Category, CategoryAccuracy, FeedbackRecord, ReputationEvent, TrustOverride};
use crate::reputation::ReputationStore;

/// Outcome of one correction
#[derive(Debug, Clone, serde::Serialize)]
pub struct CorrectionOutcome {
    /// False when the correction matched the stored category and was dropped
    pub recorded: bool,
    pub original: Category,
    pub corrected: Category,
}

/// Applies corrections and serves accuracy reports
#[derive(Clone)]
pub struct FeedbackLoop {
    db: Database,
    reputation: ReputationStore,
}

impl FeedbackLoop {
    pub fn new(db: Database) -> Self {
        let reputation = ReputationStore::new(db.clone());
        Self { db, reputation }
    }

    pub fn with_reputation(db: Database, reputation: ReputationStore) -> Self {
        Self { db, reputation }
    }

    /// Record a user correction for one email.
    ///
    /// Corrections into spam mark the sender untrusted; corrections out of
    /// spam mark it trusted. Domain rows are never overridden from a single
    /// correction, one sender misbehaving says little about its neighbors.
    pub fn record_correction(&self, email_id: i64, corrected: Category) -> Result<CorrectionOutcome> {
        let email = self.db.get_email(email_id)?;
        let account = self.db.get_account(email.account_id)?;

        let original = email.category.unwrap_or(Category::Uncategorized);
        if original == corrected {
            return Ok(CorrectionOutcome {
                recorded: false,
                original,
                corrected,
            });
        }

        self.db
            .append_feedback(email_id, &email.from_address, original, corrected)?;
        self.db.set_email_category(email_id, corrected)?;

        if corrected == Category::Spam {
            self.reputation.record_event(
                &account.user_id,
                &email.from_address,
                ReputationEvent::SpamMarked,
            )?;
            self.reputation.set_sender_override(
                &account.user_id,
                &email.from_address,
                Some(TrustOverride::Untrusted),
            )?;
        } else if original == Category::Spam {
            self.reputation.set_sender_override(
                &account.user_id,
                &email.from_address,
                Some(TrustOverride::Trusted),
            )?;
        }

        info!(
            "correction for email {}: {} -> {}",
            email_id,
            original.as_str(),
            corrected.as_str()
        );
        Ok(CorrectionOutcome {
            recorded: true,
            original,
            corrected,
        })
    }

    /// Correction history, newest first
    pub fn history(&self, limit: i64, offset: i64) -> Result<Vec<FeedbackRecord>> {
        self.db.list_feedback(limit, offset)
    }

    /// Per-category accuracy derived from the correction log
    pub fn accuracy_report(&self) -> Result<Vec<CategoryAccuracy>> {
        self.db.accuracy_by_category()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::EmailInsertResult;
    use crate::models::{
        ClassificationResult, Direction, NewEmail, NewSourceAccount, Protocol, TrustLevel,
    };
    use crate::reputation::trust_level;

    fn setup() -> (Database, FeedbackLoop, i64) {
        let db = Database::in_memory().unwrap();
        let account_id = db
            .create_account(&NewSourceAccount {
                user_id: "default".into(),
                address: "me@example.com".into(),
                protocol: Protocol::Imap,
                credentials: "blob".into(),
            })
            .unwrap();
        let feedback = FeedbackLoop::new(db.clone());
        (db, feedback, account_id)
    }

    fn insert_classified(
        db: &Database,
        account_id: i64,
        pid: &str,
        from: &str,
        category: Category,
    ) -> i64 {
        let id = match db
            .insert_email(&NewEmail {
                account_id,
                provider_message_id: pid.into(),
                direction: Direction::Inbound,
                from_name: None,
                from_address: from.into(),
                to_address: None,
                subject: Some("subject".into()),
                snippet: None,
                list_unsubscribe: None,
                precedence: None,
                received_at: None,
            })
            .unwrap()
        {
            EmailInsertResult::Inserted(id) => id,
            _ => panic!("expected insert"),
        };

        let mut result = ClassificationResult::fallback();
        result.category = category;
        result.confidence = 0.8;
        db.write_classification(id, &result).unwrap();
        id
    }

    #[test]
    fn test_unchanged_category_is_dropped() {
        let (db, feedback, account_id) = setup();
        let id = insert_classified(&db, account_id, "m1", "a@x.example", Category::Work);

        let outcome = feedback.record_correction(id, Category::Work).unwrap();
        assert!(!outcome.recorded);
        assert!(feedback.history(10, 0).unwrap().is_empty());
    }

    #[test]
    fn test_correction_updates_only_target_email() {
        let (db, feedback, account_id) = setup();
        let target = insert_classified(&db, account_id, "m1", "a@x.example", Category::Work);
        let other = insert_classified(&db, account_id, "m2", "a@x.example", Category::Work);

        let outcome = feedback.record_correction(target, Category::Finance).unwrap();
        assert!(outcome.recorded);
        assert_eq!(outcome.original, Category::Work);

        assert_eq!(
            db.get_email(target).unwrap().category,
            Some(Category::Finance)
        );
        assert_eq!(db.get_email(other).unwrap().category, Some(Category::Work));

        let records = feedback.history(10, 0).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].original_category, Category::Work);
        assert_eq!(records[0].corrected_category, Category::Finance);
    }

    #[test]
    fn test_spam_correction_blacklists_sender_only() {
        let (db, feedback, account_id) = setup();
        let id = insert_classified(&db, account_id, "m1", "junk@mailer.example", Category::Work);

        feedback.record_correction(id, Category::Spam).unwrap();

        let sender = db
            .get_sender_reputation("default", "junk@mailer.example")
            .unwrap()
            .unwrap();
        assert_eq!(sender.trust_override, Some(TrustOverride::Untrusted));
        assert_eq!(sender.counters.spam_marked, 1);
        assert_eq!(trust_level(&sender), TrustLevel::Untrusted);

        // Domain counters move but the domain is never overridden
        let domain = db
            .get_domain_reputation("default", "mailer.example")
            .unwrap()
            .unwrap();
        assert_eq!(domain.counters.spam_marked, 1);
        assert!(domain.trust_override.is_none());
    }

    #[test]
    fn test_rescue_from_spam_trusts_sender() {
        let (db, feedback, account_id) = setup();
        let id = insert_classified(&db, account_id, "m1", "boss@corp.example", Category::Spam);

        feedback.record_correction(id, Category::Work).unwrap();

        let sender = db
            .get_sender_reputation("default", "boss@corp.example")
            .unwrap()
            .unwrap();
        assert_eq!(sender.trust_override, Some(TrustOverride::Trusted));
        assert_eq!(sender.counters.spam_marked, 0);

        assert!(db
            .get_domain_reputation("default", "corp.example")
            .unwrap()
            .map(|d| d.trust_override.is_none())
            .unwrap_or(true));
    }

    #[test]
    fn test_non_spam_correction_leaves_reputation_alone() {
        let (db, feedback, account_id) = setup();
        let id = insert_classified(&db, account_id, "m1", "a@x.example", Category::Work);

        feedback.record_correction(id, Category::Finance).unwrap();

        assert!(db
            .get_sender_reputation("default", "a@x.example")
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_accuracy_report_reflects_corrections() {
        let (db, feedback, account_id) = setup();
        for i in 0..3 {
            insert_classified(&db, account_id, &format!("m{}", i), "a@x.example", Category::Work);
        }
        let bad = insert_classified(&db, account_id, "m-bad", "a@x.example", Category::Work);
        feedback.record_correction(bad, Category::Finance).unwrap();

        let report = feedback.accuracy_report().unwrap();
        let work = report
            .iter()
            .find(|r| r.category == Category::Work)
            .unwrap();
        assert_eq!(work.total, 4);
        assert_eq!(work.corrected, 1);
        assert!((work.accuracy - 0.75).abs() < 1e-9);
    }
}
