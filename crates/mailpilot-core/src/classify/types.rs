//! Request/response types for the classifier contract

use serde::{Deserialize, Serialize};

use crate::models::{KeyEntities, TrustLevel};

/// Body text sent to the classifier is capped at this many characters
pub const BODY_EXCERPT_MAX_CHARS: usize = 2000;

/// Reputation snapshot included in the classifier context
#[derive(Debug, Clone, Serialize)]
pub struct ReputationContext {
    pub trust_level: TrustLevel,
    pub confidence: f64,
}

/// Prepared context payload for one classification call
#[derive(Debug, Clone, Serialize)]
pub struct ClassifierRequest {
    pub from: String,
    pub subject: String,
    /// Bounded body excerpt, never the full message
    pub body_excerpt: String,
    /// Pre-filter hint labels
    pub hints: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sender_reputation: Option<ReputationContext>,
}

/// Untrusted classifier output, exactly as deserialized.
/// Validation into `ClassificationResult` happens in `parsing`.
#[derive(Debug, Clone, Deserialize)]
pub struct RawClassification {
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub priority: Option<i64>,
    #[serde(default)]
    pub confidence: Option<f64>,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub needs_reply: Option<bool>,
    #[serde(default)]
    pub deadline: Option<String>,
    #[serde(default)]
    pub suggested_action: Option<String>,
    #[serde(default)]
    pub key_entities: Option<KeyEntities>,
}

/// Truncate body text to the excerpt cap on a char boundary
pub fn body_excerpt(text: &str) -> String {
    if text.chars().count() <= BODY_EXCERPT_MAX_CHARS {
        return text.to_string();
    }
    text.chars().take(BODY_EXCERPT_MAX_CHARS).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_body_excerpt_caps_length() {
        let long = "x".repeat(BODY_EXCERPT_MAX_CHARS + 500);
        assert_eq!(body_excerpt(&long).len(), BODY_EXCERPT_MAX_CHARS);

        let short = "hello";
        assert_eq!(body_excerpt(short), "hello");
    }

    #[test]
    fn test_body_excerpt_respects_char_boundaries() {
        let multibyte = "é".repeat(BODY_EXCERPT_MAX_CHARS + 10);
        let excerpt = body_excerpt(&multibyte);
        assert_eq!(excerpt.chars().count(), BODY_EXCERPT_MAX_CHARS);
    }

    #[test]
    fn test_raw_classification_tolerates_missing_fields() {
        let raw: RawClassification = serde_json::from_str("{}").unwrap();
        assert!(raw.category.is_none());
        assert!(raw.priority.is_none());

        let raw: RawClassification =
            serde_json::from_str(r#"{"category": "work", "priority": 2, "confidence": 0.9}"#)
                .unwrap();
        assert_eq!(raw.category.as_deref(), Some("work"));
    }
}
