//! Parsing and validation of classifier responses
//!
//! Model output often wraps the JSON payload in extra prose, so parsing
//! scans for the outermost braces first. Validation enforces the contract:
//! closed category set, priority in [1, 5], confidence in [0, 1]. Optional
//! fields degrade gracefully rather than failing the whole response.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};

use super::types::RawClassification;
use crate::error::{Error, Result};
use crate::models::{Category, ClassificationResult, SuggestedAction};

/// Parse a raw classification out of a model response
pub fn parse_classification(response: &str) -> Result<RawClassification> {
    let response = response.trim();

    let start = response.find('{');
    let end = response.rfind('}');

    match (start, end) {
        (Some(s), Some(e)) if s < e => {
            let json_str = &response[s..=e];
            serde_json::from_str(json_str).map_err(|e| {
                Error::InvalidData(format!(
                    "Invalid JSON from classifier: {} | Raw: {}",
                    e,
                    truncate(json_str, 200)
                ))
            })
        }
        _ => Err(Error::InvalidData(format!(
            "No JSON found in classifier response | Raw: {}",
            truncate(response, 200)
        ))),
    }
}

/// Validate raw output into a persistable result.
/// Contract violations come back as `Error::InvalidData`.
pub fn validate_classification(raw: RawClassification) -> Result<ClassificationResult> {
    let category_str = raw
        .category
        .ok_or_else(|| Error::InvalidData("classifier omitted category".to_string()))?;
    let category: Category = category_str
        .parse()
        .map_err(|e: String| Error::InvalidData(e))?;

    let priority = raw
        .priority
        .ok_or_else(|| Error::InvalidData("classifier omitted priority".to_string()))?;
    if !(1..=5).contains(&priority) {
        return Err(Error::InvalidData(format!(
            "priority {} outside [1, 5]",
            priority
        )));
    }

    let confidence = raw
        .confidence
        .ok_or_else(|| Error::InvalidData("classifier omitted confidence".to_string()))?;
    if !(0.0..=1.0).contains(&confidence) || confidence.is_nan() {
        return Err(Error::InvalidData(format!(
            "confidence {} outside [0, 1]",
            confidence
        )));
    }

    // Optional fields are best-effort: unparseable values drop to defaults
    let suggested_action = raw
        .suggested_action
        .as_deref()
        .and_then(|s| s.parse().ok())
        .unwrap_or(SuggestedAction::None);

    let deadline = raw.deadline.as_deref().and_then(parse_deadline);

    Ok(ClassificationResult {
        category,
        priority,
        confidence,
        summary: raw.summary.unwrap_or_default(),
        needs_reply: raw.needs_reply.unwrap_or(false),
        deadline,
        suggested_action,
        key_entities: raw.key_entities.unwrap_or_default(),
    })
}

/// Accept RFC 3339, SQLite datetime, or a bare date
fn parse_deadline(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return Some(dt.and_utc());
    }
    if let Ok(d) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return d.and_hms_opt(0, 0, 0).map(|dt| dt.and_utc());
    }
    None
}

fn truncate(s: &str, max: usize) -> String {
    if s.len() > max {
        let mut end = max;
        while !s.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}...", &s[..end])
    } else {
        s.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::KeyEntities;

    #[test]
    fn test_parse_extracts_json_from_prose() {
        let response = r#"Sure! Here is the classification:
        {"category": "work", "priority": 2, "confidence": 0.85}
        Let me know if you need anything else."#;

        let raw = parse_classification(response).unwrap();
        assert_eq!(raw.category.as_deref(), Some("work"));
        assert_eq!(raw.priority, Some(2));
    }

    #[test]
    fn test_parse_rejects_missing_json() {
        assert!(parse_classification("I could not classify this email.").is_err());
        assert!(parse_classification("").is_err());
    }

    #[test]
    fn test_validate_accepts_contract_response() {
        let raw = parse_classification(
            r#"{"category": "finance", "priority": 1, "confidence": 0.92,
                "summary": "Invoice due Friday", "needs_reply": false,
                "deadline": "2026-09-04", "suggested_action": "follow_up",
                "key_entities": {"amounts": ["$1,200"], "dates": ["2026-09-04"]}}"#,
        )
        .unwrap();

        let result = validate_classification(raw).unwrap();
        assert_eq!(result.category, Category::Finance);
        assert_eq!(result.priority, 1);
        assert_eq!(result.suggested_action, SuggestedAction::FollowUp);
        assert!(result.deadline.is_some());
        assert_eq!(result.key_entities.amounts, vec!["$1,200".to_string()]);
    }

    #[test]
    fn test_validate_rejects_unknown_category() {
        let raw = parse_classification(r#"{"category": "bogus", "priority": 2, "confidence": 0.5}"#)
            .unwrap();
        assert!(validate_classification(raw).is_err());
    }

    #[test]
    fn test_validate_rejects_out_of_range_priority() {
        let raw = parse_classification(r#"{"category": "work", "priority": 9, "confidence": 0.5}"#)
            .unwrap();
        assert!(validate_classification(raw).is_err());

        let raw = parse_classification(r#"{"category": "work", "priority": 0, "confidence": 0.5}"#)
            .unwrap();
        assert!(validate_classification(raw).is_err());
    }

    #[test]
    fn test_validate_rejects_out_of_range_confidence() {
        let raw =
            parse_classification(r#"{"category": "work", "priority": 2, "confidence": 1.5}"#)
                .unwrap();
        assert!(validate_classification(raw).is_err());

        let raw =
            parse_classification(r#"{"category": "work", "priority": 2, "confidence": -0.1}"#)
                .unwrap();
        assert!(validate_classification(raw).is_err());
    }

    #[test]
    fn test_optional_fields_degrade_to_defaults() {
        let raw = parse_classification(
            r#"{"category": "personal", "priority": 3, "confidence": 0.6,
                "deadline": "next Tuesday", "suggested_action": "launch_rockets"}"#,
        )
        .unwrap();

        let result = validate_classification(raw).unwrap();
        assert!(result.deadline.is_none());
        assert_eq!(result.suggested_action, SuggestedAction::None);
        assert_eq!(result.summary, "");
        assert!(!result.needs_reply);
        assert_eq!(result.key_entities, KeyEntities::default());
    }

    #[test]
    fn test_parse_deadline_formats() {
        assert!(parse_deadline("2026-09-04T12:00:00Z").is_some());
        assert!(parse_deadline("2026-09-04 12:00:00").is_some());
        assert!(parse_deadline("2026-09-04").is_some());
        assert!(parse_deadline("soon").is_none());
    }
}
