//! Mock classifier backend for tests and offline development
//!
//! Deterministic keyword rules over the subject and sender, plus modes for
//! forcing a fixed result or a contract failure.

use async_trait::async_trait;

use super::types::ClassifierRequest;
use super::ClassifierBackend;
use crate::error::{Error, Result};
use crate::models::{Category, ClassificationResult, KeyEntities, SuggestedAction};

#[derive(Clone)]
enum Mode {
    Keyword,
    Fixed(Box<ClassificationResult>),
    Failing,
}

#[derive(Clone)]
pub struct MockClassifier {
    mode: Mode,
}

impl MockClassifier {
    /// Keyword-driven deterministic classification
    pub fn new() -> Self {
        Self { mode: Mode::Keyword }
    }

    /// Always return the given result
    pub fn with_result(result: ClassificationResult) -> Self {
        Self {
            mode: Mode::Fixed(Box::new(result)),
        }
    }

    /// Always fail, as a classifier violating its contract would
    pub fn failing() -> Self {
        Self { mode: Mode::Failing }
    }

    fn classify_by_keywords(request: &ClassifierRequest) -> ClassificationResult {
        let subject = request.subject.to_lowercase();
        let from = request.from.to_lowercase();

        let (category, priority, needs_reply, action) =
            if subject.contains("invoice") || subject.contains("payment") {
                (Category::Finance, 2, false, SuggestedAction::FollowUp)
            } else if subject.contains("meeting") || subject.contains("review") {
                (Category::Work, 2, true, SuggestedAction::Reply)
            } else if subject.contains("your order") || subject.contains("shipped") {
                (Category::Shopping, 4, false, SuggestedAction::Archive)
            } else if subject.contains("itinerary") || subject.contains("boarding") {
                (Category::Travel, 2, false, SuggestedAction::None)
            } else if request.hints.iter().any(|h| h == "bulk_mail")
                || subject.contains("unsubscribe")
            {
                (Category::Newsletter, 5, false, SuggestedAction::Archive)
            } else if request.hints.iter().any(|h| h == "transactional_sender")
                || from.starts_with("noreply")
                || from.starts_with("no-reply")
            {
                (Category::Transactional, 4, false, SuggestedAction::Archive)
            } else {
                (Category::Personal, 3, false, SuggestedAction::None)
            };

        ClassificationResult {
            category,
            priority,
            confidence: 0.75,
            summary: format!("Mock classification of '{}'", request.subject),
            needs_reply,
            deadline: None,
            suggested_action: action,
            key_entities: KeyEntities::default(),
        }
    }
}

impl Default for MockClassifier {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ClassifierBackend for MockClassifier {
    async fn classify(&self, request: &ClassifierRequest) -> Result<ClassificationResult> {
        match &self.mode {
            Mode::Keyword => Ok(Self::classify_by_keywords(request)),
            Mode::Fixed(result) => Ok((**result).clone()),
            Mode::Failing => Err(Error::InvalidData(
                "mock classifier configured to fail".to_string(),
            )),
        }
    }

    async fn health_check(&self) -> bool {
        !matches!(self.mode, Mode::Failing)
    }

    fn backend_name(&self) -> &'static str {
        "mock"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(subject: &str, from: &str) -> ClassifierRequest {
        ClassifierRequest {
            from: from.to_string(),
            subject: subject.to_string(),
            body_excerpt: String::new(),
            hints: Vec::new(),
            sender_reputation: None,
        }
    }

    #[tokio::test]
    async fn test_keyword_rules() {
        let mock = MockClassifier::new();

        let result = mock
            .classify(&request("Invoice #4411 due", "billing@x.com"))
            .await
            .unwrap();
        assert_eq!(result.category, Category::Finance);

        let result = mock
            .classify(&request("Team meeting tomorrow", "boss@x.com"))
            .await
            .unwrap();
        assert_eq!(result.category, Category::Work);
        assert!(result.needs_reply);
    }

    #[tokio::test]
    async fn test_hints_steer_classification() {
        let mock = MockClassifier::new();
        let mut req = request("Weekly digest", "digest@letter.example");
        req.hints.push("bulk_mail".to_string());

        let result = mock.classify(&req).await.unwrap();
        assert_eq!(result.category, Category::Newsletter);
    }

    #[tokio::test]
    async fn test_failing_mode() {
        let mock = MockClassifier::failing();
        assert!(mock.classify(&request("anything", "a@b.c")).await.is_err());
        assert!(!mock.health_check().await);
    }
}
