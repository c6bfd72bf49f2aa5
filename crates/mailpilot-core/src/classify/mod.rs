//! External classifier contract
//!
//! The language model is an external service behind a narrow interface:
//!
//! - `ClassifierBackend` trait: classify one prepared request
//! - `ClassifierClient` enum: concrete wrapper providing Clone + compile-time
//!   dispatch (`HttpClassifier` for the real service, `MockClassifier` for
//!   tests and offline development)
//! - `ClassificationEngine`: assembles context, applies the pre-filter,
//!   resolves contract failures to the safe fallback, persists results
//!
//! # Configuration
//!
//! Environment variables:
//! - `CLASSIFIER_BACKEND`: Backend to use (http, mock). Default: http
//! - `CLASSIFIER_HOST`: Classifier service URL (required for http backend)
//! - `CLASSIFIER_MODEL`: Model name passed through to the service
//! - `CLASSIFIER_API_KEY`: Bearer token if the service requires one

mod engine;
mod http;
mod mock;
pub mod parsing;
mod types;

pub use engine::{ClassificationEngine, ClassifyBatchOptions, ClassifyBatchOutcome};
pub use http::HttpClassifier;
pub use mock::MockClassifier;
pub use types::{body_excerpt, ClassifierRequest, RawClassification, ReputationContext};

use async_trait::async_trait;
use tracing::warn;

use crate::error::Result;
use crate::models::ClassificationResult;

/// Interface every classifier backend implements
#[async_trait]
pub trait ClassifierBackend: Send + Sync {
    /// Classify one message. Errors are contract failures; the engine
    /// resolves them to the fallback, never the caller.
    async fn classify(&self, request: &ClassifierRequest) -> Result<ClassificationResult>;

    /// Cheap liveness probe
    async fn health_check(&self) -> bool;

    /// Backend label for logs and status output
    fn backend_name(&self) -> &'static str;
}

/// Concrete classifier wrapper with compile-time dispatch
#[derive(Clone)]
pub enum ClassifierClient {
    Http(HttpClassifier),
    Mock(MockClassifier),
}

impl ClassifierClient {
    /// Create a client from environment variables. Returns None when no
    /// backend is configured, which disables classification.
    pub fn from_env() -> Option<Self> {
        let backend = std::env::var("CLASSIFIER_BACKEND").unwrap_or_else(|_| "http".to_string());

        match backend.as_str() {
            "mock" => Some(Self::Mock(MockClassifier::new())),
            "http" => {
                let host = match std::env::var("CLASSIFIER_HOST") {
                    Ok(host) => host,
                    Err(_) => {
                        warn!("CLASSIFIER_HOST not set, classification disabled");
                        return None;
                    }
                };
                let model = std::env::var("CLASSIFIER_MODEL")
                    .unwrap_or_else(|_| "mail-classifier-v1".to_string());
                let api_key = std::env::var("CLASSIFIER_API_KEY").ok();
                Some(Self::Http(HttpClassifier::new(&host, &model, api_key)))
            }
            other => {
                warn!("unknown CLASSIFIER_BACKEND '{}', classification disabled", other);
                None
            }
        }
    }
}

#[async_trait]
impl ClassifierBackend for ClassifierClient {
    async fn classify(&self, request: &ClassifierRequest) -> Result<ClassificationResult> {
        match self {
            Self::Http(backend) => backend.classify(request).await,
            Self::Mock(backend) => backend.classify(request).await,
        }
    }

    async fn health_check(&self) -> bool {
        match self {
            Self::Http(backend) => backend.health_check().await,
            Self::Mock(backend) => backend.health_check().await,
        }
    }

    fn backend_name(&self) -> &'static str {
        match self {
            Self::Http(backend) => backend.backend_name(),
            Self::Mock(backend) => backend.backend_name(),
        }
    }
}
