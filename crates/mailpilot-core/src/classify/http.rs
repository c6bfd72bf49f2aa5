//! HTTP classifier backend
//!
//! Speaks to the external classification service: one POST per message,
//! bounded by a request timeout. The response body is parsed and validated
//! here; the engine decides what a failure means.

use async_trait::async_trait;
use serde_json::json;
use std::time::Duration;
use tracing::debug;

use super::parsing;
use super::types::ClassifierRequest;
use super::ClassifierBackend;
use crate::error::{Error, Result};
use crate::models::{Category, ClassificationResult};

/// Per-request ceiling; a slow classifier must not stall the batch forever
const CLASSIFY_TIMEOUT: Duration = Duration::from_secs(30);
const HEALTH_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Clone)]
pub struct HttpClassifier {
    client: reqwest::Client,
    host: String,
    model: String,
    api_key: Option<String>,
}

impl HttpClassifier {
    pub fn new(host: &str, model: &str, api_key: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            host: host.trim_end_matches('/').to_string(),
            model: model.to_string(),
            api_key,
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl ClassifierBackend for HttpClassifier {
    async fn classify(&self, request: &ClassifierRequest) -> Result<ClassificationResult> {
        let url = format!("{}/v1/classify", self.host);

        let categories: Vec<&str> = Category::all().iter().map(|c| c.as_str()).collect();
        let payload = json!({
            "model": self.model,
            "from": request.from,
            "subject": request.subject,
            "body_excerpt": request.body_excerpt,
            "hints": request.hints,
            "sender_reputation": request.sender_reputation,
            "categories": categories,
        });

        let mut builder = self
            .client
            .post(&url)
            .timeout(CLASSIFY_TIMEOUT)
            .json(&payload);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(Error::InvalidData(format!(
                "classifier returned status {}",
                status
            )));
        }

        let body = response.text().await?;
        debug!("classifier response: {} bytes", body.len());

        let raw = parsing::parse_classification(&body)?;
        parsing::validate_classification(raw)
    }

    async fn health_check(&self) -> bool {
        let url = format!("{}/health", self.host);
        match self
            .client
            .get(&url)
            .timeout(HEALTH_TIMEOUT)
            .send()
            .await
        {
            Ok(response) => response.status().is_success(),
            Err(_) => false,
        }
    }

    fn backend_name(&self) -> &'static str {
        "http"
    }
}
