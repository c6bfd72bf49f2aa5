//! Test utilities for mailpilot-core
//!
//! A mock classification HTTP service for integration tests and offline
//! development, plus a scripted provider adapter for driving the sync
//! coordinator without a mail server.

use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::Mutex;

use async_trait::async_trait;
use axum::{
    extract::Json,
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use tokio::sync::oneshot;

use crate::provider::{FetchedBody, ListOutcome, ProviderAdapter, ProviderError, RawMessage};

/// Subject that makes the mock service return a non-JSON body
pub const MALFORMED_TRIGGER: &str = "TRIGGER_MALFORMED";
/// Subject that makes the mock service return out-of-range fields
pub const OUT_OF_RANGE_TRIGGER: &str = "TRIGGER_OUT_OF_RANGE";

/// Mock classification service for testing and development
pub struct MockClassifierServer {
    addr: SocketAddr,
    shutdown_tx: Option<oneshot::Sender<()>>,
}

impl MockClassifierServer {
    /// Start the mock server on an available port
    pub async fn start() -> Self {
        let app = Router::new()
            .route("/health", get(handle_health))
            .route("/v1/classify", post(handle_classify));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    shutdown_rx.await.ok();
                })
                .await
                .unwrap();
        });

        Self {
            addr,
            shutdown_tx: Some(shutdown_tx),
        }
    }

    /// Base URL for this mock server
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Stop the mock server
    pub fn stop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

impl Drop for MockClassifierServer {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn handle_health() -> &'static str {
    "ok"
}

#[derive(Debug, Deserialize)]
struct ClassifyPayload {
    #[serde(default)]
    from: String,
    #[serde(default)]
    subject: String,
    #[serde(default)]
    hints: Vec<String>,
}

/// Keyword-driven classification, mirroring what a well-behaved external
/// service would return. The trigger subjects exercise the contract-failure
/// paths.
async fn handle_classify(Json(payload): Json<ClassifyPayload>) -> String {
    if payload.subject.contains(MALFORMED_TRIGGER) {
        return "I'm sorry, I cannot classify this email.".to_string();
    }
    if payload.subject.contains(OUT_OF_RANGE_TRIGGER) {
        return r#"{"priority": 9, "category": "bogus"}"#.to_string();
    }

    let subject = payload.subject.to_lowercase();
    let from = payload.from.to_lowercase();

    let (category, priority, needs_reply, action) = if subject.contains("invoice")
        || subject.contains("payment")
    {
        ("finance", 2, false, "follow_up")
    } else if subject.contains("meeting") || subject.contains("review") {
        ("work", 2, true, "reply")
    } else if subject.contains("your order") || subject.contains("shipped") {
        ("shopping", 4, false, "archive")
    } else if payload.hints.iter().any(|h| h == "bulk_mail") {
        ("newsletter", 5, false, "archive")
    } else if payload.hints.iter().any(|h| h == "transactional_sender")
        || from.starts_with("noreply")
    {
        ("transactional", 4, false, "archive")
    } else {
        ("personal", 3, false, "none")
    };

    format!(
        r#"{{"category": "{}", "priority": {}, "confidence": 0.82, "summary": "Mock summary of '{}'", "needs_reply": {}, "suggested_action": "{}", "key_entities": {{"people": [], "dates": [], "amounts": [], "tasks": []}}}}"#,
        category, priority, payload.subject, needs_reply, action
    )
}

/// Provider adapter driven by a queue of scripted responses
pub struct ScriptedAdapter {
    pages: Mutex<VecDeque<Result<ListOutcome, ProviderError>>>,
    body: Mutex<Option<FetchedBody>>,
}

impl ScriptedAdapter {
    pub fn new() -> Self {
        Self {
            pages: Mutex::new(VecDeque::new()),
            body: Mutex::new(None),
        }
    }

    /// Queue one successful page of messages
    pub fn push_page(&self, messages: Vec<RawMessage>, next_cursor: Option<&str>) {
        self.pages.lock().unwrap().push_back(Ok(ListOutcome {
            messages,
            next_cursor: next_cursor.map(String::from),
        }));
    }

    /// Queue one provider failure
    pub fn push_error(&self, error: ProviderError) {
        self.pages.lock().unwrap().push_back(Err(error));
    }

    /// Body served for every fetch_body call
    pub fn set_body(&self, body: FetchedBody) {
        *self.body.lock().unwrap() = Some(body);
    }
}

impl Default for ScriptedAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ProviderAdapter for ScriptedAdapter {
    async fn list_new_messages(
        &self,
        _cursor: Option<&str>,
        _limit: u32,
    ) -> Result<ListOutcome, ProviderError> {
        match self.pages.lock().unwrap().pop_front() {
            Some(response) => response,
            // Script exhausted: behave like a quiet mailbox
            None => Ok(ListOutcome {
                messages: Vec::new(),
                next_cursor: None,
            }),
        }
    }

    async fn fetch_body(&self, message_ref: &str) -> Result<FetchedBody, ProviderError> {
        match self.body.lock().unwrap().clone() {
            Some(body) => Ok(body),
            None => Err(ProviderError::Contract(format!(
                "no scripted body for message {}",
                message_ref
            ))),
        }
    }
}

/// Build a minimal raw message for sync tests
pub fn raw_message(id: &str, from: &str, subject: &str) -> RawMessage {
    RawMessage {
        provider_message_id: id.to_string(),
        from: from.to_string(),
        to: Some("me@example.com".to_string()),
        subject: Some(subject.to_string()),
        snippet: Some(format!("{} ...", subject)),
        list_unsubscribe: None,
        precedence: None,
        received_at: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::{ClassifierBackend, ClassifierRequest, HttpClassifier};
    use crate::models::Category;

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
    async fn test_mock_server_health_check() {
        let server = MockClassifierServer::start().await;
        let client = HttpClassifier::new(&server.url(), "test-model", None);

        assert!(client.health_check().await);
    }

    #[tokio::test]
    async fn test_mock_server_classifies_by_keywords() {
        let server = MockClassifierServer::start().await;
        let client = HttpClassifier::new(&server.url(), "test-model", None);

        let result = client
            .classify(&request("Invoice #42 attached", "billing@x.example"))
            .await
            .unwrap();
        assert_eq!(result.category, Category::Finance);

        let result = client
            .classify(&request("Quarterly review meeting", "boss@x.example"))
            .await
            .unwrap();
        assert_eq!(result.category, Category::Work);
        assert!(result.needs_reply);
    }

    #[tokio::test]
    async fn test_mock_server_malformed_response_is_rejected() {
        let server = MockClassifierServer::start().await;
        let client = HttpClassifier::new(&server.url(), "test-model", None);

        let result = client
            .classify(&request(MALFORMED_TRIGGER, "a@b.example"))
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_mock_server_out_of_range_response_is_rejected() {
        let server = MockClassifierServer::start().await;
        let client = HttpClassifier::new(&server.url(), "test-model", None);

        let result = client
            .classify(&request(OUT_OF_RANGE_TRIGGER, "a@b.example"))
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_scripted_adapter_drains_pages() {
        let adapter = ScriptedAdapter::new();
        adapter.push_page(vec![raw_message("1", "a@x.example", "Hi")], Some("1"));

        let first = adapter.list_new_messages(None, 50).await.unwrap();
        assert_eq!(first.messages.len(), 1);
        assert_eq!(first.next_cursor.as_deref(), Some("1"));

        let second = adapter.list_new_messages(None, 50).await.unwrap();
        assert!(second.messages.is_empty());
        assert!(second.next_cursor.is_none());
    }
}
