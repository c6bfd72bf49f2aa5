//! Mail provider adapters
//!
//! One trait covers both retrieval protocols so the sync coordinator never
//! branches on account type outside adapter construction:
//! - `ImapAdapter` - stateful IMAP session, runs under `spawn_blocking`
//! - `RestAdapter` - token-based REST polling over reqwest
//!
//! Raw protocol errors never cross this boundary; everything maps into the
//! closed `ProviderError` taxonomy.

mod imap;
mod rest;
mod token;

pub use imap::ImapAdapter;
pub use rest::RestAdapter;
pub use token::{is_token_expired, TokenRefresher, EXPIRY_SKEW_SECONDS};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::time::Duration;
use thiserror::Error;
use tracing::warn;

/// Closed error taxonomy for provider operations
#[derive(Error, Debug)]
pub enum ProviderError {
    /// Network or server hiccup, worth retrying later
    #[error("transient provider error: {0}")]
    Transient(String),

    /// Access token expired; refresh and retry once
    #[error("access token expired")]
    AuthExpired,

    /// Credentials permanently rejected; account must be re-linked
    #[error("authentication revoked: {0}")]
    AuthRevoked(String),

    /// Provider returned something outside its contract
    #[error("provider contract violation: {0}")]
    Contract(String),
}

/// Message headers/metadata as fetched during incremental sync.
/// Bodies are fetched lazily via `ProviderAdapter::fetch_body`.
#[derive(Debug, Clone)]
pub struct RawMessage {
    /// Provider-scoped stable identifier (IMAP UID or REST message id)
    pub provider_message_id: String,
    /// Raw From header value, may include a display name
    pub from: String,
    pub to: Option<String>,
    pub subject: Option<String>,
    pub snippet: Option<String>,
    pub list_unsubscribe: Option<String>,
    pub precedence: Option<String>,
    pub received_at: Option<DateTime<Utc>>,
}

/// Lazily fetched message body parts
#[derive(Debug, Clone, Default)]
pub struct FetchedBody {
    pub text: Option<String>,
    pub html: Option<String>,
}

/// One page of new messages plus the cursor to persist after they land
#[derive(Debug, Clone)]
pub struct ListOutcome {
    pub messages: Vec<RawMessage>,
    /// None means the cursor should not move
    pub next_cursor: Option<String>,
}

/// Protocol-agnostic mail retrieval interface
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    /// List messages that arrived after `cursor`, up to `limit`
    async fn list_new_messages(
        &self,
        cursor: Option<&str>,
        limit: u32,
    ) -> Result<ListOutcome, ProviderError>;

    /// Fetch the body parts for one message
    async fn fetch_body(&self, message_ref: &str) -> Result<FetchedBody, ProviderError>;
}

/// Exponential backoff policy shared by the HTTP-speaking adapters
#[derive(Debug, Clone)]
pub struct BackoffPolicy {
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff_ms: 250,
            max_backoff_ms: 2_000,
        }
    }
}

fn retryable_status(status: reqwest::StatusCode) -> bool {
    status == reqwest::StatusCode::TOO_MANY_REQUESTS
        || status == reqwest::StatusCode::REQUEST_TIMEOUT
        || status.is_server_error()
}

fn retry_delay(
    attempt: u32,
    policy: &BackoffPolicy,
    retry_after: Option<&reqwest::header::HeaderValue>,
) -> Duration {
    // Honor an explicit Retry-After, capped so a hostile header can't stall us
    if let Some(value) = retry_after.and_then(|v| v.to_str().ok()) {
        if let Ok(secs) = value.parse::<u64>() {
            return Duration::from_secs(secs.min(30));
        }
    }

    let exponent = 2u64.saturating_pow(attempt.saturating_sub(1));
    let base = policy
        .initial_backoff_ms
        .saturating_mul(exponent)
        .min(policy.max_backoff_ms);
    let jitter = (std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.subsec_nanos() as u64)
        .unwrap_or(0))
        % 150;
    Duration::from_millis(base.saturating_add(jitter))
}

/// Send a request, retrying transient failures (429/408/5xx, timeouts,
/// connection errors) with exponential backoff. Non-retryable responses
/// are returned to the caller for status-specific handling.
pub(crate) async fn send_with_retry(
    request: reqwest::RequestBuilder,
    policy: &BackoffPolicy,
) -> Result<reqwest::Response, ProviderError> {
    let attempts = policy.max_attempts.max(1);
    for attempt in 1..=attempts {
        let Some(cloned) = request.try_clone() else {
            return request
                .send()
                .await
                .map_err(|e| ProviderError::Transient(e.to_string()));
        };

        match cloned.send().await {
            Ok(response) => {
                let status = response.status();
                if retryable_status(status) && attempt < attempts {
                    let delay = retry_delay(
                        attempt,
                        policy,
                        response.headers().get(reqwest::header::RETRY_AFTER),
                    );
                    warn!(
                        "provider retry {}/{} after status {} (sleep {:?})",
                        attempt, attempts, status, delay
                    );
                    tokio::time::sleep(delay).await;
                    continue;
                }
                return Ok(response);
            }
            Err(err) => {
                let retryable_transport = err.is_timeout() || err.is_connect();
                if retryable_transport && attempt < attempts {
                    let delay = retry_delay(attempt, policy, None);
                    warn!(
                        "provider retry {}/{} after transport error: {} (sleep {:?})",
                        attempt, attempts, err, delay
                    );
                    tokio::time::sleep(delay).await;
                    continue;
                }
                return Err(ProviderError::Transient(err.to_string()));
            }
        }
    }

    Err(ProviderError::Transient(
        "request exhausted retries".to_string(),
    ))
}
