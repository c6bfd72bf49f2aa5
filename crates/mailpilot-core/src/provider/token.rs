//! OAuth token refresh for REST accounts
//!
//! Refreshes are single-flight per account: concurrent sync and body-fetch
//! tasks share one refresher, and duplicate refreshes against the same
//! refresh token can invalidate each other at some providers. A per-account
//! async mutex plus a double-checked token cache collapses the herd.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use super::{send_with_retry, BackoffPolicy, ProviderError};

/// Tokens within this many seconds of expiry count as expired
pub const EXPIRY_SKEW_SECONDS: i64 = 60;

/// Check whether an access token needs refreshing. Missing expiry
/// means we cannot prove freshness, so treat it as expired.
pub fn is_token_expired(expiry: Option<DateTime<Utc>>) -> bool {
    match expiry {
        Some(expiry) => Utc::now() + ChronoDuration::seconds(EXPIRY_SKEW_SECONDS) >= expiry,
        None => true,
    }
}

/// A freshly minted access token
#[derive(Debug, Clone)]
pub struct AccessToken {
    pub token: String,
    pub expiry: Option<DateTime<Utc>>,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
}

#[derive(Default)]
struct RefreshState {
    locks: HashMap<i64, Arc<Mutex<()>>>,
    cache: HashMap<i64, AccessToken>,
}

/// Shared token refresher, cloneable across sync workers
#[derive(Clone)]
pub struct TokenRefresher {
    http: reqwest::Client,
    policy: BackoffPolicy,
    state: Arc<Mutex<RefreshState>>,
}

impl TokenRefresher {
    pub fn new() -> Self {
        Self {
            http: reqwest::Client::new(),
            policy: BackoffPolicy::default(),
            state: Arc::new(Mutex::new(RefreshState::default())),
        }
    }

    /// Return a usable access token for the account, refreshing if needed.
    ///
    /// The stored token is used as-is while valid. On expiry, exactly one
    /// caller performs the refresh; the rest wait and pick up the cached
    /// result.
    pub async fn fresh_token(
        &self,
        account_id: i64,
        stored_token: &str,
        stored_expiry: Option<DateTime<Utc>>,
        client_id: &str,
        refresh_token: &str,
        token_uri: &str,
    ) -> Result<AccessToken, ProviderError> {
        if !is_token_expired(stored_expiry) {
            return Ok(AccessToken {
                token: stored_token.to_string(),
                expiry: stored_expiry,
            });
        }

        let lock = {
            let mut state = self.state.lock().await;
            if let Some(cached) = state.cache.get(&account_id) {
                if !is_token_expired(cached.expiry) {
                    return Ok(cached.clone());
                }
            }
            state
                .locks
                .entry(account_id)
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };

        let _guard = lock.lock().await;

        // Re-check after acquiring: another task may have refreshed while we waited
        {
            let state = self.state.lock().await;
            if let Some(cached) = state.cache.get(&account_id) {
                if !is_token_expired(cached.expiry) {
                    return Ok(cached.clone());
                }
            }
        }

        let token = self
            .refresh(account_id, client_id, refresh_token, token_uri)
            .await?;

        let mut state = self.state.lock().await;
        state.cache.insert(account_id, token.clone());
        Ok(token)
    }

    /// Drop any cached token so the next `fresh_token` call refreshes.
    /// Used when the provider rejects a token we believed was valid.
    pub async fn invalidate(&self, account_id: i64) {
        let mut state = self.state.lock().await;
        state.cache.remove(&account_id);
    }

    async fn refresh(
        &self,
        account_id: i64,
        client_id: &str,
        refresh_token: &str,
        token_uri: &str,
    ) -> Result<AccessToken, ProviderError> {
        if refresh_token.is_empty() {
            return Err(ProviderError::AuthRevoked(
                "no refresh token stored for account".to_string(),
            ));
        }

        debug!("refreshing access token for account {}", account_id);

        let request = self.http.post(token_uri).form(&[
            ("client_id", client_id),
            ("refresh_token", refresh_token),
            ("grant_type", "refresh_token"),
        ]);

        let response = send_with_retry(request, &self.policy).await?;
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ProviderError::Transient(e.to_string()))?;

        if !status.is_success() {
            let lowered = body.to_lowercase();
            // invalid_grant means the refresh token itself is dead
            if lowered.contains("invalid_grant") || status == reqwest::StatusCode::UNAUTHORIZED {
                warn!(
                    "token refresh permanently rejected for account {}: {}",
                    account_id, status
                );
                return Err(ProviderError::AuthRevoked(format!(
                    "token refresh rejected ({})",
                    status
                )));
            }
            return Err(ProviderError::Transient(format!(
                "token refresh failed with status {}",
                status
            )));
        }

        let parsed: TokenResponse = serde_json::from_str(&body).map_err(|e| {
            ProviderError::Contract(format!("malformed token refresh response: {}", e))
        })?;

        let expiry = parsed
            .expires_in
            .map(|secs| Utc::now() + ChronoDuration::seconds(secs));

        Ok(AccessToken {
            token: parsed.access_token,
            expiry,
        })
    }
}

impl Default for TokenRefresher {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_expiry_is_expired() {
        assert!(is_token_expired(None));
    }

    #[test]
    fn test_future_expiry_is_fresh() {
        let expiry = Utc::now() + ChronoDuration::hours(1);
        assert!(!is_token_expired(Some(expiry)));
    }

    #[test]
    fn test_expiry_within_skew_is_expired() {
        let expiry = Utc::now() + ChronoDuration::seconds(EXPIRY_SKEW_SECONDS - 5);
        assert!(is_token_expired(Some(expiry)));

        let past = Utc::now() - ChronoDuration::hours(1);
        assert!(is_token_expired(Some(past)));
    }

    #[tokio::test]
    async fn test_fresh_token_uses_stored_token_while_valid() {
        let refresher = TokenRefresher::new();
        let expiry = Utc::now() + ChronoDuration::hours(1);

        let token = refresher
            .fresh_token(
                1,
                "stored-token",
                Some(expiry),
                "client",
                "refresh",
                "http://127.0.0.1:1/token",
            )
            .await
            .unwrap();
        assert_eq!(token.token, "stored-token");
    }

    #[tokio::test]
    async fn test_refresh_without_refresh_token_is_revoked() {
        let refresher = TokenRefresher::new();

        let result = refresher
            .fresh_token(1, "stale", None, "client", "", "http://127.0.0.1:1/token")
            .await;
        assert!(matches!(result, Err(ProviderError::AuthRevoked(_))));
    }
}
