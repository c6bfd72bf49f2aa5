//! Token-based REST provider adapter
//!
//! Polls a Gmail-style message API with a bearer token: paginated list,
//! per-message metadata hydration, and `format=full` body fetches with a
//! MIME part walk. A 401 maps straight to `AuthExpired` with no internal
//! retry; the sync coordinator owns the refresh-and-retry-once policy.

use async_trait::async_trait;
use base64::Engine;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::debug;

use super::{
    send_with_retry, BackoffPolicy, FetchedBody, ListOutcome, ProviderAdapter, ProviderError,
    RawMessage,
};

pub struct RestAdapter {
    http: reqwest::Client,
    base_url: String,
    access_token: String,
    policy: BackoffPolicy,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MessageListResponse {
    #[serde(default)]
    messages: Vec<MessageStub>,
    #[serde(default)]
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MessageStub {
    id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MessageDetail {
    id: String,
    #[serde(default)]
    snippet: Option<String>,
    #[serde(default)]
    internal_date: Option<String>,
    #[serde(default)]
    payload: Option<Payload>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Payload {
    #[serde(default)]
    mime_type: String,
    #[serde(default)]
    headers: Vec<Header>,
    #[serde(default)]
    body: Option<PayloadBody>,
    #[serde(default)]
    parts: Vec<Payload>,
}

#[derive(Debug, Deserialize)]
struct Header {
    name: String,
    value: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PayloadBody {
    #[serde(default)]
    data: Option<String>,
}

impl RestAdapter {
    pub fn new(base_url: &str, access_token: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            access_token: access_token.to_string(),
            policy: BackoffPolicy::default(),
        }
    }

    async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, ProviderError> {
        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED {
            return Err(ProviderError::AuthExpired);
        }
        if status == reqwest::StatusCode::FORBIDDEN {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::AuthRevoked(format!(
                "provider rejected credentials: {}",
                truncate(&body, 200)
            )));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Transient(format!(
                "provider returned {}: {}",
                status,
                truncate(&body, 200)
            )));
        }
        Ok(response)
    }

    async fn fetch_message_metadata(&self, message_id: &str) -> Result<RawMessage, ProviderError> {
        let url = format!("{}/messages/{}", self.base_url, message_id);

        let response = send_with_retry(
            self.http
                .get(&url)
                .bearer_auth(&self.access_token)
                .query(&[
                    ("format", "metadata"),
                    ("metadataHeaders", "From"),
                    ("metadataHeaders", "To"),
                    ("metadataHeaders", "Subject"),
                    ("metadataHeaders", "List-Unsubscribe"),
                    ("metadataHeaders", "Precedence"),
                ]),
            &self.policy,
        )
        .await?;
        let response = Self::check_status(response).await?;

        let detail: MessageDetail = response
            .json()
            .await
            .map_err(|e| ProviderError::Contract(format!("malformed message detail: {}", e)))?;

        let headers = detail
            .payload
            .as_ref()
            .map(|p| &p.headers[..])
            .unwrap_or(&[]);

        let get_header = |name: &str| -> Option<String> {
            headers
                .iter()
                .find(|h| h.name.eq_ignore_ascii_case(name))
                .map(|h| h.value.clone())
        };

        let from = get_header("From").ok_or_else(|| {
            ProviderError::Contract(format!("message {} has no From header", detail.id))
        })?;

        // internalDate is epoch milliseconds as a string
        let received_at: Option<DateTime<Utc>> = detail
            .internal_date
            .as_deref()
            .and_then(|s| s.parse::<i64>().ok())
            .and_then(DateTime::from_timestamp_millis);

        Ok(RawMessage {
            provider_message_id: detail.id,
            from,
            to: get_header("To"),
            subject: get_header("Subject"),
            snippet: detail.snippet,
            list_unsubscribe: get_header("List-Unsubscribe"),
            precedence: get_header("Precedence"),
            received_at,
        })
    }
}

#[async_trait]
impl ProviderAdapter for RestAdapter {
    async fn list_new_messages(
        &self,
        cursor: Option<&str>,
        limit: u32,
    ) -> Result<ListOutcome, ProviderError> {
        let url = format!("{}/messages", self.base_url);
        let max_results = limit.to_string();

        let mut query: Vec<(&str, &str)> = vec![("maxResults", &max_results)];
        if let Some(token) = cursor {
            query.push(("pageToken", token));
        }

        let response = send_with_retry(
            self.http
                .get(&url)
                .bearer_auth(&self.access_token)
                .query(&query),
            &self.policy,
        )
        .await?;
        let response = Self::check_status(response).await?;

        let list: MessageListResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::Contract(format!("malformed message list: {}", e)))?;

        let mut messages = Vec::with_capacity(list.messages.len());
        for stub in &list.messages {
            match self.fetch_message_metadata(&stub.id).await {
                Ok(message) => messages.push(message),
                // Auth problems abort the batch; a single vanished message does not
                Err(ProviderError::AuthExpired) => return Err(ProviderError::AuthExpired),
                Err(ProviderError::AuthRevoked(e)) => return Err(ProviderError::AuthRevoked(e)),
                Err(e) => {
                    debug!("skipping message {}: {}", stub.id, e);
                    continue;
                }
            }
        }

        Ok(ListOutcome {
            messages,
            next_cursor: list.next_page_token,
        })
    }

    async fn fetch_body(&self, message_ref: &str) -> Result<FetchedBody, ProviderError> {
        let url = format!("{}/messages/{}", self.base_url, message_ref);

        let response = send_with_retry(
            self.http
                .get(&url)
                .bearer_auth(&self.access_token)
                .query(&[("format", "full")]),
            &self.policy,
        )
        .await?;
        let response = Self::check_status(response).await?;

        let detail: MessageDetail = response
            .json()
            .await
            .map_err(|e| ProviderError::Contract(format!("malformed full message: {}", e)))?;

        let payload = match detail.payload {
            Some(payload) => payload,
            None => return Ok(FetchedBody::default()),
        };

        Ok(FetchedBody {
            text: extract_body_text(&payload, "text/plain"),
            html: extract_body_text(&payload, "text/html"),
        })
    }
}

/// Depth-first walk of the MIME tree for the first part with the target type
fn extract_body_text(payload: &Payload, target_mime: &str) -> Option<String> {
    if payload.mime_type == target_mime {
        if let Some(data) = payload.body.as_ref().and_then(|b| b.data.as_deref()) {
            return decode_url_safe_base64(data);
        }
    }

    for part in &payload.parts {
        if let Some(text) = extract_body_text(part, target_mime) {
            return Some(text);
        }
    }

    None
}

fn decode_url_safe_base64(data: &str) -> Option<String> {
    base64::engine::general_purpose::URL_SAFE_NO_PAD
        .decode(data)
        .ok()
        .and_then(|bytes| String::from_utf8(bytes).ok())
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

    #[test]
    fn test_message_list_deserialization() {
        let json = r#"{
            "messages": [{"id": "m1"}, {"id": "m2"}],
            "nextPageToken": "tok-2"
        }"#;
        let list: MessageListResponse = serde_json::from_str(json).unwrap();
        assert_eq!(list.messages.len(), 2);
        assert_eq!(list.next_page_token.as_deref(), Some("tok-2"));
    }

    #[test]
    fn test_message_list_empty() {
        let list: MessageListResponse = serde_json::from_str("{}").unwrap();
        assert!(list.messages.is_empty());
        assert!(list.next_page_token.is_none());
    }

    #[test]
    fn test_body_walk_prefers_requested_mime() {
        let json = r#"{
            "id": "m1",
            "payload": {
                "mimeType": "multipart/alternative",
                "parts": [
                    {"mimeType": "text/plain", "body": {"data": "cGxhaW4gYm9keQ"}},
                    {"mimeType": "text/html", "body": {"data": "PHA-aHRtbDwvcD4"}}
                ]
            }
        }"#;
        let detail: MessageDetail = serde_json::from_str(json).unwrap();
        let payload = detail.payload.unwrap();

        assert_eq!(
            extract_body_text(&payload, "text/plain").as_deref(),
            Some("plain body")
        );
        assert_eq!(
            extract_body_text(&payload, "text/html").as_deref(),
            Some("<p>html</p>")
        );
    }

    #[test]
    fn test_nested_multipart_walk() {
        let json = r#"{
            "id": "m1",
            "payload": {
                "mimeType": "multipart/mixed",
                "parts": [
                    {"mimeType": "multipart/alternative", "parts": [
                        {"mimeType": "text/plain", "body": {"data": "bmVzdGVk"}}
                    ]}
                ]
            }
        }"#;
        let detail: MessageDetail = serde_json::from_str(json).unwrap();
        let payload = detail.payload.unwrap();
        assert_eq!(
            extract_body_text(&payload, "text/plain").as_deref(),
            Some("nested")
        );
    }

    #[test]
    fn test_decode_rejects_invalid_base64() {
        assert!(decode_url_safe_base64("!!!").is_none());
    }
}
