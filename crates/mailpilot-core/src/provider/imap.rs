//! Stateful IMAP session adapter
//!
//! Each operation opens a fresh TLS session (connect, LOGIN, SELECT), does
//! its work, and logs out on every exit path. The mailbox session is
//! exclusive while held. All protocol work is blocking, so it runs inside
//! `tokio::task::spawn_blocking`.
//!
//! The sync cursor is the highest UID seen, stored as decimal text.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mail_parser::MessageParser;
use tracing::debug;

use super::{FetchedBody, ListOutcome, ProviderAdapter, ProviderError, RawMessage};

type ImapSession = imap::Session<native_tls::TlsStream<std::net::TcpStream>>;

#[derive(Clone)]
pub struct ImapAdapter {
    host: String,
    port: u16,
    username: String,
    password: String,
    mailbox: String,
}

impl ImapAdapter {
    pub fn new(host: &str, port: u16, username: &str, password: &str) -> Self {
        Self {
            host: host.to_string(),
            port,
            username: username.to_string(),
            password: password.to_string(),
            mailbox: "INBOX".to_string(),
        }
    }

    fn open_session(&self) -> Result<ImapSession, ProviderError> {
        let tls = native_tls::TlsConnector::builder()
            .build()
            .map_err(|e| ProviderError::Transient(format!("TLS setup failed: {}", e)))?;

        let client = imap::connect((self.host.as_str(), self.port), self.host.as_str(), &tls)
            .map_err(|e| {
                ProviderError::Transient(format!(
                    "failed to connect to {}:{}: {}",
                    self.host, self.port, e
                ))
            })?;

        // Rejected credentials are permanent until the user re-links
        client
            .login(self.username.as_str(), self.password.as_str())
            .map_err(|(e, _client)| ProviderError::AuthRevoked(format!("IMAP login failed: {}", e)))
    }

    fn list_blocking(&self, cursor: Option<String>, limit: u32) -> Result<ListOutcome, ProviderError> {
        let mut session = self.open_session()?;

        let outcome = (|| {
            session
                .select(&self.mailbox)
                .map_err(|e| ProviderError::Transient(format!("SELECT failed: {}", e)))?;

            let last_uid: u32 = cursor.as_deref().and_then(|c| c.parse().ok()).unwrap_or(0);
            let query = format!("UID {}:*", last_uid.saturating_add(1));
            let found = session
                .uid_search(&query)
                .map_err(|e| ProviderError::Transient(format!("UID SEARCH failed: {}", e)))?;

            // UID n:* always matches at least the last message in the mailbox,
            // even when its UID is below n, so filter explicitly.
            let mut uids: Vec<u32> = found.into_iter().filter(|uid| *uid > last_uid).collect();
            uids.sort_unstable();
            uids.truncate(limit as usize);

            if uids.is_empty() {
                return Ok(ListOutcome {
                    messages: Vec::new(),
                    next_cursor: None,
                });
            }

            let mut messages = Vec::with_capacity(uids.len());
            for uid in &uids {
                let fetches = session
                    .uid_fetch(uid.to_string(), "(UID BODY.PEEK[HEADER])")
                    .map_err(|e| ProviderError::Transient(format!("UID FETCH failed: {}", e)))?;

                for fetch in fetches.iter() {
                    let Some(header) = fetch.header() else {
                        continue;
                    };
                    match parse_message_headers(fetch.uid.unwrap_or(*uid), header) {
                        Some(message) => messages.push(message),
                        None => debug!("skipping unparseable message uid {}", uid),
                    }
                }
            }

            let next_cursor = uids.iter().max().map(|uid| uid.to_string());
            Ok(ListOutcome {
                messages,
                next_cursor,
            })
        })();

        session.logout().ok();
        outcome
    }

    fn fetch_body_blocking(&self, uid: String) -> Result<FetchedBody, ProviderError> {
        let mut session = self.open_session()?;

        let outcome = (|| {
            session
                .select(&self.mailbox)
                .map_err(|e| ProviderError::Transient(format!("SELECT failed: {}", e)))?;

            let fetches = session
                .uid_fetch(&uid, "(UID BODY.PEEK[])")
                .map_err(|e| ProviderError::Transient(format!("UID FETCH failed: {}", e)))?;

            let raw = fetches
                .iter()
                .find_map(|f| f.body())
                .ok_or_else(|| ProviderError::Contract(format!("message {} has no body", uid)))?;

            let message = MessageParser::default()
                .parse(raw)
                .ok_or_else(|| ProviderError::Contract(format!("unparseable message {}", uid)))?;

            Ok(FetchedBody {
                text: message.body_text(0).map(|t| t.to_string()),
                html: message.body_html(0).map(|h| h.to_string()),
            })
        })();

        session.logout().ok();
        outcome
    }
}

/// Build a RawMessage from a fetched RFC 5322 header block
fn parse_message_headers(uid: u32, header_bytes: &[u8]) -> Option<RawMessage> {
    let message = MessageParser::default().parse(header_bytes)?;

    let raw_header = |name: &str| -> Option<String> {
        message
            .header_raw(name)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    };

    let from = raw_header("From")?;

    let received_at: Option<DateTime<Utc>> = message
        .date()
        .and_then(|d| DateTime::from_timestamp(d.to_timestamp(), 0));

    Some(RawMessage {
        provider_message_id: uid.to_string(),
        from,
        to: raw_header("To"),
        subject: message.subject().map(|s| s.to_string()),
        snippet: None,
        list_unsubscribe: raw_header("List-Unsubscribe"),
        precedence: raw_header("Precedence"),
        received_at,
    })
}

#[async_trait]
impl ProviderAdapter for ImapAdapter {
    async fn list_new_messages(
        &self,
        cursor: Option<&str>,
        limit: u32,
    ) -> Result<ListOutcome, ProviderError> {
        let adapter = self.clone();
        let cursor = cursor.map(|c| c.to_string());

        tokio::task::spawn_blocking(move || adapter.list_blocking(cursor, limit))
            .await
            .map_err(|e| ProviderError::Transient(format!("IMAP task failed: {}", e)))?
    }

    async fn fetch_body(&self, message_ref: &str) -> Result<FetchedBody, ProviderError> {
        let adapter = self.clone();
        let uid = message_ref.to_string();

        tokio::task::spawn_blocking(move || adapter.fetch_body_blocking(uid))
            .await
            .map_err(|e| ProviderError::Transient(format!("IMAP task failed: {}", e)))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADERS: &[u8] = b"From: Alice Smith <alice@example.com>\r\n\
To: me@example.com\r\n\
Subject: Quarterly report\r\n\
Date: Mon, 13 Jul 2026 10:30:00 +0000\r\n\
List-Unsubscribe: <https://example.com/unsub>\r\n\
Precedence: bulk\r\n\
\r\n";

    #[test]
    fn test_parse_message_headers() {
        let message = parse_message_headers(42, HEADERS).unwrap();

        assert_eq!(message.provider_message_id, "42");
        assert!(message.from.contains("alice@example.com"));
        assert_eq!(message.subject.as_deref(), Some("Quarterly report"));
        assert_eq!(
            message.list_unsubscribe.as_deref(),
            Some("<https://example.com/unsub>")
        );
        assert_eq!(message.precedence.as_deref(), Some("bulk"));
        assert!(message.received_at.is_some());
        assert!(message.snippet.is_none());
    }

    #[test]
    fn test_parse_headers_without_from_is_skipped() {
        let headers = b"Subject: orphan\r\n\r\n";
        assert!(parse_message_headers(1, headers).is_none());
    }
}
