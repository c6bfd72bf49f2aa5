//! Incremental sync coordinator
//!
//! Drives each account through connect -> fetch -> persist. Dedup happens
//! at the database (`UNIQUE(account_id, provider_message_id)`), the cursor
//! only advances after the whole batch is durably written, and a
//! recently-synced window plus an in-process per-account lock keep
//! overlapping runs from doing duplicate work. Multi-account runs fan out
//! over a bounded worker pool; one failing account never aborts the rest.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{Duration as ChronoDuration, Utc};
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use crate::db::Database;
use crate::error::{Error, Result};
use crate::models::{
    display_name, normalize_address, Credentials, Direction, NewEmail, Protocol, SourceAccount,
};
use crate::provider::{
    FetchedBody, ImapAdapter, ProviderAdapter, ProviderError, RawMessage, RestAdapter,
    TokenRefresher,
};
use crate::vault::CredentialVault;

/// Accounts synced more recently than this are skipped unless forced
pub const RECENT_SYNC_WINDOW_SECONDS: i64 = 60;

/// Concurrent account syncs in a multi-account run
pub const SYNC_WORKERS: usize = 3;

/// Default messages fetched per sync
pub const DEFAULT_SYNC_LIMIT: u32 = 50;

const MAX_REPORTED_ERRORS: usize = 3;

/// Per-run sync knobs
#[derive(Debug, Clone)]
pub struct SyncOptions {
    pub limit: u32,
    /// Ignore the stored cursor and the recently-synced window
    pub full_sync: bool,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            limit: DEFAULT_SYNC_LIMIT,
            full_sync: false,
        }
    }
}

/// Outcome of syncing one account
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct SyncOutcome {
    pub synced: usize,
    pub errors: Vec<String>,
    pub cursor: Option<String>,
}

/// One account's line in a multi-account run
#[derive(Debug, Clone, serde::Serialize)]
pub struct AccountSyncReport {
    pub account_id: i64,
    pub address: String,
    pub synced: usize,
    pub error: Option<String>,
}

/// Outcome of a multi-account run
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct SyncAllOutcome {
    pub synced: usize,
    pub per_account: Vec<AccountSyncReport>,
    pub errors: Vec<String>,
}

type AdapterOverride = Arc<dyn Fn(&SourceAccount) -> Arc<dyn ProviderAdapter> + Send + Sync>;

/// Coordinates incremental sync across accounts. Cheap to clone.
#[derive(Clone)]
pub struct SyncCoordinator {
    db: Database,
    vault: CredentialVault,
    refresher: TokenRefresher,
    in_flight: Arc<Mutex<HashSet<i64>>>,
    /// Replaces adapter construction entirely; used by tests to script providers
    adapter_override: Option<AdapterOverride>,
}

impl SyncCoordinator {
    pub fn new(db: Database, vault: CredentialVault) -> Self {
        Self {
            db,
            vault,
            refresher: TokenRefresher::new(),
            in_flight: Arc::new(Mutex::new(HashSet::new())),
            adapter_override: None,
        }
    }

    /// Coordinator whose provider adapters come from the given factory
    pub fn with_adapter_override(
        db: Database,
        vault: CredentialVault,
        factory: AdapterOverride,
    ) -> Self {
        Self {
            db,
            vault,
            refresher: TokenRefresher::new(),
            in_flight: Arc::new(Mutex::new(HashSet::new())),
            adapter_override: Some(factory),
        }
    }

    fn in_flight(&self) -> MutexGuard<'_, HashSet<i64>> {
        self.in_flight.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Sync one account. Infrastructure problems surface as `Err`;
    /// provider-level failures come back inside the outcome.
    pub async fn sync_account(&self, account_id: i64, options: &SyncOptions) -> Result<SyncOutcome> {
        let account = self.db.get_account(account_id)?;

        if !account.active {
            return Ok(SyncOutcome {
                synced: 0,
                errors: vec![format!(
                    "account {} is deactivated: {}",
                    account.address,
                    account.last_error.as_deref().unwrap_or("unknown error")
                )],
                cursor: account.cursor,
            });
        }

        if !self.in_flight().insert(account_id) {
            debug!("account {} sync already in progress, skipping", account_id);
            return Ok(SyncOutcome {
                synced: 0,
                errors: Vec::new(),
                cursor: account.cursor,
            });
        }

        let result = self.sync_account_locked(&account, options).await;
        self.in_flight().remove(&account_id);
        result
    }

    async fn sync_account_locked(
        &self,
        account: &SourceAccount,
        options: &SyncOptions,
    ) -> Result<SyncOutcome> {
        // Recently-synced guard
        if !options.full_sync {
            if let Some(last) = account.last_synced_at {
                if Utc::now() - last < ChronoDuration::seconds(RECENT_SYNC_WINDOW_SECONDS) {
                    debug!("account {} synced recently, skipping", account.id);
                    return Ok(SyncOutcome {
                        synced: 0,
                        errors: Vec::new(),
                        cursor: account.cursor.clone(),
                    });
                }
            }
        }

        debug!("account {}: connecting", account.id);
        let adapter = match self.connect(account).await {
            Ok(adapter) => adapter,
            Err(e) => return self.handle_provider_error(account, e),
        };

        debug!("account {}: fetching", account.id);
        let cursor = if options.full_sync {
            None
        } else {
            account.cursor.clone()
        };

        let list = match adapter.list_new_messages(cursor.as_deref(), options.limit).await {
            Ok(list) => list,
            Err(ProviderError::AuthExpired) => {
                // One refresh-and-retry, then escalate
                self.refresher.invalidate(account.id).await;
                match self.connect(account).await {
                    Ok(adapter) => {
                        match adapter.list_new_messages(cursor.as_deref(), options.limit).await {
                            Ok(list) => list,
                            Err(e) => return self.handle_provider_error(account, e),
                        }
                    }
                    Err(e) => return self.handle_provider_error(account, e),
                }
            }
            Err(e) => return self.handle_provider_error(account, e),
        };

        debug!("account {}: persisting {} messages", account.id, list.messages.len());
        let new_emails: Vec<NewEmail> = list
            .messages
            .iter()
            .map(|m| raw_to_new_email(account, m))
            .collect();
        let inserted = self.db.insert_email_batch(&new_emails)?;

        // The batch is durable, the cursor may move now. Never backwards.
        let mut final_cursor = account.cursor.clone();
        if let Some(next) = list.next_cursor {
            if cursor_regressed(account.cursor.as_deref(), &next) {
                warn!(
                    "account {}: provider cursor {} behind stored {:?}, not advancing",
                    account.id, next, account.cursor
                );
            } else {
                self.db.update_account_cursor(account.id, &next)?;
                final_cursor = Some(next);
            }
        }
        self.db.mark_account_synced(account.id)?;

        info!(
            "account {}: synced {} new of {} fetched",
            account.id,
            inserted,
            new_emails.len()
        );
        Ok(SyncOutcome {
            synced: inserted,
            errors: Vec::new(),
            cursor: final_cursor,
        })
    }

    /// Sync every active account of a user over a bounded worker pool
    pub async fn sync_all(&self, user_id: &str, options: &SyncOptions) -> Result<SyncAllOutcome> {
        let accounts = self.db.list_active_accounts(user_id)?;
        let semaphore = Arc::new(Semaphore::new(SYNC_WORKERS));

        let mut handles = Vec::with_capacity(accounts.len());
        for account in accounts {
            let coordinator = self.clone();
            let options = options.clone();
            let semaphore = semaphore.clone();
            handles.push(tokio::spawn(async move {
                let _permit = semaphore.acquire_owned().await.ok();
                let outcome = coordinator.sync_account(account.id, &options).await;
                (account.id, account.address, outcome)
            }));
        }

        let mut all = SyncAllOutcome::default();
        for handle in handles {
            match handle.await {
                Ok((account_id, address, Ok(outcome))) => {
                    all.synced += outcome.synced;
                    let error = outcome.errors.first().cloned();
                    if let Some(e) = &error {
                        if all.errors.len() < MAX_REPORTED_ERRORS {
                            all.errors.push(format!("{}: {}", address, e));
                        }
                    }
                    all.per_account.push(AccountSyncReport {
                        account_id,
                        address,
                        synced: outcome.synced,
                        error,
                    });
                }
                Ok((account_id, address, Err(e))) => {
                    let message = e.to_string();
                    if all.errors.len() < MAX_REPORTED_ERRORS {
                        all.errors.push(format!("{}: {}", address, message));
                    }
                    all.per_account.push(AccountSyncReport {
                        account_id,
                        address,
                        synced: 0,
                        error: Some(message),
                    });
                }
                Err(e) => {
                    if all.errors.len() < MAX_REPORTED_ERRORS {
                        all.errors.push(format!("sync task failed: {}", e));
                    }
                }
            }
        }

        Ok(all)
    }

    /// Lazy body loader: fetch and persist a body on first read.
    /// Stored bodies are served without touching the provider.
    pub async fn fetch_body(&self, email_id: i64) -> Result<FetchedBody> {
        let email = self.db.get_email(email_id)?;
        if email.body_fetched {
            return Ok(FetchedBody {
                text: email.body_text,
                html: email.body_html,
            });
        }

        let account = self.db.get_account(email.account_id)?;
        let adapter = self.connect(&account).await.map_err(Error::Provider)?;

        let body = match adapter.fetch_body(&email.provider_message_id).await {
            Ok(body) => body,
            Err(ProviderError::AuthExpired) => {
                self.refresher.invalidate(account.id).await;
                let adapter = self.connect(&account).await.map_err(Error::Provider)?;
                adapter.fetch_body(&email.provider_message_id).await?
            }
            Err(e) => return Err(e.into()),
        };

        self.db
            .set_email_body(email_id, body.text.as_deref(), body.html.as_deref())?;
        Ok(body)
    }

    /// Build the provider adapter for an account, minting a fresh access
    /// token for REST accounts when needed.
    async fn connect(&self, account: &SourceAccount) -> std::result::Result<Arc<dyn ProviderAdapter>, ProviderError> {
        if let Some(factory) = &self.adapter_override {
            return Ok(factory(account));
        }

        let credentials = self
            .vault
            .decrypt(&account.credentials)
            .map_err(|e| ProviderError::AuthRevoked(format!("credential blob unreadable: {}", e)))?;

        match (account.protocol, credentials) {
            (
                Protocol::Imap,
                Credentials::Password {
                    username,
                    password,
                    host,
                    port,
                },
            ) => Ok(Arc::new(ImapAdapter::new(&host, port, &username, &password))),
            (
                Protocol::Rest,
                Credentials::OAuth {
                    client_id,
                    refresh_token,
                    access_token,
                    token_uri,
                    api_base,
                    expiry,
                },
            ) => {
                let token = self
                    .refresher
                    .fresh_token(
                        account.id,
                        &access_token,
                        expiry,
                        &client_id,
                        &refresh_token,
                        &token_uri,
                    )
                    .await?;
                Ok(Arc::new(RestAdapter::new(&api_base, &token.token)))
            }
            _ => Err(ProviderError::Contract(
                "stored credential kind does not match account protocol".to_string(),
            )),
        }
    }

    /// Translate a provider failure into account state plus a user-visible
    /// outcome. Only `AuthRevoked` deactivates; everything else leaves the
    /// account ready for the next attempt.
    fn handle_provider_error(
        &self,
        account: &SourceAccount,
        error: ProviderError,
    ) -> Result<SyncOutcome> {
        let message = match &error {
            ProviderError::AuthRevoked(detail) => {
                warn!("account {}: auth revoked, deactivating: {}", account.id, detail);
                let message = format!("authentication revoked: {}", detail);
                self.db.deactivate_account(account.id, &message)?;
                message
            }
            ProviderError::AuthExpired => {
                let message = "access token rejected after refresh".to_string();
                self.db.record_account_error(account.id, &message)?;
                message
            }
            ProviderError::Transient(detail) | ProviderError::Contract(detail) => {
                debug!("account {}: sync failed, will retry later: {}", account.id, detail);
                self.db.record_account_error(account.id, detail)?;
                detail.clone()
            }
        };

        Ok(SyncOutcome {
            synced: 0,
            errors: vec![message],
            cursor: account.cursor.clone(),
        })
    }
}

fn raw_to_new_email(account: &SourceAccount, message: &RawMessage) -> NewEmail {
    let from_address = normalize_address(&message.from);
    // Mail sent by the mailbox owner (e.g. a Sent-folder hit on a full
    // resync) is outbound; everything else is inbound.
    let direction = if from_address == account.address {
        Direction::Outbound
    } else {
        Direction::Inbound
    };
    NewEmail {
        account_id: account.id,
        provider_message_id: message.provider_message_id.clone(),
        direction,
        from_name: display_name(&message.from),
        from_address,
        to_address: message.to.clone(),
        subject: message.subject.clone(),
        snippet: message.snippet.clone(),
        list_unsubscribe: message.list_unsubscribe.clone(),
        precedence: message.precedence.clone(),
        received_at: message.received_at,
    }
}

/// True when both cursors parse numerically and the new one is behind
fn cursor_regressed(old: Option<&str>, new: &str) -> bool {
    match (old.and_then(|c| c.parse::<u64>().ok()), new.parse::<u64>().ok()) {
        (Some(old), Some(new)) => new < old,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NewSourceAccount;
    use crate::test_utils::{raw_message, ScriptedAdapter};

    fn setup_with_adapter(adapter: Arc<ScriptedAdapter>) -> (Database, SyncCoordinator, i64) {
        let db = Database::in_memory().unwrap();
        let vault = CredentialVault::new("test-passphrase").unwrap();

        let account_id = db
            .create_account(&NewSourceAccount {
                user_id: "default".into(),
                address: "me@example.com".into(),
                protocol: Protocol::Imap,
                credentials: "scripted".into(),
            })
            .unwrap();

        let coordinator = SyncCoordinator::with_adapter_override(
            db.clone(),
            vault,
            Arc::new(move |_account| adapter.clone() as Arc<dyn ProviderAdapter>),
        );
        (db, coordinator, account_id)
    }

    #[tokio::test]
    async fn test_new_message_advances_cursor() {
        let adapter = Arc::new(ScriptedAdapter::new());
        adapter.push_page(
            vec![raw_message("101", "alice@example.com", "Hello")],
            Some("101"),
        );

        let (db, coordinator, account_id) = setup_with_adapter(adapter);
        db.update_account_cursor(account_id, "100").unwrap();

        let outcome = coordinator
            .sync_account(account_id, &SyncOptions::default())
            .await
            .unwrap();

        assert_eq!(outcome.synced, 1);
        assert!(outcome.errors.is_empty());
        assert_eq!(outcome.cursor.as_deref(), Some("101"));
        assert_eq!(
            db.get_account(account_id).unwrap().cursor.as_deref(),
            Some("101")
        );
    }

    #[tokio::test]
    async fn test_immediate_rerun_is_skipped() {
        let adapter = Arc::new(ScriptedAdapter::new());
        adapter.push_page(
            vec![raw_message("101", "alice@example.com", "Hello")],
            Some("101"),
        );

        let (db, coordinator, account_id) = setup_with_adapter(adapter);

        let first = coordinator
            .sync_account(account_id, &SyncOptions::default())
            .await
            .unwrap();
        assert_eq!(first.synced, 1);

        // Within the recently-synced window: no provider call, nothing new
        let second = coordinator
            .sync_account(account_id, &SyncOptions::default())
            .await
            .unwrap();
        assert_eq!(second.synced, 0);
        assert!(second.errors.is_empty());
        assert_eq!(db.count_emails().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_full_resync_dedupes() {
        let adapter = Arc::new(ScriptedAdapter::new());
        adapter.push_page(
            vec![raw_message("101", "alice@example.com", "Hello")],
            Some("101"),
        );
        // Same message served again on the forced re-run
        adapter.push_page(
            vec![raw_message("101", "alice@example.com", "Hello")],
            Some("101"),
        );

        let (db, coordinator, account_id) = setup_with_adapter(adapter);

        let first = coordinator
            .sync_account(account_id, &SyncOptions::default())
            .await
            .unwrap();
        assert_eq!(first.synced, 1);

        let forced = SyncOptions {
            full_sync: true,
            ..Default::default()
        };
        let second = coordinator.sync_account(account_id, &forced).await.unwrap();
        assert_eq!(second.synced, 0);
        assert_eq!(db.count_emails().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_cursor_never_regresses() {
        let adapter = Arc::new(ScriptedAdapter::new());
        adapter.push_page(vec![], Some("90"));

        let (db, coordinator, account_id) = setup_with_adapter(adapter);
        db.update_account_cursor(account_id, "101").unwrap();

        let outcome = coordinator
            .sync_account(account_id, &SyncOptions::default())
            .await
            .unwrap();

        assert_eq!(outcome.cursor.as_deref(), Some("101"));
        assert_eq!(
            db.get_account(account_id).unwrap().cursor.as_deref(),
            Some("101")
        );
    }

    #[tokio::test]
    async fn test_transient_error_keeps_account_active() {
        let adapter = Arc::new(ScriptedAdapter::new());
        adapter.push_error(ProviderError::Transient("server sneezed".into()));

        let (db, coordinator, account_id) = setup_with_adapter(adapter);
        db.update_account_cursor(account_id, "50").unwrap();

        let outcome = coordinator
            .sync_account(account_id, &SyncOptions::default())
            .await
            .unwrap();

        assert_eq!(outcome.synced, 0);
        assert_eq!(outcome.errors.len(), 1);
        assert_eq!(outcome.cursor.as_deref(), Some("50"));

        let account = db.get_account(account_id).unwrap();
        assert!(account.active);
        assert_eq!(account.last_error.as_deref(), Some("server sneezed"));
        // Failed sync must not look like a fresh one
        assert!(account.last_synced_at.is_none());
    }

    #[tokio::test]
    async fn test_revoked_auth_deactivates_account() {
        let adapter = Arc::new(ScriptedAdapter::new());
        adapter.push_error(ProviderError::AuthRevoked("password changed".into()));

        let (db, coordinator, account_id) = setup_with_adapter(adapter);

        let outcome = coordinator
            .sync_account(account_id, &SyncOptions::default())
            .await
            .unwrap();
        assert_eq!(outcome.errors.len(), 1);

        let account = db.get_account(account_id).unwrap();
        assert!(!account.active);
        assert!(account.last_error.as_deref().unwrap().contains("revoked"));

        // Further syncs refuse without touching the provider
        let again = coordinator
            .sync_account(account_id, &SyncOptions::default())
            .await
            .unwrap();
        assert_eq!(again.synced, 0);
        assert!(!again.errors.is_empty());
    }

    #[tokio::test]
    async fn test_sync_all_isolates_failures() {
        let db = Database::in_memory().unwrap();
        let vault = CredentialVault::new("test-passphrase").unwrap();

        let good = db
            .create_account(&NewSourceAccount {
                user_id: "default".into(),
                address: "good@example.com".into(),
                protocol: Protocol::Imap,
                credentials: "scripted".into(),
            })
            .unwrap();
        let bad = db
            .create_account(&NewSourceAccount {
                user_id: "default".into(),
                address: "bad@example.com".into(),
                protocol: Protocol::Imap,
                credentials: "scripted".into(),
            })
            .unwrap();

        let good_adapter = Arc::new(ScriptedAdapter::new());
        good_adapter.push_page(
            vec![raw_message("7", "sender@example.com", "Hi")],
            Some("7"),
        );
        let bad_adapter = Arc::new(ScriptedAdapter::new());
        bad_adapter.push_error(ProviderError::Transient("down".into()));

        let coordinator = SyncCoordinator::with_adapter_override(
            db.clone(),
            vault,
            Arc::new(move |account| {
                if account.id == good {
                    good_adapter.clone() as Arc<dyn ProviderAdapter>
                } else {
                    bad_adapter.clone() as Arc<dyn ProviderAdapter>
                }
            }),
        );

        let outcome = coordinator
            .sync_all("default", &SyncOptions::default())
            .await
            .unwrap();

        assert_eq!(outcome.synced, 1);
        assert_eq!(outcome.per_account.len(), 2);
        assert_eq!(outcome.errors.len(), 1);

        let good_report = outcome
            .per_account
            .iter()
            .find(|r| r.account_id == good)
            .unwrap();
        assert_eq!(good_report.synced, 1);
        assert!(good_report.error.is_none());

        let bad_report = outcome
            .per_account
            .iter()
            .find(|r| r.account_id == bad)
            .unwrap();
        assert!(bad_report.error.is_some());
    }

    #[tokio::test]
    async fn test_lazy_body_fetch_persists() {
        let adapter = Arc::new(ScriptedAdapter::new());
        adapter.push_page(
            vec![raw_message("101", "alice@example.com", "Hello")],
            Some("101"),
        );
        adapter.set_body(FetchedBody {
            text: Some("full body".into()),
            html: None,
        });

        let (db, coordinator, account_id) = setup_with_adapter(adapter);
        coordinator
            .sync_account(account_id, &SyncOptions::default())
            .await
            .unwrap();

        let email_id = db.list_emails(Some(account_id), 10, 0).unwrap()[0].id;
        assert!(!db.get_email(email_id).unwrap().body_fetched);

        let body = coordinator.fetch_body(email_id).await.unwrap();
        assert_eq!(body.text.as_deref(), Some("full body"));
        assert!(db.get_email(email_id).unwrap().body_fetched);

        // Second read is served from storage, no provider involved
        let empty_adapter = Arc::new(ScriptedAdapter::new());
        let vault = CredentialVault::new("test-passphrase").unwrap();
        let offline = SyncCoordinator::with_adapter_override(
            db.clone(),
            vault,
            Arc::new(move |_| empty_adapter.clone() as Arc<dyn ProviderAdapter>),
        );
        let body = offline.fetch_body(email_id).await.unwrap();
        assert_eq!(body.text.as_deref(), Some("full body"));
    }

    #[test]
    fn test_cursor_regression_detection() {
        assert!(cursor_regressed(Some("101"), "90"));
        assert!(!cursor_regressed(Some("101"), "102"));
        assert!(!cursor_regressed(None, "5"));
        // Opaque tokens never count as regressions
        assert!(!cursor_regressed(Some("history-abc"), "history-xyz"));
    }
}
