//! Account management and sync handlers

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::Deserialize;

use crate::{AppError, AppState, SuccessResponse, DEFAULT_USER};
use mailpilot_core::models::{Credentials, NewSourceAccount, Protocol, SourceAccount};
use mailpilot_core::sync::{SyncAllOutcome, SyncOptions, SyncOutcome, DEFAULT_SYNC_LIMIT};

/// Request body for linking an account
#[derive(Debug, Deserialize)]
pub struct CreateAccountRequest {
    pub address: String,
    pub protocol: String,
    /// Plaintext credentials; encrypted into the vault before storage
    pub credentials: Credentials,
    pub user_id: Option<String>,
}

/// Query parameters for listing accounts
#[derive(Debug, Deserialize)]
pub struct AccountsQuery {
    pub user_id: Option<String>,
}

/// GET /api/accounts - List linked accounts
pub async fn list_accounts(
    State(state): State<Arc<AppState>>,
    Query(params): Query<AccountsQuery>,
) -> Result<Json<Vec<SourceAccount>>, AppError> {
    let accounts = state.db.list_accounts(params.user_id.as_deref())?;
    Ok(Json(accounts))
}

/// POST /api/accounts - Link a new source account
pub async fn create_account(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateAccountRequest>,
) -> Result<Json<SourceAccount>, AppError> {
    let protocol: Protocol = req
        .protocol
        .parse()
        .map_err(|_| AppError::bad_request(&format!("Unknown protocol: {}", req.protocol)))?;

    if !req.address.contains('@') {
        return Err(AppError::bad_request("Address must contain '@'"));
    }

    // Plaintext credentials never reach the database
    let blob = state.vault.encrypt(&req.credentials)?;

    let account_id = state.db.create_account(&NewSourceAccount {
        user_id: req.user_id.unwrap_or_else(|| DEFAULT_USER.to_string()),
        address: req.address,
        protocol,
        credentials: blob,
    })?;

    Ok(Json(state.db.get_account(account_id)?))
}

/// GET /api/accounts/:id - Get a single account
pub async fn get_account(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<SourceAccount>, AppError> {
    Ok(Json(state.db.get_account(id)?))
}

/// Request body for replacing account credentials
#[derive(Debug, Deserialize)]
pub struct UpdateCredentialsRequest {
    pub credentials: Credentials,
}

/// POST /api/accounts/:id/credentials - Replace credentials and reactivate
pub async fn update_credentials(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Json(req): Json<UpdateCredentialsRequest>,
) -> Result<Json<SuccessResponse>, AppError> {
    // NotFound surfaces before any vault work
    state.db.get_account(id)?;

    let blob = state.vault.encrypt(&req.credentials)?;
    state.db.update_account_credentials(id, &blob)?;

    Ok(Json(SuccessResponse { success: true }))
}

/// Request body for sync endpoints
#[derive(Debug, Default, Deserialize)]
pub struct SyncRequest {
    pub limit: Option<u32>,
    #[serde(default)]
    pub full_sync: bool,
    pub user_id: Option<String>,
}

impl SyncRequest {
    fn options(&self) -> SyncOptions {
        SyncOptions {
            limit: self.limit.unwrap_or(DEFAULT_SYNC_LIMIT),
            full_sync: self.full_sync,
        }
    }
}

/// POST /api/accounts/:id/sync - Sync one account
pub async fn sync_account(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    req: Option<Json<SyncRequest>>,
) -> Result<Json<SyncOutcome>, AppError> {
    let req = req.map(|Json(r)| r).unwrap_or_default();
    let outcome = state.sync.sync_account(id, &req.options()).await?;
    Ok(Json(outcome))
}

/// POST /api/sync - Sync every active account of a user
pub async fn sync_all(
    State(state): State<Arc<AppState>>,
    req: Option<Json<SyncRequest>>,
) -> Result<Json<SyncAllOutcome>, AppError> {
    let req = req.map(|Json(r)| r).unwrap_or_default();
    let user = req.user_id.clone().unwrap_or_else(|| DEFAULT_USER.to_string());
    let outcome = state.sync.sync_all(&user, &req.options()).await?;
    Ok(Json(outcome))
}
