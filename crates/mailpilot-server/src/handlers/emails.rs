//! Email listing and lazy body loading

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::{AppError, AppState, SuccessResponse, MAX_PAGE_LIMIT};
use mailpilot_core::models::Email;

/// Query parameters for listing emails
#[derive(Debug, Deserialize)]
pub struct EmailsQuery {
    pub account_id: Option<i64>,
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
}

fn default_limit() -> i64 {
    100
}

/// GET /api/emails - List synced emails, newest first
pub async fn list_emails(
    State(state): State<Arc<AppState>>,
    Query(params): Query<EmailsQuery>,
) -> Result<Json<Vec<Email>>, AppError> {
    let limit = params.limit.clamp(1, MAX_PAGE_LIMIT);
    let emails = state.db.list_emails(params.account_id, limit, params.offset)?;
    Ok(Json(emails))
}

/// Query parameters for fetching one email
#[derive(Debug, Deserialize)]
pub struct EmailQuery {
    /// Fetch the full body from the provider if it is not stored yet
    #[serde(default)]
    pub include_body: bool,
}

/// Email plus an indicator of whether the body came from the provider
#[derive(Debug, Serialize)]
pub struct EmailResponse {
    #[serde(flatten)]
    pub email: Email,
    pub body_loaded: bool,
}

/// GET /api/emails/:id - Get one email, optionally loading its body
///
/// Bodies are fetched lazily: the first `include_body` read pulls the full
/// message from the provider and persists it, later reads are local.
pub async fn get_email(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Query(params): Query<EmailQuery>,
) -> Result<Json<EmailResponse>, AppError> {
    if params.include_body {
        state.sync.fetch_body(id).await?;
    }

    let email = state.db.get_email(id)?;
    let body_loaded = email.body_fetched;
    Ok(Json(EmailResponse { email, body_loaded }))
}

/// Request body for flag updates
#[derive(Debug, Deserialize)]
pub struct FlagRequest {
    /// One of: is_read, starred, archived, deleted
    pub flag: String,
    pub value: bool,
}

/// POST /api/emails/:id/flags - Set a mailbox flag
pub async fn set_email_flag(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Json(req): Json<FlagRequest>,
) -> Result<Json<SuccessResponse>, AppError> {
    state.db.set_email_flag(id, &req.flag, req.value)?;
    Ok(Json(SuccessResponse { success: true }))
}
