//! Reputation handlers

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    Json,
};
use serde::Deserialize;

use crate::{AppError, AppState, SuccessResponse, DEFAULT_USER};
use mailpilot_core::models::TrustOverride;
use mailpilot_core::reputation::{RebuildOutcome, ReputationView};

/// Query parameters for reputation lookup
#[derive(Debug, Deserialize)]
pub struct ReputationQuery {
    pub sender: Option<String>,
    pub domain: Option<String>,
    pub user_id: Option<String>,
}

/// GET /api/reputation?sender=|domain= - Look up one reputation key
pub async fn get_reputation(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ReputationQuery>,
) -> Result<Json<ReputationView>, AppError> {
    let user = params.user_id.as_deref().unwrap_or(DEFAULT_USER);

    let view = match (&params.sender, &params.domain) {
        (Some(sender), None) => state.reputation.get_sender(user, sender)?,
        (None, Some(domain)) => state.reputation.get_domain(user, domain)?,
        _ => {
            return Err(AppError::bad_request(
                "Provide exactly one of 'sender' or 'domain'",
            ))
        }
    };

    view.map(Json)
        .ok_or_else(|| AppError::not_found("No reputation recorded for that key"))
}

/// Request body for setting a trust override
#[derive(Debug, Deserialize)]
pub struct OverrideRequest {
    pub sender: Option<String>,
    pub domain: Option<String>,
    /// "trusted", "untrusted", or null to clear
    pub value: Option<String>,
    pub user_id: Option<String>,
}

/// POST /api/reputation/override - Set or clear a trust override
pub async fn set_reputation_override(
    State(state): State<Arc<AppState>>,
    Json(req): Json<OverrideRequest>,
) -> Result<Json<SuccessResponse>, AppError> {
    let user = req.user_id.as_deref().unwrap_or(DEFAULT_USER);

    let value = match &req.value {
        Some(raw) => Some(raw.parse::<TrustOverride>().map_err(|_| {
            AppError::bad_request(&format!("Unknown trust override: {}", raw))
        })?),
        None => None,
    };

    match (&req.sender, &req.domain) {
        (Some(sender), None) => state.reputation.set_sender_override(user, sender, value)?,
        (None, Some(domain)) => state.reputation.set_domain_override(user, domain, value)?,
        _ => {
            return Err(AppError::bad_request(
                "Provide exactly one of 'sender' or 'domain'",
            ))
        }
    }

    Ok(Json(SuccessResponse { success: true }))
}

/// Request body for a reputation rebuild
#[derive(Debug, Default, Deserialize)]
pub struct RebuildRequest {
    pub user_id: Option<String>,
}

/// POST /api/reputation/rebuild - Recompute all derived reputation scores
pub async fn rebuild_reputation(
    State(state): State<Arc<AppState>>,
    req: Option<Json<RebuildRequest>>,
) -> Result<Json<RebuildOutcome>, AppError> {
    let req = req.map(|Json(r)| r).unwrap_or_default();
    let user = req.user_id.as_deref().unwrap_or(DEFAULT_USER);
    Ok(Json(state.reputation.rebuild(user)?))
}
