//! Health and status handlers

use std::sync::Arc;

use axum::{extract::State, Json};
use serde::Serialize;

use crate::{AppError, AppState};

/// Health report for the service and its classifier backend
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub classifier_configured: bool,
    pub classifier_healthy: bool,
    pub classifier_backend: Option<&'static str>,
    pub accounts: i64,
    pub emails: i64,
}

/// GET /api/health - Service health, including the classifier probe
pub async fn get_health(
    State(state): State<Arc<AppState>>,
) -> Result<Json<HealthResponse>, AppError> {
    let (classifier_configured, classifier_healthy, classifier_backend) = match &state.engine {
        Some(engine) => (true, engine.classifier_healthy().await, Some(engine.backend_name())),
        None => (false, false, None),
    };

    Ok(Json(HealthResponse {
        status: "ok",
        classifier_configured,
        classifier_healthy,
        classifier_backend,
        accounts: state.db.list_accounts(None)?.len() as i64,
        emails: state.db.count_emails()?,
    }))
}
