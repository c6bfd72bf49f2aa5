//! Classification handlers

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    Json,
};
use serde::Deserialize;

use crate::{AppError, AppState};
use mailpilot_core::classify::{ClassificationEngine, ClassifyBatchOptions, ClassifyBatchOutcome};
use mailpilot_core::models::ClassificationResult;

fn engine(state: &AppState) -> Result<&ClassificationEngine, AppError> {
    state
        .engine
        .as_ref()
        .ok_or_else(|| AppError::unavailable("No classifier backend configured"))
}

/// POST /api/emails/:id/classify - Classify one email now
pub async fn classify_email(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<ClassificationResult>, AppError> {
    let result = engine(&state)?.classify_email(id).await?;
    Ok(Json(result))
}

/// Request body for batch classification
#[derive(Debug, Default, Deserialize)]
pub struct ClassifyBatchRequest {
    /// Explicit email IDs; when absent, the oldest unclassified emails
    pub ids: Option<Vec<i64>>,
    /// Queue size when ids is absent (default 50)
    pub limit: Option<i64>,
}

/// POST /api/classify/batch - Classify a batch of emails
///
/// Runs under a wall-clock budget; IDs it could not get to come back in
/// `remaining` so the caller can continue where the run stopped.
pub async fn classify_batch(
    State(state): State<Arc<AppState>>,
    req: Option<Json<ClassifyBatchRequest>>,
) -> Result<Json<ClassifyBatchOutcome>, AppError> {
    let req = req.map(|Json(r)| r).unwrap_or_default();

    let ids = match req.ids {
        Some(ids) => ids,
        None => state.db.unclassified_email_ids(req.limit.unwrap_or(50))?,
    };

    let outcome = engine(&state)?
        .classify_batch(&ids, &ClassifyBatchOptions::default())
        .await;
    Ok(Json(outcome))
}
