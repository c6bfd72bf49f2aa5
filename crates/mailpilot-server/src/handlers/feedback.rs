//! Feedback and accuracy handlers

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::Deserialize;

use crate::{AppError, AppState, MAX_PAGE_LIMIT};
use mailpilot_core::feedback::CorrectionOutcome;
use mailpilot_core::models::{Category, CategoryAccuracy, FeedbackRecord};

/// Request body for correcting a classification
#[derive(Debug, Deserialize)]
pub struct CorrectionRequest {
    pub category: String,
}

/// POST /api/emails/:id/feedback - Correct an email's category
pub async fn correct_email(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Json(req): Json<CorrectionRequest>,
) -> Result<Json<CorrectionOutcome>, AppError> {
    let category: Category = req
        .category
        .parse()
        .map_err(|_| AppError::bad_request(&format!("Unknown category: {}", req.category)))?;

    let outcome = state.feedback.record_correction(id, category)?;
    Ok(Json(outcome))
}

/// Query parameters for listing feedback
#[derive(Debug, Deserialize)]
pub struct FeedbackQuery {
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
}

fn default_limit() -> i64 {
    100
}

/// GET /api/feedback - Correction history, newest first
pub async fn list_feedback(
    State(state): State<Arc<AppState>>,
    Query(params): Query<FeedbackQuery>,
) -> Result<Json<Vec<FeedbackRecord>>, AppError> {
    let limit = params.limit.clamp(1, MAX_PAGE_LIMIT);
    Ok(Json(state.feedback.history(limit, params.offset)?))
}

/// GET /api/accuracy - Per-category classification accuracy
pub async fn get_accuracy(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<CategoryAccuracy>>, AppError> {
    Ok(Json(state.feedback.accuracy_report()?))
}
