//! Mailpilot Web Server
//!
//! Axum-based REST API over the mail pipeline.
//!
//! Security features:
//! - API-key authentication (secure by default, use --no-auth for local dev)
//! - Restrictive CORS policy
//! - Input validation (pagination limits, enum parsing at the boundary)
//! - Sanitized error responses

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::{header, HeaderValue, Method, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use tower_http::{cors::CorsLayer, set_header::SetResponseHeaderLayer, trace::TraceLayer};
use tracing::{error, info, warn};

use mailpilot_core::classify::{ClassificationEngine, ClassifierClient};
use mailpilot_core::db::Database;
use mailpilot_core::feedback::FeedbackLoop;
use mailpilot_core::reputation::ReputationStore;
use mailpilot_core::sync::SyncCoordinator;
use mailpilot_core::vault::CredentialVault;

mod handlers;

/// Maximum pagination limit
pub const MAX_PAGE_LIMIT: i64 = 500;

/// User namespace used when a request carries no user_id
pub const DEFAULT_USER: &str = "default";

/// Authorization header for API key auth
const AUTHORIZATION_HEADER: &str = "authorization";

/// Server configuration
#[derive(Clone)]
pub struct ServerConfig {
    /// Whether authentication is required (secure by default)
    pub require_auth: bool,
    /// Allowed CORS origins (empty = same-origin only)
    pub allowed_origins: Vec<String>,
    /// API keys accepted as `Bearer <key>` in the Authorization header
    pub api_keys: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            require_auth: true,
            allowed_origins: vec![],
            api_keys: vec![],
        }
    }
}

/// Shared application state
pub struct AppState {
    pub db: Database,
    pub config: ServerConfig,
    pub vault: CredentialVault,
    pub sync: SyncCoordinator,
    /// None when no classifier backend is configured
    pub engine: Option<ClassificationEngine>,
    pub feedback: FeedbackLoop,
    pub reputation: ReputationStore,
}

/// Authentication middleware - validates API keys
///
/// Keys are compared using constant-time comparison to prevent timing attacks.
async fn auth_middleware(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Response {
    if !state.config.require_auth {
        return next.run(request).await;
    }

    let api_key_valid = request
        .headers()
        .get(AUTHORIZATION_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|auth| auth.strip_prefix("Bearer "))
        .map(|key| validate_api_key(key, &state.config.api_keys))
        .unwrap_or(false);

    if api_key_valid {
        return next.run(request).await;
    }

    warn!(path = %request.uri().path(), "Unauthorized request - no valid auth");
    (
        StatusCode::UNAUTHORIZED,
        Json(serde_json::json!({
            "error": "Authentication required"
        })),
    )
        .into_response()
}

/// Validate an API key against the configured keys using constant-time
/// comparison to prevent timing attacks.
fn validate_api_key(provided: &str, valid_keys: &[String]) -> bool {
    use subtle::ConstantTimeEq;

    let provided_bytes = provided.as_bytes();

    for key in valid_keys {
        let key_bytes = key.as_bytes();
        // Only compare if lengths match (constant-time for same-length keys)
        if provided_bytes.len() == key_bytes.len() && bool::from(provided_bytes.ct_eq(key_bytes)) {
            return true;
        }
    }
    false
}

/// Success response
#[derive(Serialize)]
pub struct SuccessResponse {
    pub success: bool,
}

/// Create the application router
pub fn create_router(db: Database, vault: CredentialVault, config: ServerConfig) -> Router {
    let classifier = ClassifierClient::from_env();
    create_router_with_classifier(db, vault, config, classifier)
}

/// Create the application router with an explicit classifier (for testing)
pub fn create_router_with_classifier(
    db: Database,
    vault: CredentialVault,
    config: ServerConfig,
    classifier: Option<ClassifierClient>,
) -> Router {
    let engine = match classifier {
        Some(client) => match ClassificationEngine::new(db.clone(), client) {
            Ok(engine) => {
                info!("classifier backend configured: {}", engine.backend_name());
                Some(engine)
            }
            Err(e) => {
                error!("failed to build classification engine: {}", e);
                None
            }
        },
        None => {
            info!("no classifier backend configured, classification disabled");
            None
        }
    };

    let state = Arc::new(AppState {
        sync: SyncCoordinator::new(db.clone(), vault.clone()),
        feedback: FeedbackLoop::new(db.clone()),
        reputation: ReputationStore::new(db.clone()),
        engine,
        db,
        vault,
        config: config.clone(),
    });

    let api_routes = Router::new()
        // Accounts
        .route(
            "/accounts",
            get(handlers::list_accounts).post(handlers::create_account),
        )
        .route("/accounts/:id", get(handlers::get_account))
        .route("/accounts/:id/credentials", post(handlers::update_credentials))
        // Sync
        .route("/accounts/:id/sync", post(handlers::sync_account))
        .route("/sync", post(handlers::sync_all))
        // Emails
        .route("/emails", get(handlers::list_emails))
        .route("/emails/:id", get(handlers::get_email))
        .route("/emails/:id/flags", post(handlers::set_email_flag))
        // Classification
        .route("/emails/:id/classify", post(handlers::classify_email))
        .route("/classify/batch", post(handlers::classify_batch))
        // Feedback
        .route(
            "/feedback",
            get(handlers::list_feedback),
        )
        .route("/emails/:id/feedback", post(handlers::correct_email))
        .route("/accuracy", get(handlers::get_accuracy))
        // Reputation
        .route("/reputation", get(handlers::get_reputation))
        .route("/reputation/override", post(handlers::set_reputation_override))
        .route("/reputation/rebuild", post(handlers::rebuild_reputation))
        // Health
        .route("/health", get(handlers::get_health));

    // Build CORS layer
    let cors = if config.allowed_origins.is_empty() {
        // Restrictive default: only allow same-origin
        CorsLayer::new()
            .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
            .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
    } else {
        let origins: Vec<HeaderValue> = config
            .allowed_origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();
        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
            .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
    };

    Router::new()
        .nest("/api", api_routes)
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(SetResponseHeaderLayer::overriding(
            header::X_CONTENT_TYPE_OPTIONS,
            HeaderValue::from_static("nosniff"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::X_FRAME_OPTIONS,
            HeaderValue::from_static("DENY"),
        ))
}

/// Start the server with custom configuration
pub async fn serve_with_config(
    db: Database,
    vault: CredentialVault,
    host: &str,
    port: u16,
    config: ServerConfig,
) -> anyhow::Result<()> {
    if !config.require_auth {
        warn!("authentication disabled - do not expose to network!");
    }

    let app = create_router(db, vault, config);
    let addr = format!("{}:{}", host, port);

    info!("Starting server at http://{}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

// ============================================================================
// Error Handling
// ============================================================================

/// Application error type with proper HTTP status codes
pub struct AppError {
    status: StatusCode,
    message: String,
    internal: Option<anyhow::Error>,
}

impl AppError {
    pub fn bad_request(msg: &str) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: msg.to_string(),
            internal: None,
        }
    }

    pub fn not_found(msg: &str) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: msg.to_string(),
            internal: None,
        }
    }

    pub fn unavailable(msg: &str) -> Self {
        Self {
            status: StatusCode::SERVICE_UNAVAILABLE,
            message: msg.to_string(),
            internal: None,
        }
    }

    pub fn internal(msg: &str) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: msg.to_string(),
            internal: None,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        // Log the full internal error if present
        if let Some(err) = &self.internal {
            error!(error = %err, "Internal error");
        }

        let body = Json(serde_json::json!({
            "error": self.message
        }));

        (self.status, body).into_response()
    }
}

impl From<mailpilot_core::Error> for AppError {
    fn from(err: mailpilot_core::Error) -> Self {
        match err {
            mailpilot_core::Error::NotFound(msg) => Self::not_found(&msg),
            mailpilot_core::Error::InvalidData(msg) => Self::bad_request(&msg),
            other => Self {
                status: StatusCode::INTERNAL_SERVER_ERROR,
                // Return generic message to client
                message: "An internal error occurred".to_string(),
                // Keep full error for logging
                internal: Some(other.into()),
            },
        }
    }
}

#[cfg(test)]
mod tests;
