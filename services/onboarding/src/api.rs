//! HTTP surface: submission form, submit and preview endpoints, health probes.

use crate::config::{ApiConfig, UploadConfig};
use crate::notification::DispatchError;
use crate::submission::{SubmissionError, SubmissionService};
use crate::upload::{read_submission, SubmissionRequest, ValidationError};
use anyhow::{Context, Result};
use axum::{
    extract::{multipart::MultipartRejection, DefaultBodyLimit, Multipart, State},
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use std::future::Future;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

pub const SUCCESS_MESSAGE: &str = "Welcome mail sent successfully";
pub const FAILURE_MESSAGE: &str = "An error occurred while processing your submission";

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub submissions: Arc<SubmissionService>,
    pub max_photo_bytes: usize,
}

/// Errors surfaced to HTTP callers
#[derive(Debug)]
pub enum ApiError {
    /// Client-correctable; the message is returned verbatim
    Validation(ValidationError),
    /// Server-side pipeline failure; only logged in detail
    Submission(SubmissionError),
    /// Preview could not be rendered
    Preview(DispatchError),
}

impl From<ValidationError> for ApiError {
    fn from(e: ValidationError) -> Self {
        Self::Validation(e)
    }
}

impl From<SubmissionError> for ApiError {
    fn from(e: SubmissionError) -> Self {
        Self::Submission(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            Self::Validation(e) => (StatusCode::BAD_REQUEST, e.to_string()).into_response(),
            Self::Submission(_) | Self::Preview(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, FAILURE_MESSAGE).into_response()
            }
        }
    }
}

/// Create the API router
pub fn create_router(state: AppState, config: &ApiConfig, upload: &UploadConfig) -> Router {
    let cors = if config.cors_enabled {
        if config.cors_origins.is_empty() {
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any)
        } else {
            let origins: Vec<_> = config
                .cors_origins
                .iter()
                .filter_map(|o| o.parse().ok())
                .collect();
            CorsLayer::new()
                .allow_origin(origins)
                .allow_methods(Any)
                .allow_headers(Any)
        }
    } else {
        CorsLayer::new()
    };

    Router::new()
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check))
        .route("/submit", post(submit))
        .route("/preview", post(preview))
        .fallback_service(ServeDir::new(&config.static_dir))
        .layer(DefaultBodyLimit::max(upload.max_body_bytes))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Health check endpoint
async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "onboarding-service"
    }))
}

/// Readiness check endpoint
async fn readiness_check(State(state): State<AppState>) -> impl IntoResponse {
    match state.submissions.employees().ping().await {
        Ok(()) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "status": "ready",
                "database": "connected"
            })),
        ),
        Err(e) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(serde_json::json!({
                "status": "not_ready",
                "database": "disconnected",
                "error": e.to_string()
            })),
        ),
    }
}

/// Accept an onboarding submission
#[instrument(skip(state, multipart), fields(request_id = %Uuid::new_v4()))]
async fn submit(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<&'static str, ApiError> {
    let request = validate(multipart, state.max_photo_bytes).await?;

    let confirmation = state.submissions.submit(request).await.map_err(|e| {
        error!(stage = e.stage(), error = ?e, "Submission failed");
        metrics::counter!("onboarding.submissions.failed", "stage" => e.stage()).increment(1);
        ApiError::from(e)
    })?;

    metrics::counter!("onboarding.submissions.accepted").increment(1);
    info!(
        employee_id = confirmation.record.id,
        key = %confirmation.photo.key,
        "Submission completed"
    );

    Ok(SUCCESS_MESSAGE)
}

/// Render the welcome email preview for a submission without storing anything
#[instrument(skip(state, multipart))]
async fn preview(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Html<String>, ApiError> {
    let request = validate(multipart, state.max_photo_bytes).await?;

    let html = state
        .submissions
        .composer()
        .render_preview(&request.name, &request.photo)
        .map_err(|e| {
            error!(error = %e, "Preview rendering failed");
            ApiError::Preview(e)
        })?;

    Ok(Html(html))
}

async fn validate(
    multipart: Result<Multipart, MultipartRejection>,
    max_photo_bytes: usize,
) -> Result<SubmissionRequest, ApiError> {
    let result = match multipart {
        Ok(multipart) => read_submission(multipart, max_photo_bytes).await,
        Err(rejection) => Err(ValidationError::Malformed(rejection.body_text())),
    };

    result.map_err(|e| {
        warn!(reason = e.kind(), error = %e, "Submission rejected");
        metrics::counter!("onboarding.submissions.rejected", "reason" => e.kind()).increment(1);
        ApiError::from(e)
    })
}

/// Start the API server, serving until `shutdown` resolves
pub async fn start_api_server(
    state: AppState,
    config: &ApiConfig,
    upload: &UploadConfig,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<()> {
    let router = create_router(state, config, upload);
    let addr = format!("{}:{}", config.host, config.port);

    info!(address = %addr, "Starting onboarding API server");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .context("Failed to bind to address")?;

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await
        .context("API server error")?;

    Ok(())
}
