//! HTTP API for Sentinel
//!
//! Thin layer over the triage controller:
//! - `POST /analyze` runs one triage cycle
//! - incident history and session management under `/api`
//! - Prometheus metrics and a health probe

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tracing::{error, info};
use uuid::Uuid;

use crate::gateway::GatewayError;
use crate::metrics;
use crate::triage::{
    IncidentRecord, Session, SessionArchive, SessionSummary, TriageController, TriageError, TriageReport,
};

/// API application state
#[derive(Clone)]
pub struct ApiState {
    pub controller: Arc<TriageController>,
    /// Ended sessions are saved here on reset when set
    pub archive: Option<SessionArchive>,
}

/// Request body for `POST /analyze`
#[derive(Debug, Deserialize)]
pub struct AnalyzeRequest {
    pub target_id: String,
}

#[derive(Debug, Deserialize)]
pub struct IncidentQuery {
    pub target_id: Option<String>,
}

/// Response for `POST /api/session/reset`
#[derive(Debug, Serialize)]
pub struct ResetResponse {
    pub ended: SessionSummary,
    pub archived: bool,
    pub session_id: Uuid,
}

/// JSON error body: `{"error": <kind>, "message": <detail>}`
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
    pub message: String,
}

/// Error returned by handlers
#[derive(Debug)]
pub enum ApiError {
    Triage(TriageError),
    BadRequest(String),
    Internal(String),
}

impl From<TriageError> for ApiError {
    fn from(e: TriageError) -> Self {
        ApiError::Triage(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error, message) = match self {
            ApiError::Triage(e) => (status_for(&e), e.kind().to_string(), e.to_string()),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BadRequest".to_string(), msg),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, "Internal".to_string(), msg),
        };
        (status, Json(ErrorBody { error, message })).into_response()
    }
}

/// HTTP status for a failed cycle
pub fn status_for(error: &TriageError) -> StatusCode {
    match error {
        TriageError::Gateway(GatewayError::TargetNotFound(_)) => StatusCode::NOT_FOUND,
        TriageError::Gateway(GatewayError::Unavailable(_)) => StatusCode::SERVICE_UNAVAILABLE,
        TriageError::Gateway(GatewayError::Timeout(_)) => StatusCode::GATEWAY_TIMEOUT,
        TriageError::Classification(_) => StatusCode::BAD_GATEWAY,
    }
}

/// Create the API router
pub fn create_router(state: ApiState) -> Router {
    Router::new()
        .route("/analyze", post(analyze))
        .route("/api/incidents", get(incidents))
        .route("/api/session", get(current_session))
        .route("/api/session/reset", post(reset_session))
        .route("/api/sessions", get(archived_sessions))
        .route("/metrics", get(prometheus_metrics))
        .route("/health", get(health))
        .with_state(state)
}

/// Run one triage cycle for the requested target
async fn analyze(
    State(state): State<ApiState>,
    Json(request): Json<AnalyzeRequest>,
) -> Result<Json<TriageReport>, ApiError> {
    let target_id = request.target_id.trim();
    if target_id.is_empty() {
        return Err(ApiError::BadRequest("target_id is required".into()));
    }

    info!(target = %target_id, "Analyze requested");
    let report = state.controller.triage(target_id).await?;
    Ok(Json(report))
}

async fn incidents(State(state): State<ApiState>, Query(query): Query<IncidentQuery>) -> Json<Vec<IncidentRecord>> {
    let history = state.controller.history();
    Json(match query.target_id {
        Some(target_id) => history.records_for(&target_id),
        None => history.records(),
    })
}

async fn current_session(State(state): State<ApiState>) -> Json<Session> {
    Json(state.controller.history().snapshot())
}

/// End the current session, archiving it when an archive is configured
async fn reset_session(State(state): State<ApiState>) -> Result<Json<ResetResponse>, ApiError> {
    let history = state.controller.history();
    let ended = history.reset();

    let archived = match &state.archive {
        Some(archive) => {
            archive.save(&ended).map_err(|e| {
                error!(session_id = %ended.id, error = %e, "Failed to archive session");
                ApiError::Internal(format!("session {} ended but could not be archived: {}", ended.id, e))
            })?;
            true
        }
        None => false,
    };

    Ok(Json(ResetResponse {
        ended: SessionSummary::from(&ended),
        archived,
        session_id: history.session_id(),
    }))
}

async fn archived_sessions(State(state): State<ApiState>) -> Result<Json<Vec<SessionSummary>>, ApiError> {
    match &state.archive {
        Some(archive) => archive
            .list()
            .map(Json)
            .map_err(|e| ApiError::Internal(format!("cannot list archived sessions: {}", e))),
        None => Ok(Json(Vec::new())),
    }
}

async fn prometheus_metrics() -> Result<Response, ApiError> {
    let body = metrics::render().map_err(|e| ApiError::Internal(e.to_string()))?;
    Ok(([(header::CONTENT_TYPE, "text/plain; version=0.0.4")], body).into_response())
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}
