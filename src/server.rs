//! HTTP surface
//!
//! Small JSON endpoint set over the engine. Validation errors map to 4xx,
//! everything else to 5xx, with `{ error, kind }` bodies. `/memory/context`
//! carries a soft deadline and degrades to an empty result on expiry;
//! `/memory/checkpoint` answers 202 and runs curation in the background.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

use crate::agents::CurationTrigger;
use crate::engine::{ContextPayload, Engine};
use crate::error::ContinuityError;

/// Engine name reported by `/health`
pub const ENGINE_NAME: &str = "continuity";

#[derive(Clone)]
struct AppState {
    engine: Arc<Engine>,
    request_timeout: Duration,
}

/// Build the full router
pub fn router(engine: Arc<Engine>) -> Router {
    let request_timeout = Duration::from_secs(engine.store().config().request_timeout_secs);
    Router::new()
        .route("/health", get(health))
        .route("/memory/context", post(context))
        .route("/memory/process", post(process))
        .route("/memory/checkpoint", post(checkpoint))
        .route("/memory/stats", get(stats))
        .with_state(AppState {
            engine,
            request_timeout,
        })
}

/// Bind and serve until ctrl-c, then drain background curation
pub async fn serve(engine: Arc<Engine>) -> std::io::Result<()> {
    let config = engine.store().config().clone();
    let addr = format!("{}:{}", config.host, config.port);
    let app = router(engine.clone());

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(%addr, "memory server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("shutdown signal received");
        })
        .await?;

    engine
        .shutdown(Duration::from_secs(config.shutdown_grace_secs))
        .await;
    Ok(())
}

struct ApiError(ContinuityError);

impl From<ContinuityError> for ApiError {
    fn from(err: ContinuityError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.0.status_code())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        if status.is_server_error() {
            tracing::error!(error = %self.0, kind = self.0.kind(), "request failed");
        }
        let body = serde_json::json!({
            "error": self.0.to_string(),
            "kind": self.0.kind(),
        });
        (status, Json(body)).into_response()
    }
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok", "engine": ENGINE_NAME }))
}

#[derive(Debug, Deserialize)]
struct ContextRequest {
    session_id: String,
    project_id: String,
    current_message: String,
    #[allow(dead_code)]
    claude_session_id: Option<String>,
}

async fn context(
    State(state): State<AppState>,
    Json(request): Json<ContextRequest>,
) -> Result<Json<ContextPayload>, ApiError> {
    let work = state.engine.get_context(
        &request.session_id,
        &request.project_id,
        &request.current_message,
    );
    match tokio::time::timeout(state.request_timeout, work).await {
        Ok(result) => Ok(Json(result?)),
        Err(_) => {
            // Deadline expired: a silent turn beats a failed hook
            tracing::warn!(session = %request.session_id, "context deadline expired");
            Ok(Json(ContextPayload {
                primer: None,
                memories: vec![],
                formatted: String::new(),
            }))
        }
    }
}

#[derive(Debug, Deserialize)]
struct ProcessRequest {
    session_id: String,
    project_id: String,
}

#[derive(Debug, Serialize)]
struct ProcessResponse {
    message_count: u64,
}

async fn process(
    State(state): State<AppState>,
    Json(request): Json<ProcessRequest>,
) -> Result<Json<ProcessResponse>, ApiError> {
    let message_count = state
        .engine
        .process_message(&request.session_id, &request.project_id)?;
    Ok(Json(ProcessResponse { message_count }))
}

#[derive(Debug, Deserialize)]
struct CheckpointRequest {
    session_id: String,
    project_id: String,
    claude_session_id: Option<String>,
    trigger: String,
    cwd: Option<String>,
}

async fn checkpoint(
    State(state): State<AppState>,
    Json(request): Json<CheckpointRequest>,
) -> Result<Response, ApiError> {
    let trigger: CurationTrigger = request
        .trigger
        .parse()
        .map_err(ContinuityError::Validation)?;

    state
        .engine
        .trigger_curation(
            &request.session_id,
            &request.project_id,
            trigger,
            request.claude_session_id,
            request.cwd,
        )
        .await?;

    let body = Json(serde_json::json!({ "accepted": true }));
    Ok((StatusCode::ACCEPTED, body).into_response())
}

#[derive(Debug, Deserialize)]
struct StatsQuery {
    project_id: String,
}

async fn stats(
    State(state): State<AppState>,
    Query(query): Query<StatsQuery>,
) -> Result<Json<crate::engine::StatsPayload>, ApiError> {
    Ok(Json(state.engine.stats(&query.project_id)?))
}
