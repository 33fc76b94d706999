//! Recap HTTP REST API
//!
//! Axum-based HTTP server exposing turn ingest, cadence signals, and summary
//! reads over HTTP. Runs alongside the Unix socket IPC server on port 8767
//! (configurable).
//!
//! Each endpoint has a thin axum handler that delegates to an inner function
//! taking the `AppContext` directly; the inner functions route through the IPC
//! request enum so both transports share one code path.
//!
//! Endpoints:
//! - GET  /health                          health check with store status
//! - GET  /version                         server version info
//! - POST /turns                           record a turn and signal cadence
//! - POST /signal                          assistant-turn signal only
//! - GET  /sessions/:session_id/summary    newest summary row
//! - GET  /sessions/:session_id/cadence    cadence state
//! - POST /sessions/:session_id/release    operator lock release

use std::sync::Arc;

use anyhow::Result;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use recap_core::ipc::{RecapRequest, RecapResponse};
use recap_core::models::ClientTurn;
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tokio::sync::broadcast;

use crate::context::AppContext;
use crate::router::handle_request;

/// Shared state for all HTTP handlers
#[derive(Clone)]
pub struct HttpState {
    pub ctx: AppContext,
}

/// Build the Axum router with all endpoints
pub fn build_router(state: Arc<HttpState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/version", get(version_handler))
        .route("/turns", post(record_turn_handler))
        .route("/signal", post(signal_handler))
        .route("/sessions/:session_id/summary", get(summary_handler))
        .route("/sessions/:session_id/cadence", get(cadence_handler))
        .route("/sessions/:session_id/release", post(release_handler))
        .with_state(state)
}

/// Start the HTTP server on the configured address.
/// Gracefully shuts down when the broadcast shutdown signal fires.
pub async fn start_http_server(ctx: AppContext, mut shutdown: broadcast::Receiver<()>) -> Result<()> {
    let addr = format!("{}:{}", ctx.config.http.host, ctx.config.http.port);
    let state = Arc::new(HttpState { ctx });

    let app = build_router(state);
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("Recap HTTP API listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown.recv().await;
            tracing::info!("HTTP server shutting down...");
        })
        .await?;

    Ok(())
}

// ============================================================================
// Request / Response DTOs
// ============================================================================

#[derive(Debug, Deserialize, Default)]
pub struct TurnRequest {
    pub session_id: Option<String>,
    pub role: Option<String>,
    pub text: Option<String>,
    pub timestamp: Option<i64>,
    pub client_turns: Option<Vec<ClientTurn>>,
    pub last_known_version: Option<i64>,
}

#[derive(Debug, Deserialize, Default)]
pub struct SignalRequest {
    pub session_id: Option<String>,
    pub last_known_version: Option<i64>,
    pub client_turns: Option<Vec<ClientTurn>>,
}

/// Standard HTTP error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub status: String,
}

impl ErrorResponse {
    pub fn new(msg: impl Into<String>) -> Self {
        Self {
            error: msg.into(),
            status: "error".to_string(),
        }
    }
}

fn bad_request(msg: &str) -> (StatusCode, serde_json::Value) {
    (
        StatusCode::BAD_REQUEST,
        serde_json::json!(ErrorResponse::new(msg)),
    )
}

fn required(field: Option<String>) -> Option<String> {
    field.filter(|v| !v.trim().is_empty())
}

// ============================================================================
// Inner (directly testable) business logic functions
// ============================================================================

/// Inner health check: returns (status_code, json_body).
pub async fn health_inner(ctx: &AppContext) -> (StatusCode, serde_json::Value) {
    let response = handle_request(RecapRequest::Health, ctx).await;
    match response_to_http(response) {
        Ok(mut data) => {
            if let Some(obj) = data.as_object_mut() {
                obj.insert("version".to_string(), serde_json::json!(env!("CARGO_PKG_VERSION")));
                obj.insert(
                    "socket".to_string(),
                    serde_json::json!(ctx.config.service.socket_path),
                );
            }
            (StatusCode::OK, data)
        }
        Err((_, message)) => (
            StatusCode::SERVICE_UNAVAILABLE,
            serde_json::json!({
                "status": "unhealthy",
                "error": message,
            }),
        ),
    }
}

/// Inner version: returns version info (pure, no IO).
pub fn version_inner() -> serde_json::Value {
    serde_json::json!({
        "version": env!("CARGO_PKG_VERSION"),
        "protocol": "recap/1",
    })
}

/// Inner record turn: validates the body and calls the IPC router.
pub async fn record_turn_inner(ctx: &AppContext, req: TurnRequest) -> (StatusCode, serde_json::Value) {
    let Some(session_id) = required(req.session_id) else {
        return bad_request("session_id field is required");
    };
    let Some(text) = req.text else {
        return bad_request("text field is required");
    };

    let request = RecapRequest::RecordTurn {
        session_id,
        role: req.role.unwrap_or_else(|| "user".to_string()),
        text,
        timestamp: req.timestamp,
        client_turns: req.client_turns,
        last_known_version: req.last_known_version,
    };

    into_http(handle_request(request, ctx).await)
}

/// Inner signal: assistant-turn cadence signal without recording a turn.
pub async fn signal_inner(ctx: &AppContext, req: SignalRequest) -> (StatusCode, serde_json::Value) {
    let Some(session_id) = required(req.session_id) else {
        return bad_request("session_id field is required");
    };

    let request = RecapRequest::AssistantTurn {
        session_id,
        last_known_version: req.last_known_version,
        client_turns: req.client_turns,
    };

    into_http(handle_request(request, ctx).await)
}

pub async fn summary_inner(ctx: &AppContext, session_id: String) -> (StatusCode, serde_json::Value) {
    into_http(handle_request(RecapRequest::GetSummary { session_id }, ctx).await)
}

pub async fn cadence_inner(ctx: &AppContext, session_id: String) -> (StatusCode, serde_json::Value) {
    into_http(handle_request(RecapRequest::GetCadence { session_id }, ctx).await)
}

pub async fn release_inner(ctx: &AppContext, session_id: String) -> (StatusCode, serde_json::Value) {
    into_http(handle_request(RecapRequest::ReleaseLock { session_id }, ctx).await)
}

// ============================================================================
// Axum handler wrappers (delegate to inner functions)
// ============================================================================

pub async fn health_handler(State(state): State<Arc<HttpState>>) -> impl IntoResponse {
    let (status, body) = health_inner(&state.ctx).await;
    (status, Json(body))
}

pub async fn version_handler() -> impl IntoResponse {
    (StatusCode::OK, Json(version_inner()))
}

pub async fn record_turn_handler(
    State(state): State<Arc<HttpState>>,
    Json(req): Json<TurnRequest>,
) -> impl IntoResponse {
    let (status, body) = record_turn_inner(&state.ctx, req).await;
    (status, Json(body))
}

pub async fn signal_handler(
    State(state): State<Arc<HttpState>>,
    Json(req): Json<SignalRequest>,
) -> impl IntoResponse {
    let (status, body) = signal_inner(&state.ctx, req).await;
    (status, Json(body))
}

pub async fn summary_handler(
    State(state): State<Arc<HttpState>>,
    Path(session_id): Path<String>,
) -> impl IntoResponse {
    let (status, body) = summary_inner(&state.ctx, session_id).await;
    (status, Json(body))
}

pub async fn cadence_handler(
    State(state): State<Arc<HttpState>>,
    Path(session_id): Path<String>,
) -> impl IntoResponse {
    let (status, body) = cadence_inner(&state.ctx, session_id).await;
    (status, Json(body))
}

pub async fn release_handler(
    State(state): State<Arc<HttpState>>,
    Path(session_id): Path<String>,
) -> impl IntoResponse {
    let (status, body) = release_inner(&state.ctx, session_id).await;
    (status, Json(body))
}

// ============================================================================
// Helpers
// ============================================================================

/// Convert an IPC `RecapResponse` into an HTTP body value, or the status and
/// message to report.
pub fn response_to_http(
    response: RecapResponse,
) -> std::result::Result<serde_json::Value, (StatusCode, String)> {
    match response.status.as_str() {
        "ok" => Ok(response.data.unwrap_or(serde_json::json!({}))),
        "not_found" => Err((
            StatusCode::NOT_FOUND,
            response.error.unwrap_or_else(|| "not found".to_string()),
        )),
        _ => {
            let message = response.error.unwrap_or_else(|| "unknown error".to_string());
            // Validation failures from ingest surface as client errors.
            let status = if message.starts_with("Invalid input") {
                StatusCode::BAD_REQUEST
            } else {
                StatusCode::INTERNAL_SERVER_ERROR
            };
            Err((status, message))
        }
    }
}

fn into_http(response: RecapResponse) -> (StatusCode, serde_json::Value) {
    let not_found = response.status == "not_found";
    match response_to_http(response) {
        Ok(data) => (StatusCode::OK, data),
        Err((status, message)) => {
            let body = if not_found {
                serde_json::json!({"error": message, "status": "not_found"})
            } else {
                serde_json::json!(ErrorResponse::new(message))
            };
            (status, body)
        }
    }
}

// ============================================================================
// Unit Tests
// ============================================================================
