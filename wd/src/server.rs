//! HTTP trigger endpoint
//!
//! Routes:
//! - `POST /preload` `{"urls": [...], "priority": 0}`
//! - `POST /purge` same body
//! - `POST /run/:queue` nudge the worker, answers 202 immediately
//! - `GET /stats`
//! - `GET /health`

use std::future::Future;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use queuestore::QueueStats;
use serde::Deserialize;
use tokio::net::TcpListener;
use tracing::{debug, info};

use crate::dispatch::{DispatchReport, Dispatcher};
use crate::domain::QueueKind;
use crate::queue::{ManagerError, QueueManager};

/// Shared handles for request handlers
#[derive(Debug, Clone)]
pub struct AppState {
    pub dispatcher: Dispatcher,
    pub manager: QueueManager,
}

#[derive(Debug, Deserialize)]
struct UrlsRequest {
    urls: Vec<String>,
    #[serde(default)]
    priority: i64,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/preload", post(preload))
        .route("/purge", post(purge))
        .route("/run/:queue", post(run))
        .route("/stats", get(stats))
        .route("/health", get(health))
        .with_state(state)
}

/// Serve until `shutdown` resolves
pub async fn serve(
    listener: TcpListener,
    state: AppState,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> std::io::Result<()> {
    info!(addr = ?listener.local_addr().ok(), "Trigger endpoint listening");
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await
}

async fn preload(State(state): State<AppState>, Json(request): Json<UrlsRequest>) -> Result<Json<DispatchReport>, ApiError> {
    debug!(count = request.urls.len(), "preload: called");
    let report = state.dispatcher.preload(&request.urls, request.priority).await?;
    Ok(Json(report))
}

async fn purge(State(state): State<AppState>, Json(request): Json<UrlsRequest>) -> Result<Json<DispatchReport>, ApiError> {
    debug!(count = request.urls.len(), "purge: called");
    let report = state.dispatcher.purge(&request.urls, request.priority).await?;
    Ok(Json(report))
}

async fn run(State(state): State<AppState>, Path(queue): Path<String>) -> Result<StatusCode, ApiError> {
    debug!(%queue, "run: called");
    let queue: QueueKind = queue.parse().map_err(ApiError::NotFound)?;
    state.dispatcher.trigger().fire(queue);
    Ok(StatusCode::ACCEPTED)
}

async fn stats(State(state): State<AppState>) -> Result<Json<Vec<QueueStats>>, ApiError> {
    debug!("stats: called");
    let mut all = Vec::with_capacity(QueueKind::ALL.len());
    for queue in QueueKind::ALL {
        all.push(state.manager.stats(queue).await?);
    }
    Ok(Json(all))
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// API error types
#[derive(Debug)]
enum ApiError {
    NotFound(String),
    Internal(String),
}

impl From<ManagerError> for ApiError {
    fn from(err: ManagerError) -> Self {
        ApiError::Internal(err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        let body = Json(serde_json::json!({
            "error": message,
        }));

        (status, body).into_response()
    }
}
