//! Admin HTTP API for the hybridsync agent.

use std::sync::Arc;
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use hybridsync_sync::{ChangeInfo, HealthReport, QueueInfo, SyncCoordinator, SyncError, SyncStatus};
use serde::{Deserialize, Serialize};
use tracing::warn;

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ChangesResponse {
    pub changes: ChangeInfo,
    pub queue: QueueInfo,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct SyncResponse {
    pub success: bool,
    pub status: SyncStatus,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ErrorResponse {
    pub error: String,
}

/// Local failure while answering a request.
pub struct ApiError(SyncError);

impl From<SyncError> for ApiError {
    fn from(e: SyncError) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        warn!("Admin request failed: {}", self.0);
        let body = ErrorResponse {
            error: self.0.to_string(),
        };
        (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response()
    }
}

type Coordinator = State<Arc<SyncCoordinator>>;

async fn status_handler(State(coordinator): Coordinator) -> Result<Json<SyncStatus>, ApiError> {
    Ok(Json(coordinator.status().await?))
}

async fn changes_handler(State(coordinator): Coordinator) -> Result<Json<ChangesResponse>, ApiError> {
    Ok(Json(ChangesResponse {
        changes: coordinator.change_info(),
        queue: coordinator.sync_queue_info().await?,
    }))
}

async fn health_handler(State(coordinator): Coordinator) -> Json<HealthReport> {
    Json(coordinator.health().await)
}

async fn sync_handler(State(coordinator): Coordinator) -> Result<Json<SyncResponse>, ApiError> {
    let success = coordinator.force_full_sync().await;
    Ok(Json(SyncResponse {
        success,
        status: coordinator.status().await?,
    }))
}

/// Build the admin router around a running coordinator.
pub fn build_router(coordinator: Arc<SyncCoordinator>) -> Router {
    Router::new()
        .route("/api/v1/status", get(status_handler))
        .route("/api/v1/changes", get(changes_handler))
        .route("/api/v1/health", get(health_handler))
        .route("/api/v1/sync", post(sync_handler))
        .with_state(coordinator)
}
