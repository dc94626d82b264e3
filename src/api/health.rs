//! Liveness and readiness checks

use axum::{extract::State, Json};
use serde::Serialize;
use utoipa::ToSchema;

use crate::{
    error::{AppError, AppResult},
    AppState,
};

#[derive(Serialize, ToSchema)]
pub struct HealthResponse {
    /// `healthy` for liveness, `ready` once storage answers
    pub status: String,
    pub version: String,
}

impl HealthResponse {
    fn new(status: &str) -> Self {
        Self {
            status: status.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// Process is up
#[utoipa::path(
    get,
    path = "/health",
    tag = "health",
    responses(
        (status = 200, description = "Service is healthy", body = HealthResponse)
    )
)]
pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse::new("healthy"))
}

/// Storage is reachable and requests can be served
#[utoipa::path(
    get,
    path = "/ready",
    tag = "health",
    responses(
        (status = 200, description = "Service is ready", body = HealthResponse),
        (status = 503, description = "Storage unreachable", body = crate::error::ErrorResponse)
    )
)]
pub async fn readiness_check(State(state): State<AppState>) -> AppResult<Json<HealthResponse>> {
    if let Err(e) = state.services.books.ping().await {
        tracing::warn!("Readiness check failed: {}", e);
        return Err(AppError::Unavailable("Storage is not reachable".to_string()));
    }
    Ok(Json(HealthResponse::new("ready")))
}
