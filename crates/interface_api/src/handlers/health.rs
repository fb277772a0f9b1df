//! Health check handlers

use axum::{extract::State, Json};
use serde::Serialize;

use core_kernel::HealthCheckResult;
use domain_posting::DocumentPosting;

use crate::{error::ApiError, AppState};

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub store: Option<HealthCheckResult>,
}

/// Health check endpoint
pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        store: None,
    })
}

/// Readiness check (includes the posting store)
pub async fn readiness_check(State(state): State<AppState>) -> Result<Json<HealthResponse>, ApiError> {
    let store = state.engine.health_check().await;
    if !store.is_healthy() {
        return Err(ApiError::Unavailable(
            store.message.unwrap_or_else(|| format!("{} is unhealthy", store.adapter_id)),
        ));
    }

    Ok(Json(HealthResponse {
        status: "ready".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        store: Some(store),
    }))
}
