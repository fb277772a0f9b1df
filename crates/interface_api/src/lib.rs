//! HTTP API Layer
//!
//! This crate exposes the posting engine over HTTP using Axum.
//!
//! # Routes
//!
//! - `POST /functions/post-sales-invoice`: body `{type: "post"|"void", invoiceId, userId, companyId}`
//! - `POST /functions/void-shipment`: body `{type: "void", shipmentId, userId, companyId}`
//! - `GET /health`, `GET /health/ready`
//!
//! # Example
//!
//! ```rust,ignore
//! use interface_api::create_router;
//!
//! let app = create_router(Arc::new(engine), config);
//! axum::serve(listener, app).await?;
//! ```

pub mod config;
pub mod error;
pub mod middleware;
pub mod handlers;
pub mod dto;

use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post},
    middleware as axum_middleware,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;

use domain_posting::DocumentPosting;

use crate::config::ApiConfig;
use crate::handlers::{health, posting};
use crate::middleware::audit_middleware;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<dyn DocumentPosting>,
    pub config: ApiConfig,
}

/// Creates the main API router
///
/// # Arguments
///
/// * `engine` - Posting engine over any store
/// * `config` - API configuration
///
/// # Returns
///
/// Configured Axum router with all routes and middleware
pub fn create_router(engine: Arc<dyn DocumentPosting>, config: ApiConfig) -> Router {
    let state = AppState { engine, config };

    let public_routes = Router::new()
        .route("/health", get(health::health_check))
        .route("/health/ready", get(health::readiness_check));

    let function_routes = Router::new()
        .route("/post-sales-invoice", post(posting::sales_invoice))
        .route("/void-shipment", post(posting::shipment))
        .layer(axum_middleware::from_fn(audit_middleware));

    Router::new()
        .merge(public_routes)
        .nest("/functions", function_routes)
        .layer(TraceLayer::new_for_http())
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}
