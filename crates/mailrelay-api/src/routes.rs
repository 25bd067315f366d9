//! API routes

use axum::{
    extract::DefaultBodyLimit,
    middleware,
    routing::{get, post},
    Router,
};
use mailrelay_common::config::ApiConfig;
use mailrelay_core::RelayService;
use std::sync::Arc;
use tower_http::{limit::RequestBodyLimitLayer, trace::TraceLayer};

use crate::auth::{webhook_auth_middleware, AppState};
use crate::handlers::{health, receive};

/// Create the API router
pub fn create_router(service: Arc<RelayService>, config: &ApiConfig) -> Router {
    let state = Arc::new(AppState::new(service, config.webhook_key.as_deref()));

    // Health check routes (no key required)
    let health_routes = Router::new()
        .route("/", get(health::health))
        .route("/live", get(health::liveness))
        .route("/ready", get(health::readiness))
        .with_state(state.clone());

    // Inbound webhook, attachments included in the body
    let webhook_routes = Router::new()
        .route("/receive", post(receive::receive))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            webhook_auth_middleware,
        ))
        .layer(DefaultBodyLimit::max(config.max_body_bytes))
        .layer(RequestBodyLimitLayer::new(config.max_body_bytes))
        .with_state(state);

    Router::new()
        .nest("/health", health_routes)
        .merge(webhook_routes)
        .layer(TraceLayer::new_for_http())
}
