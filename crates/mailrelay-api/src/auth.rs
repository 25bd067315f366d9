//! Webhook key authentication
//!
//! The inbound gateway cannot sign requests, so the webhook URL carries a
//! shared key, either as `?code=<key>` or in the `x-webhook-key` header.
//! Only the SHA-256 digest of the configured key is kept in memory.

use axum::{
    extract::{Query, Request, State},
    http::{HeaderMap, StatusCode, Uri},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use mailrelay_core::RelayService;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tracing::warn;

use crate::handlers::ErrorResponse;

/// Application state shared across handlers
pub struct AppState {
    pub service: Arc<RelayService>,
    /// SHA-256 hex digest of the webhook key, if one is required
    pub webhook_key_hash: Option<String>,
}

impl AppState {
    pub fn new(service: Arc<RelayService>, webhook_key: Option<&str>) -> Self {
        Self {
            service,
            webhook_key_hash: webhook_key
                .filter(|key| !key.is_empty())
                .map(hash_webhook_key),
        }
    }
}

#[derive(Debug, Deserialize)]
struct WebhookQuery {
    code: Option<String>,
}

/// Hash a webhook key for comparison
pub fn hash_webhook_key(key: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(key.as_bytes());
    hex::encode(hasher.finalize())
}

/// Extract the webhook key from the `code` query parameter or the `x-webhook-key` header
pub fn extract_webhook_key(headers: &HeaderMap, uri: &Uri) -> Option<String> {
    let from_query = Query::<WebhookQuery>::try_from_uri(uri)
        .ok()
        .and_then(|Query(q)| q.code);

    from_query.or_else(|| {
        headers
            .get("x-webhook-key")
            .and_then(|value| value.to_str().ok())
            .map(str::to_string)
    })
}

/// Reject requests without the configured webhook key
pub async fn webhook_auth_middleware(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Response {
    let Some(expected) = &state.webhook_key_hash else {
        return next.run(request).await;
    };

    let provided = extract_webhook_key(request.headers(), request.uri());
    match provided {
        Some(key) if hash_webhook_key(&key) == *expected => next.run(request).await,
        Some(_) => {
            warn!("Webhook key mismatch on {}", request.uri().path());
            unauthorized("Invalid webhook key")
        }
        None => {
            warn!("Missing webhook key on {}", request.uri().path());
            unauthorized("Missing webhook key")
        }
    }
}

fn unauthorized(message: &str) -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(ErrorResponse {
            error: "UNAUTHORIZED".to_string(),
            message: message.to_string(),
        }),
    )
        .into_response()
}
