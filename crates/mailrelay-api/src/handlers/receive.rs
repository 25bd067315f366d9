//! Inbound Parse webhook handler

use axum::{
    extract::{Multipart, State},
    http::StatusCode,
    Json,
};
use mailrelay_core::RelayReport;
use std::sync::Arc;
use tracing::{error, warn};

use super::{error_response, ErrorResponse};
use crate::auth::AppState;
use crate::inbound::InboundForm;

/// Receive one message from the inbound gateway
///
/// POST /receive
///
/// A non-2xx answer makes the gateway retry, so only failures worth
/// retrying (dispatch) or fixing (malformed form) are reported as errors.
pub async fn receive(
    State(state): State<Arc<AppState>>,
    multipart: Multipart,
) -> Result<Json<RelayReport>, (StatusCode, Json<ErrorResponse>)> {
    let message = InboundForm::read(multipart)
        .await
        .and_then(InboundForm::into_message)
        .map_err(|e| {
            warn!("Rejected inbound form: {}", e);
            error_response(&e)
        })?;

    let report = state.service.handle(&message).await.map_err(|e| {
        error!(from = %message.from.email, "Failed to relay inbound message: {}", e);
        error_response(&e)
    })?;

    Ok(Json(report))
}
