//! API request handlers

pub mod health;
pub mod receive;

use axum::{http::StatusCode, Json};
use mailrelay_common::Error;
use serde::{Deserialize, Serialize};

pub use health::*;
pub use receive::*;

/// Error response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

/// Map a domain error to its HTTP status and body
pub fn error_response(err: &Error) -> (StatusCode, Json<ErrorResponse>) {
    let status =
        StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (
        status,
        Json(ErrorResponse {
            error: err.code().to_string(),
            message: err.to_string(),
        }),
    )
}
