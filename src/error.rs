//! Request-level error taxonomy and its HTTP mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

/// Everything that can end an inbound request early.
#[derive(Debug, Error)]
pub enum MirrorError {
    #[error("missing EXTERNAL_URL query parameter")]
    MissingExternalUrl,

    #[error("failed to read request body: {0}")]
    RequestBody(String),

    #[error("request body exceeds {limit} bytes")]
    PayloadTooLarge { limit: usize },

    #[error("invalid upstream url {url:?}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("upstream {url} unreachable after {attempts} attempts: {reason}")]
    Transport {
        url: String,
        attempts: u32,
        reason: String,
    },

    #[error("upstream {url} returned {status} after {attempts} attempts")]
    UpstreamStatus {
        url: String,
        status: StatusCode,
        attempts: u32,
    },

    #[error("failed to read upstream body from {url}: {reason}")]
    BodyRead { url: String, reason: String },
}

impl MirrorError {
    pub fn status(&self) -> StatusCode {
        match self {
            MirrorError::MissingExternalUrl | MirrorError::RequestBody(_) => StatusCode::BAD_REQUEST,
            MirrorError::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            MirrorError::InvalidUrl { .. }
            | MirrorError::Transport { .. }
            | MirrorError::UpstreamStatus { .. }
            | MirrorError::BodyRead { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for MirrorError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "Request failed");
        } else {
            tracing::debug!(error = %self, "Request rejected");
        }
        // Origin error detail stays in the logs.
        let reason = status.canonical_reason().unwrap_or("Error");
        (status, reason).into_response()
    }
}
