//! Error types for the Idiogen server.

use std::path::PathBuf;

use axum::extract::multipart::MultipartError;
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};

/// Server error type.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// Build pipeline error.
    #[error(transparent)]
    Build(#[from] idiogen_core::Error),

    /// Malformed or truncated multipart body.
    #[error("invalid multipart body: {message}")]
    Multipart { status: StatusCode, message: String },

    /// Declared body size is over the configured cap.
    #[error("request body of {actual} bytes exceeds the {limit} byte limit")]
    PayloadTooLarge { actual: u64, limit: usize },

    /// IO error.
    #[error("IO error at {path}: {message}")]
    Io { path: PathBuf, message: String },

    /// Invalid listen address.
    #[error("invalid address: {0}")]
    Address(String),

    /// Failed to build a response.
    #[error("response error: {0}")]
    Response(String),
}

impl ServerError {
    /// HTTP status for this error.
    ///
    /// Request faults are 4xx; toolchain and infrastructure faults are 5xx.
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Build(e) if e.is_request_fault() => StatusCode::BAD_REQUEST,
            Self::Build(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Multipart { status, .. } => *status,
            Self::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            Self::Io { .. } | Self::Address(_) | Self::Response(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl From<MultipartError> for ServerError {
    fn from(e: MultipartError) -> Self {
        Self::Multipart {
            status: e.status(),
            message: e.body_text(),
        }
    }
}

impl From<std::io::Error> for ServerError {
    fn from(e: std::io::Error) -> Self {
        Self::Io {
            path: PathBuf::new(),
            message: e.to_string(),
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::warn!(status = %status, "compile request failed: {}", self);
        } else {
            tracing::debug!(status = %status, "compile request rejected: {}", self);
        }

        (
            status,
            [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
            self.to_string(),
        )
            .into_response()
    }
}

/// Result type for server operations.
pub type ServerResult<T> = Result<T, ServerError>;
