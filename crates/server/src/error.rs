use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

use triage_store::StoreError;

/// Errors surfaced through the HTTP API.
#[derive(Debug, Error)]
pub enum ServerError {
    /// A configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// An I/O error (e.g. binding the listener).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Authentication failed (missing or invalid credentials).
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// The referenced resource does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The request is well-formed but invalid (bad feedback value,
    /// already-resolved group).
    #[error("bad request: {0}")]
    BadRequest(String),

    /// Another cycle is already in flight.
    #[error("a processing cycle is already in progress")]
    CycleInProgress,

    /// A store operation failed.
    #[error("store error: {0}")]
    Store(String),
}

impl From<StoreError> for ServerError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(msg) => Self::NotFound(msg),
            StoreError::Conflict(msg) => Self::BadRequest(msg),
            other => Self::Store(other.to_string()),
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = match &self {
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::CycleInProgress => StatusCode::CONFLICT,
            Self::Config(_) | Self::Io(_) | Self::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = serde_json::json!({ "error": self.to_string() });
        (status, axum::Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_error_mapping() {
        let err: ServerError = StoreError::NotFound("email x".into()).into();
        assert!(matches!(err, ServerError::NotFound(_)));

        let err: ServerError = StoreError::Conflict("resolved".into()).into();
        assert!(matches!(err, ServerError::BadRequest(_)));

        let err: ServerError = StoreError::Backend("boom".into()).into();
        assert!(matches!(err, ServerError::Store(_)));
    }
}
