//! Unified error handling for fblite.
//!
//! Client-facing errors carry a stable machine-readable code and never
//! expose internal detail. Store errors live in [`crate::store`] next to sqlx.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;

// ============================================================================
// API Errors (HTTP surface)
// ============================================================================

/// Errors returned to HTTP clients.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Route not found")]
    NotFound,

    #[error("Request timed out")]
    Timeout,

    #[error("Too many requests from this IP, please try again later.")]
    RateLimited,

    #[error("Server is shutting down")]
    ShuttingDown,
}

impl ApiError {
    /// Get a static error code string, stable across releases.
    #[inline]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::NotFound => "NOT_FOUND",
            Self::Timeout => "REQUEST_TIMEOUT",
            Self::RateLimited => "RATE_LIMIT_EXCEEDED",
            Self::ShuttingDown => "SERVICE_UNAVAILABLE",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::Timeout => StatusCode::REQUEST_TIMEOUT,
            Self::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            Self::ShuttingDown => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = json!({
            "success": false,
            "error": self.to_string(),
            "code": self.error_code(),
        });
        (self.status(), Json(body)).into_response()
    }
}

// ============================================================================
// Realtime Event Errors
// ============================================================================

/// Errors produced while decoding a client's realtime frame.
///
/// Reported back to the sending connection only.
#[derive(Debug, Error)]
pub enum EventError {
    #[error("malformed event: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("room id must be between 1 and {max} characters")]
    InvalidRoom { max: usize },

    #[error("binary frames are not supported")]
    BinaryFrame,
}

impl EventError {
    #[inline]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Malformed(_) | Self::InvalidRoom { .. } => "INVALID_EVENT",
            Self::BinaryFrame => "UNSUPPORTED_FRAME",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_error_codes() {
        assert_eq!(ApiError::NotFound.error_code(), "NOT_FOUND");
        assert_eq!(ApiError::Timeout.error_code(), "REQUEST_TIMEOUT");
        assert_eq!(ApiError::RateLimited.error_code(), "RATE_LIMIT_EXCEEDED");
        assert_eq!(ApiError::ShuttingDown.error_code(), "SERVICE_UNAVAILABLE");
    }

    #[test]
    fn test_api_error_status() {
        assert_eq!(ApiError::RateLimited.into_response().status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(ApiError::NotFound.into_response().status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_event_error_codes() {
        let err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        assert_eq!(EventError::from(err).error_code(), "INVALID_EVENT");
        assert_eq!(EventError::BinaryFrame.error_code(), "UNSUPPORTED_FRAME");
    }
}
