//! Error types for the registry gateway
//!
//! Provides unified error handling using thiserror.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

// == Gateway Error Enum ==
/// Unified error type for the registry gateway.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GatewayError {
    /// Invalid request data
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Upstream call exceeded the hard request timeout
    #[error("Request timed out: {0}")]
    Timeout(String),

    /// Connection failure, 5xx, 429 or JSON-RPC provider error
    #[error("Transient upstream failure: {0}")]
    Transient(String),

    /// Upstream rejected the request (4xx other than 404)
    #[error("Upstream error: {0}")]
    Upstream(String),

    /// Upstream answered without the fields we need
    #[error("Malformed upstream response: {0}")]
    MalformedResponse(String),

    /// Requested resource does not exist on this gateway
    #[error("Not found: {0}")]
    NotFound(String),

    /// Internal server error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl GatewayError {
    /// Returns true for failures worth another attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(self, GatewayError::Timeout(_) | GatewayError::Transient(_))
    }

    /// Machine-readable code used in JSON error bodies.
    pub fn code(&self) -> &'static str {
        match self {
            GatewayError::InvalidRequest(_) => "INVALID_REQUEST",
            GatewayError::Timeout(_) => "TIMEOUT",
            GatewayError::NotFound(_) => "NOT_FOUND",
            _ => "INTERNAL_ERROR",
        }
    }

    /// HTTP status the error maps to at the API boundary.
    pub fn status(&self) -> StatusCode {
        match self {
            GatewayError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            GatewayError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            GatewayError::NotFound(_) => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

// == IntoResponse Implementation ==
impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = Json(json!({
            "error": {
                "message": self.to_string(),
                "code": self.code(),
                "timestamp": chrono::Utc::now().to_rfc3339(),
            }
        }));

        (status, body).into_response()
    }
}

impl From<alloy_sol_types::Error> for GatewayError {
    fn from(err: alloy_sol_types::Error) -> Self {
        GatewayError::MalformedResponse(format!("ABI decode: {err}"))
    }
}

// == Result Type Alias ==
/// Convenience Result type for the gateway.
pub type Result<T> = std::result::Result<T, GatewayError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(GatewayError::Timeout("eas".into()).is_retryable());
        assert!(GatewayError::Transient("503".into()).is_retryable());
        assert!(!GatewayError::MalformedResponse("no data".into()).is_retryable());
        assert!(!GatewayError::Upstream("401".into()).is_retryable());
        assert!(!GatewayError::InvalidRequest("empty".into()).is_retryable());
    }

    #[test]
    fn test_timeout_maps_to_gateway_timeout() {
        let err = GatewayError::Timeout("eas".into());
        assert_eq!(err.status(), StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(err.code(), "TIMEOUT");
    }

    #[test]
    fn test_generic_failures_map_to_internal_error() {
        for err in [
            GatewayError::Transient("x".into()),
            GatewayError::MalformedResponse("x".into()),
            GatewayError::Upstream("x".into()),
            GatewayError::Internal("x".into()),
        ] {
            assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
            assert_eq!(err.code(), "INTERNAL_ERROR");
        }
    }

    #[tokio::test]
    async fn test_error_body_shape() {
        let response = GatewayError::InvalidRequest("Missing query parameter".into()).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(json["error"]["code"], "INVALID_REQUEST");
        assert!(json["error"]["message"]
            .as_str()
            .unwrap()
            .contains("Missing query parameter"));
        assert!(json["error"]["timestamp"].is_string());
    }
}
