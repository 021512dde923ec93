//! Control plane error taxonomy.

use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Serialize;
use thiserror::Error;

/// Errors surfaced by the core subsystems.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Malformed id, missing required field, invalid zone, CIDR violation.
    #[error("validation: {0}")]
    Validation(String),

    /// Entity absent from the store or the broker.
    #[error("not found: {0}")]
    NotFound(String),

    /// Duplicate id, or deletion of an in-use resource without cascade.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Non-2xx from the broker; the broker's message is carried verbatim.
    #[error("broker: [{status}] {message}")]
    Broker { status: u16, message: String },

    /// Broker exceeded its class timeout or the endpoint-wide limit.
    #[error("timeout: {0}")]
    Timeout(String),

    /// Credential envelope decryption failed.
    #[error("crypto: {0}")]
    Crypto(String),

    /// Store unreachable, marshal failure, invariant violation.
    #[error("internal: {0}")]
    Internal(String),
}

impl CoreError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            CoreError::Validation(_) | CoreError::Crypto(_) => StatusCode::BAD_REQUEST,
            CoreError::NotFound(_) => StatusCode::NOT_FOUND,
            CoreError::Conflict(_) => StatusCode::CONFLICT,
            CoreError::Broker { .. } => StatusCode::BAD_GATEWAY,
            CoreError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            CoreError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<cirrus_kv::KvError> for CoreError {
    fn from(e: cirrus_kv::KvError) -> Self {
        match e {
            cirrus_kv::KvError::SelectorParse(msg) => CoreError::Validation(msg),
            other => CoreError::Internal(other.to_string()),
        }
    }
}

impl From<serde_json::Error> for CoreError {
    fn from(e: serde_json::Error) -> Self {
        CoreError::Internal(format!("marshal: {}", e))
    }
}

impl From<reqwest::Error> for CoreError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            CoreError::Timeout(e.to_string())
        } else {
            CoreError::Broker {
                status: e.status().map(|s| s.as_u16()).unwrap_or(502),
                message: e.to_string(),
            }
        }
    }
}

/// User-visible error body. The request tracker middleware fills in
/// `requestId` on the way out.
#[derive(Serialize)]
pub struct ErrorBody {
    pub message: String,
    #[serde(rename = "requestId", skip_serializing_if = "String::is_empty")]
    pub request_id: String,
}

impl IntoResponse for CoreError {
    fn into_response(self) -> axum::response::Response {
        let status = self.status_code();
        let body = ErrorBody {
            message: self.to_string(),
            request_id: String::new(),
        };
        (status, Json(body)).into_response()
    }
}

/// Result type for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            CoreError::Validation("x".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            CoreError::NotFound("x".into()).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            CoreError::Conflict("x".into()).status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            CoreError::Broker {
                status: 500,
                message: "x".into()
            }
            .status_code(),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            CoreError::Timeout("x".into()).status_code(),
            StatusCode::GATEWAY_TIMEOUT
        );
        assert_eq!(
            CoreError::Crypto("x".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn test_selector_parse_maps_to_validation() {
        let e: CoreError = cirrus_kv::KvError::SelectorParse("bad".into()).into();
        assert!(matches!(e, CoreError::Validation(_)));
    }
}
