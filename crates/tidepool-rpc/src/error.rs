//! API client error types.

use thiserror::Error;
use tidepool_types::{AddressError, CoinError};

#[derive(Debug, Error)]
pub enum RpcError {
    #[error("HTTP error calling {endpoint}: {source}")]
    Http {
        endpoint: String,
        source: reqwest::Error,
    },

    #[error("request to {endpoint} timed out")]
    Timeout { endpoint: String },

    /// Non-2xx response. `message` is the server-supplied error text when
    /// the body carried one; `body` preserves the raw payload for
    /// diagnostics and is never the primary message.
    #[error("{endpoint} returned HTTP {status}: {message}")]
    Status {
        endpoint: String,
        status: u16,
        message: String,
        body: String,
    },

    #[error("authentication failed calling {endpoint} (missing or expired token)")]
    AuthFailed { endpoint: String },

    #[error("invalid JSON from {endpoint}: {detail}")]
    Json { endpoint: String, detail: String },

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("invalid address: {0}")]
    InvalidAddress(#[from] AddressError),

    #[error("invalid coin: {0}")]
    Coin(#[from] CoinError),

    #[error("insufficient balance: need {required} mojos, selected coins total {available}")]
    InsufficientBalance { required: u128, available: u128 },
}

impl RpcError {
    /// Whether a retry could plausibly succeed (timeouts, connection
    /// failures, 5xx). Validation and auth failures are never transient.
    pub fn is_transient(&self) -> bool {
        match self {
            RpcError::Timeout { .. } => true,
            RpcError::Http { source, .. } => {
                source.is_timeout() || source.is_connect() || source.is_request()
            }
            RpcError::Status { status, .. } => *status >= 500,
            _ => false,
        }
    }

    /// HTTP status code, when the failure carries one.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            RpcError::Status { status, .. } => Some(*status),
            RpcError::AuthFailed { .. } => Some(401),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        let timeout = RpcError::Timeout {
            endpoint: "/health".to_string(),
        };
        assert!(timeout.is_transient());

        let server_err = RpcError::Status {
            endpoint: "/health".to_string(),
            status: 503,
            message: "unavailable".to_string(),
            body: String::new(),
        };
        assert!(server_err.is_transient());

        let not_found = RpcError::Status {
            endpoint: "/health".to_string(),
            status: 404,
            message: "not found".to_string(),
            body: String::new(),
        };
        assert!(!not_found.is_transient());

        assert!(!RpcError::Validation("empty address".to_string()).is_transient());
        assert!(!RpcError::AuthFailed {
            endpoint: "/keys".to_string()
        }
        .is_transient());
    }

    #[test]
    fn test_status_codes() {
        let auth = RpcError::AuthFailed {
            endpoint: "/keys".to_string(),
        };
        assert_eq!(auth.status_code(), Some(401));
        assert_eq!(
            RpcError::Validation("x".to_string()).status_code(),
            None
        );
    }
}
