//! Error types for X API operations.
//!
//! Every exported operation returns [`XApiResult`]. The variants mirror the
//! failure kinds a caller has to tell apart: missing configuration, a handle
//! that does not resolve, HTTP-level failures, authorization failures that
//! are eligible for a token refresh, and token endpoint or protocol failures.

use thiserror::Error;

/// Errors produced by the X API integration.
#[derive(Error, Debug)]
pub enum XApiError {
    /// No usable credentials (or other required settings) are configured.
    #[error("configuration missing: {0}")]
    ConfigurationMissing(String),

    /// Caller-supplied input was rejected before any network call.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The author handle did not resolve to an account.
    #[error("user @{0} not found")]
    ResolutionFailed(String),

    /// Non-2xx response that is not an authorization failure.
    #[error("X API error for operation '{operation}' ({status}): {body}")]
    Http {
        operation: String,
        status: u16,
        body: String,
    },

    /// 401 or 403 response, eligible for one refresh-and-retry.
    #[error("authorization rejected for operation '{operation}' ({status})")]
    AuthExpired {
        operation: String,
        status: u16,
        body: String,
    },

    /// The token endpoint rejected the request or returned malformed data.
    #[error("token refresh failed: {0}")]
    RefreshFailed(String),

    /// The token endpoint rejected an authorization code exchange.
    #[error("authorization code exchange failed: {0}")]
    AuthorizationFailed(String),

    /// A 2xx response was missing fields the protocol requires.
    #[error("protocol violation: {0}")]
    ProtocolViolation(String),

    /// The request never produced a response (connect, timeout, TLS).
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// Request signing failed.
    #[error("signing error: {0}")]
    Signing(String),

    /// Token store (database or cipher) failure.
    #[error("token store error: {0}")]
    Store(String),
}

/// Result type for X API operations.
pub type XApiResult<T> = Result<T, XApiError>;

impl XApiError {
    /// Classifies a non-2xx response. 401 and 403 become [`XApiError::AuthExpired`].
    pub(crate) fn from_status(operation: &str, status: u16, body: String) -> Self {
        if status == 401 || status == 403 {
            Self::AuthExpired {
                operation: operation.to_string(),
                status,
                body,
            }
        } else {
            Self::Http {
                operation: operation.to_string(),
                status,
                body,
            }
        }
    }

    /// Returns true for authorization failures that may be fixed by a refresh.
    pub fn is_auth_expired(&self) -> bool {
        matches!(self, Self::AuthExpired { .. })
    }

    /// Stable, machine-readable name of the error kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ConfigurationMissing(_) => "configuration_missing",
            Self::InvalidInput(_) => "invalid_input",
            Self::ResolutionFailed(_) => "resolution_failed",
            Self::Http { .. } => "http_error",
            Self::AuthExpired { .. } => "auth_expired",
            Self::RefreshFailed(_) => "refresh_failed",
            Self::AuthorizationFailed(_) => "authorization_failed",
            Self::ProtocolViolation(_) => "protocol_violation",
            Self::Transport(_) => "transport_error",
            Self::Signing(_) => "signing_error",
            Self::Store(_) => "store_error",
        }
    }
}

impl From<serde_json::Error> for XApiError {
    fn from(e: serde_json::Error) -> Self {
        Self::ProtocolViolation(format!("malformed JSON response: {}", e))
    }
}

impl From<sqlx::Error> for XApiError {
    fn from(e: sqlx::Error) -> Self {
        Self::Store(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_status_classifies_auth_failures() {
        assert!(XApiError::from_status("op", 401, String::new()).is_auth_expired());
        assert!(XApiError::from_status("op", 403, String::new()).is_auth_expired());
        assert!(!XApiError::from_status("op", 500, String::new()).is_auth_expired());
        assert!(!XApiError::from_status("op", 429, String::new()).is_auth_expired());
    }

    #[test]
    fn test_kind_names() {
        let err = XApiError::from_status("lookup_user", 500, "boom".into());
        assert_eq!(err.kind(), "http_error");
        assert_eq!(
            err.to_string(),
            "X API error for operation 'lookup_user' (500): boom"
        );
        assert_eq!(
            XApiError::ConfigurationMissing("x".into()).kind(),
            "configuration_missing"
        );
    }

    #[test]
    fn test_json_errors_are_protocol_violations() {
        let err: XApiError = serde_json::from_str::<serde_json::Value>("{not json")
            .unwrap_err()
            .into();
        assert_eq!(err.kind(), "protocol_violation");
    }
}
