// Error handling module
// Defines the client error taxonomy surfaced to callers

use serde_json::Value;
use thiserror::Error;

use crate::transport::ApiResponse;

/// Statuses the remote API uses to say "the current access token is no good".
/// 401 = invalid or missing credential, 419 = expired session.
pub const AUTH_FAILURE_STATUSES: [u16; 2] = [401, 419];

/// Returns true if `status` signals an authentication failure
pub fn is_auth_failure_status(status: u16) -> bool {
    AUTH_FAILURE_STATUSES.contains(&status)
}

/// Failure of a token renewal.
///
/// One refresh outcome is handed to every request waiting on it, so this
/// type is `Clone` and carries only owned text.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RefreshError {
    /// No refresh token in the credential store
    #[error("No refresh token available")]
    MissingRefreshToken,

    /// Auth endpoint answered with a non-success status
    #[error("Refresh rejected: {status} - {message}")]
    Rejected { status: u16, message: String },

    /// Auth endpoint could not be reached
    #[error("Refresh request failed: {0}")]
    Transport(String),

    /// Auth endpoint answered 2xx with an unusable body
    #[error("Invalid refresh response: {0}")]
    InvalidResponse(String),

    /// Renewed credentials could not be persisted
    #[error("Failed to store refreshed credentials: {0}")]
    Storage(String),

    /// The request driving the refresh was dropped before it settled
    #[error("Refresh abandoned before completion")]
    Abandoned,
}

/// Errors returned by the authenticated client and the API services built on it
#[derive(Error, Debug)]
pub enum ClientError {
    /// Non-success response from the remote API, passed through untouched.
    /// `response` is the full response as received (status, headers, body).
    #[error("API error: {status} - {message}")]
    Api {
        status: u16,
        message: String,
        response: Box<ApiResponse>,
    },

    /// Network-level failure (connect, timeout, body)
    #[error("Transport error ({kind}): {message}")]
    Transport { kind: &'static str, message: String },

    /// Token renewal failed; the session is gone
    #[error("Authentication failed: {0}")]
    Refresh(#[from] RefreshError),

    /// Response body did not match any known shape
    #[error("Unexpected response shape: {0}")]
    Decode(String),

    /// Credential store could not be read or written
    #[error("Credential storage error: {0}")]
    Storage(String),

    /// Invalid client configuration or request
    #[error("Configuration error: {0}")]
    Config(String),

    /// Anything else
    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl ClientError {
    /// Wrap a non-success response, keeping it whole
    pub fn api(response: ApiResponse) -> Self {
        ClientError::Api {
            status: response.status.as_u16(),
            message: response.error_message(),
            response: Box::new(response),
        }
    }

    /// The raw response behind an [`ClientError::Api`]
    pub fn response(&self) -> Option<&ApiResponse> {
        match self {
            ClientError::Api { response, .. } => Some(response),
            _ => None,
        }
    }

    /// Field errors of a validation failure (the `errors` object of a 422 body)
    pub fn validation_errors(&self) -> Option<Value> {
        self.response()
            .and_then(|r| serde_json::from_slice::<Value>(&r.body).ok())
            .and_then(|mut body| body.get_mut("errors").map(Value::take))
            .filter(|errors| !errors.is_null())
    }

    /// HTTP status carried by the error, if any
    pub fn status(&self) -> Option<u16> {
        match self {
            ClientError::Api { status, .. } => Some(*status),
            ClientError::Refresh(RefreshError::Rejected { status, .. }) => Some(*status),
            _ => None,
        }
    }

    /// True for a pass-through 401/419 (e.g. a request that was already retried)
    pub fn is_auth_failure(&self) -> bool {
        matches!(self, ClientError::Api { status, .. } if is_auth_failure_status(*status))
    }
}

impl From<serde_json::Error> for ClientError {
    fn from(err: serde_json::Error) -> Self {
        ClientError::Decode(err.to_string())
    }
}

/// Result type alias for client operations
pub type Result<T> = std::result::Result<T, ClientError>;
