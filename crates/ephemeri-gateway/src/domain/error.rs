//! Relay error types.
//!
//! Clients never learn which check rejected them: every [`AuthError`] maps to
//! the same generic HTTP 500 / close reason. The variant is logged instead.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use tracing::{error, warn};

/// Body returned for a publish body that does not have the request shape.
pub const INVALID_REQUEST_BODY: &str = "Invalid request";

/// Body returned for every publish that fails validation or processing.
pub const PUBLISH_FAILED_BODY: &str = "Failed to handle publish";

/// Why a token was not accepted.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    #[error("invalid token signature")]
    InvalidSignature,

    #[error("malformed token: {0}")]
    MalformedToken(String),

    #[error("token timestamp {timestamp} outside allowed window (now {now})")]
    TimestampOutOfRange { timestamp: u64, now: u64 },

    #[error("channels do not match subscribe token")]
    ChannelMismatch,

    #[error("message size {actual} does not match token ({expected})")]
    MessageSizeMismatch { expected: u64, actual: u64 },

    #[error("message SHA-1 does not match token")]
    MessageDigestMismatch,
}

/// Request-level failure, mapped onto an HTTP response for the publish route.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    /// Wrong shape or missing fields. No side effects happened.
    #[error("malformed request: {0}")]
    MalformedRequest(String),

    /// Token rejected.
    #[error("authentication failed: {0}")]
    Authentication(#[from] AuthError),

    /// Unexpected failure while handling an otherwise valid request.
    #[error("internal error: {0}")]
    Internal(String),
}

impl RelayError {
    /// HTTP status for this error.
    ///
    /// Authentication failures share 500 with internal failures; publishers
    /// already depend on that.
    pub fn status_code(&self) -> StatusCode {
        match self {
            RelayError::MalformedRequest(_) => StatusCode::BAD_REQUEST,
            RelayError::Authentication(_) | RelayError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl From<serde_json::Error> for RelayError {
    fn from(e: serde_json::Error) -> Self {
        RelayError::MalformedRequest(e.to_string())
    }
}

impl IntoResponse for RelayError {
    fn into_response(self) -> Response {
        let body = match &self {
            RelayError::MalformedRequest(details) => {
                warn!(reason = %details, "Rejected malformed publish request");
                INVALID_REQUEST_BODY
            }
            RelayError::Authentication(reason) => {
                warn!(reason = %reason, "Rejected publish");
                PUBLISH_FAILED_BODY
            }
            RelayError::Internal(details) => {
                error!(error = %details, "Failed to handle publish");
                PUBLISH_FAILED_BODY
            }
        };
        (self.status_code(), body).into_response()
    }
}

/// Result type for request handling
pub type RelayResult<T> = Result<T, RelayError>;

/// Service-level errors (startup and serving, not per request)
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Server socket bind error
    #[error("server bind error: {0}")]
    Bind(String),

    /// The HTTP server stopped with an error
    #[error("server error: {0}")]
    Server(String),
}
