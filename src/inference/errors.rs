//! Inference error types.
//!
//! All errors implement `std::error::Error` via `thiserror`. Structured logging
//! is the caller's responsibility; these types carry the context needed to build
//! meaningful log entries.

use thiserror::Error;

/// Errors that can occur while querying the inference endpoint.
///
/// A successful query is `Ok(text)`; every failure lands in one of these
/// variants so an error can never be mistaken for model output.
#[derive(Debug, Error)]
pub enum InferenceError {
    /// Network-level failure: connection refused, DNS, unreadable body.
    #[error("could not reach {endpoint}: {reason}")]
    Transport { endpoint: String, reason: String },

    /// The endpoint did not answer within the configured timeout.
    #[error("inference timed out after {duration_secs}s")]
    Timeout { duration_secs: u64 },

    /// The endpoint answered with a non-200 status.
    #[error("inference endpoint returned HTTP {status}")]
    Status { status: u16 },

    /// The HTTP client could not be constructed.
    #[error("failed to build HTTP client: {reason}")]
    ClientBuild { reason: String },
}

impl InferenceError {
    /// Whether this is a transport-class failure (as opposed to a status error).
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            InferenceError::Transport { .. } | InferenceError::Timeout { .. }
        )
    }

    /// The HTTP status code, if the endpoint answered at all.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            InferenceError::Status { status } => Some(*status),
            _ => None,
        }
    }
}
