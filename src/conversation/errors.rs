//! Conversation core error types.

use thiserror::Error;

/// Errors the orchestrator signals to its caller instead of folding into text.
///
/// Inference failures are not here: they are converted to display text at the
/// orchestrator boundary. Only request validation short-circuits.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RelayError {
    /// The prompt was empty or whitespace-only.
    #[error("prompt must not be empty")]
    EmptyPrompt,
}
