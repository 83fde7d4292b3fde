//! Conversation core: the request-to-reply pipeline for Chat Droid.
//!
//! Submodules:
//! - `sanitizer`: strips scaffolding lines and `<think>` blocks from model output
//! - `prompt`: compiles stored turns into a `User:` / `Assistant:` transcript
//! - `history`: per-user in-memory turn log
//! - `orchestrator`: validates a request, runs inference, updates history
//! - `types`: turns, request parameters and replies
//! - `errors`: request validation errors

pub mod errors;
pub mod history;
pub mod orchestrator;
pub mod prompt;
pub mod sanitizer;
pub mod types;

// Re-exports for convenience
pub use errors::RelayError;
pub use history::{HistoryStore, InMemoryHistoryStore};
pub use orchestrator::ConversationOrchestrator;
pub use prompt::compile;
pub use sanitizer::sanitize;
pub use types::{RelayReply, RequestParameters, Role, Turn};
