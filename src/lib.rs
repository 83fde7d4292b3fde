//! Chat Droid: relays chat prompts to a local Ollama model.
//!
//! A chat front end hands each message to [`commands::dispatch`], which
//! drives the [`ConversationOrchestrator`]: validate parameters, compile the
//! prompt from per-user history, query the model, strip reasoning markup and
//! record the exchange.

pub mod commands;
pub mod config;
pub mod conversation;
pub mod inference;
pub mod logging;

pub use config::{ConfigError, RelayConfig};
pub use conversation::{
    ConversationOrchestrator, HistoryStore, InMemoryHistoryStore, RelayError, RelayReply,
    RequestParameters, Role, Turn,
};
pub use inference::{InferenceBackend, InferenceClient, InferenceError};
