//! Chat-platform commands exposed to the front end.
//!
//! The front end passes each incoming message and the sender's id to
//! [`chat::dispatch`] and posts whatever text comes back.

pub mod chat;
pub mod usage;

pub use chat::{dispatch, is_model_ask, parse_command, ChatCommand, CommandError};
pub use usage::{parameter_table, usage_text, ParameterDoc};
