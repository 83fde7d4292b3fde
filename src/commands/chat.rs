//! Chat message commands: `!ask`, `!clear` and `!help`.
//!
//! Turns a raw chat message into a core call and renders the reply as plain
//! markdown text. Messages that are not commands produce no reply.

use thiserror::Error;

use super::usage::usage_text;
use crate::conversation::types::fold_warnings;
use crate::conversation::{ConversationOrchestrator, RelayError, RequestParameters};
use crate::inference::EMPTY_RESPONSE_FALLBACK;

const ASK_PREFIX: &str = "!ask";
const CLEAR_PREFIX: &str = "!clear";
const HELP_PREFIX: &str = "!help";

/// Prefix of every successful answer.
pub const ANSWER_PREFIX: &str = "💬 **Chat Droid:** ";

/// Reply to an `!ask` with no prompt.
pub const EMPTY_PROMPT_REPLY: &str = "❌ Please provide a question after `!ask`.";

/// Reply to `!clear` when something was removed.
pub const CLEARED_REPLY: &str = "🧹 Your conversation history has been cleared.";

/// Reply to `!clear` when there was nothing to remove.
pub const NOTHING_TO_CLEAR_REPLY: &str = "ℹ️ You have no stored conversation history.";

// ─── Parsing ────────────────────────────────────────────────────────────────

/// A recognised chat command.
#[derive(Debug, Clone, PartialEq)]
pub enum ChatCommand {
    Ask(RequestParameters),
    Clear,
    Help,
}

/// A malformed `!ask` option.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CommandError {
    #[error("option `--{option}` needs a value")]
    MissingValue { option: String },

    #[error("`{value}` is not a number")]
    InvalidTemperature { value: String },

    #[error("unknown option `--{option}`")]
    UnknownOption { option: String },
}

/// Parse a chat message.
///
/// Returns `Ok(None)` for messages that are not commands. `!ask` options must
/// come before the prompt; everything after the first non-option word is the
/// prompt, kept verbatim apart from surrounding whitespace.
pub fn parse_command(message: &str) -> Result<Option<ChatCommand>, CommandError> {
    let message = message.trim_start();

    if let Some(rest) = strip_command(message, ASK_PREFIX) {
        return parse_ask(rest).map(|params| Some(ChatCommand::Ask(params)));
    }
    if strip_command(message, CLEAR_PREFIX).is_some() {
        return Ok(Some(ChatCommand::Clear));
    }
    if strip_command(message, HELP_PREFIX).is_some() {
        return Ok(Some(ChatCommand::Help));
    }
    Ok(None)
}

/// Whether `message` is an `!ask` that will reach the model, so the front end
/// should show a typing notice. Malformed or empty asks are answered at once.
pub fn is_model_ask(message: &str) -> bool {
    matches!(
        parse_command(message),
        Ok(Some(ChatCommand::Ask(params))) if !params.prompt.trim().is_empty()
    )
}

/// Strip `prefix` when it is followed by whitespace or the end of the message.
fn strip_command<'a>(message: &'a str, prefix: &str) -> Option<&'a str> {
    let rest = message.strip_prefix(prefix)?;
    match rest.chars().next() {
        None => Some(rest),
        Some(c) if c.is_whitespace() => Some(rest),
        Some(_) => None,
    }
}

fn parse_ask(args: &str) -> Result<RequestParameters, CommandError> {
    let mut params = RequestParameters::default();
    let mut rest = args.trim_start();

    while let Some(option_text) = rest.strip_prefix("--") {
        let (option, after) = split_word(option_text);
        rest = after.trim_start();

        match option {
            "model" => {
                let (value, after) = take_value(option, rest)?;
                params.model = Some(value.to_string());
                rest = after;
            }
            "temperature" => {
                let (value, after) = take_value(option, rest)?;
                let parsed = value.parse::<f32>().map_err(|_| CommandError::InvalidTemperature {
                    value: value.to_string(),
                })?;
                params.temperature = Some(parsed);
                rest = after;
            }
            "think" => params.show_thinking = true,
            "history" => params.preserve_history = true,
            other => {
                return Err(CommandError::UnknownOption {
                    option: other.to_string(),
                })
            }
        }
    }

    params.prompt = rest.trim().to_string();
    Ok(params)
}

/// Take the value word following an option.
fn take_value<'a>(option: &str, rest: &'a str) -> Result<(&'a str, &'a str), CommandError> {
    let (value, after) = split_word(rest);
    if value.is_empty() || value.starts_with("--") {
        return Err(CommandError::MissingValue {
            option: option.to_string(),
        });
    }
    Ok((value, after.trim_start()))
}

/// Split off the first whitespace-delimited word.
fn split_word(text: &str) -> (&str, &str) {
    match text.find(char::is_whitespace) {
        Some(idx) => (&text[..idx], &text[idx..]),
        None => (text, ""),
    }
}

// ─── Dispatch ───────────────────────────────────────────────────────────────

/// Run a chat message through the relay and return the text to post, if any.
pub async fn dispatch(
    orchestrator: &ConversationOrchestrator,
    user_id: &str,
    message: &str,
) -> Option<String> {
    let command = match parse_command(message) {
        Ok(Some(command)) => command,
        Ok(None) => return None,
        Err(e) => {
            tracing::info!(user = %user_id, error = %e, "rejected chat command");
            return Some(format!("❌ {e}. Type `!help` for usage."));
        }
    };

    let reply = match command {
        ChatCommand::Help => usage_text(orchestrator.config()),
        ChatCommand::Clear => {
            if orchestrator.clear_history(user_id).await {
                CLEARED_REPLY.to_string()
            } else {
                NOTHING_TO_CLEAR_REPLY.to_string()
            }
        }
        ChatCommand::Ask(params) => match orchestrator.handle(user_id, params).await {
            Ok(reply) if reply.is_error => reply.text(),
            Ok(reply) => {
                let answer = if reply.content.is_empty() {
                    EMPTY_RESPONSE_FALLBACK
                } else {
                    reply.content.as_str()
                };
                fold_warnings(&reply.warnings, &format!("{ANSWER_PREFIX}{answer}"))
            }
            Err(RelayError::EmptyPrompt) => EMPTY_PROMPT_REPLY.to_string(),
        },
    };

    Some(reply)
}

// ─── Tests ──────────────────────────────────────────────────────────────────
