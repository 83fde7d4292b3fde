//! Prompt compiler: renders prior turns plus a new prompt into one transcript.
//!
//! Only used for preserve-history requests. A request without history sends
//! the raw prompt and never reaches this module.

use super::types::Turn;

/// First line of every compiled transcript.
pub const PREAMBLE: &str =
    "The following is a conversation between a user and an AI assistant.";

/// Render `history` and `new_prompt` as a `User:` / `Assistant:` transcript.
///
/// Output is the preamble, one line per turn in order, `User: <new_prompt>`,
/// and a bare `Assistant:` cue, joined by `\n` with no trailing newline.
pub fn compile(history: &[Turn], new_prompt: &str) -> String {
    let mut lines = Vec::with_capacity(history.len() + 3);
    lines.push(PREAMBLE.to_string());

    for turn in history {
        lines.push(format!("{}: {}", turn.role.label(), turn.text));
    }

    lines.push(format!("User: {new_prompt}"));
    lines.push("Assistant:".to_string());

    lines.join("\n")
}
