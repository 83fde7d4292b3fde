//! Output sanitizer: strips model-internal scaffolding from raw inference text.
//!
//! Two passes, repeated until the text stops changing:
//! 1. Drop every line whose trimmed content starts with `>>>`.
//! 2. Unless thinking is shown, cut every `<think>` … `</think>` span
//!    (non-greedy, across newlines).
//!
//! Unpaired markers:
//! - `<think>` with no later `</think>` cuts everything from the marker to
//!   the end of the text.
//! - `</think>` with no opener is left in place.
//!
//! Repeating to a fixpoint matters because removing a span can splice new
//! markers or marker lines together; the final text is then trimmed.

/// Line prefix that marks a scaffolding line.
pub const SCAFFOLD_LINE_MARKER: &str = ">>>";

/// Opening reasoning marker.
pub const THINK_OPEN: &str = "<think>";

/// Closing reasoning marker.
pub const THINK_CLOSE: &str = "</think>";

/// Remove scaffolding lines and, unless `show_thinking`, reasoning blocks.
///
/// Pure and idempotent: `sanitize(&sanitize(x, b), b) == sanitize(x, b)`.
pub fn sanitize(raw: &str, show_thinking: bool) -> String {
    let mut text = raw.to_string();
    loop {
        let mut next = strip_scaffold_lines(&text);
        if !show_thinking {
            next = strip_think_blocks(&next);
        }
        // Each changing pass removes at least one byte, so this terminates.
        if next == text {
            break;
        }
        text = next;
    }
    text.trim().to_string()
}

/// Drop lines whose trimmed content begins with [`SCAFFOLD_LINE_MARKER`].
pub fn strip_scaffold_lines(text: &str) -> String {
    text.split('\n')
        .filter(|line| !line.trim_start().starts_with(SCAFFOLD_LINE_MARKER))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Cut `<think>` … `</think>` spans left to right.
pub fn strip_think_blocks(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;

    while let Some(open) = rest.find(THINK_OPEN) {
        out.push_str(&rest[..open]);
        let inside = &rest[open + THINK_OPEN.len()..];

        match inside.find(THINK_CLOSE) {
            Some(close) => rest = &inside[close + THINK_CLOSE.len()..],
            None => {
                tracing::debug!(
                    dropped_len = inside.len(),
                    "unterminated <think> block, dropping remainder"
                );
                return out;
            }
        }
    }

    out.push_str(rest);
    out
}

// ─── Tests ──────────────────────────────────────────────────────────────────
