//! Shared types for the conversation core.

use std::fmt;

use serde::{Deserialize, Serialize};

// ─── Turns ──────────────────────────────────────────────────────────────────

/// Who spoke a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    /// Speaker label used in compiled transcripts.
    pub fn label(self) -> &'static str {
        match self {
            Role::User => "User",
            Role::Assistant => "Assistant",
        }
    }
}

/// One message in a conversation. Assistant text is stored post-sanitization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub text: String,
}

impl Turn {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            text: text.into(),
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            text: text.into(),
        }
    }
}

// ─── Requests ───────────────────────────────────────────────────────────────

/// Per-call options supplied by the chat front end.
///
/// `model` and `temperature` are validated by the orchestrator; invalid values
/// are replaced with configured defaults and reported as warnings.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequestParameters {
    pub prompt: String,
    pub model: Option<String>,
    pub temperature: Option<f32>,
    pub show_thinking: bool,
    pub preserve_history: bool,
}

impl RequestParameters {
    /// Parameters with only a prompt; everything else defaulted.
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            ..Self::default()
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_show_thinking(mut self, show: bool) -> Self {
        self.show_thinking = show;
        self
    }

    pub fn with_preserve_history(mut self, preserve: bool) -> Self {
        self.preserve_history = preserve;
        self
    }
}

// ─── Replies ────────────────────────────────────────────────────────────────

/// What the orchestrator hands back for one request.
///
/// `content` is either the (sanitized) model answer or a user-facing error
/// message; `is_error` tells them apart. Warnings are kept separately and
/// folded in by [`RelayReply::text`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayReply {
    pub content: String,
    pub warnings: Vec<String>,
    pub is_error: bool,
}

impl RelayReply {
    pub fn answered(content: String, warnings: Vec<String>) -> Self {
        Self {
            content,
            warnings,
            is_error: false,
        }
    }

    pub fn failed(content: String, warnings: Vec<String>) -> Self {
        Self {
            content,
            warnings,
            is_error: true,
        }
    }

    /// Final display text: warnings, one per line, then a blank line, then content.
    pub fn text(&self) -> String {
        fold_warnings(&self.warnings, &self.content)
    }
}

impl fmt::Display for RelayReply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text())
    }
}

/// Prepend `warnings` to `body` in the folded textual form.
pub fn fold_warnings(warnings: &[String], body: &str) -> String {
    if warnings.is_empty() {
        body.to_string()
    } else {
        format!("{}\n\n{body}", warnings.join("\n"))
    }
}
