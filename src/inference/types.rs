//! Wire types for the Ollama `/api/generate` endpoint.

use serde::{Deserialize, Serialize};

/// Text returned when a 200 response carries no `response` field.
pub const EMPTY_RESPONSE_FALLBACK: &str = "No response from model.";

/// Request body for `POST /api/generate`.
///
/// `stream` is always `false`; the relay waits for the full completion.
#[derive(Debug, Clone, Serialize)]
pub struct GenerateRequest {
    pub model: String,
    pub prompt: String,
    pub temperature: f32,
    pub stream: bool,
}

impl GenerateRequest {
    /// Build a non-streaming request.
    pub fn new(model: impl Into<String>, prompt: impl Into<String>, temperature: f32) -> Self {
        Self {
            model: model.into(),
            prompt: prompt.into(),
            temperature,
            stream: false,
        }
    }
}

/// The subset of the generate response the relay reads.
///
/// `response` is kept as a raw JSON value so that a `null` or non-string
/// value falls back the same way an absent field does.
#[derive(Debug, Deserialize)]
pub struct GenerateResponse {
    #[serde(default)]
    pub response: Option<serde_json::Value>,
}

impl GenerateResponse {
    /// The generated text, or the fixed fallback when none was returned.
    pub fn into_text(self) -> String {
        match self.response {
            Some(serde_json::Value::String(text)) => text,
            _ => EMPTY_RESPONSE_FALLBACK.to_string(),
        }
    }
}
