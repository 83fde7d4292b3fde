//! Static usage text, generated from the request parameter table.

use crate::config::RelayConfig;

/// One row of the `!ask` parameter table.
#[derive(Debug, Clone)]
pub struct ParameterDoc {
    /// Parameter name as the core knows it.
    pub name: &'static str,
    /// Command-line spelling in chat, empty for the positional prompt.
    pub flag: &'static str,
    pub description: &'static str,
    /// Human-readable default.
    pub default: String,
}

/// The parameters `!ask` accepts, with defaults taken from `config`.
pub fn parameter_table(config: &RelayConfig) -> Vec<ParameterDoc> {
    vec![
        ParameterDoc {
            name: "prompt",
            flag: "",
            description: "What to ask the model (required)",
            default: "none".to_string(),
        },
        ParameterDoc {
            name: "model",
            flag: "--model NAME",
            description: "Model to use, one of the allowed models",
            default: format!("`{}`", config.default_model),
        },
        ParameterDoc {
            name: "temperature",
            flag: "--temperature T",
            description: "Sampling temperature between 0.0 and 1.0",
            default: config.default_temperature.to_string(),
        },
        ParameterDoc {
            name: "show_thinking",
            flag: "--think",
            description: "Keep the model's <think> reasoning in the answer",
            default: "off".to_string(),
        },
        ParameterDoc {
            name: "preserve_history",
            flag: "--history",
            description: "Continue your stored conversation and remember this exchange",
            default: "off".to_string(),
        },
    ]
}

/// Markdown usage text for `!help`.
pub fn usage_text(config: &RelayConfig) -> String {
    let mut lines = vec![
        "**Chat Droid commands**".to_string(),
        "`!ask [options] <prompt>` ask the model a question".to_string(),
        "`!clear` forget your stored conversation".to_string(),
        "`!help` show this message".to_string(),
        String::new(),
        "**Options for `!ask`**".to_string(),
    ];

    for param in parameter_table(config) {
        let spelling = if param.flag.is_empty() {
            format!("`<{}>`", param.name)
        } else {
            format!("`{}`", param.flag)
        };
        lines.push(format!(
            "• {spelling} {} (default: {})",
            param.description, param.default
        ));
    }

    lines.push(String::new());
    lines.push(format!(
        "Allowed models: {}",
        config
            .allowed_models
            .iter()
            .map(|m| format!("`{m}`"))
            .collect::<Vec<_>>()
            .join(", ")
    ));

    lines.join("\n")
}
