//! Post-processing helpers for raw model text.

use std::sync::OnceLock;

use regex::Regex;
use serde_json::Value;

use crate::error::AgentError;

fn think_block() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)^\s*<think>.*</think>").expect("static regex"))
}

fn fenced_block() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)```(?:json|JSON)?\s*\n?(.*?)```").expect("static regex"))
}

/// Drop a leading `<think>...</think>` reasoning block and trim.
pub fn strip_think(text: &str) -> String {
    think_block().replace(text, "").trim().to_string()
}

/// Parse the JSON payload of a model reply.
///
/// Accepts bare JSON, JSON inside a fenced code block, or JSON surrounded by
/// prose (first `{`/`[` to the matching last `}`/`]`).
pub fn extract_json(text: &str) -> Result<Value, AgentError> {
    let text = strip_think(text);

    if let Ok(value) = serde_json::from_str(&text) {
        return Ok(value);
    }

    if let Some(captures) = fenced_block().captures(&text) {
        if let Ok(value) = serde_json::from_str(captures[1].trim()) {
            return Ok(value);
        }
    }

    for (open, close) in [('{', '}'), ('[', ']')] {
        if let (Some(start), Some(end)) = (text.find(open), text.rfind(close)) {
            if start < end {
                if let Ok(value) = serde_json::from_str(&text[start..=end]) {
                    return Ok(value);
                }
            }
        }
    }

    Err(AgentError::StructuredOutput(format!(
        "model reply is not valid JSON: {}",
        truncate(&text, 200)
    )))
}

/// Prompt asking for a reply that conforms to `schema`.
pub fn structured_output_prompt(prompt: &str, schema: &Value) -> String {
    let schema_text = serde_json::to_string_pretty(schema).unwrap_or_else(|_| schema.to_string());
    format!(
        "{}\n\nRespond with a single JSON value that conforms to this JSON schema. \
         Do not add any explanation.\n{}\n",
        prompt.trim_end(),
        schema_text
    )
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        let cut: String = text.chars().take(max_chars).collect();
        format!("{}...", cut)
    }
}
