//! Deterministic in-process model for demos and tests.

use std::sync::Mutex;

use async_trait::async_trait;

use super::image::ImagePart;
use super::message::{Message, Role, ToolCall};
use super::provider::{Llm, ToolCallResponse};
use crate::error::AgentError;
use crate::tools::ToolDefinition;

enum Reply {
    Text(String),
    Fail(String),
}

/// Answers from substring rules; the first rule whose pattern occurs in the
/// prompt wins, otherwise the default reply is returned.
///
/// In a tool conversation the "prompt" is the text of every message after
/// the last assistant turn, so the user prompt on the first round and the
/// tool results on later rounds.
///
/// ```
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// use agent_workflow::llm::{Llm, ScriptedLlm};
///
/// let llm = ScriptedLlm::new("scripted").on("weather", "Sunny, 24C");
/// assert_eq!(llm.invoke("What is the weather?").await.unwrap(), "Sunny, 24C");
/// # }
/// ```
pub struct ScriptedLlm {
    model: String,
    rules: Vec<(String, Reply)>,
    tool_rules: Vec<(String, Vec<ToolCall>)>,
    default_reply: String,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedLlm {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            rules: Vec::new(),
            tool_rules: Vec::new(),
            default_reply: String::new(),
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// Reply with `response` when the prompt contains `pattern`.
    pub fn on(mut self, pattern: impl Into<String>, response: impl Into<String>) -> Self {
        self.rules.push((pattern.into(), Reply::Text(response.into())));
        self
    }

    /// Fail with an LLM error when the prompt contains `pattern`.
    pub fn fail_on(mut self, pattern: impl Into<String>, message: impl Into<String>) -> Self {
        self.rules.push((pattern.into(), Reply::Fail(message.into())));
        self
    }

    /// Request `calls` from tool-enabled prompts containing `pattern`.
    pub fn on_tools(mut self, pattern: impl Into<String>, calls: Vec<ToolCall>) -> Self {
        self.tool_rules.push((pattern.into(), calls));
        self
    }

    pub fn with_default(mut self, response: impl Into<String>) -> Self {
        self.default_reply = response.into();
        self
    }

    /// Every prompt received so far, in order.
    pub fn prompts(&self) -> Vec<String> {
        self.prompts
            .lock()
            .map(|prompts| prompts.clone())
            .unwrap_or_default()
    }

    fn record(&self, prompt: &str) {
        if let Ok(mut prompts) = self.prompts.lock() {
            prompts.push(prompt.to_string());
        }
    }

    fn reply(&self, prompt: &str) -> Result<String, AgentError> {
        self.record(prompt);
        match self.rules.iter().find(|(pattern, _)| prompt.contains(pattern.as_str())) {
            Some((_, Reply::Text(text))) => Ok(text.clone()),
            Some((_, Reply::Fail(message))) => Err(AgentError::Llm(message.clone())),
            None => Ok(self.default_reply.clone()),
        }
    }
}

#[async_trait]
impl Llm for ScriptedLlm {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn provider_name(&self) -> &str {
        "scripted"
    }

    async fn invoke(&self, prompt: &str) -> Result<String, AgentError> {
        self.reply(prompt)
    }

    async fn invoke_with_chat(&self, messages: &[Message]) -> Result<String, AgentError> {
        let prompt = messages
            .iter()
            .rev()
            .find(|message| message.role == Role::User)
            .map(|message| message.content.as_str())
            .unwrap_or_default();
        self.reply(prompt)
    }

    async fn chat_with_tools(
        &self,
        messages: &[Message],
        tools: &[ToolDefinition],
    ) -> Result<ToolCallResponse, AgentError> {
        let start = messages
            .iter()
            .rposition(|message| message.role == Role::Assistant)
            .map_or(0, |index| index + 1);
        let prompt = messages[start..]
            .iter()
            .map(|message| message.content.as_str())
            .collect::<Vec<_>>()
            .join("\n");

        let calls = self
            .tool_rules
            .iter()
            .find(|(pattern, _)| prompt.contains(pattern.as_str()))
            .map(|(_, calls)| {
                calls
                    .iter()
                    .filter(|call| tools.iter().any(|tool| tool.name == call.name))
                    .cloned()
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default();

        let response = self.reply(&prompt)?;
        Ok(ToolCallResponse {
            response,
            tool_calls: calls,
        })
    }

    async fn invoke_with_images(
        &self,
        prompt: &str,
        _images: &[ImagePart],
    ) -> Result<String, AgentError> {
        self.reply(prompt)
    }
}
