//! The `Llm` trait every model handle implements.

use std::path::Path;
use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::config::TokenUsage;
use super::image::ImagePart;
use super::message::{Message, ToolCall};
use super::text::{extract_json, structured_output_prompt};
use crate::error::AgentError;
use crate::schema;
use crate::tools::ToolDefinition;

/// Model reply to a tool-enabled prompt.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ToolCallResponse {
    pub response: String,
    #[serde(default)]
    pub tool_calls: Vec<ToolCall>,
}

impl ToolCallResponse {
    pub fn text(response: impl Into<String>) -> Self {
        Self {
            response: response.into(),
            tool_calls: Vec::new(),
        }
    }

    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }
}

/// One piece of a streamed reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LlmChunk {
    pub content: String,
    pub is_final: bool,
}

/// Streamed reply
pub struct LlmStream {
    inner: Pin<Box<dyn Stream<Item = Result<LlmChunk, AgentError>> + Send>>,
}

impl LlmStream {
    pub fn new<S>(stream: S) -> Self
    where
        S: Stream<Item = Result<LlmChunk, AgentError>> + Send + 'static,
    {
        Self {
            inner: Box::pin(stream),
        }
    }

    /// Single final chunk carrying a complete reply.
    pub fn from_complete(content: String) -> Self {
        let chunk = LlmChunk {
            content,
            is_final: true,
        };
        Self::new(futures::stream::once(async move { Ok(chunk) }))
    }

    pub fn into_inner(self) -> Pin<Box<dyn Stream<Item = Result<LlmChunk, AgentError>> + Send>> {
        self.inner
    }

    /// Drain the stream into one string.
    pub async fn collect_text(self) -> Result<String, AgentError> {
        use futures::StreamExt;

        let mut inner = self.inner;
        let mut text = String::new();
        while let Some(chunk) = inner.next().await {
            text.push_str(&chunk?.content);
        }
        Ok(text)
    }
}

/// Provider-agnostic language model handle.
///
/// Only `invoke` and `invoke_with_chat` are mandatory. Tool calling and image
/// input default to [`AgentError::Unsupported`]; structured output falls
/// back to prompting for JSON and validating the reply against the schema.
#[async_trait]
pub trait Llm: Send + Sync {
    fn model_name(&self) -> &str;

    fn provider_name(&self) -> &str;

    async fn invoke(&self, prompt: &str) -> Result<String, AgentError>;

    async fn stream(&self, prompt: &str) -> Result<LlmStream, AgentError> {
        let response = self.invoke(prompt).await?;
        Ok(LlmStream::from_complete(response))
    }

    async fn invoke_with_chat(&self, messages: &[Message]) -> Result<String, AgentError>;

    async fn invoke_with_tools(
        &self,
        prompt: &str,
        tools: &[ToolDefinition],
    ) -> Result<ToolCallResponse, AgentError> {
        self.chat_with_tools(&[Message::user(prompt)], tools).await
    }

    /// One tool-enabled turn over a conversation that may already hold
    /// assistant tool calls and their `Role::Tool` results.
    async fn chat_with_tools(
        &self,
        _messages: &[Message],
        _tools: &[ToolDefinition],
    ) -> Result<ToolCallResponse, AgentError> {
        Err(AgentError::unsupported(self.provider_name(), "tool calling"))
    }

    /// Prompt with inline images attached after the text.
    async fn invoke_with_images(
        &self,
        _prompt: &str,
        _images: &[ImagePart],
    ) -> Result<String, AgentError> {
        Err(AgentError::unsupported(self.provider_name(), "image input"))
    }

    async fn invoke_with_structured_output(
        &self,
        prompt: &str,
        output_schema: &Value,
    ) -> Result<Value, AgentError> {
        let raw = self
            .invoke(&structured_output_prompt(prompt, output_schema))
            .await?;
        let value = extract_json(&raw)?;
        schema::check_instance(&value, output_schema).map_err(AgentError::StructuredOutput)?;
        Ok(value)
    }

    /// Provider-specific payload for an image file.
    fn image_object(&self, _image_path: &Path) -> Result<Value, AgentError> {
        Err(AgentError::unsupported(self.provider_name(), "image input"))
    }

    /// Tokens consumed so far by this handle, when the provider reports them.
    fn token_usage(&self) -> TokenUsage {
        TokenUsage::default()
    }
}
