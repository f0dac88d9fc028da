//! LM Studio provider
//!
//! Talks to the OpenAI-compatible `chat/completions` endpoint a local LM
//! Studio server exposes. The server ignores the API key but the header is
//! still sent, matching what OpenAI client libraries do.

use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use super::config::{normalize_host, LlmConfig, TokenUsage, DEFAULT_LMSTUDIO_HOST};
use super::image::{ImageFormat, ImagePart};
use super::message::{Message, Role, ToolCall};
use super::provider::{Llm, ToolCallResponse};
use crate::error::AgentError;
use crate::tools::ToolDefinition;

const DUMMY_API_KEY: &str = "dummy";
const DEFAULT_TIMEOUT_SECS: u64 = 120;

pub struct LmStudioModel {
    client: Client,
    host: String,
    config: LlmConfig,
    timeout: Duration,
    usage: Mutex<TokenUsage>,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u64>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<WireTool>,
    stream: bool,
}

#[derive(Debug, Serialize, Deserialize)]
struct WireMessage {
    role: Role,
    #[serde(default)]
    content: Option<WireContent>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<WireToolCall>>,
}

/// Plain string, or content parts when the message carries images.
#[derive(Debug, Serialize, Deserialize)]
#[serde(untagged)]
enum WireContent {
    Text(String),
    Parts(Vec<Value>),
}

impl WireContent {
    fn into_text(self) -> String {
        match self {
            WireContent::Text(text) => text,
            WireContent::Parts(parts) => parts
                .iter()
                .filter_map(|part| part.get("text").and_then(Value::as_str))
                .collect(),
        }
    }
}

#[derive(Debug, Serialize)]
struct WireTool {
    #[serde(rename = "type")]
    kind: &'static str,
    function: WireFunctionDef,
}

#[derive(Debug, Serialize)]
struct WireFunctionDef {
    name: String,
    description: String,
    parameters: Value,
}

#[derive(Debug, Serialize, Deserialize)]
struct WireToolCall {
    #[serde(default)]
    id: String,
    #[serde(rename = "type", default = "function_kind")]
    kind: String,
    function: WireFunctionCall,
}

#[derive(Debug, Serialize, Deserialize)]
struct WireFunctionCall {
    name: String,
    #[serde(default)]
    arguments: String,
}

fn function_kind() -> String {
    "function".to_string()
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: Option<WireUsage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: WireMessage,
}

#[derive(Debug, Deserialize)]
struct WireUsage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
}

#[derive(Debug, Deserialize)]
struct ModelList {
    #[serde(default)]
    data: Vec<ModelEntry>,
}

#[derive(Debug, Deserialize)]
struct ModelEntry {
    id: String,
    #[serde(default)]
    object: String,
}

impl From<&Message> for WireMessage {
    fn from(message: &Message) -> Self {
        Self {
            role: message.role,
            content: Some(wire_content(message)),
            tool_call_id: message.tool_call_id.clone(),
            tool_calls: (!message.tool_calls.is_empty()).then(|| {
                message
                    .tool_calls
                    .iter()
                    .map(|call| WireToolCall {
                        id: call.id.clone(),
                        kind: function_kind(),
                        function: WireFunctionCall {
                            name: call.name.clone(),
                            arguments: call.arguments.to_string(),
                        },
                    })
                    .collect()
            }),
        }
    }
}

fn wire_content(message: &Message) -> WireContent {
    if message.images.is_empty() {
        return WireContent::Text(message.content.clone());
    }
    let mut parts = vec![serde_json::json!({"type": "text", "text": message.content})];
    parts.extend(message.images.iter().map(ImagePart::to_data_url_object));
    WireContent::Parts(parts)
}

impl From<WireToolCall> for ToolCall {
    fn from(call: WireToolCall) -> Self {
        let arguments = if call.function.arguments.trim().is_empty() {
            Value::Object(Default::default())
        } else {
            serde_json::from_str(&call.function.arguments)
                .unwrap_or(Value::String(call.function.arguments))
        };
        Self {
            id: call.id,
            name: call.function.name,
            arguments,
        }
    }
}

impl LmStudioModel {
    /// Model served at `host` (e.g. `http://localhost:1234/v1/`).
    pub fn new(host: impl AsRef<str>, config: LlmConfig) -> Self {
        let timeout = config
            .timeout
            .unwrap_or(Duration::from_secs(DEFAULT_TIMEOUT_SECS));
        let host = config
            .base_url
            .as_deref()
            .map(normalize_host)
            .unwrap_or_else(|| normalize_host(host.as_ref()));
        Self {
            client: Client::new(),
            host,
            config,
            timeout,
            usage: Mutex::new(TokenUsage::default()),
        }
    }

    /// Model served at [`DEFAULT_LMSTUDIO_HOST`].
    pub fn local(config: LlmConfig) -> Self {
        Self::new(DEFAULT_LMSTUDIO_HOST, config)
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    /// Ids of the models the server currently exposes.
    pub async fn list_models(&self) -> Result<Vec<String>, AgentError> {
        list_models(&self.client, &self.host).await
    }

    async fn chat(
        &self,
        messages: &[Message],
        tools: &[ToolDefinition],
    ) -> Result<ToolCallResponse, AgentError> {
        let request = ChatRequest {
            model: &self.config.model,
            messages: messages.iter().map(WireMessage::from).collect(),
            temperature: self.config.temperature,
            max_tokens: self.config.max_tokens,
            tools: tools
                .iter()
                .map(|tool| WireTool {
                    kind: "function",
                    function: WireFunctionDef {
                        name: tool.name.clone(),
                        description: tool.description.clone(),
                        parameters: tool.parameters.clone(),
                    },
                })
                .collect(),
            stream: false,
        };

        let url = format!("{}chat/completions", self.host);
        debug!(url = %url, model = %self.config.model, tools = tools.len(), "LM Studio request");

        let api_key = self.config.api_key.as_deref().unwrap_or(DUMMY_API_KEY);
        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", api_key))
            .timeout(self.timeout)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AgentError::Llm(format!(
                "LM Studio returned {}: {}",
                status.as_u16(),
                body
            )));
        }

        let reply: ChatResponse = response.json().await?;
        if let Some(usage) = reply.usage {
            if let Ok(mut total) = self.usage.lock() {
                *total += TokenUsage::new(usage.prompt_tokens, usage.completion_tokens);
            }
        }

        let message = reply
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message)
            .ok_or_else(|| AgentError::Llm("LM Studio reply has no choices".to_string()))?;

        Ok(ToolCallResponse {
            response: message.content.map(WireContent::into_text).unwrap_or_default(),
            tool_calls: message
                .tool_calls
                .unwrap_or_default()
                .into_iter()
                .map(ToolCall::from)
                .collect(),
        })
    }
}

pub(crate) async fn list_models(client: &Client, host: &str) -> Result<Vec<String>, AgentError> {
    let response = client
        .get(format!("{}models", normalize_host(host)))
        .send()
        .await?
        .error_for_status()?;
    let list: ModelList = response.json().await?;
    Ok(list
        .data
        .into_iter()
        .filter(|entry| entry.object == "model")
        .map(|entry| entry.id)
        .collect())
}

#[async_trait]
impl Llm for LmStudioModel {
    fn model_name(&self) -> &str {
        &self.config.model
    }

    fn provider_name(&self) -> &str {
        "lmstudio"
    }

    async fn invoke(&self, prompt: &str) -> Result<String, AgentError> {
        let reply = self.chat(&[Message::user(prompt)], &[]).await?;
        Ok(reply.response)
    }

    async fn invoke_with_chat(&self, messages: &[Message]) -> Result<String, AgentError> {
        let reply = self.chat(messages, &[]).await?;
        Ok(reply.response)
    }

    async fn chat_with_tools(
        &self,
        messages: &[Message],
        tools: &[ToolDefinition],
    ) -> Result<ToolCallResponse, AgentError> {
        self.chat(messages, tools).await
    }

    async fn invoke_with_images(
        &self,
        prompt: &str,
        images: &[ImagePart],
    ) -> Result<String, AgentError> {
        let message = Message::user_with_images(prompt, images.to_vec());
        let reply = self.chat(&[message], &[]).await?;
        Ok(reply.response)
    }

    fn image_object(&self, image_path: &Path) -> Result<Value, AgentError> {
        ImageFormat::DataUrl.object(image_path)
    }

    fn token_usage(&self) -> TokenUsage {
        self.usage.lock().map(|usage| *usage).unwrap_or_default()
    }
}


#[cfg(test)]
mod http_tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn model_for(server: &MockServer) -> LmStudioModel {
        LmStudioModel::new(format!("{}/v1", server.uri()), LlmConfig::new("qwen2.5-7b-instruct"))
    }

    #[tokio::test]
    async fn test_invoke_returns_content_and_tracks_usage() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(header("Authorization", "Bearer dummy"))
            .and(body_partial_json(json!({"model": "qwen2.5-7b-instruct", "stream": false})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{"message": {"role": "assistant", "content": "Hello there"}}],
                "usage": {"prompt_tokens": 12, "completion_tokens": 3}
            })))
            .mount(&server)
            .await;

        let model = model_for(&server);
        assert_eq!(model.invoke("hi").await.unwrap(), "Hello there");
        assert_eq!(model.token_usage(), TokenUsage::new(12, 3));
    }

    #[tokio::test]
    async fn test_invoke_with_tools_parses_calls() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(body_partial_json(json!({
                "tools": [{"type": "function", "function": {"name": "get_weather"}}]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{"message": {
                    "role": "assistant",
                    "content": null,
                    "tool_calls": [{
                        "id": "call_abc",
                        "type": "function",
                        "function": {"name": "get_weather", "arguments": "{\"location\":\"Busan\"}"}
                    }]
                }}]
            })))
            .mount(&server)
            .await;

        let tools = vec![ToolDefinition::new(
            "get_weather",
            "Current weather for a location",
            json!({"type": "object", "properties": {"location": {"type": "string"}}}),
        )];
        let reply = model_for(&server)
            .invoke_with_tools("Weather in Busan?", &tools)
            .await
            .unwrap();

        assert_eq!(reply.response, "");
        assert_eq!(reply.tool_calls.len(), 1);
        assert_eq!(reply.tool_calls[0].id, "call_abc");
        assert_eq!(reply.tool_calls[0].arguments["location"], "Busan");
    }

    #[tokio::test]
    async fn test_images_sent_as_content_parts() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(body_partial_json(json!({
                "messages": [{
                    "role": "user",
                    "content": [
                        {"type": "text", "text": "What trail is this?"},
                        {"type": "image_url", "image_url": {"url": "data:image/png;base64,iVBORw0="}}
                    ]
                }]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{"message": {"role": "assistant", "content": "Mount Hallasan"}}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let reply = model_for(&server)
            .invoke_with_images("What trail is this?", &[ImagePart::new("image/png", "iVBORw0=")])
            .await
            .unwrap();

        assert_eq!(reply, "Mount Hallasan");
    }

    #[tokio::test]
    async fn test_tool_results_sent_back_in_conversation() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{"message": {"role": "assistant", "content": "Bring a jacket"}}]
            })))
            .mount(&server)
            .await;

        let call = ToolCall {
            id: "call_7".into(),
            name: "get_weather".into(),
            arguments: json!({"location": "Busan"}),
        };
        let conversation = vec![
            Message::user("Weather in Busan?"),
            Message::assistant_with_tool_calls("", vec![call]),
            Message::tool("windy, 12C", "call_7"),
        ];
        let reply = model_for(&server).chat_with_tools(&conversation, &[]).await.unwrap();
        assert_eq!(reply.response, "Bring a jacket");

        let requests = server.received_requests().await.unwrap();
        let body: Value = serde_json::from_slice(&requests[0].body).unwrap();
        let messages = body["messages"].as_array().unwrap();
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[1]["tool_calls"][0]["id"], "call_7");
        assert_eq!(
            messages[1]["tool_calls"][0]["function"]["arguments"],
            r#"{"location":"Busan"}"#
        );
        assert_eq!(messages[2]["role"], "tool");
        assert_eq!(messages[2]["tool_call_id"], "call_7");
        assert_eq!(messages[2]["content"], "windy, 12C");
    }

    #[tokio::test]
    async fn test_server_error_surfaces_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(500).set_body_string("model not loaded"))
            .mount(&server)
            .await;

        let err = model_for(&server).invoke("hi").await.unwrap_err();
        let message = err.to_string();
        assert!(message.contains("500"));
        assert!(message.contains("model not loaded"));
    }

    #[tokio::test]
    async fn test_list_models_filters_non_models() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/models"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": [
                    {"id": "qwen2.5-7b-instruct", "object": "model"},
                    {"id": "nomic-embed", "object": "embedding"},
                    {"id": "llama-3.2-3b", "object": "model"}
                ]
            })))
            .mount(&server)
            .await;

        let models = model_for(&server).list_models().await.unwrap();
        assert_eq!(models, vec!["qwen2.5-7b-instruct", "llama-3.2-3b"]);
    }
}
