//! `Llm` implementation over a rig agent.
//!
//! Every call goes through rig's completion request so tool definitions,
//! history and token usage are handled the same way for each provider.

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures::StreamExt;
use rig::agent::Agent;
use rig::client::CompletionClient;
use rig::completion::{Completion, CompletionModel, Message as RigMessage};
use rig::streaming::StreamedAssistantContent;
use serde_json::Value;

use super::config::{LlmConfig, ProviderSettings, TokenUsage};
use super::image::{ImageFormat, ImagePart};
use super::message::{build_rig_conversation, split_rig_choice, to_rig_tool_definitions};
use super::provider::{Llm, LlmChunk, LlmStream, ToolCallResponse};
use super::Message;
use crate::error::{AgentError, ProviderError};
use crate::tools::ToolDefinition;

/// Anthropic rejects requests without `max_tokens`.
pub const ANTHROPIC_DEFAULT_MAX_TOKENS: u64 = 4096;

pub struct RigModel<M>
where
    M: CompletionModel,
{
    agent: Agent<M>,
    provider_name: String,
    model_name: String,
    image_format: ImageFormat,
    usage: Mutex<TokenUsage>,
}

impl<M> RigModel<M>
where
    M: CompletionModel + Send + Sync + 'static,
{
    pub fn new(
        agent: Agent<M>,
        provider_name: impl Into<String>,
        model_name: impl Into<String>,
        image_format: ImageFormat,
    ) -> Self {
        Self {
            agent,
            provider_name: provider_name.into(),
            model_name: model_name.into(),
            image_format,
            usage: Mutex::new(TokenUsage::default()),
        }
    }

    pub fn agent(&self) -> &Agent<M> {
        &self.agent
    }

    fn record_usage(&self, usage: TokenUsage) {
        if usage.total_tokens == 0 {
            return;
        }
        if let Ok(mut total) = self.usage.lock() {
            *total += usage;
        }
    }

    fn llm_error(&self, err: impl std::fmt::Display) -> AgentError {
        AgentError::Llm(format!("{} request failed: {}", self.provider_name, err))
    }

    async fn complete(
        &self,
        prompt: RigMessage,
        history: Vec<RigMessage>,
        preamble: Option<String>,
        tools: &[ToolDefinition],
    ) -> Result<ToolCallResponse, AgentError> {
        let mut builder = self
            .agent
            .completion(prompt, history)
            .await
            .map_err(|e| self.llm_error(e))?;

        if let Some(preamble) = preamble {
            builder = builder.preamble(preamble);
        }

        let rig_tools = to_rig_tool_definitions(tools);
        if !rig_tools.is_empty() {
            builder = builder.tools(rig_tools);
        }

        let response = builder.send().await.map_err(|e| self.llm_error(e))?;
        self.record_usage(TokenUsage::from_rig_usage(&response.usage));

        let (text, tool_calls) = split_rig_choice(&response.choice);
        tracing::debug!(
            provider = %self.provider_name,
            model = %self.model_name,
            tool_calls = tool_calls.len(),
            "Completion received"
        );

        Ok(ToolCallResponse {
            response: text,
            tool_calls,
        })
    }
}

#[async_trait]
impl<M> Llm for RigModel<M>
where
    M: CompletionModel + Send + Sync + 'static,
{
    fn model_name(&self) -> &str {
        &self.model_name
    }

    fn provider_name(&self) -> &str {
        &self.provider_name
    }

    async fn invoke(&self, prompt: &str) -> Result<String, AgentError> {
        let reply = self
            .complete(RigMessage::user(prompt), Vec::new(), None, &[])
            .await?;
        Ok(reply.response)
    }

    async fn stream(&self, prompt: &str) -> Result<LlmStream, AgentError> {
        let builder = self
            .agent
            .completion(RigMessage::user(prompt), Vec::new())
            .await
            .map_err(|e| self.llm_error(e))?;

        let stream = builder.stream().await.map_err(|e| self.llm_error(e))?;
        let provider = self.provider_name.clone();

        let mapped = stream.filter_map(move |item| {
            let provider = provider.clone();
            async move {
                match item {
                    Ok(StreamedAssistantContent::Text(text)) => Some(Ok(LlmChunk {
                        content: text.text,
                        is_final: false,
                    })),
                    Ok(StreamedAssistantContent::Final(_)) => Some(Ok(LlmChunk {
                        content: String::new(),
                        is_final: true,
                    })),
                    Ok(_) => None,
                    Err(err) => Some(Err(AgentError::Llm(format!(
                        "{} stream failed: {}",
                        provider, err
                    )))),
                }
            }
        });

        Ok(LlmStream::new(mapped))
    }

    async fn invoke_with_chat(&self, messages: &[Message]) -> Result<String, AgentError> {
        let conversation = build_rig_conversation(messages);
        let reply = self
            .complete(
                conversation.prompt,
                conversation.history,
                conversation.preamble,
                &[],
            )
            .await?;
        Ok(reply.response)
    }

    async fn chat_with_tools(
        &self,
        messages: &[Message],
        tools: &[ToolDefinition],
    ) -> Result<ToolCallResponse, AgentError> {
        let conversation = build_rig_conversation(messages);
        self.complete(
            conversation.prompt,
            conversation.history,
            conversation.preamble,
            tools,
        )
        .await
    }

    async fn invoke_with_images(
        &self,
        prompt: &str,
        images: &[ImagePart],
    ) -> Result<String, AgentError> {
        self.invoke_with_chat(&[Message::user_with_images(prompt, images.to_vec())])
            .await
    }

    fn image_object(&self, image_path: &Path) -> Result<Value, AgentError> {
        self.image_format.object(image_path)
    }

    fn token_usage(&self) -> TokenUsage {
        self.usage.lock().map(|usage| *usage).unwrap_or_default()
    }
}

fn require_key(
    configured: Option<&String>,
    fallback: Option<&String>,
    variable: &str,
) -> Result<String, AgentError> {
    configured
        .or(fallback)
        .cloned()
        .ok_or_else(|| ProviderError::Construction(format!("{} is not set", variable)).into())
}

/// rig agents spawn their tool server on the current Tokio runtime.
fn require_runtime(provider: &str) -> Result<(), AgentError> {
    tokio::runtime::Handle::try_current()
        .map(|_| ())
        .map_err(|_| {
            ProviderError::Construction(format!(
                "a Tokio runtime is required to create {} models",
                provider
            ))
            .into()
        })
}

fn client_error(provider: &str, err: impl std::fmt::Display) -> AgentError {
    ProviderError::Construction(format!("{} client: {}", provider, err)).into()
}

/// OpenAI chat model over the Chat Completions API.
///
/// `config.base_url` (or `settings.openai_base_url`) points the client at an
/// OpenAI-compatible server instead of api.openai.com.
pub fn openai(config: &LlmConfig, settings: &ProviderSettings) -> Result<Arc<dyn Llm>, AgentError> {
    use rig::providers::openai::CompletionsClient;

    let api_key = require_key(
        config.api_key.as_ref(),
        settings.openai_api_key.as_ref(),
        "OPENAI_API_KEY",
    )?;
    require_runtime("openai")?;

    let mut client_builder = CompletionsClient::builder().api_key(api_key);
    if let Some(base_url) = config.base_url.as_ref().or(settings.openai_base_url.as_ref()) {
        client_builder = client_builder.base_url(base_url.trim_end_matches('/'));
    }
    let client: CompletionsClient = client_builder
        .build()
        .map_err(|e| client_error("openai", e))?;

    let mut builder = client.agent(&config.model);
    if let Some(temperature) = config.temperature {
        builder = builder.temperature(temperature);
    }
    if let Some(max_tokens) = config.max_tokens {
        builder = builder.max_tokens(max_tokens);
    }

    Ok(Arc::new(RigModel::new(
        builder.build(),
        "openai",
        config.model.clone(),
        ImageFormat::DataUrl,
    )))
}

/// Anthropic model; `max_tokens` defaults to [`ANTHROPIC_DEFAULT_MAX_TOKENS`].
pub fn anthropic(
    config: &LlmConfig,
    settings: &ProviderSettings,
) -> Result<Arc<dyn Llm>, AgentError> {
    use rig::providers::anthropic::Client;

    let api_key = require_key(
        config.api_key.as_ref(),
        settings.anthropic_api_key.as_ref(),
        "ANTHROPIC_API_KEY",
    )?;
    require_runtime("anthropic")?;

    let client: Client = Client::new(api_key).map_err(|e| client_error("anthropic", e))?;

    let mut builder = client
        .agent(&config.model)
        .max_tokens(config.max_tokens.unwrap_or(ANTHROPIC_DEFAULT_MAX_TOKENS));
    if let Some(temperature) = config.temperature {
        builder = builder.temperature(temperature);
    }

    Ok(Arc::new(RigModel::new(
        builder.build(),
        "anthropic",
        config.model.clone(),
        ImageFormat::Base64Source,
    )))
}

/// Google Gemini model.
pub fn gemini(config: &LlmConfig, settings: &ProviderSettings) -> Result<Arc<dyn Llm>, AgentError> {
    use rig::providers::gemini::Client;

    let api_key = require_key(
        config.api_key.as_ref(),
        settings.gemini_api_key.as_ref(),
        "GEMINI_API_KEY",
    )?;
    require_runtime("google")?;

    let client: Client = Client::new(api_key).map_err(|e| client_error("google", e))?;

    let mut builder = client.agent(&config.model);
    if let Some(temperature) = config.temperature {
        builder = builder.temperature(temperature);
    }
    if let Some(max_tokens) = config.max_tokens {
        builder = builder.max_tokens(max_tokens);
    }

    Ok(Arc::new(RigModel::new(
        builder.build(),
        "google",
        config.model.clone(),
        ImageFormat::DataUrl,
    )))
}


#[cfg(test)]
mod http_tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use crate::llm::ToolCall;

    fn openai_for(server: &MockServer) -> Arc<dyn Llm> {
        let config = LlmConfig::new("gpt-4o-mini")
            .with_api_key("sk-test")
            .with_base_url(format!("{}/v1/", server.uri()));
        openai(&config, &ProviderSettings::default()).unwrap()
    }

    fn completion(message: Value, prompt_tokens: u64, total_tokens: u64) -> Value {
        json!({
            "id": "chatcmpl-1",
            "object": "chat.completion",
            "created": 1_700_000_000,
            "model": "gpt-4o-mini",
            "choices": [{
                "index": 0,
                "message": message,
                "logprobs": null,
                "finish_reason": "stop"
            }],
            "usage": {"prompt_tokens": prompt_tokens, "total_tokens": total_tokens}
        })
    }

    async fn mount_reply(server: &MockServer, body: Value) {
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(header("Authorization", "Bearer sk-test"))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .mount(server)
            .await;
    }

    async fn sent_body(server: &MockServer) -> Value {
        let requests = server.received_requests().await.unwrap();
        serde_json::from_slice(&requests.last().unwrap().body).unwrap()
    }

    /// Message content is either a plain string or a list of typed parts.
    fn text_of(content: &Value) -> String {
        match content {
            Value::String(text) => text.clone(),
            Value::Array(parts) => parts
                .iter()
                .filter_map(|part| part["text"].as_str())
                .collect(),
            _ => String::new(),
        }
    }

    #[tokio::test]
    async fn test_invoke_returns_text_and_tracks_usage() {
        let server = MockServer::start().await;
        mount_reply(
            &server,
            completion(json!({"role": "assistant", "content": "Pong"}), 9, 12),
        )
        .await;

        let model = openai_for(&server);
        assert_eq!(model.invoke("Ping").await.unwrap(), "Pong");
        assert_eq!(model.invoke("Ping").await.unwrap(), "Pong");

        let body = sent_body(&server).await;
        assert_eq!(body["model"], "gpt-4o-mini");
        let messages = body["messages"].as_array().unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0]["role"], "user");
        assert_eq!(text_of(&messages[0]["content"]), "Ping");

        assert_eq!(model.token_usage(), TokenUsage::new(18, 6));
    }

    #[tokio::test]
    async fn test_chat_maps_system_history_and_prompt() {
        let server = MockServer::start().await;
        mount_reply(
            &server,
            completion(json!({"role": "assistant", "content": "Take the ridge trail."}), 30, 36),
        )
        .await;

        let messages = [
            Message::system("You are a hiking guide."),
            Message::user("I am in Seoul."),
            Message::assistant("Bukhansan is close by."),
            Message::user("Which trail?"),
        ];
        let reply = openai_for(&server).invoke_with_chat(&messages).await.unwrap();
        assert_eq!(reply, "Take the ridge trail.");

        let body = sent_body(&server).await;
        let sent = body["messages"].as_array().unwrap();
        let roles: Vec<_> = sent.iter().map(|m| m["role"].as_str().unwrap()).collect();
        assert_eq!(roles, vec!["system", "user", "assistant", "user"]);
        assert_eq!(text_of(&sent[0]["content"]), "You are a hiking guide.");
        assert_eq!(text_of(&sent[2]["content"]), "Bukhansan is close by.");
        assert_eq!(text_of(&sent[3]["content"]), "Which trail?");
    }

    #[tokio::test]
    async fn test_tools_offered_and_calls_mapped_back() {
        let server = MockServer::start().await;
        mount_reply(
            &server,
            completion(
                json!({
                    "role": "assistant",
                    "content": null,
                    "tool_calls": [{
                        "id": "call_1",
                        "type": "function",
                        "function": {"name": "get_weather", "arguments": "{\"city\":\"Kyoto\"}"}
                    }]
                }),
                20,
                25,
            ),
        )
        .await;

        let tools = [ToolDefinition::new(
            "get_weather",
            "Current weather for a city",
            json!({"type": "object", "properties": {"city": {"type": "string"}}}),
        )];
        let model = openai_for(&server);
        let reply = model.invoke_with_tools("Weather in Kyoto?", &tools).await.unwrap();

        assert_eq!(reply.response, "");
        assert_eq!(
            reply.tool_calls,
            vec![ToolCall {
                id: "call_1".into(),
                name: "get_weather".into(),
                arguments: json!({"city": "Kyoto"}),
            }]
        );

        let body = sent_body(&server).await;
        assert_eq!(body["tools"][0]["type"], "function");
        assert_eq!(body["tools"][0]["function"]["name"], "get_weather");
        assert_eq!(body["tools"][0]["function"]["parameters"]["properties"]["city"]["type"], "string");
        assert_eq!(model.token_usage(), TokenUsage::new(20, 5));
    }

    #[tokio::test]
    async fn test_tool_results_sent_as_tool_messages() {
        let server = MockServer::start().await;
        mount_reply(
            &server,
            completion(json!({"role": "assistant", "content": "Bring an umbrella."}), 40, 44),
        )
        .await;

        let call = ToolCall {
            id: "call_1".into(),
            name: "get_weather".into(),
            arguments: json!({"city": "Kyoto"}),
        };
        let conversation = [
            Message::user("Weather in Kyoto?"),
            Message::assistant_with_tool_calls("", vec![call]),
            Message::tool("rain, 14C", "call_1"),
        ];
        let reply = openai_for(&server)
            .chat_with_tools(&conversation, &[])
            .await
            .unwrap();
        assert_eq!(reply.response, "Bring an umbrella.");

        let body = sent_body(&server).await;
        let sent = body["messages"].as_array().unwrap();
        assert_eq!(sent[1]["role"], "assistant");
        assert_eq!(sent[1]["tool_calls"][0]["id"], "call_1");
        assert_eq!(sent[1]["tool_calls"][0]["function"]["name"], "get_weather");
        assert_eq!(sent[2]["role"], "tool");
        assert_eq!(sent[2]["tool_call_id"], "call_1");
        assert_eq!(text_of(&sent[2]["content"]), "rain, 14C");
    }

    #[tokio::test]
    async fn test_images_sent_as_data_urls() {
        let server = MockServer::start().await;
        mount_reply(
            &server,
            completion(json!({"role": "assistant", "content": "A mountain trail."}), 100, 104),
        )
        .await;

        let image = ImagePart::new("image/png", "iVBORw0=");
        let reply = openai_for(&server)
            .invoke_with_images("What is in this photo?", &[image])
            .await
            .unwrap();
        assert_eq!(reply, "A mountain trail.");

        let body = sent_body(&server).await;
        let parts = body["messages"][0]["content"].as_array().unwrap();
        assert_eq!(parts[0]["type"], "text");
        assert_eq!(parts[0]["text"], "What is in this photo?");
        assert_eq!(parts[1]["type"], "image_url");
        assert_eq!(parts[1]["image_url"]["url"], "data:image/png;base64,iVBORw0=");
    }

    #[tokio::test]
    async fn test_stream_yields_text_chunks() {
        let server = MockServer::start().await;
        let events = concat!(
            "data: {\"choices\":[{\"delta\":{\"content\":\"Po\"},\"finish_reason\":null}],\"usage\":null}\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"ng\"},\"finish_reason\":\"stop\"}],",
            "\"usage\":{\"prompt_tokens\":5,\"total_tokens\":7}}\n\n",
            "data: [DONE]\n\n",
        );
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(events, "text/event-stream"))
            .mount(&server)
            .await;

        let stream = openai_for(&server).stream("Ping").await.unwrap();
        assert_eq!(stream.collect_text().await.unwrap(), "Pong");

        let body = sent_body(&server).await;
        assert_eq!(body["stream"], true);
    }

    #[tokio::test]
    async fn test_server_error_is_llm_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(500).set_body_string("overloaded"))
            .mount(&server)
            .await;

        let err = openai_for(&server).invoke("Ping").await.unwrap_err();
        assert!(matches!(err, AgentError::Llm(ref message) if message.starts_with("openai request failed")));
    }
}
