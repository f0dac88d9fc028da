//! Model and provider configuration.

use std::env;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default LM Studio endpoint (OpenAI-compatible, trailing slash included).
pub const DEFAULT_LMSTUDIO_HOST: &str = "http://localhost:1234/v1/";

/// Token counts reported by a provider.
///
/// ```
/// use agent_workflow::llm::TokenUsage;
///
/// let mut usage = TokenUsage::new(120, 30);
/// usage += TokenUsage::new(80, 20);
/// assert_eq!(usage.total_tokens, 250);
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub total_tokens: u64,
}

impl TokenUsage {
    pub fn new(input_tokens: u64, output_tokens: u64) -> Self {
        Self {
            input_tokens,
            output_tokens,
            total_tokens: input_tokens + output_tokens,
        }
    }

    pub(crate) fn from_rig_usage(usage: &rig::completion::Usage) -> Self {
        Self::new(usage.input_tokens, usage.output_tokens)
    }
}

impl std::ops::Add for TokenUsage {
    type Output = Self;

    fn add(mut self, other: Self) -> Self {
        self += other;
        self
    }
}

impl std::ops::AddAssign for TokenUsage {
    fn add_assign(&mut self, other: Self) {
        self.input_tokens += other.input_tokens;
        self.output_tokens += other.output_tokens;
        self.total_tokens += other.total_tokens;
    }
}

/// Per-model generation settings.
///
/// ```
/// use agent_workflow::llm::LlmConfig;
///
/// let config = LlmConfig::new("gpt-4o").with_temperature(0.2);
/// assert_eq!(config.model, "gpt-4o");
/// assert_eq!(config.temperature, Some(0.2));
/// ```
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct LlmConfig {
    pub model: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    /// Custom endpoint, used by OpenAI-compatible servers
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    /// Request timeout for HTTP-backed providers
    #[serde(default, with = "humantime_serde", skip_serializing_if = "Option::is_none")]
    pub timeout: Option<Duration>,
}

impl LlmConfig {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            ..Default::default()
        }
    }

    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_max_tokens(mut self, tokens: u64) -> Self {
        self.max_tokens = Some(tokens);
        self
    }

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    pub fn with_base_url(mut self, base: impl Into<String>) -> Self {
        self.base_url = Some(base.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Credentials and endpoints for the built-in providers.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProviderSettings {
    pub openai_api_key: Option<String>,
    pub openai_base_url: Option<String>,
    pub anthropic_api_key: Option<String>,
    pub anthropic_base_url: Option<String>,
    pub gemini_api_key: Option<String>,
    pub lmstudio_host: String,
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            openai_api_key: None,
            openai_base_url: None,
            anthropic_api_key: None,
            anthropic_base_url: None,
            gemini_api_key: None,
            lmstudio_host: DEFAULT_LMSTUDIO_HOST.to_string(),
        }
    }
}

impl ProviderSettings {
    /// Read `OPENAI_API_KEY`, `ANTHROPIC_API_KEY`, `GEMINI_API_KEY` and
    /// `LMSTUDIO_HOST` from the environment.
    pub fn from_env() -> Self {
        Self {
            openai_api_key: env::var("OPENAI_API_KEY").ok(),
            openai_base_url: env::var("OPENAI_BASE_URL").ok(),
            anthropic_api_key: env::var("ANTHROPIC_API_KEY").ok(),
            anthropic_base_url: env::var("ANTHROPIC_BASE_URL").ok(),
            gemini_api_key: env::var("GEMINI_API_KEY").ok(),
            lmstudio_host: env::var("LMSTUDIO_HOST")
                .map(|host| normalize_host(&host))
                .unwrap_or_else(|_| DEFAULT_LMSTUDIO_HOST.to_string()),
        }
    }

    pub fn with_lmstudio_host(mut self, host: impl AsRef<str>) -> Self {
        self.lmstudio_host = normalize_host(host.as_ref());
        self
    }
}

/// Ensure a base URL ends with `/` so relative paths join below it.
pub fn normalize_host(host: &str) -> String {
    if host.ends_with('/') {
        host.to_string()
    } else {
        format!("{}/", host)
    }
}
