//! Provider registry and model factory.
//!
//! Model names resolve to a provider by prefix (`claude-`, `gemini-`, `gpt-`)
//! or by membership in the LM Studio model list. [`ModelFactory`] maps the
//! provider name to a constructor and builds an [`Llm`] handle.
//!
//! ```
//! use agent_workflow::providers::{get_provider, ProviderKind};
//!
//! assert_eq!(get_provider("claude-3-5-sonnet", &[]).unwrap(), ProviderKind::Anthropic);
//! assert_eq!(get_provider("qwen2.5-7b", &["qwen2.5-7b".to_string()]).unwrap(), ProviderKind::LmStudio);
//! assert!(get_provider("mistral-large", &[]).is_err());
//! ```

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::error::{AgentError, ProviderError};
use crate::llm::{self, list_lmstudio_models, normalize_host, Llm, LlmConfig, LmStudioModel, ProviderSettings};

const OPENAI_API_BASE: &str = "https://api.openai.com/v1/";
const ANTHROPIC_API_BASE: &str = "https://api.anthropic.com/v1/";
const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Built-in providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderKind {
    Anthropic,
    OpenAi,
    Google,
    LmStudio,
}

impl ProviderKind {
    pub const ALL: [ProviderKind; 4] = [
        ProviderKind::Anthropic,
        ProviderKind::OpenAi,
        ProviderKind::Google,
        ProviderKind::LmStudio,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::Anthropic => "anthropic",
            ProviderKind::OpenAi => "openai",
            ProviderKind::Google => "google",
            ProviderKind::LmStudio => "lmstudio",
        }
    }

    /// Model-name prefix routed to this provider, if any.
    pub fn model_prefix(&self) -> Option<&'static str> {
        match self {
            ProviderKind::Anthropic => Some("claude-"),
            ProviderKind::OpenAi => Some("gpt-"),
            ProviderKind::Google => Some("gemini-"),
            ProviderKind::LmStudio => None,
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderKind {
    type Err = ProviderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ProviderKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| ProviderError::UnknownProviderName(s.to_string()))
    }
}

/// Resolve the provider for `model_name`.
pub fn get_provider(model_name: &str, lmstudio_models: &[String]) -> Result<ProviderKind, ProviderError> {
    let by_prefix = [ProviderKind::Anthropic, ProviderKind::Google, ProviderKind::OpenAi]
        .into_iter()
        .find(|kind| kind.model_prefix().is_some_and(|prefix| model_name.starts_with(prefix)));

    match by_prefix {
        Some(kind) => Ok(kind),
        None if lmstudio_models.iter().any(|m| m == model_name) => Ok(ProviderKind::LmStudio),
        None => Err(ProviderError::UnknownModel(model_name.to_string())),
    }
}

/// Builds a model handle from a model config and provider settings.
pub type ModelConstructor =
    Arc<dyn Fn(&LlmConfig, &ProviderSettings) -> Result<Arc<dyn Llm>, AgentError> + Send + Sync>;

/// Provider name to constructor map, plus the models known per provider.
pub struct ModelFactory {
    constructors: HashMap<String, ModelConstructor>,
    models: HashMap<String, Vec<String>>,
    settings: ProviderSettings,
}

impl ModelFactory {
    /// Factory with the four built-in providers registered.
    pub fn new(settings: ProviderSettings) -> Self {
        let mut factory = Self::empty(settings);
        factory.register(ProviderKind::OpenAi.as_str(), Arc::new(llm::openai));
        factory.register(ProviderKind::Anthropic.as_str(), Arc::new(llm::anthropic));
        factory.register(ProviderKind::Google.as_str(), Arc::new(llm::gemini));
        factory.register(
            ProviderKind::LmStudio.as_str(),
            Arc::new(
                |config: &LlmConfig, settings: &ProviderSettings| -> Result<Arc<dyn Llm>, AgentError> {
                    Ok(Arc::new(LmStudioModel::new(&settings.lmstudio_host, config.clone())))
                },
            ),
        );
        factory
    }

    /// Factory with no providers registered.
    pub fn empty(settings: ProviderSettings) -> Self {
        Self {
            constructors: HashMap::new(),
            models: HashMap::new(),
            settings,
        }
    }

    pub fn settings(&self) -> &ProviderSettings {
        &self.settings
    }

    /// Add or replace a provider.
    pub fn register(&mut self, name: impl Into<String>, constructor: ModelConstructor) {
        let name = name.into();
        debug!(provider = %name, "Registering provider");
        self.constructors.insert(name, constructor);
    }

    /// Registered provider names, sorted.
    pub fn providers(&self) -> Vec<String> {
        let mut names: Vec<String> = self.constructors.keys().cloned().collect();
        names.sort();
        names
    }

    /// Provider name for `model_name`; an explicit `provider` wins.
    pub fn resolve(&self, model_name: &str, provider: Option<&str>) -> Result<String, ProviderError> {
        match provider {
            Some(name) => Ok(name.to_string()),
            None => {
                let kind = get_provider(model_name, self.models(ProviderKind::LmStudio.as_str()))?;
                Ok(kind.as_str().to_string())
            }
        }
    }

    /// Build a model with default settings for `model_name`.
    pub fn create(&self, model_name: &str, provider: Option<&str>) -> Result<Arc<dyn Llm>, AgentError> {
        self.create_with_config(&LlmConfig::new(model_name), provider)
    }

    pub fn create_with_config(
        &self,
        config: &LlmConfig,
        provider: Option<&str>,
    ) -> Result<Arc<dyn Llm>, AgentError> {
        let provider = self.resolve(&config.model, provider)?;
        let constructor = self
            .constructors
            .get(&provider)
            .ok_or_else(|| ProviderError::UnregisteredProvider {
                provider: provider.clone(),
                available: self.providers(),
            })?;

        info!(provider = %provider, model = %config.model, "Creating model");
        constructor(config, &self.settings)
    }

    pub fn set_models(&mut self, provider: impl Into<String>, models: Vec<String>) {
        self.models.insert(provider.into(), models);
    }

    /// Known models for one provider.
    pub fn models(&self, provider: &str) -> &[String] {
        self.models.get(provider).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Union of the known models across providers, sorted.
    pub fn allowed_models(&self) -> Vec<String> {
        self.models
            .values()
            .flatten()
            .cloned()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Query every built-in provider for its model list.
    pub async fn refresh_models(&mut self) {
        for kind in ProviderKind::ALL {
            let models = discover_models(kind, &self.settings).await;
            info!(provider = %kind, count = models.len(), "Discovered models");
            self.models.insert(kind.as_str().to_string(), models);
        }
    }
}

impl fmt::Debug for ModelFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelFactory")
            .field("providers", &self.providers())
            .field("models", &self.models)
            .finish()
    }
}

#[derive(Debug, Deserialize)]
struct ModelPage {
    #[serde(default)]
    data: Vec<ModelRecord>,
}

#[derive(Debug, Deserialize)]
struct ModelRecord {
    id: String,
    #[serde(default)]
    object: Option<String>,
    #[serde(default, rename = "type")]
    kind: Option<String>,
}

impl ModelRecord {
    fn is_model(&self) -> bool {
        self.object.as_deref() == Some("model") || self.kind.as_deref() == Some("model")
    }
}

/// Model ids offered by a provider. Any failure yields an empty list.
pub async fn discover_models(kind: ProviderKind, settings: &ProviderSettings) -> Vec<String> {
    let client = Client::new();
    let result = match kind {
        ProviderKind::OpenAi => match &settings.openai_api_key {
            Some(key) => {
                let base = settings.openai_base_url.as_deref().unwrap_or(OPENAI_API_BASE);
                fetch_models(client.get(format!("{}models", normalize_host(base))).bearer_auth(key)).await
            }
            None => Ok(Vec::new()),
        },
        ProviderKind::Anthropic => match &settings.anthropic_api_key {
            Some(key) => {
                let base = settings.anthropic_base_url.as_deref().unwrap_or(ANTHROPIC_API_BASE);
                let request = client
                    .get(format!("{}models", normalize_host(base)))
                    .header("x-api-key", key)
                    .header("anthropic-version", ANTHROPIC_VERSION);
                fetch_models(request).await
            }
            None => Ok(Vec::new()),
        },
        ProviderKind::LmStudio => list_lmstudio_models(&client, &settings.lmstudio_host).await,
        ProviderKind::Google => Ok(Vec::new()),
    };

    result.unwrap_or_else(|err| {
        warn!(provider = %kind, error = %err, "Model discovery failed");
        Vec::new()
    })
}

async fn fetch_models(request: reqwest::RequestBuilder) -> Result<Vec<String>, AgentError> {
    let page: ModelPage = request.send().await?.error_for_status()?.json().await?;
    Ok(page
        .data
        .into_iter()
        .filter(ModelRecord::is_model)
        .map(|record| record.id)
        .collect())
}
