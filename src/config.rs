//! # Configuration Module
//!
//! Loads runner settings from the environment (and a `.env` file when one
//! exists). Command-line flags override what is read here.

use anyhow::{Context, Result};
use std::env;

use agent_workflow::llm::{normalize_host, LlmConfig, ProviderSettings, DEFAULT_LMSTUDIO_HOST};

// =============================================================================
// CONFIGURATION STRUCT
// =============================================================================
/// Settings for the workflow runner.
#[derive(Debug, Clone)]
pub struct Config {
    /// Model name, e.g. "gpt-4o-mini", "claude-3-5-haiku-latest"
    pub model: String,

    /// Explicit provider name; resolved from the model name when unset
    pub provider: Option<String>,

    /// LM Studio endpoint (OpenAI-compatible)
    pub lmstudio_host: String,

    /// Sampling temperature
    pub temperature: f64,

    /// Models served by LM Studio, used for provider resolution
    pub lmstudio_models: Vec<String>,

    /// Log filter, `RUST_LOG` syntax
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            model: "gpt-4o-mini".to_string(),
            provider: None,
            lmstudio_host: DEFAULT_LMSTUDIO_HOST.to_string(),
            temperature: 0.7,
            lmstudio_models: Vec::new(),
            log_level: "info".to_string(),
        }
    }
}

// =============================================================================
// CONFIGURATION LOADING
// =============================================================================
impl Config {
    /// Read `AWF_MODEL`, `AWF_PROVIDER`, `LMSTUDIO_HOST`, `TEMPERATURE`,
    /// `LMSTUDIO_MODELS` (comma separated) and `RUST_LOG`.
    pub fn from_env() -> Result<Self> {
        let _ = dotenvy::dotenv();

        let mut config = Config::default();

        if let Ok(val) = env::var("AWF_MODEL") {
            config.model = val;
        }

        if let Ok(val) = env::var("AWF_PROVIDER") {
            config.provider = Some(val);
        }

        if let Ok(val) = env::var("LMSTUDIO_HOST") {
            config.lmstudio_host = normalize_host(&val);
        }

        if let Ok(val) = env::var("TEMPERATURE") {
            config.temperature = val
                .parse()
                .context("TEMPERATURE must be a valid floating-point number (e.g., 0.7)")?;
        }

        if let Ok(val) = env::var("LMSTUDIO_MODELS") {
            config.lmstudio_models = parse_list(&val);
        }

        if let Ok(val) = env::var("RUST_LOG") {
            config.log_level = val;
        }

        Ok(config)
    }

    /// Fail fast on out-of-range values.
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=2.0).contains(&self.temperature) {
            anyhow::bail!(
                "Temperature must be between 0.0 and 2.0, got: {}",
                self.temperature
            );
        }

        if self.model.trim().is_empty() {
            anyhow::bail!("AWF_MODEL cannot be empty");
        }

        if !self.lmstudio_host.starts_with("http://") && !self.lmstudio_host.starts_with("https://") {
            anyhow::bail!("LMSTUDIO_HOST must be an http(s) URL, got: {}", self.lmstudio_host);
        }

        Ok(())
    }

    pub fn llm_config(&self) -> LlmConfig {
        LlmConfig::new(self.model.clone()).with_temperature(self.temperature)
    }

    /// API keys from the environment, LM Studio host from this config.
    pub fn provider_settings(&self) -> ProviderSettings {
        ProviderSettings::from_env().with_lmstudio_host(&self.lmstudio_host)
    }
}

fn parse_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(String::from)
        .collect()
}
