//! Configuration system for Sleuth.
//!
//! Uses `figment` for layered configuration: defaults -> config file -> environment.
//! Configuration is loaded from `~/.config/sleuth/config.toml` and/or `.sleuth/config.toml`
//! in the workspace directory. Credentials are never stored here; each collaborator
//! names the environment variable that holds its key.

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::ConfigError;
use crate::gateway::GatewayConfig;

/// Top-level configuration for Sleuth.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SleuthConfig {
    pub llm: LlmConfig,
    pub search: SearchConfig,
    pub pipeline: PipelineConfig,
    pub gateway: GatewayConfig,
}

impl SleuthConfig {
    /// Collect warnings for questionable values across all sections.
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = self.llm.validate();
        if self.search.num_results == 0 || self.search.num_results > 10 {
            warnings.push(format!(
                "search.num_results ({}) is outside the API range 1-10",
                self.search.num_results
            ));
        }
        if self.pipeline.stage_timeout_secs == 0 {
            warnings.push("pipeline.stage_timeout_secs is 0; every stage will time out".into());
        }
        if self.pipeline.max_concurrent_calls == 0 {
            warnings.push(
                "pipeline.max_concurrent_calls is 0; no collaborator call can ever run".into(),
            );
        }
        warnings
    }

    /// Render the effective configuration as TOML.
    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::Invalid {
            message: e.to_string(),
        })
    }
}

/// Retry policy shared by the model and search collaborators.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Retries after the first attempt (0 disables retrying).
    pub max_retries: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub backoff_multiplier: f64,
    /// Add up to 25% random jitter to each delay.
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            initial_backoff_ms: 1000,
            max_backoff_ms: 30_000,
            backoff_multiplier: 2.0,
            jitter: true,
        }
    }
}

/// LLM provider configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Provider name: "openai", "anthropic", or any OpenAI-compatible endpoint.
    pub provider: String,
    /// Model identifier (e.g., "o3-mini", "gpt-4o").
    pub model: String,
    /// Environment variable name containing the API key.
    pub api_key_env: String,
    /// Optional base URL override for the API endpoint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    /// Maximum tokens to generate in a response.
    pub max_tokens: usize,
    /// Sampling temperature. Left unset for reasoning models that reject it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    /// Per-request HTTP timeout in seconds.
    pub request_timeout_secs: u64,
    #[serde(default)]
    pub retry: RetryConfig,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "openai".to_string(),
            model: "o3-mini".to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
            base_url: None,
            max_tokens: 4096,
            temperature: None,
            request_timeout_secs: 120,
            retry: RetryConfig::default(),
        }
    }
}

impl LlmConfig {
    /// Validate this LLM config and return any warnings.
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        if let Some(t) = self.temperature
            && !(0.0..=2.0).contains(&t)
        {
            warnings.push(format!(
                "llm.temperature ({}) is outside the typical range 0.0-2.0",
                t
            ));
        }
        if self.max_tokens == 0 {
            warnings.push("llm.max_tokens is 0; the model cannot answer".into());
        }
        warnings
    }
}

/// Web search configuration (Google Custom Search JSON API).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Whether the search capability is registered at all.
    pub enabled: bool,
    pub base_url: String,
    /// Environment variable holding the API key.
    pub api_key_env: String,
    /// Environment variable holding the custom search engine id.
    pub cx_env: String,
    pub num_results: u32,
    pub start: u32,
    pub safe: String,
    pub fields: String,
    /// Interface language (`hl`).
    pub language: String,
    /// Country boost (`gl`).
    pub country: String,
    pub request_timeout_secs: u64,
    #[serde(default)]
    pub retry: RetryConfig,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            base_url: "https://www.googleapis.com/customsearch/v1".to_string(),
            api_key_env: "GOOGLE_API_KEY".to_string(),
            cx_env: "GOOGLE_CX".to_string(),
            num_results: 10,
            start: 1,
            safe: "off".to_string(),
            fields: "items(title,link,snippet)".to_string(),
            language: "zh-TW".to_string(),
            country: "tw".to_string(),
            request_timeout_secs: 20,
            retry: RetryConfig::default(),
        }
    }
}

/// Research pipeline limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Upper bound for a single stage's collaborator call. Time spent queued
    /// for a `max_concurrent_calls` permit is not counted.
    pub stage_timeout_secs: u64,
    /// Collaborator calls allowed in flight across all sessions.
    pub max_concurrent_calls: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            stage_timeout_secs: 180,
            max_concurrent_calls: 8,
        }
    }
}

/// Load configuration from layered sources.
///
/// Priority (highest to lowest):
/// 1. Environment variables (prefixed with `SLEUTH_`)
/// 2. Workspace-local config (`.sleuth/config.toml`)
/// 3. User config (`~/.config/sleuth/config.toml`)
/// 4. Built-in defaults
pub fn load_config(workspace: Option<&Path>) -> Result<SleuthConfig, ConfigError> {
    let mut figment = Figment::from(Serialized::defaults(SleuthConfig::default()));

    if let Some(config_dir) = directories::ProjectDirs::from("dev", "sleuth", "sleuth") {
        let user_config = config_dir.config_dir().join("config.toml");
        if user_config.exists() {
            figment = figment.merge(Toml::file(&user_config));
        }
    }

    if let Some(ws) = workspace {
        let ws_config = ws.join(".sleuth").join("config.toml");
        if ws_config.exists() {
            figment = figment.merge(Toml::file(&ws_config));
        }
    }

    // SLEUTH_LLM__MODEL, SLEUTH_GATEWAY__PORT, etc.
    figment = figment.merge(Env::prefixed("SLEUTH_").split("__"));

    Ok(figment.extract()?)
}

/// Read a required credential from the environment.
pub fn env_credential(var: &str) -> Result<String, ConfigError> {
    match std::env::var(var) {
        Ok(value) if !value.trim().is_empty() => Ok(value),
        _ => Err(ConfigError::EnvVarMissing {
            var: var.to_string(),
        }),
    }
}
