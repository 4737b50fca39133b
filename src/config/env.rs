// Provider settings resolved from environment variables.
//
// Every function reads its variables at call time; nothing is cached. The
// `*_from` variants take an explicit `Env` so the mapping can be exercised
// against an in-memory map.

use std::collections::HashMap;

use crate::error::{LlmError, Result};

pub const DEFAULT_MODEL_TYPE: &str = "AzureOpenAI";
pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_OLLAMA_BASE_URL: &str = "http://localhost:11434";
pub const DEFAULT_OLLAMA_MODEL: &str = "llama2";
pub const DEFAULT_OLLAMA_TEMPERATURE: f64 = 0.75;

/// Source of configuration variables.
pub trait Env: Send + Sync {
    fn var(&self, key: &str) -> Option<String>;
}

/// Reads the real process environment.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessEnv;

impl Env for ProcessEnv {
    fn var(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }
}

/// In-memory variable map, used by tests and embedders.
#[derive(Debug, Clone, Default)]
pub struct MapEnv(HashMap<String, String>);

impl MapEnv {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, key: &str, value: &str) -> Self {
        self.0.insert(key.to_string(), value.to_string());
        self
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for MapEnv {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

impl Env for MapEnv {
    fn var(&self, key: &str) -> Option<String> {
        self.0.get(key).cloned()
    }
}

/// Settings for a generic OpenAI-compatible endpoint.
#[derive(Debug, Clone, PartialEq)]
pub struct OpenAiConfig {
    pub api_key: String,
    pub model_name: String,
    pub base_url: String,
    pub temperature: f64,
}

/// Settings for an Azure-hosted OpenAI deployment.
#[derive(Debug, Clone, PartialEq)]
pub struct AzureConfig {
    pub api_version: String,
    pub azure_endpoint: String,
    pub deployment_name: String,
    pub temperature: f64,
}

/// Settings for an Ollama server.
#[derive(Debug, Clone, PartialEq)]
pub struct OllamaConfig {
    pub base_url: String,
    pub model_name: String,
    pub temperature: f64,
}

fn var_or(env: &dyn Env, key: &str, default: &str) -> String {
    env.var(key).unwrap_or_else(|| default.to_string())
}

/// Show whether a secret is set without revealing it.
fn mask(secret: &str) -> &'static str {
    if secret.is_empty() {
        "<empty>"
    } else {
        "<set>"
    }
}

/// True iff `USE_OPENAI_API_KEY` is exactly `"True"`.
pub fn use_openai_api_key() -> bool {
    use_openai_api_key_from(&ProcessEnv)
}

pub fn use_openai_api_key_from(env: &dyn Env) -> bool {
    let flag = env.var("USE_OPENAI_API_KEY").as_deref() == Some("True");
    tracing::debug!(use_openai_api_key = flag, "resolved provider flag");
    flag
}

pub fn get_openai_config() -> OpenAiConfig {
    get_openai_config_from(&ProcessEnv)
}

pub fn get_openai_config_from(env: &dyn Env) -> OpenAiConfig {
    let cfg = OpenAiConfig {
        api_key: var_or(env, "OPENAI_API_KEY", ""),
        model_name: var_or(env, "OPENAI_MODEL_NAME", ""),
        base_url: var_or(env, "OPENAI_BASE_URL", DEFAULT_OPENAI_BASE_URL),
        temperature: 0.0,
    };
    if cfg.api_key.is_empty() {
        tracing::warn!("OPENAI_API_KEY is not set");
    }
    tracing::debug!(
        api_key = mask(&cfg.api_key),
        model_name = %cfg.model_name,
        base_url = %cfg.base_url,
        temperature = cfg.temperature,
        "resolved OpenAI config"
    );
    cfg
}

pub fn get_azure_config() -> AzureConfig {
    get_azure_config_from(&ProcessEnv)
}

pub fn get_azure_config_from(env: &dyn Env) -> AzureConfig {
    let cfg = AzureConfig {
        api_version: var_or(env, "OPENAI_API_VERSION", ""),
        azure_endpoint: var_or(env, "AZURE_OPENAI_ENDPOINT", ""),
        deployment_name: var_or(env, "AZURE_OPENAI_DEPLOYMENT_NAME", ""),
        temperature: 0.0,
    };
    if cfg.azure_endpoint.is_empty() {
        tracing::warn!("AZURE_OPENAI_ENDPOINT is not set");
    }
    if cfg.deployment_name.is_empty() {
        tracing::warn!("AZURE_OPENAI_DEPLOYMENT_NAME is not set");
    }
    tracing::debug!(
        api_version = %cfg.api_version,
        azure_endpoint = %cfg.azure_endpoint,
        deployment_name = %cfg.deployment_name,
        temperature = cfg.temperature,
        "resolved Azure config"
    );
    cfg
}

pub fn get_ollama_config() -> Result<OllamaConfig> {
    get_ollama_config_from(&ProcessEnv)
}

/// Fails with `ConfigParse` when `OLLAMA_TEMPERATURE` is not a number.
pub fn get_ollama_config_from(env: &dyn Env) -> Result<OllamaConfig> {
    let temperature = match env.var("OLLAMA_TEMPERATURE") {
        Some(raw) => raw
            .trim()
            .parse::<f64>()
            .map_err(|source| LlmError::ConfigParse {
                var: "OLLAMA_TEMPERATURE",
                value: raw.clone(),
                source,
            })?,
        None => DEFAULT_OLLAMA_TEMPERATURE,
    };
    let cfg = OllamaConfig {
        base_url: var_or(env, "OLLAMA_BASE_URL", DEFAULT_OLLAMA_BASE_URL),
        model_name: var_or(env, "OLLAMA_MODEL", DEFAULT_OLLAMA_MODEL),
        temperature,
    };
    tracing::debug!(
        base_url = %cfg.base_url,
        model_name = %cfg.model_name,
        temperature = cfg.temperature,
        "resolved Ollama config"
    );
    Ok(cfg)
}

/// Dispatch key; any string is accepted.
pub fn get_model_type() -> String {
    get_model_type_from(&ProcessEnv)
}

pub fn get_model_type_from(env: &dyn Env) -> String {
    let model_type = var_or(env, "MODEL_TYPE", DEFAULT_MODEL_TYPE);
    tracing::debug!(model_type = %model_type, "resolved model type");
    model_type
}
