use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Inference modality of a pooled model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelType {
    Chat,
    Completion,
    Embeddings,
    #[serde(rename = "multimodal", alias = "multi_modal")]
    MultiModal,
}

impl ModelType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModelType::Chat => "chat",
            ModelType::Completion => "completion",
            ModelType::Embeddings => "embeddings",
            ModelType::MultiModal => "multimodal",
        }
    }
}

impl fmt::Display for ModelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ModelType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "chat" => Ok(ModelType::Chat),
            "completion" => Ok(ModelType::Completion),
            "embeddings" | "embedding" => Ok(ModelType::Embeddings),
            "multimodal" | "multi_modal" | "multi-modal" => Ok(ModelType::MultiModal),
            other => Err(format!(
                "unknown model type '{other}', expected one of: chat, completion, embeddings, multimodal"
            )),
        }
    }
}

/// Everything needed to build a model pool.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModelPoolConfig {
    /// Azure OpenAI account and its deployments.
    #[serde(default)]
    pub azure_open_ai: Option<AzureOpenAiPoolConfig>,

    /// Models built by factories registered in a `ModelRegistry`.
    #[serde(default)]
    pub custom_models: Vec<CustomModelConfig>,
}

/// Azure OpenAI account settings shared by all Azure models in the pool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AzureOpenAiPoolConfig {
    /// API key, supports `${ENV_VAR}` syntax. Ignored when `use_azure_ad` is set.
    #[serde(default)]
    pub api_key: Option<String>,

    pub azure_endpoint: String,

    pub api_version: String,

    /// Authenticate with an Azure AD bearer token instead of the API key.
    #[serde(default = "default_use_azure_ad")]
    pub use_azure_ad: bool,

    #[serde(default)]
    pub azure_oai_models: Vec<AzureModelConfig>,
}

/// A single Azure deployment exposed in the pool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AzureModelConfig {
    pub unique_model_id: String,

    pub model_type: ModelType,

    /// Model name on the Azure side, e.g. `gpt-4o`. Also selects the tokenizer.
    pub model_name_in_azure: String,

    /// Deployment name. Required for embeddings and multimodal models; chat
    /// models fall back to `model_name_in_azure`.
    #[serde(default)]
    pub deployment_name_in_azure: Option<String>,

    #[serde(default)]
    pub track_tokens: bool,
}

/// A model produced by a registered factory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CustomModelConfig {
    pub unique_model_id: String,

    pub model_type: ModelType,

    /// Key of the factory in the model registry.
    pub class_name: String,

    #[serde(default)]
    pub track_tokens: bool,
}

fn default_use_azure_ad() -> bool {
    true
}

impl ModelPoolConfig {
    /// Validate configuration values, returning an error with a helpful message
    /// if any entry is incomplete.
    pub fn validate(&self) -> anyhow::Result<()> {
        if let Some(az) = &self.azure_open_ai {
            if az.azure_endpoint.trim().is_empty() {
                anyhow::bail!("azure_open_ai.azure_endpoint cannot be empty");
            }
            if az.api_version.trim().is_empty() {
                anyhow::bail!("azure_open_ai.api_version cannot be empty");
            }
            if !az.use_azure_ad && az.api_key.as_deref().unwrap_or("").is_empty() {
                anyhow::bail!("azure_open_ai.api_key is required when use_azure_ad is false");
            }
            for model in &az.azure_oai_models {
                if model.unique_model_id.is_empty() {
                    anyhow::bail!("azure model entries need a unique_model_id");
                }
                if model.model_name_in_azure.is_empty() {
                    anyhow::bail!(
                        "model '{}' has an empty model_name_in_azure",
                        model.unique_model_id
                    );
                }
            }
        }
        for model in &self.custom_models {
            if model.unique_model_id.is_empty() {
                anyhow::bail!("custom model entries need a unique_model_id");
            }
            if model.class_name.is_empty() {
                anyhow::bail!(
                    "custom model '{}' has an empty class_name",
                    model.unique_model_id
                );
            }
        }
        Ok(())
    }
}
