// Model pool: named model handles built from a ModelPoolConfig.
//
// The pool is built eagerly in one pass and never updated afterwards. Entries
// sharing a unique_model_id overwrite each other; the last one wins.

pub mod azure;
mod images;
pub mod registry;
pub mod tokens;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::config::{AzureOpenAiPoolConfig, ModelPoolConfig, ModelType};
use crate::error::{LlmError, Result};
use crate::llm::azure::{AzureAuth, AzureClient};
use crate::llm::credential::TokenProvider;
use crate::llm::messages::ChatMessage;

pub use registry::{CustomModelFactory, ModelRegistry, OllamaModelFactory};
pub use tokens::{TokenCounter, TokenUsage, Tokenizer};

use self::tokens::tokenizer_for_model;

use self::azure::{AzureChatModel, AzureEmbeddingModel, AzureMultiModalModel};

/// A handle to one model deployment.
///
/// Handles implement the operations of their modality; the rest answer with
/// `LlmError::Unsupported`.
#[async_trait]
pub trait LlmModel: Send + Sync {
    fn name(&self) -> &str;

    fn model_type(&self) -> ModelType;

    /// Present only when the pool entry enabled token tracking.
    fn token_counter(&self) -> Option<&TokenCounter>;

    async fn chat(&self, _messages: &[ChatMessage]) -> Result<String> {
        Err(unsupported(self.name(), "chat"))
    }

    async fn complete(&self, prompt: &str) -> Result<String> {
        self.chat(&[ChatMessage::user(prompt)]).await
    }

    async fn embed(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Err(unsupported(self.name(), "embeddings"))
    }

    /// `images` are URLs, data URLs or local file paths.
    async fn describe_images(&self, _prompt: &str, _images: &[String]) -> Result<String> {
        Err(unsupported(self.name(), "image input"))
    }
}

fn unsupported(model: &str, operation: &'static str) -> LlmError {
    LlmError::Unsupported {
        model: model.to_string(),
        operation,
    }
}

/// unique_model_id -> handle.
#[derive(Default, Clone)]
pub struct ModelPool {
    models: HashMap<String, Arc<dyn LlmModel>>,
}

impl ModelPool {
    pub fn get(&self, id: &str) -> Option<Arc<dyn LlmModel>> {
        self.models.get(id).cloned()
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    /// Registered ids, sorted.
    pub fn ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.models.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }

    fn insert(&mut self, id: &str, model: Arc<dyn LlmModel>) {
        if self.models.insert(id.to_string(), model).is_some() {
            tracing::debug!(id, "duplicate unique_model_id, later entry replaces earlier one");
        }
    }
}

/// Ids of all entries declaring `model_type`: Azure entries first, then
/// custom ones, each in declaration order.
pub fn get_all_model_ids_of_type(cfg: &ModelPoolConfig, model_type: ModelType) -> Vec<String> {
    let azure = cfg
        .azure_open_ai
        .iter()
        .flat_map(|az| az.azure_oai_models.iter())
        .filter(|m| m.model_type == model_type)
        .map(|m| m.unique_model_id.clone());
    let custom = cfg
        .custom_models
        .iter()
        .filter(|m| m.model_type == model_type)
        .map(|m| m.unique_model_id.clone());
    azure.chain(custom).collect()
}

/// Current token totals of `handle`, or `None` if it does not track tokens.
pub fn get_tokens_used(handle: &dyn LlmModel) -> Option<TokenUsage> {
    handle.token_counter().map(TokenCounter::usage)
}

fn azure_client(
    az: &AzureOpenAiPoolConfig,
    credential: &Arc<dyn TokenProvider>,
) -> Result<AzureClient> {
    let auth = if az.use_azure_ad {
        AzureAuth::Bearer(credential.clone())
    } else {
        AzureAuth::ApiKey(az.api_key.clone().unwrap_or_default())
    };
    AzureClient::new(&az.azure_endpoint, &az.api_version, auth)
}

/// Build every handle named in `cfg`.
///
/// `credential` supplies Azure AD tokens for accounts with `use_azure_ad`.
pub fn build_pool(
    cfg: &ModelPoolConfig,
    registry: &ModelRegistry,
    credential: Arc<dyn TokenProvider>,
) -> Result<ModelPool> {
    let mut pool = ModelPool::default();

    if let Some(az) = &cfg.azure_open_ai {
        let client = azure_client(az, &credential)?;

        for entry in &az.azure_oai_models {
            let counter = if entry.track_tokens {
                Some(TokenCounter::new(tokenizer_for_model(&entry.model_name_in_azure)?))
            } else {
                None
            };

            let require_deployment = || {
                entry.deployment_name_in_azure.as_deref().ok_or_else(|| {
                    LlmError::Config(format!(
                        "model '{}' of type {} needs deployment_name_in_azure",
                        entry.unique_model_id, entry.model_type
                    ))
                })
            };

            let handle: Arc<dyn LlmModel> = match entry.model_type {
                ModelType::Chat | ModelType::Completion => Arc::new(AzureChatModel::new(
                    client.clone(),
                    entry
                        .deployment_name_in_azure
                        .as_deref()
                        .unwrap_or(&entry.model_name_in_azure),
                    entry.model_type,
                    counter,
                )),
                ModelType::Embeddings => Arc::new(AzureEmbeddingModel::new(
                    client.clone(),
                    &entry.model_name_in_azure,
                    require_deployment()?,
                    counter,
                )),
                ModelType::MultiModal => Arc::new(AzureMultiModalModel::new(
                    client.clone(),
                    require_deployment()?,
                    counter,
                )),
            };

            tracing::debug!(
                id = %entry.unique_model_id,
                model_type = %entry.model_type,
                track_tokens = entry.track_tokens,
                "registered Azure model"
            );
            pool.insert(&entry.unique_model_id, handle);
        }
    }

    for entry in &cfg.custom_models {
        let factory = registry
            .get(&entry.class_name)
            .ok_or_else(|| LlmError::UnknownCustomModel(entry.class_name.clone()))?;

        let counter = if entry.track_tokens {
            Some(TokenCounter::new(factory.tokenizer()?))
        } else {
            None
        };

        let handle = factory.create(entry, counter)?;
        tracing::debug!(
            id = %entry.unique_model_id,
            class_name = %entry.class_name,
            "registered custom model"
        );
        pool.insert(&entry.unique_model_id, handle);
    }

    tracing::info!(models = pool.len(), "model pool ready");
    Ok(pool)
}
