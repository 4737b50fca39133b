// Registered factories for custom model handles.
//
// A pool entry names its factory through `class_name`; factories are added
// with `ModelRegistry::register` before the pool is built.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use super::tokens::{cl100k_tokenizer, TokenCounter, Tokenizer};
use super::LlmModel;
use crate::config::env::{get_ollama_config_from, OllamaConfig};
use crate::config::{CustomModelConfig, Env, ModelType, ProcessEnv};
use crate::error::{LlmError, Result};
use crate::llm::messages::ChatMessage;
use crate::llm::ollama::call_ollama;

/// Builds handles for one custom model kind.
pub trait CustomModelFactory: Send + Sync {
    /// Tokenizer used when the pool entry asks for token tracking.
    fn tokenizer(&self) -> Result<Tokenizer>;

    fn create(
        &self,
        entry: &CustomModelConfig,
        counter: Option<TokenCounter>,
    ) -> Result<Arc<dyn LlmModel>>;
}

/// Name -> factory mapping consulted by `build_pool`.
#[derive(Default)]
pub struct ModelRegistry {
    factories: HashMap<String, Arc<dyn CustomModelFactory>>,
}

impl ModelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the factories shipped in this crate.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register("ollama", Arc::new(OllamaModelFactory::new(Arc::new(ProcessEnv))));
        registry
    }

    /// Register `factory` under `name`, replacing any previous entry.
    pub fn register(&mut self, name: &str, factory: Arc<dyn CustomModelFactory>) -> &mut Self {
        self.factories.insert(name.to_string(), factory);
        self
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn CustomModelFactory>> {
        self.factories.get(name)
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

/// Chat handles backed by the Ollama server configured in the environment.
///
/// Only `chat` and `completion` entries are accepted.
pub struct OllamaModelFactory {
    env: Arc<dyn Env>,
}

impl OllamaModelFactory {
    pub fn new(env: Arc<dyn Env>) -> Self {
        Self { env }
    }
}

impl CustomModelFactory for OllamaModelFactory {
    fn tokenizer(&self) -> Result<Tokenizer> {
        cl100k_tokenizer()
    }

    fn create(
        &self,
        entry: &CustomModelConfig,
        counter: Option<TokenCounter>,
    ) -> Result<Arc<dyn LlmModel>> {
        if !matches!(entry.model_type, ModelType::Chat | ModelType::Completion) {
            return Err(LlmError::Config(format!(
                "model '{}': the ollama factory cannot serve {} models",
                entry.unique_model_id, entry.model_type
            )));
        }
        let cfg = get_ollama_config_from(self.env.as_ref())?;
        Ok(Arc::new(OllamaModel {
            client: reqwest::Client::builder()
                .timeout(std::time::Duration::from_secs(600))
                .build()?,
            cfg,
            model_type: entry.model_type,
            counter,
        }))
    }
}

struct OllamaModel {
    client: reqwest::Client,
    cfg: OllamaConfig,
    model_type: ModelType,
    counter: Option<TokenCounter>,
}

#[async_trait]
impl LlmModel for OllamaModel {
    fn name(&self) -> &str {
        &self.cfg.model_name
    }

    fn model_type(&self) -> ModelType {
        self.model_type
    }

    fn token_counter(&self) -> Option<&TokenCounter> {
        self.counter.as_ref()
    }

    async fn chat(&self, messages: &[ChatMessage]) -> Result<String> {
        let text = call_ollama(&self.client, &self.cfg, messages).await?;
        if let Some(c) = &self.counter {
            for m in messages {
                c.record_prompt(&m.content);
            }
            c.record_completion(&text);
        }
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MapEnv;

    fn entry(model_type: ModelType) -> CustomModelConfig {
        CustomModelConfig {
            unique_model_id: "local".to_string(),
            model_type,
            class_name: "ollama".to_string(),
            track_tokens: true,
        }
    }

    #[test]
    fn test_builtins() {
        let registry = ModelRegistry::with_builtins();
        assert_eq!(registry.names(), vec!["ollama"]);
        assert!(registry.get("ollama").is_some());
        assert!(registry.get("missing").is_none());
    }

    #[test]
    fn test_register_replaces() {
        let mut registry = ModelRegistry::new();
        let env = Arc::new(MapEnv::new().set("OLLAMA_MODEL", "a"));
        registry
            .register("x", Arc::new(OllamaModelFactory::new(env.clone())))
            .register("y", Arc::new(OllamaModelFactory::new(env)));
        assert_eq!(registry.names(), vec!["x", "y"]);
    }

    #[test]
    fn test_ollama_factory_uses_env() {
        let env = Arc::new(MapEnv::new().set("OLLAMA_MODEL", "phi3"));
        let factory = OllamaModelFactory::new(env);
        let model = factory.create(&entry(ModelType::Chat), None).unwrap();
        assert_eq!(model.name(), "phi3");
        assert_eq!(model.model_type(), ModelType::Chat);
        assert!(model.token_counter().is_none());
    }

    #[test]
    fn test_ollama_factory_accepts_completion() {
        let factory = OllamaModelFactory::new(Arc::new(MapEnv::new()));
        let model = factory.create(&entry(ModelType::Completion), None).unwrap();
        assert_eq!(model.model_type(), ModelType::Completion);
    }

    #[test]
    fn test_ollama_factory_rejects_other_modalities() {
        let factory = OllamaModelFactory::new(Arc::new(MapEnv::new()));
        for model_type in [ModelType::Embeddings, ModelType::MultiModal] {
            let err = factory.create(&entry(model_type), None).err().unwrap();
            match err {
                LlmError::Config(msg) => {
                    assert!(msg.contains("local"), "{msg}");
                    assert!(msg.contains(&model_type.to_string()), "{msg}");
                }
                other => panic!("expected Config error, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_ollama_factory_bad_temperature() {
        let env = Arc::new(MapEnv::new().set("OLLAMA_TEMPERATURE", "x"));
        let err = OllamaModelFactory::new(env)
            .create(&entry(ModelType::Chat), None)
            .err()
            .unwrap();
        assert!(matches!(err, LlmError::ConfigParse { .. }));
    }

    #[tokio::test]
    async fn test_ollama_model_chat_counts_tokens() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("POST", "/api/chat")
            .with_status(200)
            .with_body(r#"{"message":{"role":"assistant","content":"pong"}}"#)
            .create_async()
            .await;

        let env = Arc::new(MapEnv::new().set("OLLAMA_BASE_URL", &server.url()));
        let factory = OllamaModelFactory::new(env);
        let counter = TokenCounter::new(factory.tokenizer().unwrap());
        let model = factory.create(&entry(ModelType::Chat), Some(counter)).unwrap();

        assert_eq!(model.chat(&[ChatMessage::user("ping")]).await.unwrap(), "pong");
        let usage = model.token_counter().unwrap().usage();
        assert!(usage.prompt_tokens > 0);
        assert!(usage.completion_tokens > 0);
    }
}
