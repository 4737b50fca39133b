// Environment-driven provider selection with a single recovery boundary.

use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use super::azure::AzureCaller;
use super::ollama::OllamaCaller;
use super::openai::OpenAiCaller;
use super::ChatProvider;
use crate::config::env::{get_model_type_from, use_openai_api_key_from};
use crate::config::{Env, ProcessEnv};
use crate::error::Result;

/// Returned by `chat_completion` whenever the provider call fails.
pub const FALLBACK_RESPONSE: &str =
    "Sorry, I am not able to understand your query. Please try again.";

/// Provider picked for a call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    Ollama,
    OpenAi,
    Azure,
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ProviderKind::Ollama => "Ollama",
            ProviderKind::OpenAi => "OpenAI",
            ProviderKind::Azure => "Azure",
        })
    }
}

/// `MODEL_TYPE == "Ollama"` wins over the OpenAI key flag, which wins over
/// the Azure default.
pub fn select_provider(model_type: &str, use_openai_api_key: bool) -> ProviderKind {
    if model_type == "Ollama" {
        ProviderKind::Ollama
    } else if use_openai_api_key {
        ProviderKind::OpenAi
    } else {
        ProviderKind::Azure
    }
}

/// Routes chat payloads to the provider chosen by the environment.
pub struct Dispatcher {
    env: Arc<dyn Env>,
    openai: Arc<dyn ChatProvider>,
    azure: Arc<dyn ChatProvider>,
    ollama: Arc<dyn ChatProvider>,
}

impl Dispatcher {
    /// Dispatcher over the process environment with the built-in callers.
    pub fn from_env() -> Result<Self> {
        Self::new(Arc::new(ProcessEnv))
    }

    pub fn new(env: Arc<dyn Env>) -> Result<Self> {
        Ok(Self::with_providers(
            env,
            Arc::new(OpenAiCaller::new()?),
            Arc::new(AzureCaller::new()),
            Arc::new(OllamaCaller::new()?),
        ))
    }

    pub fn with_providers(
        env: Arc<dyn Env>,
        openai: Arc<dyn ChatProvider>,
        azure: Arc<dyn ChatProvider>,
        ollama: Arc<dyn ChatProvider>,
    ) -> Self {
        Self {
            env,
            openai,
            azure,
            ollama,
        }
    }

    /// Provider the next call would go to.
    pub fn selected(&self) -> ProviderKind {
        let model_type = get_model_type_from(self.env.as_ref());
        select_provider(&model_type, use_openai_api_key_from(self.env.as_ref()))
    }

    fn provider(&self, kind: ProviderKind) -> &dyn ChatProvider {
        match kind {
            ProviderKind::Ollama => self.ollama.as_ref(),
            ProviderKind::OpenAi => self.openai.as_ref(),
            ProviderKind::Azure => self.azure.as_ref(),
        }
    }

    /// Call the selected provider and let any failure propagate.
    pub async fn env_based_chat_completion(&self, messages: &Value) -> Result<String> {
        let kind = self.selected();
        let provider = self.provider(kind);
        tracing::debug!(provider = provider.name(), "dispatching chat completion");
        provider.chat(self.env.as_ref(), messages).await
    }

    /// Never fails: errors are logged and replaced by `FALLBACK_RESPONSE`.
    pub async fn chat_completion(&self, messages: &Value) -> String {
        let model_type = get_model_type_from(self.env.as_ref());
        match self.env_based_chat_completion(messages).await {
            Ok(text) => text,
            Err(e) => {
                tracing::error!(
                    provider = %self.selected(),
                    model_type = %model_type,
                    messages = %messages,
                    error = %e,
                    "chat completion failed"
                );
                FALLBACK_RESPONSE.to_string()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MapEnv;
    use crate::error::LlmError;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tracing_test::traced_test;

    /// Records invocations and answers with a fixed outcome.
    struct FakeProvider {
        name: &'static str,
        fail: bool,
        calls: AtomicUsize,
    }

    impl FakeProvider {
        fn ok(name: &'static str) -> Arc<Self> {
            Arc::new(Self {
                name,
                fail: false,
                calls: AtomicUsize::new(0),
            })
        }

        fn failing(name: &'static str) -> Arc<Self> {
            Arc::new(Self {
                name,
                fail: true,
                calls: AtomicUsize::new(0),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ChatProvider for FakeProvider {
        fn name(&self) -> &'static str {
            self.name
        }

        async fn chat(&self, _env: &dyn Env, _messages: &Value) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(LlmError::Api {
                    provider: self.name,
                    status: 503,
                    body: "unavailable".to_string(),
                })
            } else {
                Ok(format!("answer from {}", self.name))
            }
        }
    }

    struct Fakes {
        openai: Arc<FakeProvider>,
        azure: Arc<FakeProvider>,
        ollama: Arc<FakeProvider>,
    }

    fn dispatcher(env: MapEnv, fakes: &Fakes) -> Dispatcher {
        Dispatcher::with_providers(
            Arc::new(env),
            fakes.openai.clone(),
            fakes.azure.clone(),
            fakes.ollama.clone(),
        )
    }

    fn all_ok() -> Fakes {
        Fakes {
            openai: FakeProvider::ok("OpenAI"),
            azure: FakeProvider::ok("Azure"),
            ollama: FakeProvider::ok("Ollama"),
        }
    }

    #[test]
    fn test_select_provider_precedence() {
        assert_eq!(select_provider("Ollama", true), ProviderKind::Ollama);
        assert_eq!(select_provider("Ollama", false), ProviderKind::Ollama);
        assert_eq!(select_provider("AzureOpenAI", true), ProviderKind::OpenAi);
        assert_eq!(select_provider("AzureOpenAI", false), ProviderKind::Azure);
        assert_eq!(select_provider("ollama", false), ProviderKind::Azure);
        assert_eq!(select_provider("SomethingElse", false), ProviderKind::Azure);
    }

    #[tokio::test]
    async fn test_ollama_wins_over_openai_flag() {
        let fakes = all_ok();
        let env = MapEnv::new()
            .set("MODEL_TYPE", "Ollama")
            .set("USE_OPENAI_API_KEY", "True");
        let d = dispatcher(env, &fakes);

        let out = d.chat_completion(&json!({"messages": []})).await;
        assert_eq!(out, "answer from Ollama");
        assert_eq!(fakes.ollama.calls(), 1);
        assert_eq!(fakes.openai.calls(), 0);
        assert_eq!(fakes.azure.calls(), 0);
    }

    #[tokio::test]
    async fn test_openai_flag_selects_openai() {
        let fakes = all_ok();
        let d = dispatcher(MapEnv::new().set("USE_OPENAI_API_KEY", "True"), &fakes);
        assert_eq!(d.selected(), ProviderKind::OpenAi);
        assert_eq!(
            d.chat_completion(&json!({"messages": []})).await,
            "answer from OpenAI"
        );
    }

    #[tokio::test]
    async fn test_default_is_azure() {
        let fakes = all_ok();
        let d = dispatcher(MapEnv::new(), &fakes);
        assert_eq!(d.selected(), ProviderKind::Azure);
        d.chat_completion(&json!({"messages": []})).await;
        assert_eq!(fakes.azure.calls(), 1);
    }

    #[tokio::test]
    async fn test_failure_returns_fallback() {
        let fakes = Fakes {
            openai: FakeProvider::failing("OpenAI"),
            azure: FakeProvider::failing("Azure"),
            ollama: FakeProvider::failing("Ollama"),
        };
        for env in [
            MapEnv::new(),
            MapEnv::new().set("USE_OPENAI_API_KEY", "True"),
            MapEnv::new().set("MODEL_TYPE", "Ollama"),
        ] {
            let d = dispatcher(env, &fakes);
            assert_eq!(
                d.chat_completion(&json!({"messages": [{"content": "hi"}]})).await,
                FALLBACK_RESPONSE
            );
        }
    }

    #[tokio::test]
    async fn test_env_based_chat_completion_propagates() {
        let fakes = Fakes {
            openai: FakeProvider::ok("OpenAI"),
            azure: FakeProvider::failing("Azure"),
            ollama: FakeProvider::ok("Ollama"),
        };
        let d = dispatcher(MapEnv::new(), &fakes);
        let err = d
            .env_based_chat_completion(&json!({"messages": []}))
            .await
            .unwrap_err();
        assert!(matches!(err, LlmError::Api { status: 503, .. }));
    }

    #[tokio::test]
    async fn test_real_callers_fall_back_on_bad_config() {
        // Non-numeric temperature fails inside the Ollama caller, before any
        // network traffic; the dispatcher still answers.
        let env = MapEnv::new()
            .set("MODEL_TYPE", "Ollama")
            .set("OLLAMA_TEMPERATURE", "not-a-number");
        let d = Dispatcher::new(Arc::new(env)).unwrap();
        assert_eq!(
            d.chat_completion(&json!({"messages": []})).await,
            FALLBACK_RESPONSE
        );
    }

    #[tokio::test]
    async fn test_invalid_payload_falls_back() {
        let env = MapEnv::new().set("USE_OPENAI_API_KEY", "True");
        let d = Dispatcher::new(Arc::new(env)).unwrap();
        assert_eq!(d.chat_completion(&json!({"prompt": "hi"})).await, FALLBACK_RESPONSE);
    }

    #[tokio::test]
    #[traced_test]
    async fn test_failure_logs_provider_and_payload() {
        let fakes = Fakes {
            openai: FakeProvider::failing("OpenAI"),
            azure: FakeProvider::ok("Azure"),
            ollama: FakeProvider::ok("Ollama"),
        };
        let d = dispatcher(MapEnv::new().set("USE_OPENAI_API_KEY", "True"), &fakes);
        d.chat_completion(&json!({"messages": [{"content": "where am I"}]}))
            .await;

        assert!(logs_contain("chat completion failed"));
        assert!(logs_contain("provider=OpenAI"));
        assert!(logs_contain("model_type=AzureOpenAI"));
        assert!(logs_contain(r#"{"messages":[{"content":"where am I"}]}"#));
    }

    #[tokio::test]
    #[traced_test]
    async fn test_success_logs_no_error() {
        let d = dispatcher(MapEnv::new(), &all_ok());
        d.chat_completion(&json!({"messages": []})).await;
        assert!(logs_contain("dispatching chat completion"));
        assert!(!logs_contain("chat completion failed"));
    }
}
