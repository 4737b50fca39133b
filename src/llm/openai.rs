// OpenAI Chat Completions caller.
//
// Also works for OpenAI-compatible endpoints via OPENAI_BASE_URL.
// One non-streaming POST to /chat/completions per call.

use async_trait::async_trait;
use serde_json::{json, Value};

use super::messages::{normalize, ChatMessage};
use super::{first_choice_content, send_json, ChatProvider};
use crate::config::env::{get_openai_config_from, OpenAiConfig};
use crate::config::Env;
use crate::error::{LlmError, Result};

const PROVIDER: &str = "OpenAI";

pub struct OpenAiCaller {
    client: reqwest::Client,
}

impl OpenAiCaller {
    pub fn new() -> Result<Self> {
        Ok(Self {
            client: reqwest::Client::builder()
                .timeout(std::time::Duration::from_secs(300))
                .build()?,
        })
    }
}

/// Build the request body for the Chat Completions API.
fn build_request_body(cfg: &OpenAiConfig, messages: &[ChatMessage]) -> Value {
    json!({
        "model": cfg.model_name,
        "messages": messages.iter().map(ChatMessage::to_wire).collect::<Vec<_>>(),
        "temperature": cfg.temperature,
    })
}

/// Issue one chat completion with an already resolved config.
pub async fn call_openai(
    client: &reqwest::Client,
    cfg: &OpenAiConfig,
    messages: &[ChatMessage],
) -> Result<String> {
    let url = format!("{}/chat/completions", cfg.base_url.trim_end_matches('/'));
    let mut req = client.post(&url);
    if !cfg.api_key.is_empty() {
        req = req.bearer_auth(&cfg.api_key);
    }

    let response = send_json(PROVIDER, req, &build_request_body(cfg, messages)).await?;
    first_choice_content(PROVIDER, &response)
}

#[async_trait]
impl ChatProvider for OpenAiCaller {
    fn name(&self) -> &'static str {
        PROVIDER
    }

    async fn chat(&self, env: &dyn Env, messages: &Value) -> Result<String> {
        let cfg = get_openai_config_from(env);
        let chat_messages = normalize(messages)?;

        call_openai(&self.client, &cfg, &chat_messages)
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "OpenAI chat completion failed");
                LlmError::LlmCall {
                    provider: PROVIDER,
                    source: Box::new(e),
                }
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MapEnv;

    fn env_for(server: &mockito::Server) -> MapEnv {
        MapEnv::new()
            .set("OPENAI_API_KEY", "sk-test")
            .set("OPENAI_MODEL_NAME", "gpt-4o-mini")
            .set("OPENAI_BASE_URL", &format!("{}/v1", server.url()))
    }

    #[test]
    fn test_request_body() {
        let cfg = OpenAiConfig {
            api_key: String::new(),
            model_name: "gpt-4o".to_string(),
            base_url: "https://api.openai.com/v1".to_string(),
            temperature: 0.0,
        };
        let body = build_request_body(&cfg, &[ChatMessage::system("s"), ChatMessage::user("u")]);
        assert_eq!(body["model"], "gpt-4o");
        assert_eq!(body["temperature"], 0.0);
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["content"], "u");
        assert!(body.get("stream").is_none());
    }

    #[tokio::test]
    async fn test_chat_returns_first_choice() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/v1/chat/completions")
            .match_header("authorization", "Bearer sk-test")
            .match_body(mockito::Matcher::PartialJson(json!({
                "model": "gpt-4o-mini",
                "temperature": 0.0,
                "messages": [{"role": "user", "content": "hi"}],
            })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"choices":[{"message":{"role":"assistant","content":"hello there"}}]}"#)
            .create_async()
            .await;

        let caller = OpenAiCaller::new().unwrap();
        let out = caller
            .chat(&env_for(&server), &json!({"messages": [{"content": "hi"}]}))
            .await
            .unwrap();
        assert_eq!(out, "hello there");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_server_error_is_wrapped() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("POST", "/v1/chat/completions")
            .with_status(500)
            .with_body("upstream exploded")
            .create_async()
            .await;

        let caller = OpenAiCaller::new().unwrap();
        let err = caller
            .chat(&env_for(&server), &json!({"messages": []}))
            .await
            .unwrap_err();
        match err {
            LlmError::LlmCall { provider, source } => {
                assert_eq!(provider, "OpenAI");
                assert!(matches!(*source, LlmError::Api { status: 500, .. }));
            }
            other => panic!("expected LlmCall, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_invalid_payload_is_not_wrapped() {
        let caller = OpenAiCaller::new().unwrap();
        let err = caller.chat(&MapEnv::new(), &json!({})).await.unwrap_err();
        assert!(matches!(err, LlmError::Validation(_)));
    }
}
