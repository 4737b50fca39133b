// Ollama native chat caller.
//
// Uses POST /api/chat with `stream: false`, so the whole answer arrives as a
// single JSON object instead of NDJSON chunks.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use super::messages::{normalize, ChatMessage};
use super::{send_json, ChatProvider};
use crate::config::env::{get_ollama_config_from, OllamaConfig};
use crate::config::Env;
use crate::error::{LlmError, Result};

const PROVIDER: &str = "Ollama";

pub struct OllamaCaller {
    client: reqwest::Client,
}

impl OllamaCaller {
    pub fn new() -> Result<Self> {
        Ok(Self {
            client: reqwest::Client::builder()
                .timeout(std::time::Duration::from_secs(600)) // Ollama can be slow.
                .build()?,
        })
    }
}

/// Resolve the /api/chat URL from the configured base URL.
/// Users configure baseUrl with /v1 suffix for OpenAI compat; strip it for native API.
fn resolve_chat_url(base_url: &str) -> String {
    let base = base_url.trim_end_matches('/');
    let base = base.strip_suffix("/v1").unwrap_or(base);
    format!("{}/api/chat", base)
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct OllamaChatResponse {
    message: Option<OllamaMessage>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct OllamaMessage {
    content: Option<String>,
}

/// Build the request body for the Ollama /api/chat endpoint.
fn build_request_body(cfg: &OllamaConfig, messages: &[ChatMessage]) -> Value {
    json!({
        "model": cfg.model_name,
        "messages": messages.iter().map(ChatMessage::to_wire).collect::<Vec<_>>(),
        "stream": false,
        "options": { "temperature": cfg.temperature },
    })
}

/// Issue one chat call; an answer without a message yields `""`.
pub async fn call_ollama(
    client: &reqwest::Client,
    cfg: &OllamaConfig,
    messages: &[ChatMessage],
) -> Result<String> {
    let url = resolve_chat_url(&cfg.base_url);
    let response = send_json(PROVIDER, client.post(&url), &build_request_body(cfg, messages)).await?;
    let parsed: OllamaChatResponse =
        serde_json::from_value(response).map_err(|e| LlmError::MalformedResponse {
            provider: PROVIDER,
            reason: e.to_string(),
        })?;

    Ok(parsed
        .message
        .and_then(|m| m.content)
        .unwrap_or_default())
}

#[async_trait]
impl ChatProvider for OllamaCaller {
    fn name(&self) -> &'static str {
        PROVIDER
    }

    async fn chat(&self, env: &dyn Env, messages: &Value) -> Result<String> {
        let cfg = get_ollama_config_from(env)?;
        let chat_messages = normalize(messages)?;
        call_ollama(&self.client, &cfg, &chat_messages).await
    }
}
