// Provider callers and the environment-driven dispatcher.
//
// Each caller implements ChatProvider: it resolves its own settings from the
// Env it is handed, performs exactly one chat-completion request and returns
// the completion text.

pub mod azure;
pub mod credential;
pub mod dispatch;
pub mod messages;
pub mod ollama;
pub mod openai;

use async_trait::async_trait;
use serde_json::Value;

use crate::config::Env;
use crate::error::{LlmError, Result};

pub use dispatch::{select_provider, Dispatcher, ProviderKind, FALLBACK_RESPONSE};
pub use messages::{normalize, ChatMessage, Role};

/// Performs a single chat completion against one provider.
#[async_trait]
pub trait ChatProvider: Send + Sync {
    /// Provider name used in logs and errors.
    fn name(&self) -> &'static str;

    /// `messages` is the raw `{"messages": [...]}` payload.
    async fn chat(&self, env: &dyn Env, messages: &Value) -> Result<String>;
}

/// Send a JSON request and decode the JSON response, mapping non-2xx
/// statuses to `LlmError::Api`.
pub(crate) async fn send_json(
    provider: &'static str,
    request: reqwest::RequestBuilder,
    body: &Value,
) -> Result<Value> {
    let response = request
        .header("content-type", "application/json")
        .json(body)
        .send()
        .await?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(LlmError::Api {
            provider,
            status: status.as_u16(),
            body,
        });
    }

    let text = response.text().await?;
    serde_json::from_str(&text).map_err(|e| LlmError::MalformedResponse {
        provider,
        reason: format!("invalid JSON body: {e}"),
    })
}

/// Extract `choices[0].message.content` from a Chat Completions response.
/// A `null` content is returned as the empty string.
pub(crate) fn first_choice_content(provider: &'static str, response: &Value) -> Result<String> {
    let message = response
        .get("choices")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("message"))
        .ok_or_else(|| LlmError::MalformedResponse {
            provider,
            reason: "response has no choices[0].message".to_string(),
        })?;

    Ok(message
        .get("content")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string())
}
