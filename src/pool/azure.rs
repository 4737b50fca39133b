// Azure OpenAI model handles: chat/completion, embeddings and multimodal.

use async_trait::async_trait;
use serde_json::{json, Value};

use super::images::to_image_url;
use super::tokens::TokenCounter;
use super::LlmModel;
use crate::config::ModelType;
use crate::error::{LlmError, Result};
use crate::llm::azure::AzureClient;
use crate::llm::messages::ChatMessage;
use crate::llm::first_choice_content;

/// Output cap for multimodal deployments.
pub const MULTI_MODAL_MAX_NEW_TOKENS: u32 = 4096;

fn record_prompt(counter: Option<&TokenCounter>, messages: &[ChatMessage]) {
    if let Some(c) = counter {
        for m in messages {
            c.record_prompt(&m.content);
        }
    }
}

fn record_completion(counter: Option<&TokenCounter>, text: &str) {
    if let Some(c) = counter {
        c.record_completion(text);
    }
}

/// Chat or completion deployment.
pub struct AzureChatModel {
    client: AzureClient,
    deployment: String,
    model_type: ModelType,
    counter: Option<TokenCounter>,
}

impl AzureChatModel {
    pub fn new(
        client: AzureClient,
        deployment: &str,
        model_type: ModelType,
        counter: Option<TokenCounter>,
    ) -> Self {
        Self {
            client,
            deployment: deployment.to_string(),
            model_type,
            counter,
        }
    }
}

#[async_trait]
impl LlmModel for AzureChatModel {
    fn name(&self) -> &str {
        &self.deployment
    }

    fn model_type(&self) -> ModelType {
        self.model_type
    }

    fn token_counter(&self) -> Option<&TokenCounter> {
        self.counter.as_ref()
    }

    async fn chat(&self, messages: &[ChatMessage]) -> Result<String> {
        let body = json!({
            "messages": messages.iter().map(ChatMessage::to_wire).collect::<Vec<_>>(),
        });
        let response = self
            .client
            .post(&self.deployment, "/chat/completions", &body)
            .await?;
        let text = first_choice_content("Azure", &response)?;

        record_prompt(self.token_counter(), messages);
        record_completion(self.token_counter(), &text);
        Ok(text)
    }
}

/// Embedding deployment.
pub struct AzureEmbeddingModel {
    client: AzureClient,
    model: String,
    deployment: String,
    counter: Option<TokenCounter>,
}

impl AzureEmbeddingModel {
    pub fn new(
        client: AzureClient,
        model: &str,
        deployment: &str,
        counter: Option<TokenCounter>,
    ) -> Self {
        Self {
            client,
            model: model.to_string(),
            deployment: deployment.to_string(),
            counter,
        }
    }
}

/// Pull `data[*].embedding` out of an embeddings response, ordered by `index`.
fn parse_embeddings(response: &Value) -> Result<Vec<Vec<f32>>> {
    let malformed = |reason: &str| LlmError::MalformedResponse {
        provider: "Azure",
        reason: reason.to_string(),
    };

    let data = response
        .get("data")
        .and_then(Value::as_array)
        .ok_or_else(|| malformed("embeddings response has no data array"))?;

    let mut rows = data
        .iter()
        .enumerate()
        .map(|(pos, item)| {
            let index = item
                .get("index")
                .and_then(Value::as_u64)
                .unwrap_or(pos as u64);
            let vector = item
                .get("embedding")
                .and_then(Value::as_array)
                .ok_or_else(|| malformed("embedding entry without a vector"))?
                .iter()
                .map(|v| v.as_f64().map(|f| f as f32))
                .collect::<Option<Vec<f32>>>()
                .ok_or_else(|| malformed("embedding vector holds non-numeric values"))?;
            Ok((index, vector))
        })
        .collect::<Result<Vec<_>>>()?;

    rows.sort_by_key(|(index, _)| *index);
    Ok(rows.into_iter().map(|(_, v)| v).collect())
}

#[async_trait]
impl LlmModel for AzureEmbeddingModel {
    fn name(&self) -> &str {
        &self.deployment
    }

    fn model_type(&self) -> ModelType {
        ModelType::Embeddings
    }

    fn token_counter(&self) -> Option<&TokenCounter> {
        self.counter.as_ref()
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let body = json!({ "model": self.model, "input": texts });
        let response = self
            .client
            .post(&self.deployment, "/embeddings", &body)
            .await?;
        let vectors = parse_embeddings(&response)?;

        if let Some(c) = self.token_counter() {
            for t in texts {
                c.record_embedding(t);
            }
        }
        Ok(vectors)
    }
}

/// Vision-capable chat deployment.
pub struct AzureMultiModalModel {
    client: AzureClient,
    deployment: String,
    max_new_tokens: u32,
    counter: Option<TokenCounter>,
}

impl AzureMultiModalModel {
    pub fn new(client: AzureClient, deployment: &str, counter: Option<TokenCounter>) -> Self {
        Self {
            client,
            deployment: deployment.to_string(),
            max_new_tokens: MULTI_MODAL_MAX_NEW_TOKENS,
            counter,
        }
    }

    async fn send(&self, messages: Vec<Value>) -> Result<String> {
        let body = json!({
            "messages": messages,
            "max_tokens": self.max_new_tokens,
        });
        let response = self
            .client
            .post(&self.deployment, "/chat/completions", &body)
            .await?;
        first_choice_content("Azure", &response)
    }
}

#[async_trait]
impl LlmModel for AzureMultiModalModel {
    fn name(&self) -> &str {
        &self.deployment
    }

    fn model_type(&self) -> ModelType {
        ModelType::MultiModal
    }

    fn token_counter(&self) -> Option<&TokenCounter> {
        self.counter.as_ref()
    }

    async fn chat(&self, messages: &[ChatMessage]) -> Result<String> {
        let text = self
            .send(messages.iter().map(ChatMessage::to_wire).collect())
            .await?;
        record_prompt(self.token_counter(), messages);
        record_completion(self.token_counter(), &text);
        Ok(text)
    }

    async fn describe_images(&self, prompt: &str, images: &[String]) -> Result<String> {
        let mut parts = vec![json!({ "type": "text", "text": prompt })];
        for image in images {
            parts.push(json!({
                "type": "image_url",
                "image_url": { "url": to_image_url(image).await? },
            }));
        }

        let text = self
            .send(vec![json!({ "role": "user", "content": parts })])
            .await?;
        if let Some(c) = self.token_counter() {
            c.record_prompt(prompt);
            c.record_completion(&text);
        }
        Ok(text)
    }
}
