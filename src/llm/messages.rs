use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::{LlmError, Result};

/// Role in a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }

    /// Case-insensitive; anything unrecognised is a user turn.
    fn parse_lenient(raw: Option<&str>) -> Self {
        match raw.map(str::to_lowercase).as_deref() {
            Some("assistant") => Role::Assistant,
            Some("system") => Role::System,
            _ => Role::User,
        }
    }
}

/// A single provider-agnostic chat turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    /// `{"role": ..., "content": ...}` as accepted by OpenAI and Ollama.
    pub fn to_wire(&self) -> Value {
        json!({
            "role": self.role.as_str(),
            "content": self.content,
        })
    }
}

/// Convert `{"messages": [{"role": ..., "content": ...}, ...]}` into chat messages.
///
/// Order and count are preserved. Missing roles become `User`, missing content
/// becomes the empty string.
pub fn normalize(raw: &Value) -> Result<Vec<ChatMessage>> {
    let entries = raw
        .get("messages")
        .ok_or_else(|| LlmError::Validation("expected 'messages' key in the payload".into()))?
        .as_array()
        .ok_or_else(|| LlmError::Validation("'messages' must be an array".into()))?;

    entries
        .iter()
        .enumerate()
        .map(|(i, entry)| {
            let obj = entry.as_object().ok_or_else(|| {
                LlmError::Validation(format!("message {i} is not an object"))
            })?;
            let role = Role::parse_lenient(obj.get("role").and_then(Value::as_str));
            let content = match obj.get("content") {
                None | Some(Value::Null) => String::new(),
                Some(Value::String(s)) => s.clone(),
                Some(other) => other.to_string(),
            };
            Ok(ChatMessage { role, content })
        })
        .collect()
}

/// Build a `{"messages": [...]}` payload from chat messages.
pub fn to_payload(messages: &[ChatMessage]) -> Value {
    json!({ "messages": messages.iter().map(ChatMessage::to_wire).collect::<Vec<_>>() })
}
