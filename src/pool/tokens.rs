// Token accounting for pooled model handles.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::Serialize;

use crate::error::{LlmError, Result};

/// Counts the tokens in a piece of text.
pub type Tokenizer = Arc<dyn Fn(&str) -> usize + Send + Sync>;

/// Tokenizer matching the encoding tiktoken uses for `model`.
pub fn tokenizer_for_model(model: &str) -> Result<Tokenizer> {
    let bpe = tiktoken_rs::get_bpe_from_model(model)
        .map_err(|e| LlmError::Tokenizer(format!("no encoding for model '{model}': {e}")))?;
    Ok(Arc::new(move |text: &str| bpe.encode_ordinary(text).len()))
}

/// The `cl100k_base` encoding, a reasonable default for chat models.
pub fn cl100k_tokenizer() -> Result<Tokenizer> {
    let bpe = tiktoken_rs::cl100k_base()
        .map_err(|e| LlmError::Tokenizer(format!("cl100k_base unavailable: {e}")))?;
    Ok(Arc::new(move |text: &str| bpe.encode_ordinary(text).len()))
}

/// Snapshot of the counters of one handle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TokenUsage {
    pub embedding_tokens: u64,
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
}

/// Running token totals for a model handle.
pub struct TokenCounter {
    tokenizer: Tokenizer,
    embedding: AtomicU64,
    prompt: AtomicU64,
    completion: AtomicU64,
}

impl std::fmt::Debug for TokenCounter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenCounter")
            .field("usage", &self.usage())
            .finish()
    }
}

impl TokenCounter {
    pub fn new(tokenizer: Tokenizer) -> Self {
        Self {
            tokenizer,
            embedding: AtomicU64::new(0),
            prompt: AtomicU64::new(0),
            completion: AtomicU64::new(0),
        }
    }

    fn count(&self, text: &str) -> u64 {
        (self.tokenizer)(text) as u64
    }

    pub fn record_prompt(&self, text: &str) {
        self.prompt.fetch_add(self.count(text), Ordering::Relaxed);
    }

    pub fn record_completion(&self, text: &str) {
        self.completion.fetch_add(self.count(text), Ordering::Relaxed);
    }

    pub fn record_embedding(&self, text: &str) {
        self.embedding.fetch_add(self.count(text), Ordering::Relaxed);
    }

    /// Current totals. Reading does not reset anything.
    pub fn usage(&self) -> TokenUsage {
        let prompt = self.prompt.load(Ordering::Relaxed);
        let completion = self.completion.load(Ordering::Relaxed);
        TokenUsage {
            embedding_tokens: self.embedding.load(Ordering::Relaxed),
            prompt_tokens: prompt,
            completion_tokens: completion,
            total_tokens: prompt + completion,
        }
    }
}
