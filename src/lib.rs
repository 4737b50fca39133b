//! Environment-driven adapter over OpenAI, Azure OpenAI and Ollama chat
//! endpoints, plus a builder for pools of named model handles.
//!
//! ```no_run
//! # async fn demo() -> glue_llm::Result<()> {
//! let dispatcher = glue_llm::Dispatcher::from_env()?;
//! let answer = dispatcher
//!     .chat_completion(&serde_json::json!({
//!         "messages": [{"role": "user", "content": "Hello"}]
//!     }))
//!     .await;
//! println!("{answer}");
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod llm;
pub mod pool;

pub use config::{Env, MapEnv, ModelPoolConfig, ModelType, ProcessEnv};
pub use error::{LlmError, Result};
pub use llm::{ChatMessage, ChatProvider, Dispatcher, ProviderKind, Role, FALLBACK_RESPONSE};
pub use pool::{
    build_pool, get_all_model_ids_of_type, get_tokens_used, LlmModel, ModelPool, ModelRegistry,
    TokenUsage,
};
