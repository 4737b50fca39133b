use thiserror::Error;

/// Errors produced by the provider adapters and the model pool.
#[derive(Debug, Error)]
pub enum LlmError {
    /// The message payload is malformed (missing `messages`, wrong shape).
    #[error("invalid messages payload: {0}")]
    Validation(String),

    /// An environment variable holds a value that cannot be parsed.
    #[error("invalid value {value:?} for {var}: {source}")]
    ConfigParse {
        var: &'static str,
        value: String,
        #[source]
        source: std::num::ParseFloatError,
    },

    /// Pool or provider configuration is incomplete or inconsistent.
    #[error("configuration error: {0}")]
    Config(String),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The provider answered with a non-success status.
    #[error("{provider} API error ({status}): {body}")]
    Api {
        provider: &'static str,
        status: u16,
        body: String,
    },

    #[error("malformed {provider} response: {reason}")]
    MalformedResponse {
        provider: &'static str,
        reason: String,
    },

    /// A provider call failed; the original cause is kept as the source.
    #[error("Error calling {provider} API")]
    LlmCall {
        provider: &'static str,
        #[source]
        source: Box<LlmError>,
    },

    #[error("credential error: {0}")]
    Credential(String),

    #[error("no custom model factory registered under '{0}'")]
    UnknownCustomModel(String),

    #[error("tokenizer error: {0}")]
    Tokenizer(String),

    /// The handle does not implement the requested modality.
    #[error("model '{model}' does not support {operation}")]
    Unsupported {
        model: String,
        operation: &'static str,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T, E = LlmError> = std::result::Result<T, E>;
