//! Error types for the embedding service

use std::time::Duration;

/// Result type for embedding operations.
pub type Result<T> = std::result::Result<T, EmbedError>;

/// Error type for all embedding operations.
///
/// Nothing in this crate retries automatically; callers that want retries on
/// [`EmbedError::Timeout`] or backend failures wrap the call themselves.
///
/// # Error Categories
///
/// - **Input Errors**: empty text handed to the model
/// - **Configuration Errors**: invalid settings or an unknown model name
/// - **Initialization Errors**: failures while loading the model
/// - **Runtime Errors**: backend failures and timeouts during embedding
#[derive(Debug, thiserror::Error)]
pub enum EmbedError {
    /// Input text at `index` is empty or whitespace only
    #[error("Cannot embed empty text (input {index})")]
    EmptyInput { index: usize },

    /// Error when model configuration is invalid
    #[error("Invalid model configuration: {message}")]
    InvalidConfig { message: String },

    /// The configured model name is not a supported pretrained model
    #[error("Unknown embedding model: {name}")]
    UnknownModel { name: String },

    /// Error during model initialization
    #[error("Model initialization failed: {source}")]
    ModelInitialization {
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Error during embedding generation
    #[error("Embedding generation failed: {source}")]
    EmbeddingGeneration {
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// The backend returned a different number of vectors than inputs
    #[error("Backend returned {actual} embeddings for {expected} inputs")]
    UnexpectedOutput { expected: usize, actual: usize },

    /// The backend did not answer in time
    #[error("Embedding backend timed out after {timeout:?}")]
    Timeout { timeout: Duration },

    /// IO errors, e.g. when creating the model cache directory
    #[error("IO error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },

    /// Async task join errors
    #[error("Async task failed: {source}")]
    AsyncTask {
        #[from]
        source: tokio::task::JoinError,
    },

    /// Errors reported by the embedding backend
    #[error("External error: {source}")]
    External {
        #[from]
        source: anyhow::Error,
    },
}

impl EmbedError {
    /// Create an invalid configuration error with a custom message.
    pub fn invalid_config<S: Into<String>>(message: S) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }
}
