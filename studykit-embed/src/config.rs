//! Configuration for embedding models

use crate::error::{EmbedError, Result};
use derive_builder::Builder;
use fastembed::EmbeddingModel;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Model used when none is configured (384-dimensional sentence embeddings).
pub const DEFAULT_MODEL: &str = "all-MiniLM-L6-v2";

/// Pretrained sentence-embedding models that can be named in a config,
/// with the output dimension of each.
pub const SUPPORTED_MODELS: &[(&str, usize)] = &[
    ("all-MiniLM-L6-v2", 384),
    ("all-MiniLM-L12-v2", 384),
    ("bge-small-en-v1.5", 384),
    ("bge-base-en-v1.5", 768),
];

/// Configuration for the embedding service.
///
/// Deserializes from a table such as:
///
/// ```toml
/// model_name = "all-MiniLM-L6-v2"
/// batch_size = 32
/// workers = 2
/// timeout_secs = 60
/// ```
///
/// Missing fields take their defaults.
#[derive(Debug, Clone, PartialEq, Builder, Serialize, Deserialize)]
#[builder(setter(into))]
#[serde(default)]
pub struct EmbedConfig {
    /// Name of the pretrained model, one of [`SUPPORTED_MODELS`]
    #[builder(default = "DEFAULT_MODEL.to_string()")]
    pub model_name: String,
    /// Where downloaded model files are kept (backend default when unset)
    #[builder(default)]
    pub cache_dir: Option<PathBuf>,
    /// Maximum number of texts sent to the model in one call
    #[builder(default = "32")]
    pub batch_size: usize,
    /// Number of model instances embedding batches concurrently
    #[builder(default = "1")]
    pub workers: usize,
    /// Upper bound on a single backend call, in seconds
    #[builder(default = "120")]
    pub timeout_secs: u64,
    /// Whether to L2-normalize embeddings
    #[builder(default = "true")]
    pub normalize: bool,
    /// Whether to print download progress when fetching the model
    #[builder(default = "false")]
    pub show_download_progress: bool,
}

impl EmbedConfig {
    /// Create a new embedding configuration using the builder
    pub fn builder() -> EmbedConfigBuilder {
        EmbedConfigBuilder::default()
    }

    /// Create a configuration for a named model with default settings
    pub fn new(model_name: impl Into<String>) -> Self {
        Self {
            model_name: model_name.into(),
            ..Self::default()
        }
    }

    /// Set the batch size for embedding generation (builder style)
    pub fn with_batch_size(self, batch_size: usize) -> Self {
        Self { batch_size, ..self }
    }

    /// Set the number of concurrent workers (builder style)
    pub fn with_workers(self, workers: usize) -> Self {
        Self { workers, ..self }
    }

    /// Set the backend timeout (builder style)
    ///
    /// The timeout is kept in whole seconds; a fractional part rounds up, so
    /// any non-zero duration stays a valid timeout.
    pub fn with_timeout(self, timeout: Duration) -> Self {
        Self {
            timeout_secs: timeout.as_secs() + u64::from(timeout.subsec_nanos() > 0),
            ..self
        }
    }

    /// Set the model cache directory (builder style)
    pub fn with_cache_dir(self, cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            cache_dir: Some(cache_dir.into()),
            ..self
        }
    }

    /// Set whether to normalize embeddings (builder style)
    pub fn with_normalize(self, normalize: bool) -> Self {
        Self { normalize, ..self }
    }

    /// Timeout applied to each backend call
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Output dimension of the configured model, if it is a supported one
    pub fn expected_dimension(&self) -> Option<usize> {
        SUPPORTED_MODELS
            .iter()
            .find(|(name, _)| *name == self.model_name)
            .map(|(_, dim)| *dim)
    }

    /// Maps the configured name onto the backend's model identifier
    pub fn embedding_model(&self) -> Result<EmbeddingModel> {
        match self.model_name.as_str() {
            "all-MiniLM-L6-v2" => Ok(EmbeddingModel::AllMiniLML6V2),
            "all-MiniLM-L12-v2" => Ok(EmbeddingModel::AllMiniLML12V2),
            "bge-small-en-v1.5" => Ok(EmbeddingModel::BGESmallENV15),
            "bge-base-en-v1.5" => Ok(EmbeddingModel::BGEBaseENV15),
            other => Err(EmbedError::UnknownModel {
                name: other.to_string(),
            }),
        }
    }

    /// Check that the configuration can be used to build a provider
    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(EmbedError::invalid_config("batch_size must be at least 1"));
        }
        if self.workers == 0 {
            return Err(EmbedError::invalid_config("workers must be at least 1"));
        }
        if self.timeout_secs == 0 {
            return Err(EmbedError::invalid_config("timeout_secs must be at least 1"));
        }
        self.embedding_model()?;

        tracing::debug!("Embedding config valid for: {}", self.model_name);
        Ok(())
    }
}

impl Default for EmbedConfig {
    fn default() -> Self {
        Self {
            model_name: DEFAULT_MODEL.to_string(),
            cache_dir: None,
            batch_size: 32,
            workers: 1,
            timeout_secs: 120,
            normalize: true,
            show_download_progress: false,
        }
    }
}
