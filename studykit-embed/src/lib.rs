//! # studykit-embed
//!
//! Sentence embeddings for study material, computed locally with a pretrained
//! ONNX model via FastEmbed.
//!
//! ## Quick Start
//!
//! ```no_run
//! use studykit_embed::{EmbedConfig, EmbeddingProvider, FastEmbedProvider};
//!
//! # async fn example() -> studykit_embed::Result<()> {
//! let provider = FastEmbedProvider::create(EmbedConfig::default()).await?;
//!
//! let texts = vec!["Cells divide by mitosis".to_string(), "Rome fell in 476".to_string()];
//! let result = provider.embed_many(&texts).await?;
//! println!("{} embeddings of dimension {}", result.len(), result.dimension);
//!
//! let query = provider.embed("How do cells divide?").await?;
//! assert_eq!(query.len(), provider.embedding_dimension());
//! # Ok(())
//! # }
//! ```
//!
//! ## Modules
//!
//! - [`config`]: model selection, batching, concurrency and timeout settings
//! - [`provider`]: the [`EmbeddingProvider`] trait and [`FastEmbedProvider`]
//! - [`error`]: the [`EmbedError`] type
//!
//! The model is loaded once per configuration and cached for the process, so
//! creating several providers with the same config is cheap. Every call into
//! the model runs on a blocking thread under the configured timeout.

pub mod config;
pub mod error;
pub mod provider;

pub use config::{DEFAULT_MODEL, EmbedConfig, EmbedConfigBuilder, SUPPORTED_MODELS};
pub use error::{EmbedError, Result};
pub use provider::{
    EmbeddingProvider, EmbeddingResult, FastEmbedProvider, ensure_non_empty, normalize,
};
