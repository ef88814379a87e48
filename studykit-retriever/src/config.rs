//! Session configuration and TOML loading.
//!
//! ```toml
//! default_k = 5
//! full_context_cap = 20
//!
//! [chunking]
//! mode = "windowed"
//! max_chunk_length = 1200
//!
//! [embedding]
//! model_name = "all-MiniLM-L6-v2"
//! batch_size = 32
//! ```
//!
//! Every key is optional.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use studykit_context::ChunkingMode;
use studykit_embed::EmbedConfig;

/// Number of units retrieved for a query when the caller gives no `k`.
pub const DEFAULT_K: usize = 5;

/// Settings for a [`StudySession`](crate::retrieval::session::StudySession).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Units retrieved per query by default
    pub default_k: usize,
    /// Maximum number of units in a full-context answer (unbounded when unset)
    pub full_context_cap: Option<usize>,
    /// How documents are split into units
    pub chunking: ChunkingMode,
    /// Embedding model settings
    pub embedding: EmbedConfig,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            default_k: DEFAULT_K,
            full_context_cap: None,
            chunking: ChunkingMode::WholeDocument,
            embedding: EmbedConfig::default(),
        }
    }
}

impl SessionConfig {
    pub fn with_default_k(self, default_k: usize) -> Self {
        Self { default_k, ..self }
    }

    pub fn with_full_context_cap(self, cap: Option<usize>) -> Self {
        Self {
            full_context_cap: cap,
            ..self
        }
    }

    pub fn with_chunking(self, chunking: ChunkingMode) -> Self {
        Self { chunking, ..self }
    }

    pub fn with_embedding(self, embedding: EmbedConfig) -> Self {
        Self { embedding, ..self }
    }

    /// Parses and validates a TOML document.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: SessionConfig =
            toml::from_str(content).context("Invalid session configuration")?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a TOML file.
    pub fn from_toml_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::from_toml_str(&content).with_context(|| format!("In {}", path.display()))
    }

    pub fn validate(&self) -> Result<()> {
        if self.default_k == 0 {
            anyhow::bail!("default_k must be at least 1");
        }
        if let ChunkingMode::Windowed { max_chunk_length } = self.chunking {
            if max_chunk_length == 0 {
                anyhow::bail!("max_chunk_length must be at least 1");
            }
        }
        self.embedding.validate()?;
        Ok(())
    }
}
