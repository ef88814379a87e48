//! # studykit-retriever
//!
//! Stores embedded study material and retrieves the parts relevant to a
//! question.
//!
//! - [`storage`]: the in-memory [`ContextStore`] and its SQLite snapshots
//! - [`retrieval`]: the [`ContextAssembler`] and the [`StudySession`] that
//!   ties ingestion, embedding and retrieval together
//! - [`config`]: [`SessionConfig`] and TOML loading
//!
//! ```no_run
//! use std::path::Path;
//! use std::sync::Arc;
//! use studykit_embed::FastEmbedProvider;
//! use studykit_retriever::{SessionConfig, StudySession};
//!
//! # async fn run() -> anyhow::Result<()> {
//! let config = SessionConfig::default();
//! let provider = FastEmbedProvider::create(config.embedding.clone()).await?;
//! let session = StudySession::new(config, Arc::new(provider))?;
//!
//! session.ingest_folder(Path::new("Data/Upload")).await?;
//! let context = session.context_for_query("What does mitochondria do?", None).await?;
//! println!("{context}");
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod retrieval;
pub mod storage;

pub use config::{DEFAULT_K, SessionConfig};
pub use retrieval::{ContextAssembler, IngestReport, StudySession};
pub use storage::{
    ContextStore, ContextUnit, Metadata, ScoredUnit, SnapshotInfo, SqliteSnapshot, StoreError,
};
