//! A study session: one context store, one embedding provider, and the
//! ingestion and retrieval operations built on them.
//!
//! Nothing here is global. A session owns its store explicitly; consumers that
//! need to read the same store concurrently take a clone of [`StudySession::store`].
//!
//! ## Unit ids and metadata
//!
//! Each chunk of a document becomes one unit with id `"<source id>:<sequence>"`,
//! where the source id is the file name plus a short hash of the file's
//! canonical path (see [`SourceDocument::source_id`]). `notes.pdf` in two
//! different folders, or `notes.pdf` next to `notes.PDF`, therefore never
//! share an id, while ingesting the same folder twice overwrites the same
//! units instead of duplicating them. Metadata records `source` (the file
//! name), `sequence`, `content_hash` and `pages`.
//!
//! An ingestion run writes all of its units or none: if any unit is rejected
//! by the store, nothing from the run is kept.

use crate::config::SessionConfig;
use crate::retrieval::assembler::ContextAssembler;
use crate::storage::{
    ContextStore, ContextUnit, Metadata, ScoredUnit, SnapshotInfo, SqliteSnapshot,
};
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use studykit_context::{DocumentChunker, IngestFailure, SourceDocument, load_folder};
use studykit_embed::EmbeddingProvider;
use tracing::{debug, info, warn};

/// What an ingestion run did.
#[derive(Debug, Default)]
pub struct IngestReport {
    /// Documents whose text was extracted and embedded
    pub documents: usize,
    /// Units added to the store
    pub units_inserted: usize,
    /// Existing units replaced by a unit with the same id
    pub units_replaced: usize,
    /// Documents that were skipped, with the reason
    pub failures: Vec<IngestFailure>,
}

impl IngestReport {
    pub fn units_written(&self) -> usize {
        self.units_inserted + self.units_replaced
    }
}

/// Owns a [`ContextStore`] and the provider used to fill and query it.
pub struct StudySession {
    config: SessionConfig,
    provider: Arc<dyn EmbeddingProvider>,
    store: Arc<ContextStore>,
    assembler: ContextAssembler,
}

impl std::fmt::Debug for StudySession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StudySession")
            .field("config", &self.config)
            .field("provider", &self.provider.provider_name())
            .field("units", &self.store.len())
            .finish()
    }
}

impl StudySession {
    /// Starts a session with an empty store sized for `provider`.
    pub fn new(config: SessionConfig, provider: Arc<dyn EmbeddingProvider>) -> Result<Self> {
        let store = ContextStore::with_dimension(provider.embedding_dimension());
        Self::with_store(config, provider, store)
    }

    fn with_store(
        config: SessionConfig,
        provider: Arc<dyn EmbeddingProvider>,
        store: ContextStore,
    ) -> Result<Self> {
        config.validate()?;
        let store = Arc::new(store);
        info!(
            "Study session using {} ({} dimensions), {} units",
            provider.provider_name(),
            provider.embedding_dimension(),
            store.len()
        );
        Ok(Self {
            assembler: ContextAssembler::new(Arc::clone(&store)),
            config,
            provider,
            store,
        })
    }

    /// Restores the session saved in `snapshot`, or starts an empty one if
    /// the snapshot is empty.
    ///
    /// Fails when the snapshot was built with a different embedding model or
    /// dimension, since its vectors would not be comparable with new queries.
    pub async fn restore(
        config: SessionConfig,
        provider: Arc<dyn EmbeddingProvider>,
        snapshot: &SqliteSnapshot,
    ) -> Result<Self> {
        let Some((saved, store)) = snapshot.restore().await? else {
            debug!("No snapshot saved, starting empty");
            return Self::new(config, provider);
        };

        if saved.model_name != config.embedding.model_name {
            anyhow::bail!(
                "Snapshot was built with model {} but the session uses {}; run `clear` and ingest again",
                saved.model_name,
                config.embedding.model_name
            );
        }
        if let Some(dimension) = saved.dimension {
            if dimension != provider.embedding_dimension() {
                anyhow::bail!(
                    "Snapshot holds {}-dimensional vectors but the provider produces {}",
                    dimension,
                    provider.embedding_dimension()
                );
            }
        }

        let store = match store.dimension() {
            Some(_) => store,
            None => ContextStore::with_dimension(provider.embedding_dimension()),
        };
        Self::with_store(config, provider, store)
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// The shared store, for consumers that read it directly.
    pub fn store(&self) -> Arc<ContextStore> {
        Arc::clone(&self.store)
    }

    pub fn provider(&self) -> &Arc<dyn EmbeddingProvider> {
        &self.provider
    }

    /// Ingests every PDF directly inside `dir`.
    ///
    /// Documents that cannot be read are skipped and listed in the report;
    /// only an unreadable directory or an embedding failure fails the call.
    pub async fn ingest_folder(&self, dir: &Path) -> Result<IngestReport> {
        let dir_owned: PathBuf = dir.to_path_buf();
        let batch = tokio::task::spawn_blocking(move || load_folder(&dir_owned))
            .await?
            .with_context(|| format!("Failed to read folder {}", dir.display()))?;

        if !batch.failures.is_empty() {
            warn!(
                "{} of {} documents in {} could not be ingested",
                batch.failures.len(),
                batch.attempted(),
                dir.display()
            );
        }

        let mut report = self.ingest_documents(batch.documents).await?;
        report.failures = batch.failures;
        Ok(report)
    }

    /// Chunks, embeds and stores already extracted documents.
    pub async fn ingest_documents(&self, documents: Vec<SourceDocument>) -> Result<IngestReport> {
        let mut report = IngestReport {
            documents: documents.len(),
            ..IngestReport::default()
        };

        let mut pending: Vec<(String, String, Metadata)> = Vec::new();
        for document in &documents {
            let chunker =
                DocumentChunker::new(document.name.clone(), self.config.chunking.clone())?;
            let hash = document.content_hash_hex();

            for chunk in chunker.chunk(&document.text) {
                if chunk.text.trim().is_empty() {
                    continue;
                }
                let mut metadata = Metadata::new();
                metadata.insert("source".to_string(), document.name.clone());
                metadata.insert("sequence".to_string(), chunk.sequence.to_string());
                metadata.insert("content_hash".to_string(), hash.clone());
                metadata.insert("pages".to_string(), document.page_count.to_string());

                let id = format!("{}:{}", document.source_id(), chunk.sequence);
                pending.push((id, chunk.text, metadata));
            }
        }

        if pending.is_empty() {
            debug!("Nothing to embed");
            return Ok(report);
        }

        let texts: Vec<String> = pending.iter().map(|(_, text, _)| text.clone()).collect();
        let result = self
            .provider
            .embed_many(&texts)
            .await
            .context("Failed to embed documents")?;
        if result.len() != pending.len() {
            anyhow::bail!(
                "Provider returned {} embeddings for {} units",
                result.len(),
                pending.len()
            );
        }

        let units: Vec<ContextUnit> = pending
            .into_iter()
            .zip(result.embeddings)
            .map(|((id, text, metadata), vector)| ContextUnit {
                id,
                text,
                vector,
                metadata,
            })
            .collect();
        let (inserted, replaced) = self
            .store
            .insert_batch(units)
            .context("Store rejected the ingested units; nothing was written")?;
        report.units_inserted = inserted;
        report.units_replaced = replaced;

        info!(
            "Ingested {} documents: {} new units, {} replaced",
            report.documents, report.units_inserted, report.units_replaced
        );
        Ok(report)
    }

    /// The units most similar to `query`, best first. `k` defaults to the
    /// configured `default_k`.
    pub async fn search(&self, query: &str, k: Option<usize>) -> Result<Vec<ScoredUnit>> {
        let k = k.unwrap_or(self.config.default_k);
        if k == 0 || self.store.is_empty() {
            return Ok(Vec::new());
        }

        let vector = self.embed_query(query).await?;
        Ok(self.store.query(&vector, k)?)
    }

    /// Prompt-ready context for `query`: the texts of the top `k` units,
    /// separated by blank lines.
    pub async fn context_for_query(&self, query: &str, k: Option<usize>) -> Result<String> {
        let k = k.unwrap_or(self.config.default_k);
        if k == 0 || self.store.is_empty() {
            return Ok(String::new());
        }

        let vector = self.embed_query(query).await?;
        Ok(self.assembler.assemble(&vector, k)?)
    }

    /// All stored texts in insertion order, up to `cap` units (the configured
    /// `full_context_cap` when `cap` is `None`).
    pub fn full_context(&self, cap: Option<usize>) -> String {
        self.assembler.full_context(cap.or(self.config.full_context_cap))
    }

    /// Removes every unit from the store.
    pub fn clear(&self) {
        info!("Clearing {} units", self.store.len());
        self.store.clear();
    }

    /// Saves the current store to `snapshot`, replacing what it held.
    pub async fn save_snapshot(&self, snapshot: &SqliteSnapshot) -> Result<SnapshotInfo> {
        snapshot
            .save(&self.store, &self.config.embedding.model_name)
            .await
    }

    async fn embed_query(&self, query: &str) -> Result<Vec<f32>> {
        self.provider
            .embed(query)
            .await
            .context("Failed to embed query")
    }
}
