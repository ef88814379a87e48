//! Embedding provider implementations

use crate::config::EmbedConfig;
use crate::error::{EmbedError, Result};
use async_trait::async_trait;
use fastembed::{InitOptions, TextEmbedding};
use fnv::FnvHasher;
use futures::stream::{self, StreamExt, TryStreamExt};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::hash::Hasher;
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tracing::{debug, info};

/// Result of embedding generation
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EmbeddingResult {
    /// The generated embeddings, one per input text, in input order
    pub embeddings: Vec<Vec<f32>>,
    /// The dimension of each embedding vector
    pub dimension: usize,
}

impl EmbeddingResult {
    /// Create a new embedding result.
    ///
    /// The dimension is inferred from the first embedding vector, or 0 when
    /// there are none.
    pub fn new(embeddings: Vec<Vec<f32>>) -> Self {
        let dimension = embeddings.first().map(|e| e.len()).unwrap_or(0);
        Self {
            embeddings,
            dimension,
        }
    }

    /// Returns the number of embedding vectors in this result.
    pub fn len(&self) -> usize {
        self.embeddings.len()
    }

    /// Returns `true` if this result contains no embedding vectors.
    pub fn is_empty(&self) -> bool {
        self.embeddings.is_empty()
    }
}

/// Trait for embedding providers that turn text into fixed-length vectors.
///
/// Implementations must be deterministic for a fixed model, and
/// [`embed_many`](Self::embed_many) must return vectors in input order so that
/// `embed_many(texts).embeddings[i] == embed(&texts[i])`.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Generate the embedding for a single text
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        if text.trim().is_empty() {
            return Err(EmbedError::EmptyInput { index: 0 });
        }
        let result = self.embed_many(&[text.to_string()]).await?;
        let actual = result.len();
        result
            .embeddings
            .into_iter()
            .next()
            .ok_or(EmbedError::UnexpectedOutput {
                expected: 1,
                actual,
            })
    }

    /// Generate embeddings for multiple texts, preserving input order
    async fn embed_many(&self, texts: &[String]) -> Result<EmbeddingResult>;

    /// Get the dimension of embeddings produced by this provider
    fn embedding_dimension(&self) -> usize;

    /// Get the name/identifier of this provider
    fn provider_name(&self) -> &str;
}

/// Rejects inputs that are empty or whitespace only.
pub fn ensure_non_empty(texts: &[String]) -> Result<()> {
    match texts.iter().position(|t| t.trim().is_empty()) {
        Some(index) => Err(EmbedError::EmptyInput { index }),
        None => Ok(()),
    }
}

/// Scales `vector` to unit length. Zero vectors are left unchanged.
pub fn normalize(vector: &mut [f32]) {
    let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for value in vector.iter_mut() {
            *value /= norm;
        }
    }
}

type SharedModel = Arc<Mutex<TextEmbedding>>;

/// Cached model instances (one per worker) and their dimension
type ModelCacheEntry = (Vec<SharedModel>, usize);

/// Global cache for loaded embedding models to avoid reloading
static MODEL_CACHE: OnceLock<Mutex<HashMap<String, ModelCacheEntry>>> = OnceLock::new();

fn get_model_cache() -> &'static Mutex<HashMap<String, ModelCacheEntry>> {
    MODEL_CACHE.get_or_init(|| Mutex::new(HashMap::new()))
}

/// FastEmbed-based provider running a local ONNX sentence-embedding model.
///
/// Input is split into batches of `batch_size` texts. Up to `workers` batches
/// run at once, each on a blocking thread with its own model instance, and
/// every backend call is bounded by the configured timeout. Results are
/// reassembled in input order.
#[derive(Clone)]
pub struct FastEmbedProvider {
    config: EmbedConfig,
    models: Vec<SharedModel>,
    dimension: usize,
}

impl std::fmt::Debug for FastEmbedProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FastEmbedProvider")
            .field("config", &self.config)
            .field("models", &self.models.len())
            .field("dimension", &self.dimension)
            .finish()
    }
}

impl FastEmbedProvider {
    /// Loads the configured model (or reuses a cached copy) and probes its dimension.
    ///
    /// The model is fixed for the provider's lifetime.
    ///
    /// # Errors
    /// - [`EmbedError::InvalidConfig`] / [`EmbedError::UnknownModel`] from validation
    /// - [`EmbedError::ModelInitialization`] if the model cannot be downloaded or loaded
    pub async fn create(config: EmbedConfig) -> Result<Self> {
        config.validate()?;

        let cache_key = create_cache_key(&config)?;
        let cached = get_model_cache().lock().get(&cache_key).cloned();
        if let Some((models, dimension)) = cached {
            info!("Using cached model for: {}", config.model_name);
            return Ok(Self {
                config,
                models,
                dimension,
            });
        }

        info!(
            "Loading embedding model {} ({} workers)",
            config.model_name, config.workers
        );

        if let Some(cache_dir) = &config.cache_dir {
            tokio::fs::create_dir_all(cache_dir).await?;
        }

        let load_config = config.clone();
        let (models, dimension) =
            tokio::task::spawn_blocking(move || load_models(&load_config)).await??;

        get_model_cache()
            .lock()
            .insert(cache_key, (models.clone(), dimension));

        info!("Model loaded successfully. Dimension: {}", dimension);
        Ok(Self {
            config,
            models,
            dimension,
        })
    }

    /// The configuration this provider was built from.
    pub fn config(&self) -> &EmbedConfig {
        &self.config
    }

    /// Clears the global model cache.
    pub fn clear_cache() {
        get_model_cache().lock().clear();
        info!("Model cache cleared");
    }

    /// Returns the number of cached model configurations.
    pub fn cache_size() -> usize {
        get_model_cache().lock().len()
    }
}

/// Splits `texts` into batches of `batch_size` and runs up to
/// `backends.len()` of them at once, batch `i` on `backends[i % len]`.
///
/// Each backend call runs on a blocking thread and is bounded by `timeout`.
/// Results come back in input order whatever order the batches finish in.
pub(crate) async fn embed_in_batches<B, F>(
    backends: &[B],
    texts: &[String],
    batch_size: usize,
    timeout: Duration,
    run: F,
) -> Result<Vec<Vec<f32>>>
where
    B: Clone + Send + Sync + 'static,
    F: Fn(&B, Vec<String>) -> Result<Vec<Vec<f32>>> + Clone + Send + Sync + 'static,
{
    if backends.is_empty() || batch_size == 0 {
        return Err(EmbedError::invalid_config(
            "at least one worker and a positive batch size are required",
        ));
    }

    let workers = backends.len();
    let per_batch: Vec<Vec<Vec<f32>>> = stream::iter(texts.chunks(batch_size).map(<[String]>::to_vec).enumerate())
        .map(|(i, batch)| {
            let backend = backends[i % workers].clone();
            let run = run.clone();
            async move {
                debug!("Processing batch {} of {} texts", i, batch.len());
                let handle = tokio::task::spawn_blocking(move || run(&backend, batch));
                // The blocking task cannot be interrupted; on timeout its result is discarded.
                let embeddings = tokio::time::timeout(timeout, handle)
                    .await
                    .map_err(|_| EmbedError::Timeout { timeout })???;
                Ok::<_, EmbedError>(embeddings)
            }
        })
        .buffered(workers)
        .try_collect()
        .await?;

    let embeddings: Vec<Vec<f32>> = per_batch.into_iter().flatten().collect();
    if embeddings.len() != texts.len() {
        return Err(EmbedError::UnexpectedOutput {
            expected: texts.len(),
            actual: embeddings.len(),
        });
    }
    Ok(embeddings)
}

fn load_models(config: &EmbedConfig) -> Result<ModelCacheEntry> {
    let model_id = config.embedding_model()?;
    let mut models = Vec::with_capacity(config.workers);
    let mut dimension = 0;

    for worker in 0..config.workers {
        let mut options = InitOptions::new(model_id.clone())
            .with_show_download_progress(config.show_download_progress);
        if let Some(cache_dir) = &config.cache_dir {
            options = options.with_cache_dir(cache_dir.clone());
        }

        let mut model = TextEmbedding::try_new(options)
            .map_err(|e| EmbedError::ModelInitialization { source: e.into() })?;

        if worker == 0 {
            let probe = model
                .embed(vec!["dimension probe"], None)
                .map_err(|e| EmbedError::ModelInitialization { source: e.into() })?;
            dimension = probe.first().map(Vec::len).unwrap_or(0);
            if dimension == 0 {
                return Err(EmbedError::invalid_config(
                    "Model validation failed: empty embedding",
                ));
            }
        }

        models.push(Arc::new(Mutex::new(model)));
    }

    Ok((models, dimension))
}

/// Cache key derived from the whole configuration
fn create_cache_key(config: &EmbedConfig) -> Result<String> {
    let config_json =
        serde_json::to_string(config).map_err(|e| EmbedError::invalid_config(e.to_string()))?;

    let mut hasher = FnvHasher::default();
    hasher.write(b"v1:");
    hasher.write(config_json.as_bytes());

    Ok(format!("v1:{:x}", hasher.finish()))
}

#[async_trait]
impl EmbeddingProvider for FastEmbedProvider {
    async fn embed_many(&self, texts: &[String]) -> Result<EmbeddingResult> {
        if texts.is_empty() {
            return Ok(EmbeddingResult::new(vec![]));
        }
        ensure_non_empty(texts)?;

        debug!("Generating embeddings for {} texts", texts.len());

        let batch_size = self.config.batch_size;
        let mut embeddings = embed_in_batches(
            &self.models,
            texts,
            batch_size,
            self.config.timeout(),
            move |model: &SharedModel, batch: Vec<String>| {
                model
                    .lock()
                    .embed(batch, Some(batch_size))
                    .map_err(|e| EmbedError::EmbeddingGeneration { source: e.into() })
            },
        )
        .await?;

        if self.config.normalize {
            embeddings.iter_mut().for_each(|e| normalize(e));
        }

        debug!("Generated {} embeddings", embeddings.len());
        Ok(EmbeddingResult::new(embeddings))
    }

    fn embedding_dimension(&self) -> usize {
        self.dimension
    }

    fn provider_name(&self) -> &str {
        "fastembed"
    }
}
