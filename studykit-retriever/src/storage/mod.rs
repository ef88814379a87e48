//! Storage layer for context units
//!
//! ## Key Components
//!
//! - **ContextUnit**: one retrievable piece of study material with its embedding
//! - **ContextStore**: in-memory store with cosine-similarity top-k retrieval
//! - **SqliteSnapshot**: optional persistence of a store between sessions
//!
//! ## Architecture
//!
//! ```text
//! ContextStore ── save ──▶ SqliteSnapshot (SQLite file)
//!      ▲                         │
//!      └────────── restore ──────┘
//! ```

use serde::Serialize;
use std::collections::BTreeMap;

pub mod memory_store;
pub mod sqlite_store;

pub use memory_store::ContextStore;
pub use sqlite_store::{SnapshotInfo, SqliteSnapshot};

/// Provenance attached to a unit, e.g. `source` → `"biology.pdf"`.
pub type Metadata = BTreeMap<String, String>;

/// One retrievable piece of knowledge.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContextUnit {
    /// Unique within a store; stable for the unit's lifetime
    pub id: String,
    /// Raw extracted text (never empty)
    pub text: String,
    /// Embedding of `text`; its length is the store dimension
    pub vector: Vec<f32>,
    /// Optional provenance; empty when none was given
    pub metadata: Metadata,
}

/// A unit returned by a similarity query, with its cosine similarity to the query.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredUnit {
    pub unit: ContextUnit,
    pub score: f32,
}

/// Errors raised by [`ContextStore`] operations.
///
/// In every case the store is left exactly as it was before the call.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum StoreError {
    /// A vector's length differs from the store dimension
    #[error("Dimension mismatch: store holds {expected}-dimensional vectors, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// Units need a non-empty id
    #[error("Context unit id must not be empty")]
    EmptyId,

    /// Units need non-empty text
    #[error("Context unit {id} has empty text")]
    EmptyText { id: String },

    /// A vector contains NaN or an infinity
    #[error("Vector for {id} contains non-finite values")]
    NonFiniteVector { id: String },

    /// Vectors need at least one component
    #[error("Vector for {id} is empty")]
    EmptyVector { id: String },
}
