//! SQLite snapshots of a [`ContextStore`].
//!
//! A snapshot is a full copy of one store: saving replaces whatever the
//! database held before, restoring rebuilds a store with the same units in the
//! same insertion order.
//!
//! ## Database Schema
//!
//! ```sql
//! -- One row per unit, ordered by insertion position
//! CREATE TABLE context_units (
//!     position INTEGER PRIMARY KEY,   -- insertion order within the store
//!     id TEXT UNIQUE NOT NULL,
//!     text TEXT NOT NULL,
//!     embedding BLOB NOT NULL,        -- f32 components, little-endian
//!     metadata TEXT NOT NULL          -- JSON object of string pairs
//! );
//!
//! -- At most one row describing the saved store
//! CREATE TABLE snapshot_meta (
//!     id INTEGER PRIMARY KEY CHECK (id = 1),
//!     dimension INTEGER,
//!     model_name TEXT NOT NULL,
//!     unit_count INTEGER NOT NULL,
//!     saved_at TEXT NOT NULL
//! );
//! ```

use super::{ContextStore, ContextUnit, Metadata};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};
use std::path::Path;

/// Summary of the snapshot currently held in the database.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SnapshotInfo {
    /// Dimension of the saved store, if it had one
    pub dimension: Option<usize>,
    /// Embedding model that produced the saved vectors
    pub model_name: String,
    pub unit_count: usize,
    pub saved_at: DateTime<Utc>,
}

/// SQLite database holding at most one store snapshot.
#[derive(Clone, Debug)]
pub struct SqliteSnapshot {
    pool: SqlitePool,
}

impl SqliteSnapshot {
    /// Opens (or creates) a snapshot database at `path`.
    pub async fn open(path: &Path) -> Result<Self> {
        let pool = SqlitePool::connect_with(
            SqliteConnectOptions::new()
                .filename(path)
                .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
                .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
                .busy_timeout(std::time::Duration::from_secs(5))
                .create_if_missing(true),
        )
        .await
        .with_context(|| format!("Failed to open snapshot database {}", path.display()))?;
        Self::new_with_pool(pool).await
    }

    /// Opens an in-memory snapshot database for testing.
    pub async fn open_memory() -> Result<Self> {
        // Every connection to :memory: is a separate database, so keep exactly one.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await?;
        Self::new_with_pool(pool).await
    }

    async fn new_with_pool(pool: SqlitePool) -> Result<Self> {
        Self::create_tables(&pool).await?;
        Ok(Self { pool })
    }

    async fn create_tables(pool: &SqlitePool) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS context_units (
                position INTEGER PRIMARY KEY,
                id TEXT UNIQUE NOT NULL,
                text TEXT NOT NULL,
                embedding BLOB NOT NULL,
                metadata TEXT NOT NULL
            )
            "#,
        )
        .execute(pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS snapshot_meta (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                dimension INTEGER,
                model_name TEXT NOT NULL,
                unit_count INTEGER NOT NULL,
                saved_at TEXT NOT NULL
            )
            "#,
        )
        .execute(pool)
        .await?;

        Ok(())
    }

    /// Replaces the stored snapshot with the current contents of `store`.
    pub async fn save(&self, store: &ContextStore, model_name: &str) -> Result<SnapshotInfo> {
        let units = store.get_all();
        let info = SnapshotInfo {
            dimension: store.dimension(),
            model_name: model_name.to_string(),
            unit_count: units.len(),
            saved_at: Utc::now(),
        };

        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM context_units")
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM snapshot_meta")
            .execute(&mut *tx)
            .await?;

        for (position, unit) in units.iter().enumerate() {
            let metadata = serde_json::to_string(&unit.metadata)?;
            sqlx::query(
                "INSERT INTO context_units (position, id, text, embedding, metadata) VALUES (?1, ?2, ?3, ?4, ?5)",
            )
            .bind(position as i64)
            .bind(&unit.id)
            .bind(&unit.text)
            .bind(encode_vector(&unit.vector))
            .bind(metadata)
            .execute(&mut *tx)
            .await?;
        }

        sqlx::query(
            "INSERT INTO snapshot_meta (id, dimension, model_name, unit_count, saved_at) VALUES (1, ?1, ?2, ?3, ?4)",
        )
        .bind(info.dimension.map(|d| d as i64))
        .bind(&info.model_name)
        .bind(info.unit_count as i64)
        .bind(info.saved_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        tracing::info!(
            "Saved snapshot of {} units ({})",
            info.unit_count,
            info.model_name
        );
        Ok(info)
    }

    /// Describes the stored snapshot, or `None` if nothing was saved.
    pub async fn info(&self) -> Result<Option<SnapshotInfo>> {
        let row = sqlx::query(
            "SELECT dimension, model_name, unit_count, saved_at FROM snapshot_meta WHERE id = 1",
        )
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|row| {
            let dimension: Option<i64> = row.get("dimension");
            let unit_count: i64 = row.get("unit_count");
            SnapshotInfo {
                dimension: dimension.map(|d| d as usize),
                model_name: row.get("model_name"),
                unit_count: unit_count as usize,
                saved_at: row.get("saved_at"),
            }
        }))
    }

    /// Rebuilds the saved store, or returns `None` if nothing was saved.
    pub async fn restore(&self) -> Result<Option<(SnapshotInfo, ContextStore)>> {
        let Some(info) = self.info().await? else {
            return Ok(None);
        };

        let store = match info.dimension {
            Some(dimension) => ContextStore::with_dimension(dimension),
            None => ContextStore::new(),
        };

        let rows = sqlx::query(
            "SELECT id, text, embedding, metadata FROM context_units ORDER BY position",
        )
        .fetch_all(&self.pool)
        .await?;

        for row in rows {
            let id: String = row.get("id");
            let embedding_bytes: Vec<u8> = row.get("embedding");
            let metadata_json: String = row.get("metadata");

            let vector = decode_vector(&embedding_bytes)
                .with_context(|| format!("Corrupt embedding for unit {id}"))?;
            let metadata: Metadata = serde_json::from_str(&metadata_json)
                .with_context(|| format!("Corrupt metadata for unit {id}"))?;

            store
                .insert_unit(ContextUnit {
                    id,
                    text: row.get("text"),
                    vector,
                    metadata,
                })
                .context("Snapshot contains an invalid unit")?;
        }

        if store.len() != info.unit_count {
            tracing::warn!(
                "Snapshot meta reports {} units but {} were restored",
                info.unit_count,
                store.len()
            );
        }

        tracing::info!("Restored snapshot of {} units", store.len());
        Ok(Some((info, store)))
    }

    /// Deletes the stored snapshot.
    pub async fn clear(&self) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM context_units")
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM snapshot_meta")
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }
}

fn encode_vector(vector: &[f32]) -> Vec<u8> {
    if cfg!(target_endian = "little") {
        bytemuck::cast_slice::<f32, u8>(vector).to_vec()
    } else {
        vector.iter().flat_map(|x| x.to_le_bytes()).collect()
    }
}

fn decode_vector(bytes: &[u8]) -> Result<Vec<f32>> {
    const WIDTH: usize = std::mem::size_of::<f32>();
    if bytes.is_empty() || bytes.len() % WIDTH != 0 {
        anyhow::bail!("embedding blob of {} bytes is not a f32 vector", bytes.len());
    }

    // Copy into an f32 buffer; the blob itself carries no alignment guarantee.
    let mut vector = vec![0f32; bytes.len() / WIDTH];
    bytemuck::cast_slice_mut::<f32, u8>(&mut vector).copy_from_slice(bytes);
    if cfg!(target_endian = "big") {
        for x in &mut vector {
            *x = f32::from_le_bytes(x.to_ne_bytes());
        }
    }
    Ok(vector)
}
