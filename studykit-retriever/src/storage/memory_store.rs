//! In-memory context store with brute-force cosine retrieval.
//!
//! Every query scans all units, scores them by cosine similarity and keeps the
//! `k` best with a partial sort. Ranking is total: higher score first, and on
//! equal scores the unit inserted earlier wins. A unit replaced through an
//! overwrite keeps the position of the unit it replaced.
//!
//! The store dimension is fixed either up front ([`ContextStore::with_dimension`])
//! or by the first accepted insert, and stays fixed across [`ContextStore::clear`].

use super::{ContextUnit, Metadata, ScoredUnit, StoreError};
use parking_lot::RwLock;
use std::cmp::Ordering;
use std::collections::HashMap;

/// Thread-safe in-memory store of [`ContextUnit`]s.
///
/// Share one instance between consumers with `Arc<ContextStore>`; reads run
/// concurrently and each insert is applied atomically.
#[derive(Debug, Default)]
pub struct ContextStore {
    inner: RwLock<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    dimension: Option<usize>,
    units: Vec<ContextUnit>,
    positions: HashMap<String, usize>,
}

impl ContextStore {
    /// Creates an empty store whose dimension is set by the first insert.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty store that only accepts `dimension`-long vectors.
    pub fn with_dimension(dimension: usize) -> Self {
        Self {
            inner: RwLock::new(Inner {
                dimension: Some(dimension),
                ..Inner::default()
            }),
        }
    }

    /// Adds a unit, or replaces the unit with the same id.
    ///
    /// Returns `true` when an existing unit was replaced. On error nothing is
    /// written.
    pub fn insert(
        &self,
        id: impl Into<String>,
        text: impl Into<String>,
        vector: Vec<f32>,
        metadata: Option<Metadata>,
    ) -> Result<bool, StoreError> {
        self.insert_unit(ContextUnit {
            id: id.into(),
            text: text.into(),
            vector,
            metadata: metadata.unwrap_or_default(),
        })
    }

    /// Same as [`insert`](Self::insert) for an already assembled unit.
    pub fn insert_unit(&self, unit: ContextUnit) -> Result<bool, StoreError> {
        validate_unit(&unit)?;

        let mut inner = self.inner.write();
        let dimension = inner.expected_dimension(&unit)?;
        inner.dimension = Some(dimension);
        Ok(inner.apply(unit))
    }

    /// Inserts every unit of `units`, or none of them.
    ///
    /// All units are validated before the first one is written, so a bad unit
    /// anywhere in the batch leaves the store as it was. Returns how many
    /// units were added and how many replaced an existing id.
    pub fn insert_batch(&self, units: Vec<ContextUnit>) -> Result<(usize, usize), StoreError> {
        units.iter().try_for_each(validate_unit)?;

        let mut inner = self.inner.write();
        let Some(first) = units.first() else {
            return Ok((0, 0));
        };
        let dimension = inner.expected_dimension(first)?;
        for unit in &units {
            if unit.vector.len() != dimension {
                tracing::error!(
                    "Rejected batch at unit {}: expected {} dimensions, got {}",
                    unit.id,
                    dimension,
                    unit.vector.len()
                );
                return Err(StoreError::DimensionMismatch {
                    expected: dimension,
                    actual: unit.vector.len(),
                });
            }
        }

        inner.dimension = Some(dimension);
        let (mut inserted, mut replaced) = (0, 0);
        for unit in units {
            if inner.apply(unit) {
                replaced += 1;
            } else {
                inserted += 1;
            }
        }
        Ok((inserted, replaced))
    }

    /// Returns the `k` units most similar to `vector`, best first.
    ///
    /// Yields `min(k, len)` results; `k == 0` and an empty store both yield
    /// nothing. A vector of the wrong length is a [`StoreError::DimensionMismatch`].
    pub fn query(&self, vector: &[f32], k: usize) -> Result<Vec<ScoredUnit>, StoreError> {
        if k == 0 {
            return Ok(Vec::new());
        }

        let inner = self.inner.read();
        if inner.units.is_empty() {
            return Ok(Vec::new());
        }
        if let Some(expected) = inner.dimension {
            if expected != vector.len() {
                return Err(StoreError::DimensionMismatch {
                    expected,
                    actual: vector.len(),
                });
            }
        }

        let mut scored: Vec<(usize, f32)> = inner
            .units
            .iter()
            .enumerate()
            .map(|(position, unit)| (position, cosine_similarity(vector, &unit.vector)))
            .collect();

        if k < scored.len() {
            scored.select_nth_unstable_by(k - 1, by_rank);
            scored.truncate(k);
        }
        scored.sort_unstable_by(by_rank);

        Ok(scored
            .into_iter()
            .map(|(position, score)| ScoredUnit {
                unit: inner.units[position].clone(),
                score,
            })
            .collect())
    }

    /// All units in insertion order.
    pub fn get_all(&self) -> Vec<ContextUnit> {
        self.inner.read().units.clone()
    }

    pub fn get(&self, id: &str) -> Option<ContextUnit> {
        let inner = self.inner.read();
        inner
            .positions
            .get(id)
            .map(|&position| inner.units[position].clone())
    }

    pub fn len(&self) -> usize {
        self.inner.read().units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().units.is_empty()
    }

    /// The store dimension, once known.
    pub fn dimension(&self) -> Option<usize> {
        self.inner.read().dimension
    }

    /// Removes every unit. The dimension is kept.
    pub fn clear(&self) {
        let mut inner = self.inner.write();
        inner.units.clear();
        inner.positions.clear();
    }
}

impl Inner {
    /// The dimension `unit` must have: the store's, or the unit's own for an
    /// unsized store.
    fn expected_dimension(&self, unit: &ContextUnit) -> Result<usize, StoreError> {
        match self.dimension {
            Some(expected) if expected != unit.vector.len() => {
                tracing::error!(
                    "Rejected unit {}: expected {} dimensions, got {}",
                    unit.id,
                    expected,
                    unit.vector.len()
                );
                Err(StoreError::DimensionMismatch {
                    expected,
                    actual: unit.vector.len(),
                })
            }
            Some(expected) => Ok(expected),
            None => {
                tracing::debug!("Store dimension set to {}", unit.vector.len());
                Ok(unit.vector.len())
            }
        }
    }

    /// Writes an already validated unit. Returns true on overwrite.
    fn apply(&mut self, unit: ContextUnit) -> bool {
        if let Some(&position) = self.positions.get(&unit.id) {
            tracing::debug!("Overwriting unit {}", unit.id);
            self.units[position] = unit;
            return true;
        }

        let position = self.units.len();
        self.positions.insert(unit.id.clone(), position);
        self.units.push(unit);
        false
    }
}

fn validate_unit(unit: &ContextUnit) -> Result<(), StoreError> {
    if unit.id.is_empty() {
        return Err(StoreError::EmptyId);
    }
    if unit.text.trim().is_empty() {
        return Err(StoreError::EmptyText {
            id: unit.id.clone(),
        });
    }
    if unit.vector.is_empty() {
        return Err(StoreError::EmptyVector {
            id: unit.id.clone(),
        });
    }
    if unit.vector.iter().any(|x| !x.is_finite()) {
        return Err(StoreError::NonFiniteVector {
            id: unit.id.clone(),
        });
    }
    Ok(())
}

// Higher score first, then earlier position.
fn by_rank(a: &(usize, f32), b: &(usize, f32)) -> Ordering {
    b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0))
}

/// Cosine similarity of two equal-length vectors.
///
/// Sums run in `f64`, so components far from 1.0 in either direction neither
/// overflow nor flush to zero when squared. Zero-norm vectors, and anything
/// that would produce a non-finite result, score 0.0.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }

    let (mut dot_product, mut norm_a, mut norm_b) = (0.0f64, 0.0f64, 0.0f64);
    for (&x, &y) in a.iter().zip(b) {
        let (x, y) = (f64::from(x), f64::from(y));
        dot_product += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    let similarity = (dot_product / (norm_a.sqrt() * norm_b.sqrt())) as f32;
    // Also folds -0.0 into 0.0 so ties rank by position.
    if !similarity.is_finite() || similarity == 0.0 {
        0.0
    } else {
        similarity
    }
}
