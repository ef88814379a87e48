//! Turns retrieved units into prompt-ready context text.

use crate::storage::{ContextStore, StoreError};
use std::sync::Arc;

/// Separator placed between unit texts.
pub const UNIT_SEPARATOR: &str = "\n\n";

/// Builds context strings from a shared [`ContextStore`].
#[derive(Debug, Clone)]
pub struct ContextAssembler {
    store: Arc<ContextStore>,
}

impl ContextAssembler {
    pub fn new(store: Arc<ContextStore>) -> Self {
        Self { store }
    }

    /// Texts of the `k` units most similar to `query_vector`, best first,
    /// joined by a blank line. An empty store yields an empty string.
    pub fn assemble(&self, query_vector: &[f32], k: usize) -> Result<String, StoreError> {
        let results = self.store.query(query_vector, k)?;
        tracing::debug!("Assembling context from {} units", results.len());

        Ok(results
            .iter()
            .map(|scored| scored.unit.text.as_str())
            .collect::<Vec<_>>()
            .join(UNIT_SEPARATOR))
    }

    /// Texts of the first `cap` units in insertion order (all units when
    /// `cap` is `None`), joined by a blank line.
    pub fn full_context(&self, cap: Option<usize>) -> String {
        let units = self.store.get_all();
        let take = cap.unwrap_or(units.len());

        units
            .iter()
            .take(take)
            .map(|unit| unit.text.as_str())
            .collect::<Vec<_>>()
            .join(UNIT_SEPARATOR)
    }
}
