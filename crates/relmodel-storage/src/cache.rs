//! Write-once memoization of bounded-length mappings.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use crate::mapping::TypeMapping;

/// Thread-safe cache of mappings keyed by bounded length.
///
/// A slot never changes once populated. Readers take the shared lock only.
/// Concurrent first requests for the same key may each build a candidate
/// outside the lock; the first insert wins and every caller gets the winner.
/// Factories must therefore be pure functions of the key.
#[derive(Debug, Default)]
pub struct TypeMappingCache {
    entries: RwLock<HashMap<usize, Arc<TypeMapping>>>,
}

impl TypeMappingCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached mapping for `key`, if present.
    pub fn get(&self, key: usize) -> Option<Arc<TypeMapping>> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        entries.get(&key).cloned()
    }

    /// Cached mapping for `key`, building it with `factory` on first request.
    pub fn get_or_add<F>(&self, key: usize, factory: F) -> Arc<TypeMapping>
    where
        F: FnOnce(usize) -> TypeMapping,
    {
        // Fast path: already cached
        if let Some(mapping) = self.get(key) {
            return mapping;
        }

        // Slow path: build without holding the lock, then keep whichever
        // candidate reached the slot first.
        let candidate = Arc::new(factory(key));
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        let winner = entries.entry(key).or_insert(candidate);
        tracing::trace!(
            target: "relmodel::storage",
            key,
            mapping = winner.default_type_name(),
            "bounded-length mapping cached"
        );
        Arc::clone(winner)
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
