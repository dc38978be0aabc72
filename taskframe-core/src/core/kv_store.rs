// src/core/kv_store.rs
// ============================================================================
// Module: Key/Value Store
// Description: Mutable string-keyed map threaded through every hook and
//              processor boundary, deep-copied on each crossing.
// ============================================================================

use std::collections::BTreeMap;

use serde_json::Value;

/// Mutable, run-scoped mapping from string keys to opaque JSON values.
///
/// # Invariants
/// - Cloning this type performs a deep copy: no two independently-held
///   clones observe each other's subsequent mutations. This is what lets
///   hooks and processors receive a private snapshot at every boundary
///   crossing (see the orchestrator's lifecycle dispatch).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyValueStore {
    store: BTreeMap<String, Value>,
}

impl KeyValueStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the value stored under `key`, if any.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.store.get(key)
    }

    /// Returns `true` if `key` is present in the store.
    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.store.contains_key(key)
    }

    /// Inserts or overwrites `key` with `value`.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.store.insert(key.into(), value.into());
    }

    /// Removes `key`, returning its previous value if present.
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.store.remove(key)
    }

    /// Returns the number of entries in the store.
    #[must_use]
    pub fn len(&self) -> usize {
        self.store.len()
    }

    /// Returns `true` if the store holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    /// Iterates over all entries in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.store.iter()
    }

    /// Replaces the entire backing map with `store`.
    ///
    /// Used by the hooks registry to merge a hook's returned store back
    /// into the orchestrator's working copy.
    pub fn replace_store(&mut self, store: BTreeMap<String, Value>) {
        self.store = store;
    }

    /// Borrows the backing map directly.
    #[must_use]
    pub fn as_map(&self) -> &BTreeMap<String, Value> {
        &self.store
    }
}

impl From<BTreeMap<String, Value>> for KeyValueStore {
    fn from(store: BTreeMap<String, Value>) -> Self {
        Self { store }
    }
}
