// src/lib.rs
// ============================================================================
// Module: In-Memory State Persistence
// Description: A cache-only `StatePersistence` implementation backed by a
//              mutex-guarded in-memory map, plus a clonable shared wrapper.
// Purpose: Give callers a ready-to-use backend for local runs and tests
//          without requiring a real persistence layer.
// Dependencies: taskframe-core, serde_json
// ============================================================================

//! ## Overview
//! [`InMemoryStatePersistence`] holds every object's state in a
//! `Mutex`-guarded map; nothing is ever written past the process. It
//! exists to let `taskframe-core` depend only on the [`StatePersistence`]
//! trait while still having a usable default for local runs, demos, and
//! tests. [`SharedStatePersistence`] wraps it (or any other backend) in an
//! `Arc<dyn StatePersistence>` so it can be cloned and shared across an
//! orchestrator and its callers.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::Mutex;

use serde_json::Value;
use taskframe_core::PersistenceError;
use taskframe_core::StatePersistence;

/// A cache-only, in-memory [`StatePersistence`] implementation.
///
/// `persist_all_state` and `retrieve_all_state_from_persistence` are
/// no-ops: there is no backing store to flush to or reload from.
#[derive(Default)]
pub struct InMemoryStatePersistence {
    state: Mutex<BTreeMap<String, BTreeMap<String, Value>>>,
}

impl InMemoryStatePersistence {
    /// Builds an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl StatePersistence for InMemoryStatePersistence {
    fn retrieve_all_state_from_persistence(&self) -> Result<(), PersistenceError> {
        Ok(())
    }

    fn get_object_state(&self, id: &str, _refresh_if_missing: bool) -> Result<Option<BTreeMap<String, Value>>, PersistenceError> {
        let state = self.state.lock().map_err(|_| PersistenceError::Backend("in-memory state lock poisoned".to_string()))?;
        Ok(state.get(id).cloned())
    }

    fn save_object_state(&self, id: &str, data: BTreeMap<String, Value>) -> Result<(), PersistenceError> {
        let mut state = self.state.lock().map_err(|_| PersistenceError::Backend("in-memory state lock poisoned".to_string()))?;
        state.insert(id.to_string(), data);
        Ok(())
    }

    fn persist_all_state(&self) -> Result<(), PersistenceError> {
        Ok(())
    }
}

/// A clonable `Arc<dyn StatePersistence>` handle over a shared backend.
#[derive(Clone)]
pub struct SharedStatePersistence {
    backend: Arc<dyn StatePersistence + Send + Sync>,
}

impl SharedStatePersistence {
    /// Wraps an existing backend for sharing.
    #[must_use]
    pub fn from_backend(backend: Arc<dyn StatePersistence + Send + Sync>) -> Self {
        Self { backend }
    }

    /// Builds a shared handle over a fresh [`InMemoryStatePersistence`].
    #[must_use]
    pub fn new() -> Self {
        Self::from_backend(Arc::new(InMemoryStatePersistence::new()))
    }
}

impl Default for SharedStatePersistence {
    fn default() -> Self {
        Self::new()
    }
}

impl StatePersistence for SharedStatePersistence {
    fn retrieve_all_state_from_persistence(&self) -> Result<(), PersistenceError> {
        self.backend.retrieve_all_state_from_persistence()
    }

    fn get_object_state(&self, id: &str, refresh_if_missing: bool) -> Result<Option<BTreeMap<String, Value>>, PersistenceError> {
        self.backend.get_object_state(id, refresh_if_missing)
    }

    fn save_object_state(&self, id: &str, data: BTreeMap<String, Value>) -> Result<(), PersistenceError> {
        self.backend.save_object_state(id, data)
    }

    fn persist_all_state(&self) -> Result<(), PersistenceError> {
        self.backend.persist_all_state()
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::expect_used, reason = "Unit tests use expect for setup clarity.")]

    use super::*;
    use serde_json::json;

    #[test]
    fn saved_state_is_retrievable_by_id() {
        let store = InMemoryStatePersistence::new();
        let mut data = BTreeMap::new();
        data.insert("count".to_string(), json!(1));
        store.save_object_state("task-1", data).expect("save succeeds");

        let loaded = store.get_object_state("task-1", false).expect("load succeeds");
        assert_eq!(loaded.and_then(|map| map.get("count").cloned()), Some(json!(1)));
    }

    #[test]
    fn missing_id_returns_none() {
        let store = InMemoryStatePersistence::new();
        assert!(store.get_object_state("absent", false).expect("load succeeds").is_none());
    }

    #[test]
    fn shared_handle_clones_and_sees_same_state() {
        let shared = SharedStatePersistence::new();
        let other = shared.clone();
        let mut data = BTreeMap::new();
        data.insert("k".to_string(), json!("v"));
        shared.save_object_state("id", data).expect("save succeeds");
        assert!(other.get_object_state("id", false).expect("load succeeds").is_some());
    }
}
