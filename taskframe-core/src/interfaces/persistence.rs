// src/interfaces/persistence.rs
// ============================================================================
// Module: State Persistence Capability
// Description: Per-object state cache with an external backing contract.
// Purpose: Let the core depend on a persistence shape without choosing a
//          concrete backend.
// Dependencies: serde_json
// ============================================================================

//! ## Overview
//! [`StatePersistence`] models a cache of id-keyed mappings, backed by
//! whatever external store an implementation wraps. The core only ever
//! calls the four operations declared here; a cache-only, in-memory
//! default ships in its own crate so alternative backends can depend on
//! this trait alone.

use std::collections::BTreeMap;

use serde_json::Value;
use thiserror::Error;

/// Errors raised by a [`StatePersistence`] implementation.
#[derive(Debug, Error)]
pub enum PersistenceError {
    /// The backing store could not be reached or returned malformed data.
    #[error("state persistence backend error: {0}")]
    Backend(String),
}

/// Per-object state cache backed by an external store.
///
/// # Contract
/// - `get_object_state` returns the cached mapping for `id`; when
///   `refresh_if_missing` is `true` and the id is not cached, an
///   implementation may attempt a single reload from the backend before
///   reporting absence.
/// - `save_object_state` updates the cache only; the value becomes
///   durable only once `persist_all_state` is called.
pub trait StatePersistence {
    /// Reloads the entire cache from the backing store.
    ///
    /// # Errors
    ///
    /// Returns [`PersistenceError`] if the backend cannot be reached.
    fn retrieve_all_state_from_persistence(&self) -> Result<(), PersistenceError>;

    /// Returns the cached mapping for `id`, if any.
    ///
    /// # Errors
    ///
    /// Returns [`PersistenceError`] if a refresh attempt fails.
    fn get_object_state(
        &self,
        id: &str,
        refresh_if_missing: bool,
    ) -> Result<Option<BTreeMap<String, Value>>, PersistenceError>;

    /// Updates the cached mapping for `id`.
    ///
    /// # Errors
    ///
    /// Returns [`PersistenceError`] if the update cannot be recorded.
    fn save_object_state(&self, id: &str, data: BTreeMap<String, Value>) -> Result<(), PersistenceError>;

    /// Flushes the entire cache to the backing store.
    ///
    /// # Errors
    ///
    /// Returns [`PersistenceError`] if the flush fails.
    fn persist_all_state(&self) -> Result<(), PersistenceError>;
}
