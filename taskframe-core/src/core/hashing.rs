// src/core/hashing.rs
// ============================================================================
// Module: Hashing
// Description: Deterministic id derivation for identifiers and tasks.
// Purpose: Reproduce stable ids by hashing insertion-order JSON, not
//          sorted-key canonical JSON.
// ============================================================================

use serde::Serialize;
use sha2::Digest;
use sha2::Sha256;
use thiserror::Error;

/// Supported digest algorithms.
///
/// # Invariants
/// - Currently a single variant; kept as an enum so a future algorithm can
///   be added without breaking the `HashDigest` representation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HashAlgorithm {
    /// SHA-256.
    Sha256,
}

/// The algorithm used when none is specified explicitly.
pub const DEFAULT_HASH_ALGORITHM: HashAlgorithm = HashAlgorithm::Sha256;

/// A computed digest paired with the algorithm that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HashDigest {
    /// Algorithm used to produce `value`.
    pub algorithm: HashAlgorithm,
    /// Lowercase hex-encoded digest bytes.
    pub value: String,
}

impl HashDigest {
    fn new(algorithm: HashAlgorithm, bytes: &[u8]) -> Self {
        Self {
            algorithm,
            value: hex_encode(bytes),
        }
    }
}

/// Errors raised while hashing identifier or task data.
#[derive(Debug, Error)]
pub enum HashError {
    /// The value could not be serialized to JSON.
    #[error("failed to serialize value for hashing: {0}")]
    Serialization(String),
}

/// Serializes `value` to JSON bytes preserving field and map insertion
/// order (the workspace enables `serde_json`'s `preserve_order` feature
/// crate-wide, so this is a thin, documented wrapper rather than a
/// from-scratch canonicalizer).
///
/// # Errors
///
/// Returns [`HashError::Serialization`] when `value` cannot be serialized.
pub fn insertion_ordered_json_bytes<T>(value: &T) -> Result<Vec<u8>, HashError>
where
    T: Serialize + ?Sized,
{
    serde_json::to_vec(value).map_err(|err| HashError::Serialization(err.to_string()))
}

/// Hashes `value` after serializing it with [`insertion_ordered_json_bytes`].
///
/// # Errors
///
/// Returns [`HashError::Serialization`] when `value` cannot be serialized.
pub fn hash_insertion_ordered_json<T>(
    algorithm: HashAlgorithm,
    value: &T,
) -> Result<HashDigest, HashError>
where
    T: Serialize + ?Sized,
{
    let bytes = insertion_ordered_json_bytes(value)?;
    Ok(hash_bytes(algorithm, &bytes))
}

/// Hashes raw bytes with the given algorithm.
#[must_use]
pub fn hash_bytes(algorithm: HashAlgorithm, bytes: &[u8]) -> HashDigest {
    match algorithm {
        HashAlgorithm::Sha256 => {
            let mut hasher = Sha256::new();
            hasher.update(bytes);
            HashDigest::new(algorithm, &hasher.finalize())
        }
    }
}

/// Hand-rolled hex encoding; avoids an extra dependency for a handful of
/// lookup-table writes.
fn hex_encode(bytes: &[u8]) -> String {
    const HEX_DIGITS: &[u8; 16] = b"0123456789abcdef";
    let mut out = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        out.push(HEX_DIGITS[(byte >> 4) as usize] as char);
        out.push(HEX_DIGITS[(byte & 0x0f) as usize] as char);
    }
    out
}
