// src/core/identifier_context.rs
// ============================================================================
// Module: Identifier Context
// Description: Named (type, name) tuples and an order-preserving,
//              dedup'd collection of them.
// ============================================================================

use serde::Serialize;
use thiserror::Error;

use crate::core::hashing::DEFAULT_HASH_ALGORITHM;
use crate::core::hashing::HashError;
use crate::core::hashing::hash_insertion_ordered_json;

/// Errors raised while constructing an [`IdentifierContext`].
#[derive(Debug, Error)]
pub enum IdentifierContextError {
    /// Either `context_type` or `context_name` was empty.
    #[error("identifier context fields must be non-empty (type={context_type:?}, name={context_name:?})")]
    EmptyField {
        /// The offending type string.
        context_type: String,
        /// The offending name string.
        context_name: String,
    },
}

/// A single `(context_type, context_name)` dimension attached to an
/// [`Identifier`](crate::core::identifier::Identifier), e.g. `Command:apply`.
///
/// # Invariants
/// - Both fields are non-empty for the lifetime of the value.
/// - Value equality compares both fields.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct IdentifierContext {
    #[serde(rename = "Type")]
    context_type: String,
    #[serde(rename = "Name")]
    context_name: String,
}

impl IdentifierContext {
    /// Builds a new context, rejecting empty fields.
    ///
    /// # Errors
    ///
    /// Returns [`IdentifierContextError::EmptyField`] when either argument
    /// is empty.
    pub fn new(
        context_type: impl Into<String>,
        context_name: impl Into<String>,
    ) -> Result<Self, IdentifierContextError> {
        let context_type = context_type.into();
        let context_name = context_name.into();
        if context_type.is_empty() || context_name.is_empty() {
            return Err(IdentifierContextError::EmptyField {
                context_type,
                context_name,
            });
        }
        Ok(Self {
            context_type,
            context_name,
        })
    }

    /// Returns the context type, e.g. `"Command"`.
    #[must_use]
    pub fn context_type(&self) -> &str {
        &self.context_type
    }

    /// Returns the context name, e.g. `"apply"`.
    #[must_use]
    pub fn context_name(&self) -> &str {
        &self.context_name
    }

    /// Returns the canonical `"<type>:<name>"` string form.
    #[must_use]
    pub fn canonical(&self) -> String {
        format!("{}:{}", self.context_type, self.context_name)
    }
}

/// An insertion-ordered collection of unique [`IdentifierContext`] values.
///
/// # Invariants
/// - Adding a duplicate (by value equality) is a silent no-op.
/// - `unique_id()` is a pure function of the current contents; it is
///   recomputed on every successful `add`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdentifierContexts {
    contexts: Vec<IdentifierContext>,
    unique_id: String,
}

/// Canonical serializable form of an [`IdentifierContexts`] collection.
#[derive(Debug, Clone, Serialize)]
pub struct CanonicalIdentifierContexts {
    /// The contexts, in insertion order.
    #[serde(rename = "IdentifierContexts")]
    pub contexts: Vec<IdentifierContext>,
    /// The collection's content-derived unique id.
    #[serde(rename = "UniqueId")]
    pub unique_id: String,
}

impl IdentifierContexts {
    /// Creates an empty collection.
    #[must_use]
    pub fn new() -> Self {
        let mut contexts = Self {
            contexts: Vec::new(),
            unique_id: String::new(),
        };
        contexts.recompute_unique_id();
        contexts
    }

    /// Adds `context` unless an equal value is already present.
    pub fn add(&mut self, context: IdentifierContext) {
        if !self.contexts.contains(&context) {
            self.contexts.push(context);
            self.recompute_unique_id();
        }
    }

    /// Returns `true` if an equal context is already present.
    #[must_use]
    pub fn contains(&self, context: &IdentifierContext) -> bool {
        self.contexts.contains(context)
    }

    /// Returns `true` if `self` and `other` share at least one context.
    #[must_use]
    pub fn any_shared(&self, other: &IdentifierContexts) -> bool {
        other.contexts.iter().any(|context| self.contains(context))
    }

    /// Returns the number of contexts in the collection.
    #[must_use]
    pub fn len(&self) -> usize {
        self.contexts.len()
    }

    /// Returns `true` if the collection holds no contexts.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.contexts.is_empty()
    }

    /// Iterates over the contexts in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &IdentifierContext> {
        self.contexts.iter()
    }

    /// Returns the collection's content-derived unique id.
    #[must_use]
    pub fn unique_id(&self) -> &str {
        &self.unique_id
    }

    /// Builds the canonical serializable form, recomputing nothing (the
    /// unique id is already current).
    #[must_use]
    pub fn to_canonical(&self) -> CanonicalIdentifierContexts {
        CanonicalIdentifierContexts {
            contexts: self.contexts.clone(),
            unique_id: self.unique_id.clone(),
        }
    }

    fn recompute_unique_id(&mut self) {
        // Hashing errors here would only ever originate from a JSON
        // serialization failure, which cannot happen for this well-formed
        // struct; fall back to an empty id rather than panicking.
        self.unique_id = hash_contexts(&self.contexts).unwrap_or_default();
    }
}

fn hash_contexts(contexts: &[IdentifierContext]) -> Result<String, HashError> {
    let digest = hash_insertion_ordered_json(DEFAULT_HASH_ALGORITHM, &contexts)?;
    Ok(digest.value)
}

impl<'a> IntoIterator for &'a IdentifierContexts {
    type Item = &'a IdentifierContext;
    type IntoIter = std::slice::Iter<'a, IdentifierContext>;

    fn into_iter(self) -> Self::IntoIter {
        self.contexts.iter()
    }
}

impl FromIterator<IdentifierContext> for IdentifierContexts {
    fn from_iter<I: IntoIterator<Item = IdentifierContext>>(iter: I) -> Self {
        let mut contexts = Self::new();
        for context in iter {
            contexts.add(context);
        }
        contexts
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::expect_used, reason = "Unit tests use expect for setup clarity.")]

    use super::*;

    fn ctx(t: &str, n: &str) -> IdentifierContext {
        IdentifierContext::new(t, n).expect("non-empty")
    }

    #[test]
    fn rejects_empty_fields() {
        assert!(IdentifierContext::new("", "x").is_err());
        assert!(IdentifierContext::new("x", "").is_err());
    }

    #[test]
    fn duplicate_add_is_noop() {
        let mut contexts = IdentifierContexts::new();
        contexts.add(ctx("Command", "apply"));
        let first_id = contexts.unique_id().to_string();
        contexts.add(ctx("Command", "apply"));
        assert_eq!(contexts.len(), 1);
        assert_eq!(contexts.unique_id(), first_id);
    }

    #[test]
    fn unique_id_changes_on_mutation() {
        let mut contexts = IdentifierContexts::new();
        let empty_id = contexts.unique_id().to_string();
        contexts.add(ctx("Environment", "prod"));
        assert_ne!(contexts.unique_id(), empty_id);
    }

    #[test]
    fn any_shared_detects_overlap() {
        let mut a = IdentifierContexts::new();
        a.add(ctx("Environment", "prod"));
        let mut b = IdentifierContexts::new();
        b.add(ctx("Environment", "prod"));
        b.add(ctx("Command", "apply"));
        assert!(a.any_shared(&b));
        assert!(b.any_shared(&a));
    }
}
