// src/core/identifier.rs
// ============================================================================
// Module: Identifier
// Description: Typed (type, key, val?, contexts) match tokens and the
//              insertion-ordered, dedup'd collection over them.
// Purpose: Implements the matching algebra that anchors scope filtering
//          and dependency resolution.
// ============================================================================

use serde::Serialize;

use crate::core::hashing::DEFAULT_HASH_ALGORITHM;
use crate::core::hashing::hash_insertion_ordered_json;
use crate::core::identifier_context::IdentifierContexts;

/// Fields hashed to derive an [`Identifier`]'s unique id, in the exact
/// order they must appear for the hash to be reproducible.
#[derive(Serialize)]
struct UniqueIdFields<'a> {
    #[serde(rename = "IdentifierType")]
    identifier_type: &'a str,
    #[serde(rename = "IdentifierKey")]
    key: &'a str,
    #[serde(skip_serializing_if = "Option::is_none", rename = "IdentifierValue")]
    val: Option<&'a str>,
    #[serde(rename = "IdentifierContexts")]
    contexts: crate::core::identifier_context::CanonicalIdentifierContexts,
}

/// A typed match token attached to a task: a name, a label, or an
/// execution-scope constraint.
///
/// # Invariants
/// - `unique_id()` is a pure function of `(identifier_type, key, val,
///   contexts.unique_id())`; it is recomputed whenever contexts are
///   attached at construction.
/// - An identifier is "contextual" iff `contexts` is non-empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identifier {
    identifier_type: String,
    key: String,
    val: Option<String>,
    contexts: IdentifierContexts,
    unique_id: String,
}

impl Identifier {
    /// Builds a non-contextual identifier.
    #[must_use]
    pub fn new(identifier_type: impl Into<String>, key: impl Into<String>, val: Option<String>) -> Self {
        Self::with_contexts(identifier_type, key, val, IdentifierContexts::new())
    }

    /// Builds an identifier carrying the given contexts.
    #[must_use]
    pub fn with_contexts(
        identifier_type: impl Into<String>,
        key: impl Into<String>,
        val: Option<String>,
        contexts: IdentifierContexts,
    ) -> Self {
        let identifier_type = identifier_type.into();
        let key = key.into();
        let unique_id = compute_unique_id(&identifier_type, &key, val.as_deref(), &contexts);
        Self {
            identifier_type,
            key,
            val,
            contexts,
            unique_id,
        }
    }

    /// Returns the identifier's type, e.g. `"ManifestName"`.
    #[must_use]
    pub fn identifier_type(&self) -> &str {
        &self.identifier_type
    }

    /// Returns the identifier's key.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Returns the identifier's optional value.
    #[must_use]
    pub fn val(&self) -> Option<&str> {
        self.val.as_deref()
    }

    /// Returns the identifier's attached contexts.
    #[must_use]
    pub fn contexts(&self) -> &IdentifierContexts {
        &self.contexts
    }

    /// Returns `true` if this identifier carries at least one context.
    #[must_use]
    pub fn is_contextual(&self) -> bool {
        !self.contexts.is_empty()
    }

    /// Returns the content-derived unique id.
    #[must_use]
    pub fn unique_id(&self) -> &str {
        &self.unique_id
    }

    /// Strict equality used for registry dedup: `type`, `key`, `val` all
    /// equal, and contexts match iff both are empty or at least one of
    /// `other`'s contexts is present in `self`'s.
    #[must_use]
    pub fn equals(&self, other: &Identifier) -> bool {
        self.matches_any_context(&other.identifier_type, &other.key, other.val.as_deref(), &other.contexts)
    }

    /// Scheduling match: the scalar triple matches, and either side's
    /// contexts are empty, or at least one of `query_contexts` is present
    /// in `self`'s contexts.
    #[must_use]
    pub fn matches_any_context(
        &self,
        identifier_type: &str,
        key: &str,
        val: Option<&str>,
        query_contexts: &IdentifierContexts,
    ) -> bool {
        if self.identifier_type != identifier_type || self.key != key || self.val.as_deref() != val {
            return false;
        }
        if self.contexts.is_empty() || query_contexts.is_empty() {
            return true;
        }
        self.contexts.any_shared(query_contexts)
    }
}

fn compute_unique_id(
    identifier_type: &str,
    key: &str,
    val: Option<&str>,
    contexts: &IdentifierContexts,
) -> String {
    let fields = UniqueIdFields {
        identifier_type,
        key,
        val,
        contexts: contexts.to_canonical(),
    };
    hash_insertion_ordered_json(DEFAULT_HASH_ALGORITHM, &fields)
        .map(|digest| digest.value)
        .unwrap_or_default()
}

/// An insertion-ordered, unique-id-deduplicated collection of
/// [`Identifier`] values.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Identifiers {
    items: Vec<Identifier>,
}

impl Identifiers {
    /// Creates an empty collection.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `identifier` unless an identifier with the same unique id is
    /// already present.
    pub fn add(&mut self, identifier: Identifier) {
        if !self.items.iter().any(|existing| existing.unique_id == identifier.unique_id) {
            self.items.push(identifier);
        }
    }

    /// Returns the number of identifiers in the collection.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Returns `true` if the collection holds no identifiers.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Iterates over the identifiers in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &Identifier> {
        self.items.iter()
    }

    /// Returns `true` if any member `equals` the given identifier's
    /// scalar-and-context triple (delegates to [`Identifier::equals`]).
    #[must_use]
    pub fn any_equals(&self, other: &Identifier) -> bool {
        self.items.iter().any(|item| item.equals(other))
    }

    /// Returns `true` if any member matches the given scalar-and-context
    /// query (delegates to [`Identifier::matches_any_context`]).
    #[must_use]
    pub fn any_matches_any_context(
        &self,
        identifier_type: &str,
        key: &str,
        val: Option<&str>,
        query_contexts: &IdentifierContexts,
    ) -> bool {
        self.items
            .iter()
            .any(|item| item.matches_any_context(identifier_type, key, val, query_contexts))
    }

    /// Returns the first identifier of the given type with a matching
    /// key, if any.
    #[must_use]
    pub fn find_by_type_and_key(&self, identifier_type: &str, key: &str) -> Option<&Identifier> {
        self.items
            .iter()
            .find(|item| item.identifier_type == identifier_type && item.key == key)
    }

    /// Iterates over all identifiers of the given type.
    pub fn of_type<'a>(&'a self, identifier_type: &'a str) -> impl Iterator<Item = &'a Identifier> {
        self.items.iter().filter(move |item| item.identifier_type == identifier_type)
    }
}

impl<'a> IntoIterator for &'a Identifiers {
    type Item = &'a Identifier;
    type IntoIter = std::slice::Iter<'a, Identifier>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

impl FromIterator<Identifier> for Identifiers {
    fn from_iter<I: IntoIterator<Item = Identifier>>(iter: I) -> Self {
        let mut identifiers = Self::new();
        for identifier in iter {
            identifiers.add(identifier);
        }
        identifiers
    }
}
