// src/core/task.rs
// ============================================================================
// Module: Task
// Description: An immutable manifest instance: kind, version, spec,
//              metadata; derived identifiers, dependencies, annotations,
//              checksum, and stable id.
// ============================================================================

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::Map;
use serde_json::Value;
use thiserror::Error;

use crate::core::hashing::DEFAULT_HASH_ALGORITHM;
use crate::core::hashing::hash_insertion_ordered_json;
use crate::core::identifier::Identifier;
use crate::core::identifier::Identifiers;
use crate::core::identifier_context::IdentifierContext;
use crate::core::identifier_context::IdentifierContexts;

const MANIFEST_NAME: &str = "ManifestName";
const LABEL: &str = "Label";
const EXECUTION_SCOPE: &str = "ExecutionScope";

/// Errors raised while building a [`Task`].
#[derive(Debug, Error)]
pub enum TaskError {
    /// `kind` or `version` was empty.
    #[error("task kind and version must both be non-empty")]
    MissingKindOrVersion,
}

/// Fields hashed to derive a task's checksum, in the exact order they
/// must appear for the hash to be reproducible. Empty `metadata`/`spec`
/// are omitted entirely rather than serialized as `{}`.
#[derive(Serialize)]
struct ChecksumFields<'a> {
    kind: &'a str,
    version: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    metadata: Option<&'a Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    spec: Option<&'a Value>,
}

/// An immutable declarative task manifest.
///
/// # Invariants
/// - `identifiers`, `task_dependencies`, `annotations`, `task_id`, and
///   `task_checksum` are fixed at construction and never change.
/// - `spec` and `metadata` have had all mapping keys lowercased,
///   recursively through nested mappings; list elements are left
///   untouched (their own keys are not descended into).
#[derive(Debug, Clone)]
pub struct Task {
    kind: String,
    version: String,
    spec: Value,
    metadata: Value,
    identifiers: Identifiers,
    annotations: BTreeMap<String, String>,
    task_dependencies: Vec<Identifier>,
    task_checksum: String,
    task_id: String,
    task_can_be_persisted: bool,
}

impl Task {
    /// Builds a task from a `kind`, `version`, `spec`, and `metadata`.
    ///
    /// `spec` and `metadata` are lowercase-normalized before anything
    /// else is derived from them.
    ///
    /// # Errors
    ///
    /// Returns [`TaskError::MissingKindOrVersion`] if `kind` or `version`
    /// is empty.
    pub fn new(
        kind: impl Into<String>,
        version: impl Into<String>,
        spec: Value,
        metadata: Value,
    ) -> Result<Self, TaskError> {
        let kind = kind.into();
        let version = version.into();
        if kind.is_empty() || version.is_empty() {
            return Err(TaskError::MissingKindOrVersion);
        }
        let spec = lowercase_keys(spec);
        let metadata = lowercase_keys(metadata);

        let identifiers = build_contextual_identifiers(&metadata, build_non_contextual_identifiers(&metadata, Identifiers::new()));
        let annotations = extract_annotations(&metadata);
        let task_dependencies = extract_dependencies(&metadata);
        let task_checksum = calculate_task_checksum(&kind, &version, &metadata, &spec);
        let (task_id, task_can_be_persisted) = determine_task_id(&identifiers, &task_checksum);

        Ok(Self {
            kind,
            version,
            spec,
            metadata,
            identifiers,
            annotations,
            task_dependencies,
            task_checksum,
            task_id,
            task_can_be_persisted,
        })
    }

    /// Returns the task's kind.
    #[must_use]
    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// Returns the task's version.
    #[must_use]
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Returns the lowercase-normalized spec.
    #[must_use]
    pub fn spec(&self) -> &Value {
        &self.spec
    }

    /// Returns the lowercase-normalized metadata.
    #[must_use]
    pub fn metadata(&self) -> &Value {
        &self.metadata
    }

    /// Returns the identifiers derived from metadata.
    #[must_use]
    pub fn identifiers(&self) -> &Identifiers {
        &self.identifiers
    }

    /// Returns the stringified annotations extracted from metadata.
    #[must_use]
    pub fn annotations(&self) -> &BTreeMap<String, String> {
        &self.annotations
    }

    /// Returns the dependency identifiers, in metadata order.
    #[must_use]
    pub fn task_dependencies(&self) -> &[Identifier] {
        &self.task_dependencies
    }

    /// Returns the task's checksum (SHA-256 hex digest).
    #[must_use]
    pub fn task_checksum(&self) -> &str {
        &self.task_checksum
    }

    /// Returns the task's stable id: its `ManifestName` if named, else
    /// its checksum.
    #[must_use]
    pub fn task_id(&self) -> &str {
        &self.task_id
    }

    /// Returns `true` if the task carries a `ManifestName` and can
    /// therefore be keyed in a persistence backend.
    #[must_use]
    pub fn task_can_be_persisted(&self) -> bool {
        self.task_can_be_persisted
    }

    /// Returns `true` if `name` matches this task's `ManifestName`.
    #[must_use]
    pub fn task_match_name(&self, name: &str) -> bool {
        self.identifiers
            .any_matches_any_context(MANIFEST_NAME, name, None, &IdentifierContexts::new())
    }

    /// Returns `true` if `(key, value)` matches one of this task's labels.
    #[must_use]
    pub fn task_match_label(&self, key: &str, value: &str) -> bool {
        self.identifiers
            .any_matches_any_context(LABEL, key, Some(value), &IdentifierContexts::new())
    }

    /// Determines whether this task is in scope for the given processing
    /// identifier, per the `EXCLUDE`-wins-over-`INCLUDE` scope filter.
    ///
    /// Non-`ExecutionScope`/`"processing"` queries always qualify (the
    /// filter does not apply to them).
    #[must_use]
    pub fn task_qualifies_for_processing(&self, processing_target_identifier: &Identifier) -> bool {
        if processing_target_identifier.identifier_type() != EXECUTION_SCOPE
            || processing_target_identifier.key() != "processing"
        {
            return true;
        }

        let mut processing_command: Option<&str> = None;
        let mut processing_environment: Option<&str> = None;
        for context in processing_target_identifier.contexts() {
            match context.context_type() {
                "Command" => processing_command = Some(context.context_name()),
                "Environment" => processing_environment = Some(context.context_name()),
                _ => {}
            }
        }

        let mut qualifies = true;
        let mut required_commands: Vec<&str> = Vec::new();
        let mut required_environments: Vec<&str> = Vec::new();

        for candidate in self.identifiers.of_type(EXECUTION_SCOPE) {
            match candidate.key() {
                "EXCLUDE" => {
                    for context in candidate.contexts() {
                        match context.context_type() {
                            "Command" if Some(context.context_name()) == processing_command => {
                                qualifies = false;
                            }
                            "Environment" if Some(context.context_name()) == processing_environment => {
                                qualifies = false;
                            }
                            _ => {}
                        }
                    }
                }
                "INCLUDE" => {
                    for context in candidate.contexts() {
                        match context.context_type() {
                            "Command" => required_commands.push(context.context_name()),
                            "Environment" => required_environments.push(context.context_name()),
                            _ => {}
                        }
                    }
                }
                _ => {}
            }
        }

        if qualifies {
            if !required_commands.is_empty() && !required_commands.contains(&processing_command.unwrap_or_default()) {
                qualifies = false;
            }
            if qualifies
                && !required_environments.is_empty()
                && !required_environments.contains(&processing_environment.unwrap_or_default())
            {
                qualifies = false;
            }
        }

        qualifies
    }

    /// Matches `identifier` against this task's name, labels, or (for an
    /// `ExecutionScope`/`"processing"` query) its processing scope.
    #[must_use]
    pub fn match_name_or_label_identifier(&self, identifier: &Identifier) -> bool {
        if identifier.identifier_type() == EXECUTION_SCOPE && identifier.key() == "processing" {
            return self.task_qualifies_for_processing(identifier);
        }
        if identifier.identifier_type() != MANIFEST_NAME && identifier.identifier_type() != LABEL {
            return false;
        }

        let query_contexts = identifier.contexts();
        for candidate in &self.identifiers {
            if candidate.identifier_type() == EXECUTION_SCOPE {
                continue;
            }
            let basic_match = match candidate.identifier_type() {
                MANIFEST_NAME => candidate.key() == identifier.key(),
                LABEL => candidate.key() == identifier.key() && candidate.val() == identifier.val(),
                _ => false,
            };
            if !basic_match {
                continue;
            }
            if query_contexts.is_empty() {
                return true;
            }
            if candidate.contexts().any_shared(query_contexts) {
                return true;
            }
        }
        false
    }
}

impl<'a> IntoIterator for &'a Task {
    type Item = (&'static str, Value);
    type IntoIter = std::vec::IntoIter<(&'static str, Value)>;

    /// Exposes the task's checksum-relevant fields as a finite,
    /// non-restartable stream of `(field, value)` pairs, for inspection.
    fn into_iter(self) -> Self::IntoIter {
        let mut pairs = vec![
            ("kind", Value::from(self.kind.clone())),
            ("version", Value::from(self.version.clone())),
        ];
        if let Value::Object(map) = &self.metadata {
            if !map.is_empty() {
                pairs.push(("metadata", self.metadata.clone()));
            }
        }
        if let Value::Object(map) = &self.spec {
            if !map.is_empty() {
                pairs.push(("spec", self.spec.clone()));
            }
        }
        pairs.into_iter()
    }
}

/// Lowercases mapping keys recursively; array elements are left
/// untouched, matching the "lists are not descended" normalization rule.
fn lowercase_keys(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut lowered = Map::with_capacity(map.len());
            for (key, val) in map {
                lowered.insert(key.to_lowercase(), lowercase_keys(val));
            }
            Value::Object(lowered)
        }
        other => other,
    }
}

fn object_field<'a>(metadata: &'a Value, key: &str) -> Option<&'a Value> {
    metadata.as_object().and_then(|map| map.get(key))
}

fn string_field(object: &Map<String, Value>, key: &str) -> Option<String> {
    object.get(key).and_then(Value::as_str).map(str::to_string)
}

/// Extracts non-contextual identifiers from `metadata.identifiers`.
///
/// Malformed entries (missing `type` or `key`) are silently skipped
/// rather than raising, per the construction-errors policy.
fn build_non_contextual_identifiers(metadata: &Value, current: Identifiers) -> Identifiers {
    let mut identifiers = current;
    let Some(Value::Array(entries)) = object_field(metadata, "identifiers") else {
        return identifiers;
    };
    for entry in entries {
        let Some(object) = entry.as_object() else {
            continue;
        };
        let (Some(identifier_type), Some(key)) = (string_field(object, "type"), string_field(object, "key")) else {
            continue;
        };
        let mut val = string_field(object, "val");
        if let Some(value) = string_field(object, "value") {
            val = Some(value);
        }
        identifiers.add(Identifier::new(identifier_type, key, val));
    }
    identifiers
}

/// Extracts contextual identifiers from `metadata.contextualidentifiers`
/// (the lowercased form of `contextualIdentifiers`).
fn build_contextual_identifiers(metadata: &Value, current: Identifiers) -> Identifiers {
    let mut identifiers = current;
    let Some(Value::Array(entries)) = object_field(metadata, "contextualidentifiers") else {
        return identifiers;
    };
    for entry in entries {
        let Some(object) = entry.as_object() else {
            continue;
        };
        let mut contexts = IdentifierContexts::new();
        if let Some(Value::Array(context_entries)) = object.get("contexts") {
            for context_entry in context_entries {
                let Some(context_object) = context_entry.as_object() else {
                    continue;
                };
                let (Some(context_type), Some(Value::Array(names))) =
                    (string_field(context_object, "type"), context_object.get("names"))
                else {
                    continue;
                };
                for name in names {
                    let Some(name) = name.as_str() else {
                        continue;
                    };
                    if let Ok(context) = IdentifierContext::new(context_type.clone(), name) {
                        contexts.add(context);
                    }
                }
            }
        }
        let (Some(identifier_type), Some(key)) = (string_field(object, "type"), string_field(object, "key")) else {
            continue;
        };
        let mut val = string_field(object, "val");
        if let Some(value) = string_field(object, "value") {
            val = Some(value);
        }
        identifiers.add(Identifier::with_contexts(identifier_type, key, val, contexts));
    }
    identifiers
}

/// Extracts `annotations` from metadata, stringifying each value.
fn extract_annotations(metadata: &Value) -> BTreeMap<String, String> {
    let mut annotations = BTreeMap::new();
    let Some(Value::Object(entries)) = object_field(metadata, "annotations") else {
        return annotations;
    };
    for (key, value) in entries {
        let stringified = match value {
            Value::String(text) => text.clone(),
            other => other.to_string(),
        };
        annotations.insert(key.clone(), stringified);
    }
    annotations
}

/// Extracts `dependencies` from metadata into identifier form: one
/// `ManifestName` or `Label` identifier per entry, in metadata order.
fn extract_dependencies(metadata: &Value) -> Vec<Identifier> {
    let mut dependencies = Vec::new();
    let Some(Value::Array(entries)) = object_field(metadata, "dependencies") else {
        return dependencies;
    };
    for entry in entries {
        let Some(object) = entry.as_object() else {
            continue;
        };
        let Some(dependency_type) = string_field(object, "identifiertype") else {
            continue;
        };
        let Some(Value::Array(references)) = object.get("identifiers") else {
            continue;
        };
        for reference in references {
            let Some(reference_object) = reference.as_object() else {
                continue;
            };
            let Some(key) = string_field(reference_object, "key") else {
                continue;
            };
            match dependency_type.as_str() {
                MANIFEST_NAME => dependencies.push(Identifier::new(MANIFEST_NAME, key, None)),
                LABEL => {
                    if let Some(value) = string_field(reference_object, "value") {
                        dependencies.push(Identifier::new(LABEL, key, Some(value)));
                    }
                }
                _ => {}
            }
        }
    }
    dependencies
}

fn calculate_task_checksum(kind: &str, version: &str, metadata: &Value, spec: &Value) -> String {
    let metadata = non_empty_object(metadata);
    let spec = non_empty_object(spec);
    let fields = ChecksumFields {
        kind,
        version,
        metadata,
        spec,
    };
    hash_insertion_ordered_json(DEFAULT_HASH_ALGORITHM, &fields)
        .map(|digest| digest.value)
        .unwrap_or_default()
}

fn non_empty_object(value: &Value) -> Option<&Value> {
    match value.as_object() {
        Some(map) if !map.is_empty() => Some(value),
        _ => None,
    }
}

/// Determines a task's stable id: the last non-contextual `ManifestName`
/// encountered wins over the checksum (matches the reference
/// implementation's last-write assignment while walking identifiers).
fn determine_task_id(identifiers: &Identifiers, task_checksum: &str) -> (String, bool) {
    let mut task_id = task_checksum.to_string();
    let mut named = false;
    for identifier in identifiers {
        if identifier.contexts().is_empty() && identifier.identifier_type() == MANIFEST_NAME && !identifier.key().is_empty() {
            task_id = identifier.key().to_string();
            named = true;
        }
    }
    (task_id, named)
}
