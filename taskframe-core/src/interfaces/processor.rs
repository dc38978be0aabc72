// src/interfaces/processor.rs
// ============================================================================
// Module: Task Processor Capability
// Description: User-supplied processing capability for a (kind, versions).
// Purpose: Declare the minimal contract the orchestrator calls into; the
//          pre-processing gate built on top of this lives in the runtime
//          module, since it depends on hooks.
// Dependencies: crate::core, crate::interfaces::persistence
// ============================================================================

//! ## Overview
//! A [`TaskProcessor`] is identified across the versions it supports by a
//! composite id (`kind:v1:v2:...`); the orchestrator resolves a task's
//! `(kind, version)` to this composite id to find the processor that
//! should handle it.

use thiserror::Error;

use crate::core::KeyValueStore;
use crate::core::Task;
use crate::interfaces::persistence::StatePersistence;

/// Errors raised while processing a task.
#[derive(Debug, Error)]
pub enum ProcessorError {
    /// The processor's `process_task` failed.
    #[error("task processing failed: {0}")]
    Failed(#[from] Box<dyn std::error::Error + Send + Sync>),
}

/// A processing capability for a given `(kind, versions)`.
pub trait TaskProcessor {
    /// Returns the processor's kind, e.g. `"HelloWorld"`.
    fn kind(&self) -> &str;

    /// Returns the versions this processor supports.
    fn versions(&self) -> &[String];

    /// Returns the commands this processor supports, e.g. `["apply"]`.
    fn supported_commands(&self) -> &[String];

    /// Processes `task` for `(command, context)`, reading and writing
    /// `kv` and `persistence` as needed.
    ///
    /// # Errors
    ///
    /// Returns [`ProcessorError::Failed`] when processing fails; the
    /// orchestrator's pre-processing gate records this as a `-1` run-key
    /// state and surfaces it through the matching error-stage hook.
    fn process_task(
        &self,
        task: &Task,
        command: &str,
        context: &str,
        kv: KeyValueStore,
        persistence: &dyn StatePersistence,
    ) -> Result<KeyValueStore, ProcessorError>;

    /// Builds this processor's composite id: `kind:v1:v2:...`.
    #[must_use]
    fn composite_id(&self) -> String {
        let mut id = self.kind().to_string();
        for version in self.versions() {
            id.push(':');
            id.push_str(version);
        }
        id
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::expect_used, reason = "Unit tests use expect for setup clarity.")]

    use super::*;

    struct StubProcessor {
        kind: String,
        versions: Vec<String>,
        commands: Vec<String>,
    }

    impl TaskProcessor for StubProcessor {
        fn kind(&self) -> &str {
            &self.kind
        }

        fn versions(&self) -> &[String] {
            &self.versions
        }

        fn supported_commands(&self) -> &[String] {
            &self.commands
        }

        fn process_task(
            &self,
            _task: &Task,
            _command: &str,
            _context: &str,
            kv: KeyValueStore,
            _persistence: &dyn StatePersistence,
        ) -> Result<KeyValueStore, ProcessorError> {
            Ok(kv)
        }
    }

    #[test]
    fn composite_id_joins_kind_and_versions() {
        let processor = StubProcessor {
            kind: "K".to_string(),
            versions: vec!["v1".to_string(), "v2".to_string()],
            commands: vec!["apply".to_string()],
        };
        assert_eq!(processor.composite_id(), "K:v1:v2");
    }
}
