// demos/hello-world/src/main.rs
// ============================================================================
// Demo: Hello World
// Description: Minimal end-to-end wiring of a Tasks orchestrator: a stdout
//              logger, an in-memory persistence backend, a single
//              "HelloWorld" processor, and one task run through `apply`.
// Purpose: Show how the pieces in taskframe-core compose; not part of the
//          core crate's public surface.
// ============================================================================

//! ## Overview
//! This binary is the only place in the workspace allowed to print:
//! `taskframe-core` forbids `print_stdout` everywhere else, so the stdout
//! sink lives here, behind this crate's own lint boundary.

use std::sync::Arc;

use serde_json::json;
use taskframe_core::KeyValueStore;
use taskframe_core::Logger;
use taskframe_core::ProcessorError;
use taskframe_core::StatePersistence;
use taskframe_core::Task;
use taskframe_core::TaskProcessor;
use taskframe_core::Tasks;
use taskframe_memory_store::InMemoryStatePersistence;

/// Logs every level to stdout/stderr, prefixed by level name.
#[derive(Debug, Clone, Copy, Default)]
struct StdoutLogger;

impl Logger for StdoutLogger {
    fn info(&self, message: &str) {
        #[allow(clippy::print_stdout, reason = "This demo's sole purpose is to show console output; the crate-wide print ban does not apply here.")]
        {
            println!("[INFO] {message}");
        }
    }

    fn warn(&self, message: &str) {
        self.warning(message);
    }

    fn warning(&self, message: &str) {
        #[allow(clippy::print_stdout, reason = "This demo's sole purpose is to show console output; the crate-wide print ban does not apply here.")]
        {
            println!("[WARN] {message}");
        }
    }

    fn debug(&self, message: &str) {
        #[allow(clippy::print_stdout, reason = "This demo's sole purpose is to show console output; the crate-wide print ban does not apply here.")]
        {
            println!("[DEBUG] {message}");
        }
    }

    fn critical(&self, message: &str) {
        self.error(message);
    }

    fn error(&self, message: &str) {
        #[allow(clippy::print_stderr, reason = "This demo's sole purpose is to show console output; the crate-wide print ban does not apply here.")]
        {
            eprintln!("[ERROR] {message}");
        }
    }
}

/// Greets whoever is named in a task's `spec.name` field.
struct HelloWorldProcessor {
    versions: Vec<String>,
    commands: Vec<String>,
}

impl HelloWorldProcessor {
    fn new() -> Self {
        Self {
            versions: vec!["v1".to_string()],
            commands: vec!["apply".to_string()],
        }
    }
}

impl TaskProcessor for HelloWorldProcessor {
    fn kind(&self) -> &str {
        "HelloWorld"
    }

    fn versions(&self) -> &[String] {
        &self.versions
    }

    fn supported_commands(&self) -> &[String] {
        &self.commands
    }

    fn process_task(
        &self,
        task: &Task,
        _command: &str,
        _context: &str,
        mut kv: KeyValueStore,
        _persistence: &dyn StatePersistence,
    ) -> Result<KeyValueStore, ProcessorError> {
        let name = task.spec().get("name").and_then(serde_json::Value::as_str).unwrap_or("world");
        kv.set("greeting", format!("Hello, {name}!"));
        Ok(kv)
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let logger = Arc::new(StdoutLogger);
    let persistence = Arc::new(InMemoryStatePersistence::new());

    let mut tasks = Tasks::new(persistence, logger)?;
    tasks.register_task_processor(Box::new(HelloWorldProcessor::new()));

    let task = Task::new(
        "HelloWorld",
        "v1",
        json!({"name": "Taskframe"}),
        json!({"identifiers": [{"type": "ManifestName", "key": "greet-taskframe"}]}),
    )?;
    tasks.add_task(task)?;

    tasks.process("apply", "default")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    #![allow(clippy::expect_used, reason = "Unit tests use expect for setup clarity.")]

    use super::*;

    #[test]
    fn processor_greets_the_named_spec() {
        let processor = HelloWorldProcessor::new();
        let persistence = InMemoryStatePersistence::new();
        let task = Task::new("HelloWorld", "v1", json!({"name": "Taskframe"}), json!({})).expect("valid task");
        let kv = processor
            .process_task(&task, "apply", "default", KeyValueStore::new(), &persistence)
            .expect("processing succeeds");
        assert_eq!(kv.get("greeting").and_then(serde_json::Value::as_str), Some("Hello, Taskframe!"));
    }
}
