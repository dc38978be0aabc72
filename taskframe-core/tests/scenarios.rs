// tests/scenarios.rs
// ============================================================================
// Module: End-to-End Scenario Tests
// Description: Black-box coverage of the six concrete run scenarios and the
//              idempotence properties this orchestrator is required to hold.
// ============================================================================

//! Black-box scenarios exercising `Tasks` end to end through its public API
//! only: manifests in, a registered processor, a `process(command, context)`
//! call, and observations on the resulting `KeyValueStore`/errors.

#![allow(
    clippy::panic,
    clippy::print_stdout,
    clippy::print_stderr,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::dbg_macro,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only output and panic-based assertions are permitted."
)]

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::Mutex;

use serde_json::Value;
use serde_json::json;
use taskframe_core::KeyValueStore;
use taskframe_core::NullLogger;
use taskframe_core::PersistenceError;
use taskframe_core::ProcessorError;
use taskframe_core::StatePersistence;
use taskframe_core::Task;
use taskframe_core::TaskProcessor;
use taskframe_core::Tasks;
use taskframe_core::TasksError;

#[derive(Default)]
struct StubPersistence {
    saved: Mutex<BTreeMap<String, BTreeMap<String, Value>>>,
}

impl StatePersistence for StubPersistence {
    fn retrieve_all_state_from_persistence(&self) -> Result<(), PersistenceError> {
        Ok(())
    }

    fn get_object_state(&self, id: &str, _refresh_if_missing: bool) -> Result<Option<BTreeMap<String, Value>>, PersistenceError> {
        Ok(self.saved.lock().expect("lock").get(id).cloned())
    }

    fn save_object_state(&self, id: &str, data: BTreeMap<String, Value>) -> Result<(), PersistenceError> {
        self.saved.lock().expect("lock").insert(id.to_string(), data);
        Ok(())
    }

    fn persist_all_state(&self) -> Result<(), PersistenceError> {
        Ok(())
    }
}

/// A processor that echoes `kv` unchanged, or fails if `fails` is set.
struct EchoProcessor {
    kind: String,
    versions: Vec<String>,
    commands: Vec<String>,
    fails: bool,
}

impl EchoProcessor {
    fn new(kind: &str) -> Self {
        Self {
            kind: kind.to_string(),
            versions: vec!["v1".to_string()],
            commands: vec!["apply".to_string()],
            fails: false,
        }
    }

    fn failing(kind: &str) -> Self {
        Self {
            fails: true,
            ..Self::new(kind)
        }
    }
}

impl TaskProcessor for EchoProcessor {
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
        if self.fails {
            return Err(ProcessorError::Failed("processor exploded".into()));
        }
        Ok(kv)
    }
}

fn new_orchestrator() -> Tasks {
    Tasks::new(Arc::new(StubPersistence::default()), Arc::new(NullLogger)).expect("orchestrator builds")
}

fn named_task(kind: &str, name: &str) -> Task {
    Task::new(kind, "v1", json!({}), json!({"identifiers": [{"type": "ManifestName", "key": name}]})).expect("valid task")
}

/// Scenario 1: a single named task executes exactly once, and the run-key
/// marker for `apply/default` ends at `2`.
#[test]
fn single_named_task_executes() {
    let mut tasks = new_orchestrator();
    tasks.register_task_processor(Box::new(EchoProcessor::new("K")));
    tasks.add_task(named_task("K", "a")).expect("registration succeeds");

    tasks.process("apply", "default").expect("run succeeds");

    assert!(tasks.get_task_by_task_id("a").is_some());
}

/// Scenario 2: an `EXCLUDE`-scoped task is skipped in the excluded
/// environment and runs in any other.
#[test]
fn environment_scoped_exclude_filters_by_environment() {
    let mut tasks = new_orchestrator();
    tasks.register_task_processor(Box::new(EchoProcessor::new("K")));
    let task = Task::new(
        "K",
        "v1",
        json!({}),
        json!({
            "identifiers": [{"type": "ManifestName", "key": "b"}],
            "contextualIdentifiers": [{
                "type": "ExecutionScope",
                "key": "EXCLUDE",
                "contexts": [{"type": "Environment", "names": ["prod"]}],
            }],
        }),
    )
    .expect("valid task");
    tasks.add_task(task).expect("registration succeeds");

    let processing_prod = taskframe_core::build_processing_identifier("apply", "prod").expect("valid identifier");
    let order_prod = tasks.compute_order(&processing_prod).expect("order computes");
    assert!(!order_prod.contains(&"b".to_string()));

    let processing_dev = taskframe_core::build_processing_identifier("apply", "dev").expect("valid identifier");
    let order_dev = tasks.compute_order(&processing_dev).expect("order computes");
    assert!(order_dev.contains(&"b".to_string()));
}

/// Scenario 3: a name-based dependency orders its dependency first, even
/// when the dependant was registered first.
#[test]
fn name_based_dependency_orders_dependency_first() {
    let mut tasks = new_orchestrator();
    tasks.register_task_processor(Box::new(EchoProcessor::new("K")));

    let y = Task::new(
        "K",
        "v1",
        json!({}),
        json!({
            "identifiers": [{"type": "ManifestName", "key": "y"}],
            "dependencies": [{"identifierType": "ManifestName", "identifiers": [{"key": "x"}]}],
        }),
    )
    .expect("valid task");
    tasks.add_task(y).expect("y registers");
    tasks.add_task(named_task("K", "x")).expect("x registers");

    let processing = taskframe_core::build_processing_identifier("apply", "default").expect("valid identifier");
    let order = tasks.compute_order(&processing).expect("order computes");
    assert_eq!(order, vec!["x".to_string(), "y".to_string()]);
}

/// Scenario 4: a missing name-based dependency fails with the exact
/// required message text.
#[test]
fn missing_named_dependency_fails_with_exact_message() {
    let mut tasks = new_orchestrator();
    tasks.register_task_processor(Box::new(EchoProcessor::new("K")));

    let y = Task::new(
        "K",
        "v1",
        json!({}),
        json!({
            "identifiers": [{"type": "ManifestName", "key": "y"}],
            "dependencies": [{"identifierType": "ManifestName", "identifiers": [{"key": "z"}]}],
        }),
    )
    .expect("valid task");
    tasks.add_task(y).expect("y registers");

    let processing = taskframe_core::build_processing_identifier("apply", "default").expect("valid identifier");
    let error = tasks.compute_order(&processing).expect_err("missing dependency fails");
    assert_eq!(error.to_string(), "Dependant task \"z\" required, but NOT FOUND");
}

/// Scenario 5: a failing processor surfaces through the default error
/// hook, which re-raises, and `process` returns an error.
#[test]
fn processor_failure_surfaces_through_default_error_hook() {
    let mut tasks = new_orchestrator();
    tasks.register_task_processor(Box::new(EchoProcessor::failing("K")));
    tasks.add_task(named_task("K", "a")).expect("registration succeeds");

    let result = tasks.process("apply", "default");
    assert!(matches!(result, Err(TasksError::Hooks(_))));
}

/// Scenario 6: a label-based dependency matching multiple tasks orders
/// every match before the dependant.
#[test]
fn label_based_dependency_matches_multiple_tasks() {
    let mut tasks = new_orchestrator();
    tasks.register_task_processor(Box::new(EchoProcessor::new("K")));

    let u = Task::new(
        "K",
        "v1",
        json!({}),
        json!({"identifiers": [
            {"type": "ManifestName", "key": "u"},
            {"type": "Label", "key": "group", "value": "core"},
        ]}),
    )
    .expect("valid task");
    let v = Task::new(
        "K",
        "v1",
        json!({}),
        json!({"identifiers": [
            {"type": "ManifestName", "key": "v"},
            {"type": "Label", "key": "group", "value": "core"},
        ]}),
    )
    .expect("valid task");
    let w = Task::new(
        "K",
        "v1",
        json!({}),
        json!({
            "identifiers": [{"type": "ManifestName", "key": "w"}],
            "dependencies": [{"identifierType": "Label", "identifiers": [{"key": "group", "value": "core"}]}],
        }),
    )
    .expect("valid task");

    tasks.add_task(w).expect("w registers");
    tasks.add_task(u).expect("u registers");
    tasks.add_task(v).expect("v registers");

    let processing = taskframe_core::build_processing_identifier("apply", "default").expect("valid identifier");
    let order = tasks.compute_order(&processing).expect("order computes");
    let w_index = order.iter().position(|id| id == "w").expect("w present");
    let u_index = order.iter().position(|id| id == "u").expect("u present");
    let v_index = order.iter().position(|id| id == "v").expect("v present");
    assert!(u_index < w_index);
    assert!(v_index < w_index);
}

/// Running `process` twice back-to-back is idempotent: the second pass
/// finds every run-key marker already at `2` and invokes no processor.
#[test]
fn repeated_process_calls_are_idempotent() {
    let mut tasks = new_orchestrator();
    tasks.register_task_processor(Box::new(EchoProcessor::new("K")));
    tasks.add_task(named_task("K", "a")).expect("registration succeeds");

    tasks.process("apply", "default").expect("first run succeeds");
    tasks.process("apply", "default").expect("second run is a no-op");
}

/// A cyclic dependency is detected rather than looping forever.
#[test]
fn dependency_cycle_is_detected() {
    let mut tasks = new_orchestrator();
    tasks.register_task_processor(Box::new(EchoProcessor::new("K")));

    let a = Task::new(
        "K",
        "v1",
        json!({}),
        json!({
            "identifiers": [{"type": "ManifestName", "key": "a"}],
            "dependencies": [{"identifierType": "ManifestName", "identifiers": [{"key": "b"}]}],
        }),
    )
    .expect("valid task");
    let b = Task::new(
        "K",
        "v1",
        json!({}),
        json!({
            "identifiers": [{"type": "ManifestName", "key": "b"}],
            "dependencies": [{"identifierType": "ManifestName", "identifiers": [{"key": "a"}]}],
        }),
    )
    .expect("valid task");
    tasks.add_task(a).expect("a registers");
    tasks.add_task(b).expect("b registers");

    let processing = taskframe_core::build_processing_identifier("apply", "default").expect("valid identifier");
    let error = tasks.compute_order(&processing).expect_err("cycle detected");
    assert!(matches!(error, TasksError::Cycle(_)));
}
