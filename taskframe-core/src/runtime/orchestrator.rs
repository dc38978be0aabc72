// src/runtime/orchestrator.rs
// ============================================================================
// Module: Tasks Orchestrator
// Description: Manifest and processor registries, dependency ordering, and
//              the sequential single-threaded run driver.
// Purpose: Tie identifiers, lifecycle hooks, and processors together into a
//          single `process(command, context)` entry point.
// Dependencies: crate::core, crate::interfaces, crate::runtime::{hook, hooks}
// ============================================================================

//! ## Overview
//! [`Tasks`] holds every registered manifest and processor, computes a
//! dependency-respecting execution order for a `(command, context)` pair,
//! and drives each eligible task through its lifecycle while firing the
//! matching hooks.

use std::collections::BTreeMap;
use std::collections::HashSet;
use std::sync::Arc;

use thiserror::Error;

use crate::core::Identifier;
use crate::core::IdentifierContext;
use crate::core::IdentifierContextError;
use crate::core::KeyValueStore;
use crate::core::Task;
use crate::core::TaskLifecycleStage;
use crate::interfaces::Logger;
use crate::interfaces::PersistenceError;
use crate::interfaces::StatePersistence;
use crate::interfaces::TaskProcessor;
use crate::runtime::hook::ExtraParameters;
use crate::runtime::hook::Hook;
use crate::runtime::hook::HookError;
use crate::runtime::hooks::Hooks;
use crate::runtime::hooks::HooksError;

/// Errors raised by the orchestrator.
#[derive(Debug, Error)]
pub enum TasksError {
    /// A task with this id was already registered.
    #[error("duplicate task id '{0}'")]
    DuplicateTaskId(String),
    /// No processor is registered for the given `(kind, version)`.
    #[error("no processor registered for '{kind}:{version}'")]
    MissingProcessor {
        /// The task's kind.
        kind: String,
        /// The task's version.
        version: String,
    },
    /// A task could not be found by its id.
    #[error("Task with task_id \"{0}\" NOT FOUND")]
    TaskNotFound(String),
    /// A name-based dependency matched no registered task.
    #[error("Dependant task \"{0}\" required, but NOT FOUND")]
    DependencyNotFound(String),
    /// A dependency matched a task that is out of processing scope.
    #[error("{dependant} depends on {dependency}, but {dependency} is out of processing scope")]
    DependencyOutOfScope {
        /// The id of the task whose dependency is out of scope.
        dependant: String,
        /// The id of the out-of-scope dependency.
        dependency: String,
    },
    /// A dependency cycle was detected while ordering tasks.
    #[error("dependency cycle at '{0}'")]
    Cycle(String),
    /// Hook dispatch failed.
    #[error(transparent)]
    Hooks(#[from] HooksError),
    /// A persistence operation failed.
    #[error(transparent)]
    Persistence(#[from] PersistenceError),
    /// The processing-scope identifier could not be built.
    #[error(transparent)]
    IdentifierContext(#[from] IdentifierContextError),
}

/// Builds the processing-scope identifier for `(command, context)`:
/// `ExecutionScope`/`"processing"` carrying `Environment` then `Command`
/// contexts, in that order.
///
/// # Errors
///
/// Returns [`IdentifierContextError`] if either argument is empty.
pub fn build_processing_identifier(command: &str, context: &str) -> Result<Identifier, IdentifierContextError> {
    let mut contexts = crate::core::IdentifierContexts::new();
    contexts.add(IdentifierContext::new("Environment", context)?);
    contexts.add(IdentifierContext::new("Command", command)?);
    Ok(Identifier::with_contexts("ExecutionScope", "processing", None, contexts))
}

/// Builds the default, always-failing error hook for `stage`.
fn default_error_hook(stage: TaskLifecycleStage) -> Hook {
    let name = format!("DEFAULT_{}_HOOK", stage.name());
    Hook::new(
        name.clone(),
        vec![],
        vec![],
        crate::core::TaskLifecycleStages::of([stage]),
        Box::new(move |hook_name, _task, kv, _command, _context, _stage, extra, logger| {
            let _ = kv;
            let generic_message = format!("{hook_name}: unrecoverable task lifecycle error");
            let mut display_message = generic_message.clone();
            if let Some(exception_message) = &extra.exception_message {
                logger.error(&generic_message);
                display_message = exception_message.clone();
            }
            if let Some(traceback) = &extra.traceback {
                return Err(HookError::Source(Arc::clone(traceback)));
            }
            Err(HookError::Failed(display_message))
        }),
    )
}

/// Incrementally builds a [`Tasks`] orchestrator, allowing user hooks to be
/// registered before the default error hooks are installed.
///
/// Installing defaults last lets a caller pre-empt a given stage's default
/// by registering their own hook under that stage before calling
/// [`TasksBuilder::build`]; [`Hooks`] dedups by name and the default
/// installer only adds a hook for stages with no existing match (mirroring
/// an `any_hook_exists` gate), so a caller-supplied hook always wins.
pub struct TasksBuilder {
    persistence: Arc<dyn StatePersistence + Send + Sync>,
    logger: Arc<dyn Logger + Send + Sync>,
    hooks: Hooks,
}

impl TasksBuilder {
    /// Starts a builder backed by `persistence` and `logger`.
    #[must_use]
    pub fn new(persistence: Arc<dyn StatePersistence + Send + Sync>, logger: Arc<dyn Logger + Send + Sync>) -> Self {
        Self {
            persistence,
            logger,
            hooks: Hooks::new(),
        }
    }

    /// Registers a user hook before the defaults are installed.
    #[must_use]
    pub fn hook(mut self, hook: Hook) -> Self {
        self.hooks.register(hook);
        self
    }

    /// Finalizes the orchestrator: installs default error hooks for any
    /// error stage not already covered, then reloads persisted state.
    ///
    /// # Errors
    ///
    /// Returns [`TasksError::Persistence`] if the initial reload fails.
    pub fn build(mut self) -> Result<Tasks, TasksError> {
        for stage in crate::core::TaskLifecycleStage::ALL.into_iter().filter(TaskLifecycleStage::is_error) {
            if !self.hooks.any_hook_exists("NOT_APPLICABLE", "ALL", stage) {
                self.hooks.register(default_error_hook(stage));
            }
        }
        self.persistence.retrieve_all_state_from_persistence()?;
        Ok(Tasks {
            persistence: self.persistence,
            logger: self.logger,
            hooks: self.hooks,
            manifests: Vec::new(),
            processor_lookup: BTreeMap::new(),
            processors: BTreeMap::new(),
            run_state: KeyValueStore::new(),
        })
    }
}

/// The task manifest and processor registry, dependency resolver, and run
/// driver.
pub struct Tasks {
    /// Shared persistence backend.
    persistence: Arc<dyn StatePersistence + Send + Sync>,
    /// Shared log sink.
    logger: Arc<dyn Logger + Send + Sync>,
    /// Lifecycle hook registry.
    hooks: Hooks,
    /// Registered manifests, in registration order.
    manifests: Vec<Task>,
    /// `kind:version` -> composite processor id.
    processor_lookup: BTreeMap<String, String>,
    /// Composite processor id -> processor.
    processors: BTreeMap<String, Box<dyn TaskProcessor + Send + Sync>>,
    /// Run-key bookkeeping for the pre-processing gate, keyed by
    /// `PROCESSING_TASK:<task_id>:<command>:<context>`. Persists across
    /// tasks within a single [`Tasks::process`] call and across repeated
    /// calls, so re-running the same `(command, context)` finds the
    /// markers already at `2` and skips re-processing.
    run_state: KeyValueStore,
}

impl Tasks {
    /// Builds an orchestrator with no pre-registered hooks.
    ///
    /// # Errors
    ///
    /// Returns [`TasksError::Persistence`] if the initial reload fails.
    pub fn new(persistence: Arc<dyn StatePersistence + Send + Sync>, logger: Arc<dyn Logger + Send + Sync>) -> Result<Self, TasksError> {
        TasksBuilder::new(persistence, logger).build()
    }

    /// Returns the number of registered manifests.
    #[must_use]
    pub fn task_count(&self) -> usize {
        self.manifests.len()
    }

    /// Returns the manifest with the given `task_id`, if registered.
    #[must_use]
    pub fn get_task_by_task_id(&self, task_id: &str) -> Option<&Task> {
        self.manifests.iter().find(|task| task.task_id() == task_id)
    }

    /// Registers a processor, mapping each of its supported versions to a
    /// composite `kind:v1:v2:...` id.
    pub fn register_task_processor(&mut self, processor: Box<dyn TaskProcessor + Send + Sync>) {
        let composite_id = processor.composite_id();
        for version in processor.versions() {
            self.processor_lookup.insert(format!("{}:{version}", processor.kind()), composite_id.clone());
        }
        self.processors.insert(composite_id, processor);
    }

    /// Registers a task manifest.
    ///
    /// Order of operations: fire `TASK_PRE_REGISTER`; if no processor is
    /// registered for the task's `(kind, version)`, fire
    /// `TASK_REGISTERED_ERROR` (the default hook raises, aborting
    /// registration unless a user hook suppresses it); reject a duplicate
    /// `task_id`; store the task and fire `TASK_REGISTERED`.
    ///
    /// # Errors
    ///
    /// Returns [`TasksError::DuplicateTaskId`] if the id is already
    /// registered, [`TasksError::Hooks`] if an unhandled hook error
    /// propagates, or [`TasksError::Persistence`] if logging state fails.
    pub fn add_task(&mut self, task: Task) -> Result<(), TasksError> {
        self.fire_registration_hook(TaskLifecycleStage::TaskPreRegister, &task)?;

        let composite_id = format!("{}:{}", task.kind(), task.version());
        if !self.processor_lookup.contains_key(&composite_id) {
            self.logger.warning(&format!("no processor registered for '{composite_id}'"));
            let extra = ExtraParameters::for_failure(HookError::Failed(format!(
                "no processor registered for task kind '{}' version '{}'",
                task.kind(),
                task.version()
            )));
            self.hooks
                .process_hook(
                    "NOT_APPLICABLE",
                    "ALL",
                    TaskLifecycleStage::TaskRegisteredError,
                    KeyValueStore::new(),
                    &task,
                    &extra,
                    self.logger.as_ref(),
                )
                .map_err(|_| TasksError::MissingProcessor {
                    kind: task.kind().to_string(),
                    version: task.version().to_string(),
                })?;
        }

        if self.get_task_by_task_id(task.task_id()).is_some() {
            return Err(TasksError::DuplicateTaskId(task.task_id().to_string()));
        }

        self.fire_registration_hook(TaskLifecycleStage::TaskRegistered, &task)?;
        self.manifests.push(task);
        Ok(())
    }

    /// Fires a registration-time hook: no `(command, context)` scope
    /// applies, so hooks dispatch under the wildcard pair.
    fn fire_registration_hook(&self, stage: TaskLifecycleStage, task: &Task) -> Result<(), TasksError> {
        self.hooks.process_hook(
            "NOT_APPLICABLE",
            "ALL",
            stage,
            KeyValueStore::new(),
            task,
            &ExtraParameters::none(),
            self.logger.as_ref(),
        )?;
        Ok(())
    }

    /// Computes the dependency-respecting execution order for the given
    /// processing-scope identifier, deduplicated by first occurrence.
    ///
    /// # Errors
    ///
    /// Returns [`TasksError::DependencyNotFound`],
    /// [`TasksError::DependencyOutOfScope`], or [`TasksError::Cycle`] per
    /// the rules in this module's overview.
    pub fn compute_order(&self, processing_identifier: &Identifier) -> Result<Vec<String>, TasksError> {
        let mut order: Vec<String> = Vec::new();
        let mut in_progress: HashSet<String> = HashSet::new();
        for task in &self.manifests {
            if task.task_qualifies_for_processing(processing_identifier) && !order.contains(&task.task_id().to_string()) {
                self.emit(task, processing_identifier, &mut order, &mut in_progress)?;
            }
        }
        Ok(order)
    }

    /// Recursively resolves one task's dependencies into `order`, then
    /// appends the task itself. A dependant is itself emitted through this
    /// same call (not merely appended), so a dependency cycle is caught by
    /// `in_progress` rather than left unreachable.
    fn emit(
        &self,
        task: &Task,
        processing_identifier: &Identifier,
        order: &mut Vec<String>,
        in_progress: &mut HashSet<String>,
    ) -> Result<(), TasksError> {
        if order.contains(&task.task_id().to_string()) {
            return Ok(());
        }
        if !in_progress.insert(task.task_id().to_string()) {
            return Err(TasksError::Cycle(task.task_id().to_string()));
        }

        for dependency in task.task_dependencies() {
            let matches: Vec<&Task> = self
                .manifests
                .iter()
                .filter(|candidate| candidate.match_name_or_label_identifier(dependency))
                .collect();

            if dependency.identifier_type() == "ManifestName" && matches.is_empty() {
                return Err(TasksError::DependencyNotFound(dependency.key().to_string()));
            }

            for dependant in matches {
                if order.contains(&dependant.task_id().to_string()) {
                    continue;
                }
                if !dependant.task_qualifies_for_processing(processing_identifier) {
                    return Err(TasksError::DependencyOutOfScope {
                        dependant: task.task_id().to_string(),
                        dependency: dependant.task_id().to_string(),
                    });
                }
                self.emit(dependant, processing_identifier, order, in_progress)?;
            }
        }

        if !order.contains(&task.task_id().to_string()) {
            order.push(task.task_id().to_string());
        }
        in_progress.remove(task.task_id());
        Ok(())
    }

    /// Runs every eligible task for `(command, context)` in dependency
    /// order.
    ///
    /// # Errors
    ///
    /// Returns [`TasksError`] if ordering fails or a task's lifecycle
    /// hooks abort the run.
    pub fn process(&mut self, command: &str, context: &str) -> Result<(), TasksError> {
        let processing_identifier = build_processing_identifier(command, context)?;
        let order = self.compute_order(&processing_identifier)?;
        self.logger.info(&format!("processing {} task(s) for {command}/{context}", order.len()));

        for task_id in order {
            let Some(task) = self.get_task_by_task_id(&task_id).cloned() else {
                continue;
            };

            self.hooks.process_hook(
                command,
                context,
                TaskLifecycleStage::TaskPreProcessingStart,
                KeyValueStore::new(),
                &task,
                &ExtraParameters::none(),
                self.logger.as_ref(),
            )?;

            let Some(composite_id) = self.processor_lookup.get(&format!("{}:{}", task.kind(), task.version())).cloned() else {
                self.logger.warning(&format!("no processor found for '{}', skipping", task.task_id()));
                continue;
            };
            let Some(processor) = self.processors.get(&composite_id) else {
                self.logger.warning(&format!("processor '{composite_id}' missing from registry, skipping"));
                continue;
            };

            let mut run_state = std::mem::take(&mut self.run_state);
            let check_result = self.run_pre_processing_check(processor.as_ref(), &task, command, context, &mut run_state);
            self.run_state = run_state;
            check_result?;
            self.persistence.persist_all_state()?;

            self.hooks.process_hook(
                command,
                context,
                TaskLifecycleStage::TaskProcessingPostDone,
                KeyValueStore::new(),
                &task,
                &ExtraParameters::none(),
                self.logger.as_ref(),
            )?;
        }
        Ok(())
    }

    /// Runs the pre-processing gate for a single task: a run-key state
    /// machine over `PROCESSING_TASK:<task_id>:<command>:<context>` with
    /// values `1` (ready), `2` (succeeded), `-1` (failed).
    ///
    /// `run_state` is the orchestrator's persistent `run_state` store,
    /// threaded in by the caller so the run-key markers it sets survive
    /// across tasks within one [`Tasks::process`] call and across repeated
    /// calls: a second run of the same `(command, context)` finds the
    /// marker already at `2` and is a no-op.
    fn run_pre_processing_check(
        &self,
        processor: &(dyn TaskProcessor + Send + Sync),
        task: &Task,
        command: &str,
        context: &str,
        run_state: &mut KeyValueStore,
    ) -> Result<(), TasksError> {
        let run_key = format!("PROCESSING_TASK:{}:{command}:{context}", task.task_id());
        let mut kv = run_state.clone();

        let freshly_set = if kv.contains_key(&run_key) {
            false
        } else {
            kv.set(&run_key, 1);
            true
        };

        if freshly_set {
            kv = self.hooks.process_hook(
                command,
                context,
                TaskLifecycleStage::TaskPreProcessingCompleted,
                kv,
                task,
                &ExtraParameters::none(),
                self.logger.as_ref(),
            )?;
        }

        if kv.get(&run_key).and_then(serde_json::Value::as_i64) == Some(1) {
            kv = self.hooks.process_hook(
                command,
                context,
                TaskLifecycleStage::TaskProcessingPreStart,
                kv,
                task,
                &ExtraParameters::none(),
                self.logger.as_ref(),
            )?;

            match processor.process_task(task, command, context, kv.clone(), self.persistence.as_ref()) {
                Ok(updated) => {
                    kv = updated;
                    kv.set(&run_key, 2);
                    kv = self.hooks.process_hook(
                        command,
                        context,
                        TaskLifecycleStage::TaskPreProcessingCompleted,
                        kv,
                        task,
                        &ExtraParameters::none(),
                        self.logger.as_ref(),
                    )?;
                }
                Err(error) => {
                    kv.set(&run_key, -1);
                    self.logger.error(&format!("task '{}' processing failed: {error}", task.task_id()));
                    let extra = ExtraParameters::for_failure(HookError::Failed(error.to_string()));
                    kv = self.hooks.process_hook(
                        command,
                        context,
                        TaskLifecycleStage::TaskPreProcessingCompletedError,
                        kv,
                        task,
                        &extra,
                        self.logger.as_ref(),
                    )?;
                }
            }
        } else {
            self.logger.warning(&format!("task '{}' already processed for {command}/{context}", task.task_id()));
        }
        *run_state = kv;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::expect_used, reason = "Unit tests use expect for setup clarity.")]

    use super::*;
    use crate::interfaces::NullLogger;
    use serde_json::json;
    use std::collections::BTreeMap as StdBTreeMap;
    use std::sync::Mutex;

    #[derive(Default)]
    struct StubPersistence {
        saved: Mutex<StdBTreeMap<String, StdBTreeMap<String, serde_json::Value>>>,
    }

    impl StatePersistence for StubPersistence {
        fn retrieve_all_state_from_persistence(&self) -> Result<(), PersistenceError> {
            Ok(())
        }

        fn get_object_state(&self, id: &str, _refresh_if_missing: bool) -> Result<Option<StdBTreeMap<String, serde_json::Value>>, PersistenceError> {
            Ok(self.saved.lock().map_err(|_| PersistenceError::Backend("poisoned".to_string()))?.get(id).cloned())
        }

        fn save_object_state(&self, id: &str, data: StdBTreeMap<String, serde_json::Value>) -> Result<(), PersistenceError> {
            self.saved.lock().map_err(|_| PersistenceError::Backend("poisoned".to_string()))?.insert(id.to_string(), data);
            Ok(())
        }

        fn persist_all_state(&self) -> Result<(), PersistenceError> {
            Ok(())
        }
    }

    struct EchoProcessor {
        kind: String,
        versions: Vec<String>,
        commands: Vec<String>,
        fails: bool,
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
        ) -> Result<KeyValueStore, crate::interfaces::ProcessorError> {
            if self.fails {
                return Err(crate::interfaces::ProcessorError::Failed("processor boom".into()));
            }
            Ok(kv)
        }
    }

    fn echo_processor(kind: &str) -> Box<dyn TaskProcessor + Send + Sync> {
        Box::new(EchoProcessor {
            kind: kind.to_string(),
            versions: vec!["v1".to_string()],
            commands: vec!["apply".to_string()],
            fails: false,
        })
    }

    fn named_task(kind: &str, name: &str) -> Task {
        Task::new(
            kind,
            "v1",
            json!({}),
            json!({"identifiers": [{"type": "ManifestName", "key": name}]}),
        )
        .expect("valid task")
    }

    fn new_tasks() -> Tasks {
        Tasks::new(Arc::new(StubPersistence::default()), Arc::new(NullLogger)).expect("orchestrator builds")
    }

    #[test]
    fn registering_a_task_without_a_processor_fails() {
        let mut tasks = new_tasks();
        let result = tasks.add_task(named_task("Unknown", "t1"));
        assert!(matches!(result, Err(TasksError::MissingProcessor { .. })));
    }

    #[test]
    fn duplicate_task_id_is_rejected() {
        let mut tasks = new_tasks();
        tasks.register_task_processor(echo_processor("Kind"));
        tasks.add_task(named_task("Kind", "t1")).expect("first registration succeeds");
        let result = tasks.add_task(named_task("Kind", "t1"));
        assert!(matches!(result, Err(TasksError::DuplicateTaskId(_))));
    }

    #[test]
    fn missing_named_dependency_fails_with_exact_message() {
        let mut tasks = new_tasks();
        tasks.register_task_processor(echo_processor("Kind"));
        let metadata = json!({
            "identifiers": [{"type": "ManifestName", "key": "dependant"}],
            "dependencies": [{"identifierType": "ManifestName", "identifiers": [{"key": "ghost"}]}],
        });
        let task = Task::new("Kind", "v1", json!({}), metadata).expect("valid task");
        tasks.add_task(task).expect("registration succeeds");

        let processing_identifier = build_processing_identifier("apply", "default").expect("valid identifier");
        let error = tasks.compute_order(&processing_identifier).expect_err("missing dependency");
        assert_eq!(error.to_string(), "Dependant task \"ghost\" required, but NOT FOUND");
    }

    #[test]
    fn process_runs_registered_task_and_is_idempotent() {
        let mut tasks = new_tasks();
        tasks.register_task_processor(echo_processor("Kind"));
        tasks.add_task(named_task("Kind", "t1")).expect("registration succeeds");

        tasks.process("apply", "default").expect("first run succeeds");
        tasks.process("apply", "default").expect("second run is a no-op");
    }

    #[test]
    fn processor_failure_is_surfaced_through_default_error_hook() {
        let mut tasks = new_tasks();
        tasks.register_task_processor(Box::new(EchoProcessor {
            kind: "Kind".to_string(),
            versions: vec!["v1".to_string()],
            commands: vec!["apply".to_string()],
            fails: true,
        }));
        tasks.add_task(named_task("Kind", "t1")).expect("registration succeeds");
        let result = tasks.process("apply", "default");
        assert!(result.is_err());
    }
}
