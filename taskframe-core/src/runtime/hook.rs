// src/runtime/hook.rs
// ============================================================================
// Module: Hook
// Description: A named callback matched on command x context x lifecycle
//              stage, invoked with a private copy of the run's shared state.
// Purpose: Let callers observe or react to orchestrator transitions without
//          the orchestrator depending on any specific reaction.
// Dependencies: crate::core, crate::interfaces::logger
// ============================================================================

//! ## Overview
//! A [`Hook`] normalizes its command/context match lists at construction
//! (case folding, wildcard collapse) so that matching at dispatch time is a
//! simple case-insensitive membership test.

use std::sync::Arc;

use thiserror::Error;

use crate::core::KeyValueStore;
use crate::core::Task;
use crate::core::TaskLifecycleStage;
use crate::core::TaskLifecycleStages;
use crate::interfaces::Logger;

const WILDCARD_COMMAND: &str = "not_applicable";
const WILDCARD_CONTEXT: &str = "all";

/// Errors raised by a hook's callable.
#[derive(Debug, Error)]
pub enum HookError {
    /// The callable failed with a message; no original error is carried.
    #[error("{0}")]
    Failed(String),
    /// The callable failed, wrapping a shared handle to the error that
    /// caused it (shared so the same instance can be re-raised by a
    /// downstream error hook without requiring the error type to be
    /// `Clone`).
    #[error("{0}")]
    Source(Arc<dyn std::error::Error + Send + Sync>),
}

/// Side-channel data passed to a hook alongside the stage it's firing for.
///
/// When a success-stage hook fails, the orchestrator fires the matching
/// error-stage hook with `traceback` set to the failure and
/// `exception_message` set to its display text. The default error hook
/// re-raises `traceback` directly when present, so callers that want to
/// inspect the original failure do not have to parse `exception_message`.
#[derive(Default)]
pub struct ExtraParameters {
    /// The original error that triggered this error-stage hook, if any.
    pub traceback: Option<Arc<dyn std::error::Error + Send + Sync>>,
    /// A display-text summary of the failure, if any.
    pub exception_message: Option<String>,
}

impl ExtraParameters {
    /// Builds an empty set of extra parameters.
    #[must_use]
    pub fn none() -> Self {
        Self::default()
    }

    /// Builds extra parameters describing a failure.
    #[must_use]
    pub fn for_failure(cause: HookError) -> Self {
        let exception_message = Some(cause.to_string());
        Self {
            traceback: Some(Arc::new(cause)),
            exception_message,
        }
    }
}

/// A hook's callable: observes or reacts to a lifecycle transition.
///
/// Receives a private, deep-copied [`KeyValueStore`]; its return value
/// becomes the orchestrator's working copy on success.
pub type HookFn = dyn Fn(
        &str,
        &Task,
        KeyValueStore,
        &str,
        &str,
        TaskLifecycleStage,
        &ExtraParameters,
        &dyn Logger,
    ) -> Result<KeyValueStore, HookError>
    + Send
    + Sync;

/// A named callback matched on `(command, context, lifecycle stage)`.
pub struct Hook {
    /// The hook's name, used for registry dedup and default-hook naming.
    name: String,
    /// Normalized, lowercased command match list.
    commands: Vec<String>,
    /// Normalized, lowercased context match list.
    contexts: Vec<String>,
    /// The lifecycle stages this hook fires on.
    stages: TaskLifecycleStages,
    /// The callback invoked on a match.
    callable: Box<HookFn>,
}

impl Hook {
    /// Builds a hook.
    ///
    /// `commands` and `contexts` are lowercased and wildcard-normalized:
    /// an empty list becomes a single wildcard entry, and any explicit
    /// `"all"` entry (case-insensitive) collapses the whole list to just
    /// the wildcard.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        commands: Vec<String>,
        contexts: Vec<String>,
        stages: TaskLifecycleStages,
        callable: Box<HookFn>,
    ) -> Self {
        Self {
            name: name.into(),
            commands: normalize(commands, WILDCARD_COMMAND),
            contexts: normalize(contexts, WILDCARD_CONTEXT),
            stages,
            callable,
        }
    }

    /// Returns the hook's name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns `true` if this hook fires for `(command, context, stage)`.
    #[must_use]
    pub fn hook_applies(&self, command: &str, context: &str, stage: TaskLifecycleStage) -> bool {
        if !self.stages.contains(stage) {
            return false;
        }
        matches_list(&self.commands, command, WILDCARD_COMMAND) && matches_list(&self.contexts, context, WILDCARD_CONTEXT)
    }

    /// Invokes the hook if applicable, returning a deep copy of `kv` with
    /// the callable's effect applied.
    ///
    /// Returns an unchanged deep copy when the hook does not apply. On
    /// callable failure, logs and propagates the error.
    ///
    /// # Errors
    ///
    /// Returns whatever [`HookError`] the callable raised.
    pub fn process_hook(
        &self,
        task: &Task,
        kv: &KeyValueStore,
        command: &str,
        context: &str,
        stage: TaskLifecycleStage,
        extra: &ExtraParameters,
        logger: &dyn Logger,
    ) -> Result<KeyValueStore, HookError> {
        let default_return = kv.clone();
        if !self.hook_applies(command, context, stage) {
            return Ok(default_return);
        }
        match (self.callable)(&self.name, task, kv.clone(), command, context, stage, extra, logger) {
            Ok(store) => Ok(store),
            Err(error) => {
                logger.error(&format!("hook '{}' failed: {error}", self.name));
                Err(error)
            }
        }
    }
}

fn normalize(entries: Vec<String>, wildcard: &str) -> Vec<String> {
    if entries.is_empty() {
        return vec![wildcard.to_string()];
    }
    let lowered: Vec<String> = entries.iter().map(|entry| entry.to_lowercase()).collect();
    if lowered.iter().any(|entry| entry == "all") {
        return vec!["all".to_string()];
    }
    lowered
}

fn matches_list(entries: &[String], query: &str, wildcard: &str) -> bool {
    let query = query.to_lowercase();
    entries.iter().any(|entry| entry == wildcard || entry == "all" || *entry == query)
}
