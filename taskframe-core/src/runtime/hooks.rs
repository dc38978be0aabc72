// src/runtime/hooks.rs
// ============================================================================
// Module: Hooks Registry
// Description: Insertion-deduplicated-by-name collection of Hook, with the
//              dispatch and error-stage recursion logic.
// Purpose: Centralize lifecycle observation/reaction for the orchestrator.
// Dependencies: crate::core, crate::interfaces::logger, crate::runtime::hook
// ============================================================================

//! ## Overview
//! Hooks are matched and invoked in registration order. A success-stage
//! hook's failure triggers a recursive dispatch into the matching
//! error-stage hooks; an error-stage hook's own failure is only logged,
//! to avoid unbounded recursion.

use thiserror::Error;

use crate::core::KeyValueStore;
use crate::core::Task;
use crate::core::TaskLifecycleStage;
use crate::interfaces::Logger;
use crate::runtime::hook::ExtraParameters;
use crate::runtime::hook::Hook;

/// Errors raised by [`Hooks::process_hook`].
#[derive(Debug, Error)]
pub enum HooksError {
    /// At least one matching hook raised; processing is aborted.
    #[error("Hook processing failed. Aborting.")]
    Aborted,
}

/// An insertion-ordered, name-deduplicated registry of [`Hook`] values.
#[derive(Default)]
pub struct Hooks {
    /// Registered hooks, in registration order.
    hooks: Vec<Hook>,
}

impl Hooks {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `hook` unless a hook with the same name is already
    /// present, in which case the registration is silently ignored.
    ///
    /// Returns `true` if the hook was registered.
    pub fn register(&mut self, hook: Hook) -> bool {
        if self.hooks.iter().any(|existing| existing.name() == hook.name()) {
            return false;
        }
        self.hooks.push(hook);
        true
    }

    /// Returns `true` if any registered hook applies to
    /// `(command, context, stage)`.
    #[must_use]
    pub fn any_hook_exists(&self, command: &str, context: &str, stage: TaskLifecycleStage) -> bool {
        self.hooks.iter().any(|hook| hook.hook_applies(command, context, stage))
    }

    /// Dispatches `(command, context, stage)` to every matching hook, in
    /// registration order, threading the returned store through each.
    ///
    /// `extra` is forwarded to each matching hook unchanged; pass
    /// [`ExtraParameters::none`] for an ordinary success-stage dispatch,
    /// and a failure-carrying value when re-dispatching into an
    /// error stage.
    ///
    /// On a success-stage (`stage.value() > 0`) hook failure, recursively
    /// dispatches to the matching error-stage hooks with
    /// `command = "NOT_APPLICABLE"`, `context = "ALL"`. An error-stage
    /// hook's own failure is logged but not recursed into further.
    ///
    /// # Errors
    ///
    /// Returns [`HooksError::Aborted`] if any matching hook failed.
    #[allow(clippy::too_many_arguments, reason = "Mirrors the dispatch triple plus task context and the error side-channel.")]
    pub fn process_hook(
        &self,
        command: &str,
        context: &str,
        stage: TaskLifecycleStage,
        kv: KeyValueStore,
        task: &Task,
        extra: &ExtraParameters,
        logger: &dyn Logger,
    ) -> Result<KeyValueStore, HooksError> {
        let mut current = kv;
        let mut any_failed = false;

        for hook in self.hooks.iter().filter(|hook| hook.hook_applies(command, context, stage)) {
            match hook.process_hook(task, &current, command, context, stage, extra, logger) {
                Ok(next) => current = next,
                Err(error) => {
                    any_failed = true;
                    logger.error(&format!("hook '{}' raised during {}: {error}", hook.name(), stage.name()));
                    if stage.value() > 0 {
                        if let Ok(error_stage) = stage.error_stage() {
                            let error_extra = ExtraParameters::for_failure(error);
                            let _ = self.process_hook("NOT_APPLICABLE", "ALL", error_stage, current.clone(), task, &error_extra, logger);
                        }
                    } else {
                        logger.error("error-stage hook failed; not recursing further");
                    }
                }
            }
        }

        if any_failed {
            return Err(HooksError::Aborted);
        }
        Ok(current)
    }
}
