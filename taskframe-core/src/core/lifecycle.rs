// src/core/lifecycle.rs
// ============================================================================
// Module: Task Lifecycle Stages
// Description: The finite set of lifecycle events a task passes through,
//              with mirrored error variants, and collections over them.
// ============================================================================

use thiserror::Error;

/// A point in a task's journey through registration and processing.
///
/// Success stages carry positive values; each has a mirrored error
/// variant carrying the negated value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i8)]
pub enum TaskLifecycleStage {
    /// About to register a task.
    TaskPreRegister = 1,
    /// Task registration failed.
    TaskPreRegisterError = -1,
    /// Task registration succeeded.
    TaskRegistered = 2,
    /// Task registration failed after the pre-register stage.
    TaskRegisteredError = -2,
    /// About to start pre-processing a task for a run.
    TaskPreProcessingStart = 3,
    /// Pre-processing start failed.
    TaskPreProcessingStartError = -3,
    /// Pre-processing completed (fires both before and after execution).
    TaskPreProcessingCompleted = 4,
    /// Pre-processing or execution failed.
    TaskPreProcessingCompletedError = -4,
    /// About to invoke the processor's `process_task`.
    TaskProcessingPreStart = 5,
    /// The pre-start stage failed.
    TaskProcessingPreStartError = -5,
    /// The task finished processing for this run.
    TaskProcessingPostDone = 6,
    /// The task failed to finish processing for this run.
    TaskProcessingPostDoneError = -6,
}

/// Errors raised by lifecycle stage operations.
#[derive(Debug, Error)]
pub enum LifecycleError {
    /// `error_stage` was called on a stage that is already an error stage.
    #[error("the provided stage is already an error stage")]
    AlreadyErrorStage,
}

impl TaskLifecycleStage {
    /// All twelve stages, success and error, in declaration order.
    pub const ALL: [TaskLifecycleStage; 12] = [
        Self::TaskPreRegister,
        Self::TaskPreRegisterError,
        Self::TaskRegistered,
        Self::TaskRegisteredError,
        Self::TaskPreProcessingStart,
        Self::TaskPreProcessingStartError,
        Self::TaskPreProcessingCompleted,
        Self::TaskPreProcessingCompletedError,
        Self::TaskProcessingPreStart,
        Self::TaskProcessingPreStartError,
        Self::TaskProcessingPostDone,
        Self::TaskProcessingPostDoneError,
    ];

    /// Returns the stage's signed value.
    #[must_use]
    pub const fn value(self) -> i8 {
        self as i8
    }

    /// Returns `true` if this is an error-variant stage.
    #[must_use]
    pub const fn is_error(self) -> bool {
        self.value() < 0
    }

    /// Returns a stable, uppercase-snake name, used to build default hook
    /// names and for log messages.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::TaskPreRegister => "TASK_PRE_REGISTER",
            Self::TaskPreRegisterError => "TASK_PRE_REGISTER_ERROR",
            Self::TaskRegistered => "TASK_REGISTERED",
            Self::TaskRegisteredError => "TASK_REGISTERED_ERROR",
            Self::TaskPreProcessingStart => "TASK_PRE_PROCESSING_START",
            Self::TaskPreProcessingStartError => "TASK_PRE_PROCESSING_START_ERROR",
            Self::TaskPreProcessingCompleted => "TASK_PRE_PROCESSING_COMPLETED",
            Self::TaskPreProcessingCompletedError => "TASK_PRE_PROCESSING_COMPLETED_ERROR",
            Self::TaskProcessingPreStart => "TASK_PROCESSING_PRE_START",
            Self::TaskProcessingPreStartError => "TASK_PROCESSING_PRE_START_ERROR",
            Self::TaskProcessingPostDone => "TASK_PROCESSING_POST_DONE",
            Self::TaskProcessingPostDoneError => "TASK_PROCESSING_POST_DONE_ERROR",
        }
    }

    /// Looks up a stage by its signed value.
    #[must_use]
    pub fn from_value(value: i8) -> Option<Self> {
        Self::ALL.into_iter().find(|stage| stage.value() == value)
    }

    /// Returns the mirrored error stage for a success stage.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::AlreadyErrorStage`] if `self` is already
    /// an error stage.
    pub fn error_stage(self) -> Result<Self, LifecycleError> {
        if self.is_error() {
            return Err(LifecycleError::AlreadyErrorStage);
        }
        Self::from_value(-self.value()).ok_or(LifecycleError::AlreadyErrorStage)
    }
}

/// A collection of [`TaskLifecycleStage`] values, used by a [`Hook`] to
/// record which stages it triggers on.
///
/// [`Hook`]: crate::runtime::hook::Hook
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskLifecycleStages {
    stages: Vec<TaskLifecycleStage>,
}

impl TaskLifecycleStages {
    /// Builds a collection containing all twelve stages.
    #[must_use]
    pub fn all() -> Self {
        Self {
            stages: TaskLifecycleStage::ALL.to_vec(),
        }
    }

    /// Builds an empty collection.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Builds a collection containing exactly the given stages.
    #[must_use]
    pub fn of(stages: impl IntoIterator<Item = TaskLifecycleStage>) -> Self {
        let mut collection = Self::empty();
        for stage in stages {
            collection.register(stage);
        }
        collection
    }

    /// Adds `stage` to the collection if not already present.
    pub fn register(&mut self, stage: TaskLifecycleStage) {
        if !self.contains(stage) {
            self.stages.push(stage);
        }
    }

    /// Returns `true` if `stage` is in the collection.
    #[must_use]
    pub fn contains(&self, stage: TaskLifecycleStage) -> bool {
        self.stages.iter().any(|existing| *existing == stage)
    }

    /// Returns the number of stages in the collection.
    #[must_use]
    pub fn len(&self) -> usize {
        self.stages.len()
    }

    /// Returns `true` if the collection holds no stages.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Iterates over the stages.
    pub fn iter(&self) -> impl Iterator<Item = &TaskLifecycleStage> {
        self.stages.iter()
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::expect_used, reason = "Unit tests use expect for setup clarity.")]

    use super::*;

    #[test]
    fn error_stage_negates_value() {
        let stage = TaskLifecycleStage::TaskRegistered;
        let error = stage.error_stage().expect("success stage");
        assert_eq!(error, TaskLifecycleStage::TaskRegisteredError);
    }

    #[test]
    fn error_stage_on_error_stage_fails() {
        let stage = TaskLifecycleStage::TaskRegisteredError;
        assert!(stage.error_stage().is_err());
    }

    #[test]
    fn stages_collection_dedups() {
        let mut stages = TaskLifecycleStages::empty();
        stages.register(TaskLifecycleStage::TaskRegistered);
        stages.register(TaskLifecycleStage::TaskRegistered);
        assert_eq!(stages.len(), 1);
    }
}
