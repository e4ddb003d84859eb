// src/errors.rs

//! Crate-wide error types.
//!
//! - [`TaskError`] is what the engine hands back from `Task`, `Runner`,
//!   `FanOutTask` and `retry`. It is `Clone` because a single cached outcome
//!   is returned to every caller of a memoized task.
//! - [`TaskflowError`] covers the application layer (config loading,
//!   validation, pipeline wiring).

use std::fmt;
use std::sync::Arc;

use thiserror::Error;

use crate::context::ContextError;

/// Failure of a task, fan-out stage, runner or retried operation.
#[derive(Error, Debug, Clone)]
pub enum TaskError {
    /// Error returned by a caller-supplied function, passed through verbatim.
    #[error("{0}")]
    Failed(Arc<anyhow::Error>),

    /// The value flowing into a task does not match its declared input type.
    #[error("task '{task}': input type mismatch: expected {expected}, got {actual}")]
    TypeMismatch {
        task: String,
        expected: &'static str,
        actual: &'static str,
    },

    /// The shared context was cancelled or its deadline passed.
    #[error(transparent)]
    Context(#[from] ContextError),

    /// A caller-supplied function panicked.
    #[error("task '{task}' panicked")]
    Panicked { task: String },
}

impl TaskError {
    /// Wrap an arbitrary error as a user-function failure.
    pub fn failed(err: impl Into<anyhow::Error>) -> Self {
        TaskError::Failed(Arc::new(err.into()))
    }

    /// Build a failure from a plain message.
    pub fn msg<M>(message: M) -> Self
    where
        M: fmt::Display + fmt::Debug + Send + Sync + 'static,
    {
        TaskError::Failed(Arc::new(anyhow::Error::msg(message)))
    }

    pub fn is_type_mismatch(&self) -> bool {
        matches!(self, TaskError::TypeMismatch { .. })
    }

    /// The context error, if this failure came from cancellation or a deadline.
    pub fn context_error(&self) -> Option<ContextError> {
        match self {
            TaskError::Context(err) => Some(*err),
            _ => None,
        }
    }

    /// Downcast a user-function failure to its concrete error type.
    pub fn downcast_ref<E>(&self) -> Option<&E>
    where
        E: fmt::Display + fmt::Debug + Send + Sync + 'static,
    {
        match self {
            TaskError::Failed(err) => err.downcast_ref::<E>(),
            _ => None,
        }
    }

    /// Whether two errors are the very same user failure (same allocation).
    ///
    /// Cached outcomes are cloned, not rebuilt, so every caller of a memoized
    /// task receives an error that is `same_failure` as the original.
    pub fn same_failure(&self, other: &TaskError) -> bool {
        match (self, other) {
            (TaskError::Failed(a), TaskError::Failed(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl From<anyhow::Error> for TaskError {
    /// Errors that already carry an engine class keep it, so a user function
    /// propagating `ctx.err()` with `?` still yields a context error.
    fn from(err: anyhow::Error) -> Self {
        let err = match err.downcast::<TaskError>() {
            Ok(task_err) => return task_err,
            Err(err) => err,
        };
        match err.downcast::<ContextError>() {
            Ok(ctx_err) => TaskError::Context(ctx_err),
            Err(err) => TaskError::Failed(Arc::new(err)),
        }
    }
}

/// Application-level errors (configuration, pipeline wiring).
#[derive(Error, Debug)]
pub enum TaskflowError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Task not found: {0}")]
    TaskNotFound(String),

    #[error("Cycle detected in task graph: {0}")]
    DagCycle(String),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error(transparent)]
    Task(#[from] TaskError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, TaskflowError>;
