// src/engine/executable.rs

//! The minimal capability every runnable node implements.
//!
//! `Task`, the task produced by `FanOutTask::to_task`, and test doubles all
//! implement [`Executable`], so any of them can appear in a dependency list
//! or be handed to a `Runner`.

use std::sync::Arc;

use futures::future::BoxFuture;

use crate::context::Context;
use crate::engine::value::Value;
use crate::errors::TaskError;

/// Run given an input and a context, producing an output or a failure.
///
/// `input` is `None` when the caller has nothing to pass (the Runner always
/// starts top-level nodes this way).
pub trait Executable: Send + Sync {
    /// Diagnostic name; not required to be unique.
    fn name(&self) -> &str;

    fn run<'a>(
        &'a self,
        ctx: &'a Context,
        input: Option<Value>,
    ) -> BoxFuture<'a, Result<Value, TaskError>>;
}

/// Shared handle used for dependency lists and runner entries.
pub type SharedExecutable = Arc<dyn Executable>;
