// src/engine/runner.rs

//! Top-level concurrent launcher.

use futures::future::join_all;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::context::Context;
use crate::engine::executable::SharedExecutable;
use crate::errors::TaskError;

/// Runs a collection of executables concurrently.
///
/// No ordering is imposed between entries. Dependencies are honoured only
/// through each task's own `after` list; when two entries share a dependency
/// instance, its run-once guard makes the second resolver wait for and reuse
/// the first one's outcome.
#[derive(Default)]
pub struct Runner {
    tasks: Vec<SharedExecutable>,
}

impl Runner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append top-level entries. May be called any number of times before `run`.
    pub fn add<I>(&mut self, tasks: I) -> &mut Self
    where
        I: IntoIterator<Item = SharedExecutable>,
    {
        self.tasks.extend(tasks);
        self
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn task_names(&self) -> impl Iterator<Item = &str> {
        self.tasks.iter().map(|t| t.name())
    }

    /// Run every entry on its own Tokio task and wait for all of them.
    ///
    /// Returns the first error drained from the error queue. With several
    /// concurrent failures, which one that is depends on queue order, not on
    /// which failure happened first in time.
    ///
    /// If the context is done before all workers finish, the context error is
    /// returned right away; the workers keep running in the background. A
    /// context that is already done when `run` is called launches nothing.
    pub async fn run(&self, ctx: &Context) -> Result<(), TaskError> {
        if self.tasks.is_empty() {
            debug!("runner has no tasks; nothing to do");
            return Ok(());
        }

        if let Some(err) = ctx.err() {
            warn!(error = %err, "context already done; runner launches nothing");
            return Err(err.into());
        }

        info!(tasks = self.tasks.len(), "runner starting");

        // Sized to the task count so no worker ever blocks on a full queue.
        let (err_tx, mut err_rx) = mpsc::channel::<TaskError>(self.tasks.len());

        let handles: Vec<_> = self
            .tasks
            .iter()
            .cloned()
            .map(|task| {
                let err_tx = err_tx.clone();
                let ctx = ctx.clone();
                tokio::spawn(async move {
                    if let Err(err) = task.run(&ctx, None).await {
                        warn!(task = %task.name(), error = %err, "top-level task failed");
                        let queued = err_tx.try_send(err);
                        debug_assert!(queued.is_ok(), "error queue sized to the task count");
                    }
                })
            })
            .collect();
        drop(err_tx);

        // Join first: a barrier that has already completed wins over a
        // context that became done at the same time.
        let joined = tokio::select! {
            biased;
            joined = join_all(handles) => joined,
            err = ctx.done() => {
                warn!(error = %err, "context done while waiting for runner workers");
                return Err(err.into());
            }
        };

        if let Ok(err) = err_rx.try_recv() {
            return Err(err);
        }

        // A worker that panicked never reported through the queue.
        let panicked = self
            .tasks
            .iter()
            .zip(joined.iter())
            .find(|(_, joined)| joined.is_err());
        if let Some((task, _)) = panicked {
            warn!(task = %task.name(), "runner worker panicked");
            return Err(TaskError::Panicked {
                task: task.name().to_string(),
            });
        }

        info!("runner finished without errors");
        Ok(())
    }
}

impl std::fmt::Debug for Runner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runner")
            .field("tasks", &self.task_names().collect::<Vec<_>>())
            .finish()
    }
}
