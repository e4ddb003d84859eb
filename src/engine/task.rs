// src/engine/task.rs

//! Memoized unit of work with declared predecessors.

use std::any::type_name;
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex};

use futures::FutureExt;
use futures::future::BoxFuture;
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::context::Context;
use crate::engine::executable::{Executable, SharedExecutable};
use crate::engine::lock;
use crate::engine::value::Value;
use crate::errors::TaskError;
use crate::logger::{Logger, NoopLogger};

const NOT_STARTED: u8 = 0;
const IN_PROGRESS: u8 = 1;
const DONE: u8 = 2;

/// Boxed work function of a task.
pub type TaskFn<In, Out> =
    Arc<dyn Fn(Context, In) -> BoxFuture<'static, anyhow::Result<Out>> + Send + Sync>;

/// Cached result of a task run.
pub type Outcome<Out> = Result<Out, TaskError>;

/// A unit of work that runs at most once.
///
/// `Task` is a cheap handle: clones share the same run-once guard and the same
/// cached outcome. Dependencies are added with [`Task::after`] and resolved in
/// declaration order before the work function runs.
///
/// # Single-flight
///
/// The first call to [`Task::run`] claims the task; its input is the one the
/// work function sees. Every other call, concurrent or later, waits for that
/// execution and receives a clone of its outcome, **whatever input it passed**.
/// Task identity, not call arguments, determines the outcome.
pub struct Task<In, Out> {
    inner: Arc<TaskInner<In, Out>>,
}

struct TaskInner<In, Out> {
    name: String,
    func: TaskFn<In, Out>,
    depends: Mutex<Vec<SharedExecutable>>,
    logger: Mutex<Arc<dyn Logger>>,
    state: AtomicU8,
    outcome: watch::Sender<Option<Outcome<Out>>>,
}

impl<In, Out> Clone for Task<In, Out> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<In, Out> fmt::Debug for Task<In, Out> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("name", &self.inner.name)
            .field("state", &self.inner.state.load(Ordering::Acquire))
            .finish_non_exhaustive()
    }
}

impl<In, Out> Task<In, Out>
where
    In: Clone + Default + Send + 'static,
    Out: Clone + Send + Sync + 'static,
{
    /// Create a task from a name and an async work function.
    ///
    /// The task logs through [`NoopLogger`] until [`Task::with_logger`] is used.
    pub fn new<F, Fut>(name: impl Into<String>, func: F) -> Self
    where
        F: Fn(Context, In) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Out>> + Send + 'static,
    {
        let func: TaskFn<In, Out> = Arc::new(
            move |ctx: Context, input: In| -> BoxFuture<'static, anyhow::Result<Out>> {
                Box::pin(func(ctx, input))
            },
        );
        let (outcome, _) = watch::channel(None);

        Self {
            inner: Arc::new(TaskInner {
                name: name.into(),
                func,
                depends: Mutex::new(Vec::new()),
                logger: Mutex::new(Arc::new(NoopLogger)),
                state: AtomicU8::new(NOT_STARTED),
                outcome,
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Replace the diagnostic logger.
    pub fn with_logger(self, logger: impl Logger + 'static) -> Self {
        *lock(&self.inner.logger) = Arc::new(logger);
        self
    }

    /// Append dependencies. They run, in order, before this task's function.
    ///
    /// May be called repeatedly; dependencies accumulate. Calls made after the
    /// task has started are ignored.
    pub fn after<I>(self, deps: I) -> Self
    where
        I: IntoIterator<Item = SharedExecutable>,
    {
        if self.inner.state.load(Ordering::Acquire) != NOT_STARTED {
            warn!(
                task = %self.inner.name,
                "dependencies added after the task started are ignored"
            );
            return self;
        }
        lock(&self.inner.depends).extend(deps);
        self
    }

    /// This task as a shared [`Executable`], for dependency lists and runners.
    pub fn executable(&self) -> SharedExecutable {
        Arc::new(self.clone())
    }

    pub fn dependency_names(&self) -> Vec<String> {
        lock(&self.inner.depends)
            .iter()
            .map(|dep| dep.name().to_string())
            .collect()
    }

    pub fn is_done(&self) -> bool {
        self.inner.state.load(Ordering::Acquire) == DONE
    }

    /// The cached outcome, or `None` if the task has not finished yet.
    pub fn result(&self) -> Option<Outcome<Out>> {
        self.inner.outcome.borrow().clone()
    }

    /// Run the task (once) and return its outcome.
    ///
    /// `input` feeds the first dependency, or the work function directly when
    /// there are no dependencies. `None` becomes `In::default()`.
    ///
    /// The execution itself is spawned on the Tokio runtime, so it completes
    /// even if every caller stops waiting. See the type-level docs for the
    /// single-flight behaviour with differing inputs.
    pub async fn run(&self, ctx: &Context, input: Option<Value>) -> Outcome<Out> {
        let mut rx = self.inner.outcome.subscribe();

        if self.claim() {
            debug!(task = %self.inner.name, "task claimed; starting execution");
            let task = self.clone();
            let ctx = ctx.clone();
            tokio::spawn(async move {
                let outcome = match AssertUnwindSafe(task.execute(&ctx, input))
                    .catch_unwind()
                    .await
                {
                    Ok(outcome) => outcome,
                    Err(_) => {
                        warn!(task = %task.inner.name, "task function panicked");
                        Err(TaskError::Panicked {
                            task: task.inner.name.clone(),
                        })
                    }
                };
                task.finish(outcome);
            });
        }

        let settled = match rx.wait_for(Option::is_some).await {
            Ok(slot) => (*slot).clone(),
            Err(_) => None,
        };
        settled.unwrap_or_else(|| {
            Err(TaskError::Panicked {
                task: self.inner.name.clone(),
            })
        })
    }

    fn claim(&self) -> bool {
        self.inner
            .state
            .compare_exchange(NOT_STARTED, IN_PROGRESS, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    fn finish(&self, outcome: Outcome<Out>) {
        match &outcome {
            Ok(_) => debug!(task = %self.inner.name, "task succeeded"),
            Err(err) => debug!(task = %self.inner.name, error = %err, "task failed"),
        }
        self.inner.outcome.send_replace(Some(outcome));
        self.inner.state.store(DONE, Ordering::Release);
    }

    async fn execute(&self, ctx: &Context, input: Option<Value>) -> Outcome<Out> {
        let depends = lock(&self.inner.depends).clone();

        let mut current = input;
        for dep in depends.iter() {
            match dep.run(ctx, current.take()).await {
                Ok(output) => current = Some(output),
                Err(err) => {
                    self.log(&format!(
                        "task {} dependency {} failed: {err}",
                        self.inner.name,
                        dep.name()
                    ));
                    return Err(err);
                }
            }
        }

        let input = match current {
            None => In::default(),
            Some(value) => match value.get::<In>() {
                Some(input) => input,
                None => {
                    let err = TaskError::TypeMismatch {
                        task: self.inner.name.clone(),
                        expected: type_name::<In>(),
                        actual: value.type_name(),
                    };
                    self.log(&err.to_string());
                    return Err(err);
                }
            },
        };

        (self.inner.func)(ctx.clone(), input)
            .await
            .map_err(TaskError::from)
    }

    fn log(&self, message: &str) {
        let logger = Arc::clone(&lock(&self.inner.logger));
        logger.log(message);
    }
}

impl<In, Out> Executable for Task<In, Out>
where
    In: Clone + Default + Send + 'static,
    Out: Clone + Send + Sync + 'static,
{
    fn name(&self) -> &str {
        &self.inner.name
    }

    fn run<'a>(
        &'a self,
        ctx: &'a Context,
        input: Option<Value>,
    ) -> BoxFuture<'a, Result<Value, TaskError>> {
        Box::pin(async move { Task::run(self, ctx, input).await.map(Value::new) })
    }
}
