// src/engine/fanout.rs

//! Fan-out / fan-in combinator.
//!
//! A [`FanOutTask`] describes a stage that, given its input, generates a
//! dynamic list of sub-operations, runs them all concurrently and reduces
//! their results with a fan-in function. [`FanOutTask::to_task`] packages the
//! whole stage as an ordinary [`Task`], so it can be a dependency of other
//! tasks or be handed to a `Runner`.

use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex};

use futures::future::{BoxFuture, join_all};
use tracing::{debug, warn};

use crate::context::Context;
use crate::engine::lock;
use crate::engine::task::Task;
use crate::errors::TaskError;

/// One generated sub-operation.
pub type SubTask<In, Out> =
    Box<dyn FnOnce(Context, In) -> BoxFuture<'static, anyhow::Result<Out>> + Send>;

type GenerateFn<In, Out> = Arc<
    dyn Fn(Context, Vec<In>) -> BoxFuture<'static, anyhow::Result<Vec<SubTask<In, Out>>>>
        + Send
        + Sync,
>;

type FanInFn<Out> =
    Arc<dyn Fn(Context, Vec<Out>) -> BoxFuture<'static, anyhow::Result<Out>> + Send + Sync>;

/// Box an async closure into a [`SubTask`].
pub fn sub_task<In, Out, F, Fut>(f: F) -> SubTask<In, Out>
where
    F: FnOnce(Context, In) -> Fut + Send + 'static,
    Fut: Future<Output = anyhow::Result<Out>> + Send + 'static,
{
    Box::new(move |ctx: Context, input: In| -> BoxFuture<'static, anyhow::Result<Out>> {
        Box::pin(f(ctx, input))
    })
}

pub struct FanOutTask<In, Out> {
    name: String,
    generate: GenerateFn<In, Out>,
    fan_in: FanInFn<Out>,
}

impl<In, Out> fmt::Debug for FanOutTask<In, Out> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FanOutTask")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

impl<In, Out> FanOutTask<In, Out>
where
    In: Clone + Default + Send + 'static,
    Out: Clone + Send + Sync + 'static,
{
    /// `generate` receives the stage input and returns the sub-operations;
    /// `fan_in` receives their results in generation order.
    pub fn new<G, GFut, F, FFut>(name: impl Into<String>, generate: G, fan_in: F) -> Self
    where
        G: Fn(Context, Vec<In>) -> GFut + Send + Sync + 'static,
        GFut: Future<Output = anyhow::Result<Vec<SubTask<In, Out>>>> + Send + 'static,
        F: Fn(Context, Vec<Out>) -> FFut + Send + Sync + 'static,
        FFut: Future<Output = anyhow::Result<Out>> + Send + 'static,
    {
        let generate: GenerateFn<In, Out> = Arc::new(
            move |ctx: Context,
                  input: Vec<In>|
                  -> BoxFuture<'static, anyhow::Result<Vec<SubTask<In, Out>>>> {
                Box::pin(generate(ctx, input))
            },
        );
        let fan_in: FanInFn<Out> = Arc::new(
            move |ctx: Context, results: Vec<Out>| -> BoxFuture<'static, anyhow::Result<Out>> {
                Box::pin(fan_in(ctx, results))
            },
        );

        Self {
            name: name.into(),
            generate,
            fan_in,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Build a fresh task running the whole fan-out stage.
    ///
    /// 1. `generate` is called with the task input; its error aborts the stage.
    /// 2. Every sub-operation runs on its own Tokio task with `In::default()`.
    /// 3. Results land at their generation index; the first error wins.
    /// 4. On any error `fan_in` is skipped, otherwise it reduces the results.
    ///
    /// If the context is done while sub-operations are still running, the
    /// stage returns the context error without waiting for them. Results that
    /// are all in by then are kept. A context that is already done when
    /// `generate` returns launches no sub-operations.
    pub fn to_task(&self) -> Task<Vec<In>, Out> {
        let name = self.name.clone();
        let generate = Arc::clone(&self.generate);
        let fan_in = Arc::clone(&self.fan_in);

        Task::new(self.name.clone(), move |ctx: Context, input: Vec<In>| {
            let name = name.clone();
            let generate = Arc::clone(&generate);
            let fan_in = Arc::clone(&fan_in);
            async move {
                let ops = generate(ctx.clone(), input).await?;
                debug!(task = %name, fan_out = ops.len(), "fan-out generated sub-operations");

                let results = run_sub_tasks(&name, &ctx, ops).await?;
                fan_in(ctx, results).await
            }
        })
    }
}

struct Slots<Out> {
    results: Vec<Option<Out>>,
    first_err: Option<TaskError>,
}

async fn run_sub_tasks<In, Out>(
    name: &str,
    ctx: &Context,
    ops: Vec<SubTask<In, Out>>,
) -> Result<Vec<Out>, TaskError>
where
    In: Default + Send + 'static,
    Out: Send + 'static,
{
    if let Some(err) = ctx.err() {
        warn!(task = %name, error = %err, "context already done; no sub-operations launched");
        return Err(err.into());
    }

    let slots = Arc::new(Mutex::new(Slots {
        results: ops.iter().map(|_| None).collect::<Vec<Option<Out>>>(),
        first_err: None,
    }));

    let handles: Vec<_> = ops
        .into_iter()
        .enumerate()
        .map(|(idx, op)| {
            let slots = Arc::clone(&slots);
            let ctx = ctx.clone();
            tokio::spawn(async move {
                let res = op(ctx, In::default()).await;
                let mut slots = lock(&slots);
                match res {
                    Ok(out) => slots.results[idx] = Some(out),
                    Err(err) => {
                        if slots.first_err.is_none() {
                            slots.first_err = Some(TaskError::from(err));
                        }
                    }
                }
            })
        })
        .collect();

    let joined = tokio::select! {
        biased;
        joined = join_all(handles) => joined,
        err = ctx.done() => {
            warn!(task = %name, error = %err, "context done while waiting for fan-out workers");
            return Err(err.into());
        }
    };

    let mut slots = lock(&slots);
    if joined.iter().any(|j| j.is_err()) && slots.first_err.is_none() {
        warn!(task = %name, "fan-out sub-operation panicked");
        slots.first_err = Some(TaskError::Panicked {
            task: name.to_string(),
        });
    }
    if let Some(err) = slots.first_err.take() {
        return Err(err);
    }

    let results = std::mem::take(&mut slots.results);
    results
        .into_iter()
        .collect::<Option<Vec<Out>>>()
        .ok_or_else(|| TaskError::Panicked {
            task: name.to_string(),
        })
}
