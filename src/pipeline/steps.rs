// src/pipeline/steps.rs

//! Engine tasks for individual pipeline sections.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use anyhow::{Context as _, bail};

use crate::config::model::TaskConfig;
use crate::context::Context;
use crate::engine::{FanOutTask, RetryPolicy, SubTask, Task, sub_task};
use crate::types::ReduceOp;

/// What a plain step does with its input, extracted from its section.
#[derive(Debug, Clone)]
struct StepSpec {
    value: Option<i64>,
    multiply: i64,
    add: i64,
    sleep: Duration,
    fail: Option<String>,
    fail_times: u32,
}

impl StepSpec {
    fn from_config(tc: &TaskConfig) -> Self {
        Self {
            value: tc.value,
            multiply: tc.effective_multiply(),
            add: tc.add,
            sleep: tc.sleep(),
            fail: tc.fail.clone(),
            fail_times: tc.fail_times,
        }
    }

    async fn attempt(&self, ctx: &Context, input: i64, attempt: u32) -> anyhow::Result<i64> {
        sleep_or_done(ctx, self.sleep).await?;

        if let Some(message) = &self.fail {
            bail!("{message}");
        }
        if attempt < self.fail_times {
            bail!("transient failure on attempt {}", attempt + 1);
        }

        match self.value {
            Some(value) => Ok(value),
            None => input
                .checked_mul(self.multiply)
                .and_then(|x| x.checked_add(self.add))
                .with_context(|| format!("arithmetic overflow on input {input}")),
        }
    }
}

/// Build a plain step. Steps with `fail_times` are retried under `retry`;
/// all other steps get exactly one attempt.
///
/// A root step (empty `after`) always starts from `0`. A value threaded in
/// by whichever dependent happens to claim it first is ignored, so pipeline
/// results do not depend on scheduling.
pub fn step(name: &str, tc: &TaskConfig, retry: RetryPolicy) -> Task<i64, i64> {
    let spec = Arc::new(StepSpec::from_config(tc));
    let is_root = tc.after.is_empty();
    let policy = if spec.fail_times > 0 {
        retry
    } else {
        RetryPolicy::new(0, Duration::ZERO)
    };
    let attempts = Arc::new(AtomicU32::new(0));

    Task::new(name, move |ctx: Context, input: i64| {
        let spec = Arc::clone(&spec);
        let attempts = Arc::clone(&attempts);
        let input = if is_root { 0 } else { input };
        async move {
            let value = policy
                .retry(&ctx, |ctx| {
                    let spec = Arc::clone(&spec);
                    let attempt = attempts.fetch_add(1, Ordering::SeqCst);
                    async move { spec.attempt(&ctx, input, attempt).await }
                })
                .await?;
            Ok(value)
        }
    })
}

/// Build a fan-out stage: one sub-operation per listed value, each sleeping
/// `sleep_ms` and returning its value, reduced with `reduce`.
///
/// The stage is exposed as a scalar step so it can sit anywhere in an `after`
/// list. The scalar it may be handed is dropped; the wrapped fan-out task
/// always starts from an empty list.
pub fn fan_out_stage(name: &str, tc: &TaskConfig) -> Task<i64, i64> {
    let inner = fan_out_task(name, tc);
    Task::new(name, move |ctx: Context, _input: i64| {
        let inner = inner.clone();
        async move { Ok(inner.run(&ctx, None).await?) }
    })
}

fn fan_out_task(name: &str, tc: &TaskConfig) -> Task<Vec<i64>, i64> {
    let values = tc.fan_out.clone().unwrap_or_default();
    let sleep = tc.sleep();
    let fail = tc.fail.clone();
    let reduce: ReduceOp = tc.effective_reduce();

    FanOutTask::new(
        format!("{name}.fan_out"),
        move |_ctx: Context, _input: Vec<i64>| {
            let values = values.clone();
            let fail = fail.clone();
            async move {
                if let Some(message) = fail {
                    bail!("{message}");
                }
                Ok(values
                    .into_iter()
                    .map(|value| -> SubTask<i64, i64> {
                        sub_task(move |ctx: Context, _: i64| async move {
                            sleep_or_done(&ctx, sleep).await?;
                            Ok(value)
                        })
                    })
                    .collect::<Vec<_>>())
            }
        },
        move |_ctx: Context, results: Vec<i64>| async move { reduce.apply(&results) },
    )
    .to_task()
}

/// Sleep for `duration`, giving up early with the context error.
async fn sleep_or_done(ctx: &Context, duration: Duration) -> anyhow::Result<()> {
    if duration.is_zero() {
        return Ok(());
    }
    tokio::select! {
        err = ctx.done() => Err(err.into()),
        _ = tokio::time::sleep(duration) => Ok(()),
    }
}
