// src/engine/retry.rs

//! Bounded retry with exponential backoff.

use std::future::Future;
use std::time::Duration;

use serde::Deserialize;
use tracing::{debug, warn};

use crate::context::Context;
use crate::errors::TaskError;

/// Run `op` until it succeeds, retrying up to `max_retries` extra times.
///
/// After each failure (except the last) the call waits `initial_backoff`,
/// doubled after every wait, or until the context is done, whichever comes
/// first. If the context wins, its error is returned at once. When every
/// attempt fails, the last operation error is returned. No jitter is applied.
pub async fn retry<T, F, Fut>(
    ctx: &Context,
    mut op: F,
    max_retries: u32,
    initial_backoff: Duration,
) -> Result<T, TaskError>
where
    F: FnMut(Context) -> Fut,
    Fut: Future<Output = anyhow::Result<T>>,
{
    let mut backoff = initial_backoff;
    let mut attempt: u32 = 0;

    loop {
        let err = match op(ctx.clone()).await {
            Ok(value) => {
                if attempt > 0 {
                    debug!(attempt = attempt + 1, "operation succeeded after retry");
                }
                return Ok(value);
            }
            Err(err) => TaskError::from(err),
        };

        if attempt >= max_retries {
            warn!(attempts = attempt + 1, error = %err, "retries exhausted");
            return Err(err);
        }

        debug!(
            attempt = attempt + 1,
            backoff_ms = backoff.as_millis() as u64,
            error = %err,
            "operation failed; backing off"
        );

        tokio::select! {
            ctx_err = ctx.done() => return Err(ctx_err.into()),
            _ = tokio::time::sleep(backoff) => {}
        }

        backoff = backoff.saturating_mul(2);
        attempt += 1;
    }
}

/// Retry parameters as they appear in configuration (`[retry]`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct RetryPolicy {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(
        default = "default_initial_backoff",
        rename = "initial_backoff_ms",
        deserialize_with = "millis::deserialize"
    )]
    pub initial_backoff: Duration,
}

fn default_max_retries() -> u32 {
    3
}

fn default_initial_backoff() -> Duration {
    Duration::from_millis(100)
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            initial_backoff: default_initial_backoff(),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32, initial_backoff: Duration) -> Self {
        Self {
            max_retries,
            initial_backoff,
        }
    }

    pub async fn retry<T, F, Fut>(&self, ctx: &Context, op: F) -> Result<T, TaskError>
    where
        F: FnMut(Context) -> Fut,
        Fut: Future<Output = anyhow::Result<T>>,
    {
        retry(ctx, op, self.max_retries, self.initial_backoff).await
    }
}

mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
