// src/config/model.rs

use std::collections::BTreeMap;
use std::time::Duration;

use serde::Deserialize;

use crate::engine::RetryPolicy;
use crate::types::ReduceOp;

/// Pipeline file as read from TOML, before validation.
///
/// ```toml
/// [config]
/// timeout_ms = 5000
///
/// [retry]
/// max_retries = 3
/// initial_backoff_ms = 50
///
/// [task.fetch]
/// value = 2
/// sleep_ms = 20
///
/// [task.double]
/// after = ["fetch"]
/// multiply = 2
///
/// [task.sum]
/// fan_out = [1, 2, 3]
/// reduce = "sum"
/// ```
///
/// All sections are optional and have reasonable defaults; validation then
/// requires at least one task.
#[derive(Debug, Clone, Deserialize)]
pub struct RawConfigFile {
    #[serde(default)]
    pub config: ConfigSection,

    #[serde(default)]
    pub retry: RetryPolicy,

    /// Keys are the task names.
    #[serde(default)]
    pub task: BTreeMap<String, TaskConfig>,
}

/// A validated pipeline file.
///
/// Only obtainable through `TryFrom<RawConfigFile>`, so holders can assume
/// every `after` reference resolves and the task graph is acyclic.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    pub config: ConfigSection,
    pub retry: RetryPolicy,
    pub task: BTreeMap<String, TaskConfig>,
}

impl ConfigFile {
    pub(crate) fn new_unchecked(
        config: ConfigSection,
        retry: RetryPolicy,
        task: BTreeMap<String, TaskConfig>,
    ) -> Self {
        Self { config, retry, task }
    }
}

/// `[config]` section.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfigSection {
    /// Deadline for the whole run in milliseconds. No deadline when absent.
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

impl ConfigSection {
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }
}

/// `[task.<name>]` section.
///
/// A plain step maps its input `x` (the last dependency's output, or `0` for a
/// step without `after`) to `value` if set, otherwise to `x * multiply + add`. A step with `fan_out`
/// instead runs one sub-operation per listed value and reduces the results.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TaskConfig {
    /// Predecessors, resolved in the listed order.
    #[serde(default)]
    pub after: Vec<String>,

    /// Constant output, ignoring the input.
    #[serde(default)]
    pub value: Option<i64>,

    #[serde(default)]
    pub multiply: Option<i64>,

    #[serde(default)]
    pub add: i64,

    /// Simulated work duration; for fan-out stages, per sub-operation.
    #[serde(default)]
    pub sleep_ms: u64,

    /// Always fail with this message.
    #[serde(default)]
    pub fail: Option<String>,

    /// Fail this many times before succeeding; the step is retried with the
    /// `[retry]` policy.
    #[serde(default)]
    pub fail_times: u32,

    /// Values for a fan-out stage, one sub-operation each.
    #[serde(default)]
    pub fan_out: Option<Vec<i64>>,

    /// Reduction for `fan_out`; defaults to `sum`.
    #[serde(default)]
    pub reduce: Option<ReduceOp>,
}

impl TaskConfig {
    pub fn is_fan_out(&self) -> bool {
        self.fan_out.is_some()
    }

    pub fn effective_reduce(&self) -> ReduceOp {
        self.reduce.unwrap_or_default()
    }

    pub fn effective_multiply(&self) -> i64 {
        self.multiply.unwrap_or(1)
    }

    pub fn sleep(&self) -> Duration {
        Duration::from_millis(self.sleep_ms)
    }
}
