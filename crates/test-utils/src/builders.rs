use std::collections::BTreeMap;
use std::time::Duration;

use taskflow::config::{ConfigFile, ConfigSection, RawConfigFile, TaskConfig};
use taskflow::engine::RetryPolicy;
use taskflow::errors::Result;
use taskflow::types::ReduceOp;

/// Builder for `ConfigFile` to simplify test setup.
pub struct ConfigFileBuilder {
    config: RawConfigFile,
}

impl ConfigFileBuilder {
    pub fn new() -> Self {
        Self {
            config: RawConfigFile {
                config: ConfigSection::default(),
                retry: RetryPolicy::default(),
                task: BTreeMap::new(),
            },
        }
    }

    pub fn with_task(mut self, name: &str, task: TaskConfig) -> Self {
        self.config.task.insert(name.to_string(), task);
        self
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.config.config.timeout_ms = Some(timeout_ms);
        self
    }

    pub fn with_retry(mut self, max_retries: u32, initial_backoff_ms: u64) -> Self {
        self.config.retry =
            RetryPolicy::new(max_retries, Duration::from_millis(initial_backoff_ms));
        self
    }

    /// Validate without panicking; for tests that expect a rejection.
    pub fn try_build(self) -> Result<ConfigFile> {
        ConfigFile::try_from(self.config)
    }

    pub fn build(self) -> ConfigFile {
        self.try_build()
            .expect("failed to build valid config from builder")
    }
}

impl Default for ConfigFileBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for `TaskConfig`. Starts as a root step returning its input.
#[derive(Default)]
pub struct TaskConfigBuilder {
    task: TaskConfig,
}

impl TaskConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Shorthand for a step with a constant output.
    pub fn value(value: i64) -> Self {
        let mut builder = Self::new();
        builder.task.value = Some(value);
        builder
    }

    /// Shorthand for a fan-out stage over `values`.
    pub fn fan_out(values: &[i64]) -> Self {
        let mut builder = Self::new();
        builder.task.fan_out = Some(values.to_vec());
        builder
    }

    pub fn after(mut self, dep: &str) -> Self {
        self.task.after.push(dep.to_string());
        self
    }

    pub fn multiply(mut self, factor: i64) -> Self {
        self.task.multiply = Some(factor);
        self
    }

    pub fn add(mut self, term: i64) -> Self {
        self.task.add = term;
        self
    }

    pub fn sleep_ms(mut self, ms: u64) -> Self {
        self.task.sleep_ms = ms;
        self
    }

    pub fn fail(mut self, message: &str) -> Self {
        self.task.fail = Some(message.to_string());
        self
    }

    pub fn fail_times(mut self, times: u32) -> Self {
        self.task.fail_times = times;
        self
    }

    pub fn reduce(mut self, op: ReduceOp) -> Self {
        self.task.reduce = Some(op);
        self
    }

    pub fn build(self) -> TaskConfig {
        self.task
    }
}
