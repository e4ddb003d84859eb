// src/pipeline/mod.rs

//! Build and run a task graph described by a pipeline file.
//!
//! - [`steps`] turns individual `[task.<name>]` sections into engine tasks.
//! - [`Pipeline`] wires them together in topological order and submits every
//!   task to a [`Runner`].

pub mod steps;

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info};

use crate::config::model::ConfigFile;
use crate::config::validate::topological_order;
use crate::context::Context;
use crate::engine::{Outcome, Runner, SharedExecutable, Task};
use crate::errors::{Result, TaskError, TaskflowError};
use crate::logger::{Logger, TracingLogger};

/// A built pipeline node.
#[derive(Debug, Clone)]
pub enum Stage {
    /// A plain step: scalar in, scalar out.
    Step(Task<i64, i64>),
    /// A fan-out stage: generated sub-operations reduced to one scalar.
    FanOut(Task<i64, i64>),
}

impl Stage {
    pub fn task(&self) -> &Task<i64, i64> {
        match self {
            Stage::Step(task) | Stage::FanOut(task) => task,
        }
    }

    pub fn name(&self) -> &str {
        self.task().name()
    }

    pub fn executable(&self) -> SharedExecutable {
        self.task().executable()
    }

    pub fn result(&self) -> Option<Outcome<i64>> {
        self.task().result()
    }
}

#[derive(Debug)]
pub struct Pipeline {
    order: Vec<String>,
    stages: BTreeMap<String, Stage>,
    runner: Runner,
    timeout: Option<Duration>,
}

impl Pipeline {
    /// Build a pipeline whose tasks log through `tracing`.
    pub fn from_config(cfg: &ConfigFile) -> Result<Self> {
        Self::with_logger(cfg, Arc::new(TracingLogger))
    }

    /// Build a pipeline whose tasks report diagnostics to `logger`.
    pub fn with_logger(cfg: &ConfigFile, logger: Arc<dyn Logger>) -> Result<Self> {
        let order = topological_order(&cfg.task)?;
        let mut stages: BTreeMap<String, Stage> = BTreeMap::new();

        for name in order.iter() {
            let tc = cfg
                .task
                .get(name)
                .ok_or_else(|| TaskflowError::TaskNotFound(name.clone()))?;

            let stage = if tc.is_fan_out() {
                Stage::FanOut(steps::fan_out_stage(name, tc).with_logger(Arc::clone(&logger)))
            } else {
                let deps = tc
                    .after
                    .iter()
                    .map(|dep| {
                        stages
                            .get(dep)
                            .map(Stage::executable)
                            .ok_or_else(|| TaskflowError::TaskNotFound(dep.clone()))
                    })
                    .collect::<Result<Vec<_>>>()?;
                Stage::Step(
                    steps::step(name, tc, cfg.retry)
                        .with_logger(Arc::clone(&logger))
                        .after(deps),
                )
            };

            debug!(task = %name, after = ?tc.after, "pipeline stage built");
            stages.insert(name.clone(), stage);
        }

        let mut runner = Runner::new();
        runner.add(order.iter().filter_map(|name| stages.get(name).map(Stage::executable)));

        Ok(Self {
            order,
            stages,
            runner,
            timeout: cfg.config.timeout(),
        })
    }

    /// Override the run deadline from the pipeline file.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        if timeout.is_some() {
            self.timeout = timeout;
        }
        self
    }

    /// Task names in topological order.
    pub fn order(&self) -> &[String] {
        &self.order
    }

    pub fn stage(&self, name: &str) -> Option<&Stage> {
        self.stages.get(name)
    }

    /// Run every stage once; returns the first failure the runner drains.
    pub async fn run(&self, ctx: &Context) -> std::result::Result<(), TaskError> {
        let ctx = match self.timeout {
            Some(timeout) => ctx.with_timeout(timeout),
            None => ctx.clone(),
        };
        info!(stages = self.order.len(), timeout = ?self.timeout, "running pipeline");
        self.runner.run(&ctx).await
    }

    /// Outcome of every stage in topological order; `None` if it never ran
    /// to completion.
    pub fn results(&self) -> Vec<(&str, Option<Outcome<i64>>)> {
        self.order
            .iter()
            .filter_map(|name| self.stages.get(name))
            .map(|stage| (stage.name(), stage.result()))
            .collect()
    }
}
