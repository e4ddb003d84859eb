// src/config/validate.rs

use std::collections::BTreeMap;

use petgraph::algo::toposort;
use petgraph::graphmap::DiGraphMap;

use crate::config::model::{ConfigFile, RawConfigFile, TaskConfig};
use crate::errors::{Result, TaskflowError};

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = crate::errors::TaskflowError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        validate_raw_config(&raw)?;
        Ok(ConfigFile::new_unchecked(raw.config, raw.retry, raw.task))
    }
}

fn validate_raw_config(cfg: &RawConfigFile) -> Result<()> {
    ensure_has_tasks(cfg)?;
    validate_task_dependencies(cfg)?;
    validate_fan_out(cfg)?;
    topological_order(&cfg.task)?;
    Ok(())
}

fn ensure_has_tasks(cfg: &RawConfigFile) -> Result<()> {
    if cfg.task.is_empty() {
        return Err(TaskflowError::ConfigError(
            "config must contain at least one [task.<name>] section".to_string(),
        ));
    }
    Ok(())
}

fn validate_task_dependencies(cfg: &RawConfigFile) -> Result<()> {
    for (name, task) in cfg.task.iter() {
        for dep in task.after.iter() {
            if !cfg.task.contains_key(dep) {
                return Err(TaskflowError::ConfigError(format!(
                    "task '{}' has unknown dependency '{}' in `after`",
                    name, dep
                )));
            }
            if dep == name {
                return Err(TaskflowError::ConfigError(format!(
                    "task '{}' cannot depend on itself in `after`",
                    name
                )));
            }
        }
    }
    Ok(())
}

fn validate_fan_out(cfg: &RawConfigFile) -> Result<()> {
    for (name, task) in cfg.task.iter() {
        if task.is_fan_out() {
            // A fan-out stage takes a list input; step outputs are scalars.
            if !task.after.is_empty() {
                return Err(TaskflowError::ConfigError(format!(
                    "fan-out task '{}' cannot have `after` dependencies",
                    name
                )));
            }
            if task.fail_times > 0 {
                return Err(TaskflowError::ConfigError(format!(
                    "fan-out task '{}' does not support `fail_times`",
                    name
                )));
            }
        } else if task.reduce.is_some() {
            return Err(TaskflowError::ConfigError(format!(
                "task '{}' sets `reduce` without `fan_out`",
                name
            )));
        }
    }
    Ok(())
}

/// Order tasks so that every task comes after all of its `after` entries.
///
/// Edge direction: dep -> task. For
///
/// ```toml
/// [task.B]
/// after = ["A"]
/// ```
///
/// we add edge A -> B. Fails with [`TaskflowError::DagCycle`] on a cycle.
pub fn topological_order(tasks: &BTreeMap<String, TaskConfig>) -> Result<Vec<String>> {
    let mut graph: DiGraphMap<&str, ()> = DiGraphMap::new();

    for name in tasks.keys() {
        graph.add_node(name.as_str());
    }

    for (name, task) in tasks.iter() {
        for dep in task.after.iter() {
            graph.add_edge(dep.as_str(), name.as_str(), ());
        }
    }

    match toposort(&graph, None) {
        Ok(order) => Ok(order.into_iter().map(str::to_string).collect()),
        Err(cycle) => {
            let node = cycle.node_id();
            Err(TaskflowError::DagCycle(format!(
                "cycle detected in task graph involving task '{}'",
                node
            )))
        }
    }
}
