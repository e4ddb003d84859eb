// src/lib.rs

//! In-process task-dependency executor.
//!
//! Callers describe units of work as [`Task`]s with declared predecessors.
//! A task resolves its dependencies in order, runs its work function at most
//! once and caches the outcome, so a dependency shared by several concurrent
//! branches executes a single time. [`Runner`] launches top-level tasks
//! concurrently, [`FanOutTask`] parallelises a generated set of
//! sub-operations behind one task, and [`retry`] re-runs a flaky operation
//! with exponential backoff.
//!
//! ```ignore
//! use taskflow::{Context, Runner, Task};
//!
//! let fetch = Task::new("fetch", |_ctx, _: ()| async { Ok(21_i64) });
//! let double = Task::new("double", |_ctx, x: i64| async move { Ok(x * 2) })
//!     .after([fetch.executable()]);
//!
//! let mut runner = Runner::new();
//! runner.add([double.executable()]);
//! runner.run(&Context::background()).await?;
//! assert_eq!(double.result().unwrap()?, 42);
//! ```
//!
//! The `taskflow` binary drives the same engine from a TOML pipeline file;
//! see [`config`] and [`pipeline`].

pub mod cli;
pub mod config;
pub mod context;
pub mod engine;
pub mod errors;
pub mod logger;
pub mod logging;
pub mod pipeline;
pub mod types;

use anyhow::Result;
use tracing::{debug, info, warn};

use crate::cli::CliArgs;
use crate::config::model::ConfigFile;
use crate::config::{default_config_path, load_and_validate, topological_order};
use crate::pipeline::Pipeline;

pub use crate::context::{Context, ContextError};
pub use crate::engine::{
    Executable, FanOutTask, Outcome, RetryPolicy, Runner, SharedExecutable, SubTask, Task,
    Value, retry, sub_task,
};
pub use crate::errors::{TaskError, TaskflowError};
pub use crate::logger::{Logger, LoggerFn, NoopLogger, TracingLogger};

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - pipeline file loading and validation
/// - pipeline construction
/// - the run context (deadline + Ctrl-C cancellation)
/// - the final report on stdout
pub async fn run(args: CliArgs) -> Result<()> {
    let config_path = args.config.clone().unwrap_or_else(default_config_path);
    let cfg = load_and_validate(&config_path)?;

    if args.dry_run {
        print_dry_run(&cfg)?;
        return Ok(());
    }

    let timeout = args.timeout_ms.map(std::time::Duration::from_millis);
    let pipeline = Pipeline::from_config(&cfg)?.with_timeout(timeout);

    // Ctrl-C → cancel the run context.
    let ctx = Context::background();
    {
        let ctx = ctx.clone();
        tokio::spawn(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                eprintln!("failed to listen for Ctrl+C: {e}");
                return;
            }
            warn!("Ctrl+C received; cancelling run");
            ctx.cancel();
        });
    }

    info!(config = %config_path.display(), "starting taskflow run");
    let outcome = pipeline.run(&ctx).await;

    print_report(&pipeline);

    outcome.map_err(TaskflowError::from)?;
    Ok(())
}

fn print_report(pipeline: &Pipeline) {
    println!("taskflow results:");
    for (name, result) in pipeline.results() {
        match result {
            Some(Ok(value)) => println!("  {name:<20} ok     {value}"),
            Some(Err(err)) => println!("  {name:<20} failed {err}"),
            None => println!("  {name:<20} not finished"),
        }
    }
}

/// Simple dry-run output: print tasks, deps and the run order.
fn print_dry_run(cfg: &ConfigFile) -> Result<()> {
    println!("taskflow dry-run");
    if let Some(timeout_ms) = cfg.config.timeout_ms {
        println!("  config.timeout_ms = {timeout_ms}");
    }
    println!(
        "  retry = {} retries, {:?} initial backoff",
        cfg.retry.max_retries, cfg.retry.initial_backoff
    );
    println!();

    println!("tasks ({}):", cfg.task.len());
    for (name, task) in cfg.task.iter() {
        println!("  - {name}");
        if !task.after.is_empty() {
            println!("      after: {:?}", task.after);
        }
        if let Some(ref values) = task.fan_out {
            println!("      fan_out: {values:?} reduce: {:?}", task.effective_reduce());
        } else if let Some(value) = task.value {
            println!("      value: {value}");
        } else {
            println!("      x * {} + {}", task.effective_multiply(), task.add);
        }
        if task.sleep_ms > 0 {
            println!("      sleep_ms: {}", task.sleep_ms);
        }
        if let Some(ref message) = task.fail {
            println!("      fail: {message}");
        }
        if task.fail_times > 0 {
            println!("      fail_times: {}", task.fail_times);
        }
    }

    println!();
    println!("order: {}", topological_order(&cfg.task)?.join(" -> "));

    debug!("dry-run complete (no execution)");
    Ok(())
}
