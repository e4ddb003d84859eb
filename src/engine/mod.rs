// src/engine/mod.rs

//! Task execution engine.
//!
//! - [`executable`] defines the `Executable` capability shared by every node.
//! - [`value`] holds the type-erased `Value` passed along dependency edges.
//! - [`task`] implements the memoized `Task` with recursive dependency
//!   resolution.
//! - [`fanout`] builds a `Task` that runs a generated set of sub-operations
//!   concurrently and reduces their results.
//! - [`runner`] launches top-level executables concurrently and reports the
//!   first failure.
//! - [`retry`] retries a fallible operation with exponential backoff.

pub mod executable;
pub mod fanout;
pub mod retry;
pub mod runner;
pub mod task;
pub mod value;

use std::sync::{Mutex, MutexGuard, PoisonError};

pub use executable::{Executable, SharedExecutable};
pub use fanout::{FanOutTask, SubTask, sub_task};
pub use retry::{RetryPolicy, retry};
pub use runner::Runner;
pub use task::{Outcome, Task, TaskFn};
pub use value::Value;

/// Lock a mutex, recovering the data if a previous holder panicked.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
