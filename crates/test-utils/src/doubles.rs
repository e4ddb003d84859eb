//! Hand-rolled `Executable` and `Logger` doubles for engine tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::future::BoxFuture;
use taskflow::context::Context;
use taskflow::engine::{Executable, SharedExecutable, Value};
use taskflow::errors::TaskError;
use taskflow::logger::Logger;

/// An executable that:
/// - counts how often it is invoked,
/// - optionally sleeps to widen race windows,
/// - returns a fixed `i64`.
///
/// It has no run-once guard of its own; wrap it in a `Task` to get one.
pub struct CountingExecutable {
    name: String,
    output: i64,
    delay: Duration,
    calls: AtomicUsize,
}

impl CountingExecutable {
    pub fn new(name: &str, output: i64) -> Arc<Self> {
        Self::with_delay(name, output, Duration::ZERO)
    }

    pub fn with_delay(name: &str, output: i64, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            output,
            delay,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn shared(self: &Arc<Self>) -> SharedExecutable {
        Arc::clone(self) as SharedExecutable
    }
}

impl Executable for CountingExecutable {
    fn name(&self) -> &str {
        &self.name
    }

    fn run<'a>(
        &'a self,
        _ctx: &'a Context,
        _input: Option<Value>,
    ) -> BoxFuture<'a, Result<Value, TaskError>> {
        Box::pin(async move {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            Ok(Value::new(self.output))
        })
    }
}

/// An executable that always fails with the same error instance, so callers
/// can check identity with `TaskError::same_failure`.
pub struct FailingExecutable {
    name: String,
    error: TaskError,
    calls: AtomicUsize,
}

impl FailingExecutable {
    pub fn new(name: &str, message: &str) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            error: TaskError::msg(message.to_string()),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn error(&self) -> &TaskError {
        &self.error
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn shared(self: &Arc<Self>) -> SharedExecutable {
        Arc::clone(self) as SharedExecutable
    }
}

impl Executable for FailingExecutable {
    fn name(&self) -> &str {
        &self.name
    }

    fn run<'a>(
        &'a self,
        _ctx: &'a Context,
        _input: Option<Value>,
    ) -> BoxFuture<'a, Result<Value, TaskError>> {
        Box::pin(async move {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(self.error.clone())
        })
    }
}

/// Logger that keeps every message in memory.
#[derive(Clone, Default)]
pub struct RecordingLogger {
    messages: Arc<Mutex<Vec<String>>>,
}

impl RecordingLogger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> Vec<String> {
        self.messages.lock().unwrap().clone()
    }
}

impl Logger for RecordingLogger {
    fn log(&self, message: &str) {
        self.messages.lock().unwrap().push(message.to_string());
    }
}
