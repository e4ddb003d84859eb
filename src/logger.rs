// src/logger.rs

//! Diagnostic logging capability consumed by tasks.
//!
//! A task never reaches for a global logger. It holds an `Arc<dyn Logger>`
//! that defaults to [`NoopLogger`] and can be replaced per task with
//! `Task::with_logger`. None of the implementations affect control flow.

use std::fmt;

/// Something that accepts diagnostic messages.
pub trait Logger: Send + Sync {
    fn log(&self, message: &str);
}

impl<L: Logger + ?Sized> Logger for std::sync::Arc<L> {
    fn log(&self, message: &str) {
        (**self).log(message)
    }
}

/// Discards every message. Default logger for new tasks.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopLogger;

impl Logger for NoopLogger {
    fn log(&self, _message: &str) {}
}

/// Forwards messages to the console through `tracing` at INFO level.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingLogger;

impl Logger for TracingLogger {
    fn log(&self, message: &str) {
        tracing::info!(target: "taskflow::task", "{message}");
    }
}

/// Adapts a closure into a [`Logger`].
pub struct LoggerFn<F>(pub F);

impl<F> Logger for LoggerFn<F>
where
    F: Fn(&str) + Send + Sync,
{
    fn log(&self, message: &str) {
        (self.0)(message)
    }
}

impl<F> fmt::Debug for LoggerFn<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoggerFn").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[test]
    fn logger_fn_forwards_message() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let logger = LoggerFn(move |msg: &str| sink.lock().unwrap().push(msg.to_string()));

        logger.log("hello from LoggerFn");

        assert_eq!(*seen.lock().unwrap(), vec!["hello from LoggerFn".to_string()]);
    }

    #[test]
    fn noop_logger_accepts_messages() {
        let logger: Arc<dyn Logger> = Arc::new(NoopLogger);
        logger.log("dropped");
    }
}
