// dataload-core/src/logging.rs

//! Injectable logging for user-facing reader warnings.
//!
//! Readers never write warnings to a global sink. Instead a [`Logger`] is
//! passed in at construction; the default [`NoopLogger`] discards messages
//! and [`TracingLogger`] forwards them to `tracing`.

use std::fmt;

/// Receives warnings about skipped records, truncated fields and similar
/// data-quality events.
pub trait Logger: Send + Sync + fmt::Debug {
    fn warn(&self, message: &str);
}

/// Discards every message.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopLogger;

impl Logger for NoopLogger {
    fn warn(&self, _message: &str) {}
}

/// Forwards messages to `tracing::warn!` under the `dataload` target.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingLogger;

impl Logger for TracingLogger {
    fn warn(&self, message: &str) {
        tracing::warn!(target: "dataload", "{}", message);
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::Mutex;

    use super::Logger;

    /// Collects warnings so tests can assert on them.
    #[derive(Debug, Default)]
    pub(crate) struct MemoryLogger {
        messages: Mutex<Vec<String>>,
    }

    impl MemoryLogger {
        pub(crate) fn messages(&self) -> Vec<String> {
            self.messages.lock().unwrap().clone()
        }
    }

    impl Logger for MemoryLogger {
        fn warn(&self, message: &str) {
            self.messages.lock().unwrap().push(message.to_string());
        }
    }
}
