//! Logging seam for endpoint lifecycle events.
//!
//! Routers and endpoints receive an [`EventLog`] at construction instead of
//! writing to a process-wide logger. [`TracingLog`] forwards to `tracing`, so the
//! application's subscriber decides formatting and destination.

use std::fmt;

/// Sink for informational and error events.
pub trait EventLog: Send + Sync + fmt::Debug {
    /// Informational event, e.g. a successful connect.
    fn log(&self, message: &str);
    /// Recoverable-but-noteworthy failure, e.g. a retry or a rejected query.
    fn error(&self, message: &str);
}

/// Forwards events to `tracing` under the `sql_failover` target.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingLog;

impl EventLog for TracingLog {
    fn log(&self, message: &str) {
        tracing::info!(target: "sql_failover", "{message}");
    }

    fn error(&self, message: &str) {
        tracing::error!(target: "sql_failover", "{message}");
    }
}

/// Discards every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopLog;

impl EventLog for NoopLog {
    fn log(&self, _message: &str) {}

    fn error(&self, _message: &str) {}
}
