//! Test doubles for the driver and logging seams.
//!
//! Enabled with the `test-utils` feature. [`ScriptedDriver`] plays back queued
//! connect and query outcomes and counts every call, so retry behavior can be
//! asserted without a database server. With `test-utils-postgres`,
//! [`postgres::setup_postgres_embedded`] starts a throwaway `PostgreSQL` server.

mod log;
#[cfg(feature = "test-utils-postgres")]
pub mod postgres;
mod scripted;

pub use log::RecordingLog;
pub use scripted::{ExecutedQuery, ScriptedDriver};

use crate::driver::DriverError;

/// Transient connect failure, as a refused TCP connection would produce.
#[must_use]
pub fn refused() -> DriverError {
    DriverError::connect(Some("ECONNREFUSED"), "connection refused")
}

/// Query failure caused by a dead connection.
#[must_use]
pub fn fatal_query_error() -> DriverError {
    DriverError::query(true, Some("ECONNRESET"), "connection reset by peer")
}

/// Query rejected by the database.
#[must_use]
pub fn syntax_error() -> DriverError {
    DriverError::query(false, Some("42601"), "syntax error at or near \"SELEC\"")
}
