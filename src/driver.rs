//! Boundary between the failover core and a concrete database client.
//!
//! A driver hands out [`DriverConnection`] handles. Every failure crossing this
//! boundary is a [`DriverError`] whose [`FailureKind`] is decided once, when the
//! error is built, so the endpoint logic never looks at raw codes.

use std::fmt;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc::UnboundedReceiver;

use crate::config::ConnectionDescriptor;
use crate::error::SqlFailoverError;
use crate::results::ResultSet;
use crate::types::RowValues;

/// Error code reported when the server closed the connection under us.
pub const CONNECTION_LOST: &str = "PROTOCOL_CONNECTION_LOST";

/// Stream of errors a live connection reports outside of any query.
pub type ConnectionEvents = UnboundedReceiver<DriverError>;

/// Where a driver error was observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Establishing a connection
    Connect,
    /// Running a statement on a live connection
    Query,
    /// Reported asynchronously by a live connection
    Event,
}

/// Closed classification of everything a driver can fail with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    /// Could not establish a connection; retried up to the connect cap.
    TransientConnect,
    /// A live connection was dropped; triggers a reconnect cycle.
    ConnectionLost,
    /// A statement failed because the connection is unusable; retried with a reconnect.
    FatalQuery,
    /// The statement itself was rejected; never retried.
    NonFatalQuery,
    /// An asynchronous error with no fatal flag and no known code.
    Unknown,
}

impl FailureKind {
    /// Translate a driver's raw `fatal` flag and error code into a kind.
    #[must_use]
    pub fn classify(phase: Phase, fatal: bool, code: Option<&str>) -> Self {
        match phase {
            Phase::Connect => FailureKind::TransientConnect,
            Phase::Query if fatal || code == Some(CONNECTION_LOST) => FailureKind::FatalQuery,
            Phase::Query => FailureKind::NonFatalQuery,
            Phase::Event if fatal || code == Some(CONNECTION_LOST) => FailureKind::ConnectionLost,
            Phase::Event => FailureKind::Unknown,
        }
    }

    /// Whether the endpoint recovers from this kind on its own.
    #[must_use]
    pub fn is_recoverable(self) -> bool {
        matches!(
            self,
            FailureKind::TransientConnect | FailureKind::ConnectionLost | FailureKind::FatalQuery
        )
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            FailureKind::TransientConnect => "transient connect error",
            FailureKind::ConnectionLost => "connection lost",
            FailureKind::FatalQuery => "fatal query error",
            FailureKind::NonFatalQuery => "query error",
            FailureKind::Unknown => "unknown connection error",
        };
        f.write_str(label)
    }
}

/// Error reported by a driver, already classified.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}{}", code_suffix(.code))]
pub struct DriverError {
    kind: FailureKind,
    fatal: bool,
    code: Option<String>,
    message: String,
}

impl DriverError {
    /// Build an error observed in `phase`.
    pub fn new(
        phase: Phase,
        fatal: bool,
        code: Option<impl Into<String>>,
        message: impl Into<String>,
    ) -> Self {
        let code = code.map(Into::into);
        Self {
            kind: FailureKind::classify(phase, fatal, code.as_deref()),
            fatal,
            code,
            message: message.into(),
        }
    }

    /// Failure to establish a connection.
    pub fn connect(code: Option<impl Into<String>>, message: impl Into<String>) -> Self {
        Self::new(Phase::Connect, true, code, message)
    }

    /// Failure of a statement on a live connection.
    pub fn query(fatal: bool, code: Option<impl Into<String>>, message: impl Into<String>) -> Self {
        Self::new(Phase::Query, fatal, code, message)
    }

    /// Out-of-band error reported by a live connection.
    pub fn event(fatal: bool, code: Option<impl Into<String>>, message: impl Into<String>) -> Self {
        Self::new(Phase::Event, fatal, code, message)
    }

    /// The server dropped the connection.
    pub fn connection_lost(message: impl Into<String>) -> Self {
        Self::event(true, Some(CONNECTION_LOST), message)
    }

    #[must_use]
    pub fn kind(&self) -> FailureKind {
        self.kind
    }

    #[must_use]
    pub fn is_fatal(&self) -> bool {
        self.fatal
    }

    #[must_use]
    pub fn code(&self) -> Option<&str> {
        self.code.as_deref()
    }

    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

fn code_suffix(code: &Option<String>) -> String {
    code.as_ref()
        .map(|c| format!(" (code: {c})"))
        .unwrap_or_default()
}

/// Factory for physical connections.
#[async_trait]
pub trait Driver: Send + Sync {
    /// Short name used in log lines.
    fn name(&self) -> &'static str;

    /// Check a descriptor before any I/O happens.
    ///
    /// # Errors
    /// Returns `SqlFailoverError::ConfigError` naming the first missing field.
    fn validate(&self, descriptor: &ConnectionDescriptor) -> Result<(), SqlFailoverError> {
        if descriptor.host.is_empty() {
            return Err(SqlFailoverError::ConfigError("host is required".to_string()));
        }
        if descriptor.database.is_empty() {
            return Err(SqlFailoverError::ConfigError(
                "database is required".to_string(),
            ));
        }
        Ok(())
    }

    /// Open a new physical connection.
    ///
    /// # Errors
    /// Returns a `DriverError` of kind [`FailureKind::TransientConnect`].
    async fn connect(
        &self,
        descriptor: &ConnectionDescriptor,
    ) -> Result<Box<dyn DriverConnection>, DriverError>;
}

/// One live physical connection.
#[async_trait]
pub trait DriverConnection: Send {
    /// Server-side identifier of this connection, if the driver knows one.
    fn connection_id(&self) -> Option<u64> {
        None
    }

    /// Run SQL text as-is.
    ///
    /// # Errors
    /// Returns a `DriverError` of kind `FatalQuery` or `NonFatalQuery`.
    async fn execute_raw(&mut self, sql: &str) -> Result<ResultSet, DriverError>;

    /// Run SQL with bound parameters. `params` never contains [`RowValues::Absent`].
    ///
    /// # Errors
    /// Returns a `DriverError` of kind `FatalQuery` or `NonFatalQuery`.
    async fn execute_params(
        &mut self,
        sql: &str,
        params: &[RowValues],
    ) -> Result<ResultSet, DriverError>;

    /// Hand over the asynchronous error stream. Returns `None` after the first call,
    /// or when the driver reports no out-of-band errors.
    fn take_events(&mut self) -> Option<ConnectionEvents> {
        None
    }

    /// Release the physical connection. Called at most once per handle.
    fn destroy(&mut self);
}
