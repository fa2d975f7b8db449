use thiserror::Error;

#[cfg(feature = "sqlite")]
use rusqlite;
#[cfg(feature = "postgres")]
use tokio_postgres;

use crate::driver::{DriverError, FailureKind};

#[derive(Debug, Error)]
pub enum SqlFailoverError {
    #[cfg(feature = "postgres")]
    #[error(transparent)]
    PostgresError(#[from] tokio_postgres::Error),

    #[cfg(feature = "sqlite")]
    #[error(transparent)]
    SqliteError(#[from] rusqlite::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Connecting to {host} failed after {attempts} retries: {source}")]
    ConnectFailed {
        host: String,
        attempts: u32,
        #[source]
        source: DriverError,
    },

    #[error("Query error: {0}")]
    QueryError(#[source] DriverError),

    #[error("Query failed after {attempts} retries: {source}")]
    QueryRetriesExhausted {
        attempts: u32,
        #[source]
        source: DriverError,
    },

    #[error("Unrecoverable connection error: {0}")]
    Unrecoverable(#[source] DriverError),

    #[error("Connection error: {0}")]
    ConnectionError(String),

    #[error("Parameter conversion error: {0}")]
    ParameterError(String),
}

impl SqlFailoverError {
    /// The driver error behind this failure, if it came from a driver.
    #[must_use]
    pub fn driver_error(&self) -> Option<&DriverError> {
        match self {
            SqlFailoverError::ConnectFailed { source, .. }
            | SqlFailoverError::QueryRetriesExhausted { source, .. }
            | SqlFailoverError::QueryError(source)
            | SqlFailoverError::Unrecoverable(source) => Some(source),
            _ => None,
        }
    }

    /// Classification of the underlying driver error.
    #[must_use]
    pub fn kind(&self) -> Option<FailureKind> {
        self.driver_error().map(DriverError::kind)
    }

    /// Whether retries were attempted and ran out.
    #[must_use]
    pub fn is_exhausted(&self) -> bool {
        matches!(
            self,
            SqlFailoverError::ConnectFailed { .. } | SqlFailoverError::QueryRetriesExhausted { .. }
        )
    }
}
