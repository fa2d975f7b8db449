use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use rusqlite::ErrorCode;

use super::params::convert_params;
use super::worker::SqliteWorker;
use crate::config::ConnectionDescriptor;
use crate::driver::{Driver, DriverConnection, DriverError, Phase};
use crate::error::SqlFailoverError;
use crate::results::ResultSet;
use crate::types::RowValues;

static NEXT_CONN_ID: AtomicU64 = AtomicU64::new(1);

/// Translate a rusqlite error observed in `phase`.
///
/// Errors that mean the database file itself is unusable are fatal; everything
/// else is a problem with the statement.
#[must_use]
pub fn classify_error(phase: Phase, err: &rusqlite::Error) -> DriverError {
    let (fatal, code) = match err {
        rusqlite::Error::SqliteFailure(failure, _) => (
            matches!(
                failure.code,
                ErrorCode::CannotOpen
                    | ErrorCode::SystemIoFailure
                    | ErrorCode::DatabaseCorrupt
                    | ErrorCode::NotADatabase
            ),
            Some(format!("{:?}", failure.code)),
        ),
        _ => (false, None),
    };
    DriverError::new(phase, fatal, code, err.to_string())
}

/// `SQLite` driver. The descriptor's `database` is the file path (or `:memory:`).
#[derive(Debug, Default, Clone, Copy)]
pub struct SqliteDriver;

#[async_trait]
impl Driver for SqliteDriver {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    fn validate(&self, descriptor: &ConnectionDescriptor) -> Result<(), SqlFailoverError> {
        if descriptor.database.is_empty() {
            return Err(SqlFailoverError::ConfigError(
                "database path is required".to_string(),
            ));
        }
        Ok(())
    }

    async fn connect(
        &self,
        descriptor: &ConnectionDescriptor,
    ) -> Result<Box<dyn DriverConnection>, DriverError> {
        let conn_id = NEXT_CONN_ID.fetch_add(1, Ordering::Relaxed);
        let worker = SqliteWorker::spawn(descriptor.database.clone(), conn_id).await?;
        Ok(Box::new(SqliteConnection {
            worker: Some(worker),
            conn_id,
        }))
    }
}

/// Live `SQLite` connection owned by a worker thread.
pub struct SqliteConnection {
    worker: Option<SqliteWorker>,
    conn_id: u64,
}

impl SqliteConnection {
    fn worker(&self) -> Result<&SqliteWorker, DriverError> {
        self.worker.as_ref().ok_or_else(|| {
            DriverError::query(
                true,
                Some(crate::driver::CONNECTION_LOST),
                "connection destroyed",
            )
        })
    }
}

#[async_trait]
impl DriverConnection for SqliteConnection {
    fn connection_id(&self) -> Option<u64> {
        Some(self.conn_id)
    }

    async fn execute_raw(&mut self, sql: &str) -> Result<ResultSet, DriverError> {
        self.worker()?.execute(sql.to_string(), None).await
    }

    async fn execute_params(
        &mut self,
        sql: &str,
        params: &[RowValues],
    ) -> Result<ResultSet, DriverError> {
        let values = convert_params(params);
        self.worker()?
            .execute(sql.to_string(), Some(values))
            .await
    }

    fn destroy(&mut self) {
        if let Some(worker) = self.worker.take() {
            worker.shutdown();
        }
    }
}
