use std::error::Error as _;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_postgres::{Client, Config as PgConfig, NoTls};

use super::params::Params;
use super::query::{build_result_set_from_simple, build_result_set_from_statement};
use crate::config::ConnectionDescriptor;
use crate::driver::{
    CONNECTION_LOST, ConnectionEvents, Driver, DriverConnection, DriverError, Phase,
};
use crate::results::ResultSet;
use crate::types::RowValues;

/// Translate a `tokio_postgres` error observed in `phase`.
///
/// Closed connections, socket I/O failures, SQLSTATE classes `08` (connection
/// exception) and `57P` (operator intervention, e.g. admin shutdown), and
/// `FATAL`/`PANIC` severities count as fatal.
#[must_use]
pub fn classify_error(phase: Phase, err: &tokio_postgres::Error) -> DriverError {
    let (fatal, code) = inspect(err);
    DriverError::new(phase, fatal, code, err.to_string())
}

/// Error the connection task finished with. The session is over whatever the
/// error itself says, so it is always reported as fatal.
#[must_use]
pub fn session_ended(err: &tokio_postgres::Error) -> DriverError {
    let (_, code) = inspect(err);
    DriverError::event(true, code, err.to_string())
}

fn inspect(err: &tokio_postgres::Error) -> (bool, Option<String>) {
    let code = if err.is_closed() {
        Some(CONNECTION_LOST.to_string())
    } else {
        err.code().map(|state| state.code().to_string())
    };
    let fatal_state = code
        .as_deref()
        .is_some_and(|c| c.starts_with("08") || c.starts_with("57P"));
    let fatal_severity = err
        .as_db_error()
        .is_some_and(|db| matches!(db.severity(), "FATAL" | "PANIC"));
    let io_failure = err
        .source()
        .is_some_and(|source| source.is::<std::io::Error>());
    let fatal = err.is_closed() || io_failure || fatal_state || fatal_severity;
    (fatal, code)
}

/// `PostgreSQL` driver. One `connect` opens one session without TLS.
#[derive(Debug, Default, Clone, Copy)]
pub struct PostgresDriver;

impl PostgresDriver {
    fn config(descriptor: &ConnectionDescriptor) -> PgConfig {
        let mut config = PgConfig::new();
        config.host(&descriptor.host).dbname(&descriptor.database);
        if let Some(port) = descriptor.port {
            config.port(port);
        }
        if !descriptor.user.is_empty() {
            config.user(&descriptor.user);
        }
        if !descriptor.password.is_empty() {
            config.password(&descriptor.password);
        }
        config
    }
}

#[async_trait]
impl Driver for PostgresDriver {
    fn name(&self) -> &'static str {
        "postgres"
    }

    async fn connect(
        &self,
        descriptor: &ConnectionDescriptor,
    ) -> Result<Box<dyn DriverConnection>, DriverError> {
        let (client, connection) = Self::config(descriptor)
            .connect(NoTls)
            .await
            .map_err(|e| classify_error(Phase::Connect, &e))?;

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(async move {
            let event = match connection.await {
                Ok(()) => DriverError::connection_lost("server closed the connection"),
                Err(err) => session_ended(&err),
            };
            let _ = events_tx.send(event);
        });

        Ok(Box::new(PostgresConnection {
            client: Some(client),
            task: Some(task),
            events: Some(events_rx),
        }))
    }
}

/// Live `tokio-postgres` session plus the task driving its socket.
pub struct PostgresConnection {
    client: Option<Client>,
    task: Option<JoinHandle<()>>,
    events: Option<ConnectionEvents>,
}

impl PostgresConnection {
    fn client(&self) -> Result<&Client, DriverError> {
        self.client
            .as_ref()
            .ok_or_else(|| DriverError::query(true, Some(CONNECTION_LOST), "connection destroyed"))
    }
}

#[async_trait]
impl DriverConnection for PostgresConnection {
    async fn execute_raw(&mut self, sql: &str) -> Result<ResultSet, DriverError> {
        let messages = self
            .client()?
            .simple_query(sql)
            .await
            .map_err(|e| classify_error(Phase::Query, &e))?;
        Ok(build_result_set_from_simple(&messages))
    }

    async fn execute_params(
        &mut self,
        sql: &str,
        params: &[RowValues],
    ) -> Result<ResultSet, DriverError> {
        let client = self.client()?;
        let stmt = client
            .prepare(sql)
            .await
            .map_err(|e| classify_error(Phase::Query, &e))?;
        let converted = Params::convert(params);

        if stmt.columns().is_empty() {
            let affected = client
                .execute(&stmt, converted.as_refs())
                .await
                .map_err(|e| classify_error(Phase::Query, &e))?;
            return Ok(ResultSet::affected(
                usize::try_from(affected).unwrap_or(usize::MAX),
            ));
        }

        let rows = client
            .query(&stmt, converted.as_refs())
            .await
            .map_err(|e| classify_error(Phase::Query, &e))?;
        build_result_set_from_statement(&stmt, &rows)
            .map_err(|e| classify_error(Phase::Query, &e))
    }

    fn take_events(&mut self) -> Option<ConnectionEvents> {
        self.events.take()
    }

    fn destroy(&mut self) {
        // abort first so the closing socket is not reported as a lost connection
        if let Some(task) = self.task.take() {
            task.abort();
        }
        self.client = None;
    }
}

impl Drop for PostgresConnection {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}
