//! Read/write splitting front of two endpoints.

use std::sync::Arc;

use crate::backoff::RetryPolicy;
use crate::classify::QueryKind;
use crate::config::ConnectionDescriptor;
use crate::driver::Driver;
use crate::endpoint::Endpoint;
use crate::error::SqlFailoverError;
use crate::logging::{EventLog, TracingLog};
use crate::query::QueryAndParams;
use crate::results::ResultSet;

/// Single logical database handle that sends `SELECT`s to the read endpoint and
/// everything else to the write endpoint.
///
/// When both sides resolve to the same descriptor, they share one [`Endpoint`]
/// (and so one physical connection):
/// ```rust,no_run
/// # async fn demo() -> Result<(), sql_failover::SqlFailoverError> {
/// use sql_failover::prelude::*;
///
/// let primary = ConnectionDescriptor::builder()
///     .host("db-primary")
///     .user("app")
///     .password("secret")
///     .database("orders")
///     .build();
/// let replica = ConnectionDescriptor { host: "db-replica".into(), ..primary.clone() };
///
/// let router = Router::builder(replica)
///     .write(primary)
///     .driver(DriverKind::Postgres.driver())
///     .build()?;
/// router.connect().await?;
/// let rows = router.query("SELECT id FROM orders").await?;
/// router
///     .query(QueryAndParams::new(
///         "UPDATE orders SET shipped = $1 WHERE id = $2",
///         vec![RowValues::Bool(true), RowValues::Int(7)],
///     ))
///     .await?;
/// # let _ = rows;
/// router.disconnect().await;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct Router {
    read: Arc<Endpoint>,
    write: Arc<Endpoint>,
}

impl Router {
    /// Start building a router whose read side connects with `read`.
    #[must_use]
    pub fn builder(read: ConnectionDescriptor) -> RouterBuilder {
        RouterBuilder::new(read)
    }

    /// Router over two existing endpoints. Pass the same `Arc` twice to share one
    /// connection between both sides.
    #[must_use]
    pub fn from_endpoints(read: Arc<Endpoint>, write: Arc<Endpoint>) -> Self {
        Self { read, write }
    }

    /// `PostgreSQL` router with default logging and retry policy.
    ///
    /// # Errors
    /// Returns `SqlFailoverError::ConfigError` for an incomplete descriptor.
    #[cfg(feature = "postgres")]
    pub fn postgres(
        read: ConnectionDescriptor,
        write: Option<ConnectionDescriptor>,
    ) -> Result<Self, SqlFailoverError> {
        Self::builder(read)
            .write_opt(write)
            .driver(Arc::new(crate::postgres::PostgresDriver))
            .build()
    }

    /// `SQLite` router with default logging and retry policy.
    ///
    /// # Errors
    /// Returns `SqlFailoverError::ConfigError` for an empty database path.
    #[cfg(feature = "sqlite")]
    pub fn sqlite(
        read: ConnectionDescriptor,
        write: Option<ConnectionDescriptor>,
    ) -> Result<Self, SqlFailoverError> {
        Self::builder(read)
            .write_opt(write)
            .driver(Arc::new(crate::sqlite::SqliteDriver))
            .build()
    }

    #[must_use]
    pub fn read_endpoint(&self) -> &Arc<Endpoint> {
        &self.read
    }

    #[must_use]
    pub fn write_endpoint(&self) -> &Arc<Endpoint> {
        &self.write
    }

    /// Whether both sides are served by the same endpoint.
    #[must_use]
    pub fn is_shared(&self) -> bool {
        Arc::ptr_eq(&self.read, &self.write)
    }

    /// Endpoint that serves `kind`.
    #[must_use]
    pub fn endpoint_for(&self, kind: QueryKind) -> &Arc<Endpoint> {
        match kind {
            QueryKind::Read => &self.read,
            QueryKind::Write => &self.write,
        }
    }

    /// Connect the read side, then the write side if it is a separate endpoint.
    ///
    /// # Errors
    /// The first side's terminal connect error; the write side is not attempted if
    /// the read side fails.
    pub async fn connect(&self) -> Result<(), SqlFailoverError> {
        self.read.connect().await?;
        if !self.is_shared() {
            self.write.connect().await?;
        }
        Ok(())
    }

    /// Release both connections, a shared one only once.
    pub async fn disconnect(&self) {
        self.read.destroy().await;
        if !self.is_shared() {
            self.write.destroy().await;
        }
    }

    /// Classify `query` and run it on the matching endpoint.
    ///
    /// # Errors
    /// Whatever [`Endpoint::query`] returns for the chosen side.
    pub async fn query(
        &self,
        query: impl Into<QueryAndParams>,
    ) -> Result<ResultSet, SqlFailoverError> {
        let query = query.into();
        let kind = query.kind();
        self.dispatch(kind, &query).await
    }

    /// Run `query` on the side named by `kind`, bypassing classification.
    ///
    /// # Errors
    /// Whatever [`Endpoint::query`] returns for that side.
    pub async fn query_as(
        &self,
        kind: QueryKind,
        query: impl Into<QueryAndParams>,
    ) -> Result<ResultSet, SqlFailoverError> {
        let query = query.into();
        self.dispatch(kind, &query).await
    }

    /// Handle pending asynchronous connection errors on both sides.
    ///
    /// # Errors
    /// The first side's unrecoverable error or failed reconnect.
    pub async fn process_events(&self) -> Result<(), SqlFailoverError> {
        self.read.process_events().await?;
        if !self.is_shared() {
            self.write.process_events().await?;
        }
        Ok(())
    }

    async fn dispatch(
        &self,
        kind: QueryKind,
        query: &QueryAndParams,
    ) -> Result<ResultSet, SqlFailoverError> {
        tracing::trace!(target: "sql_failover", side = %kind, "dispatching query");
        self.endpoint_for(kind).query(query).await
    }
}

/// Builder for [`Router`]. Validates configuration; performs no I/O.
pub struct RouterBuilder {
    read: ConnectionDescriptor,
    write: Option<ConnectionDescriptor>,
    driver: Option<Arc<dyn Driver>>,
    log: Arc<dyn EventLog>,
    policy: RetryPolicy,
}

impl RouterBuilder {
    fn new(read: ConnectionDescriptor) -> Self {
        Self {
            read,
            write: None,
            driver: None,
            log: Arc::new(TracingLog),
            policy: RetryPolicy::default(),
        }
    }

    /// Descriptor for the write side. Equal to the read descriptor means shared.
    #[must_use]
    pub fn write(self, write: ConnectionDescriptor) -> Self {
        self.write_opt(Some(write))
    }

    #[must_use]
    pub fn write_opt(mut self, write: Option<ConnectionDescriptor>) -> Self {
        self.write = write;
        self
    }

    #[must_use]
    pub fn driver(mut self, driver: Arc<dyn Driver>) -> Self {
        self.driver = Some(driver);
        self
    }

    #[must_use]
    pub fn log(mut self, log: Arc<dyn EventLog>) -> Self {
        self.log = log;
        self
    }

    #[must_use]
    pub fn retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Validate the descriptors and create both (or one shared) endpoints.
    ///
    /// # Errors
    /// Returns `SqlFailoverError::ConfigError` if no driver was given or a
    /// descriptor is incomplete for that driver.
    pub fn build(self) -> Result<Router, SqlFailoverError> {
        let driver = self.driver.ok_or_else(|| {
            SqlFailoverError::ConfigError("a driver is required".to_string())
        })?;
        driver.validate(&self.read)?;

        let read = Arc::new(self.read);
        let read_endpoint = Arc::new(Endpoint::new(
            Arc::clone(&read),
            Arc::clone(&driver),
            Arc::clone(&self.log),
            self.policy,
        ));

        let write_endpoint = match self.write {
            Some(write) if write != *read => {
                driver.validate(&write)?;
                Arc::new(Endpoint::new(
                    Arc::new(write),
                    driver,
                    self.log,
                    self.policy,
                ))
            }
            _ => Arc::clone(&read_endpoint),
        };

        Ok(Router {
            read: read_endpoint,
            write: write_endpoint,
        })
    }
}
