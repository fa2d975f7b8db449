//! One physical connection and the machinery that keeps it alive.
//!
//! Every operation on an [`Endpoint`] runs under an async mutex that owns the
//! driver handle, so a connect, a query, a backoff sleep and the reconnect that
//! follows it are strictly sequential. Another caller waits for the whole retry
//! sequence to finish, which is what keeps a second live handle from appearing.
//!
//! Counters and lifecycle state are mirrored in a small synchronous lock that is
//! never held across an await, so [`Endpoint::status`] answers immediately even
//! while a retry sleep is pending.

mod state;

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::Mutex as AsyncMutex;
use tokio::sync::mpsc::error::TryRecvError;

use crate::backoff::{AttemptCounters, Operation, RetryDecision, RetryPolicy};
use crate::config::ConnectionDescriptor;
use crate::driver::{ConnectionEvents, Driver, DriverConnection, DriverError, FailureKind};
use crate::error::SqlFailoverError;
use crate::logging::EventLog;
use crate::query::QueryAndParams;
use crate::results::ResultSet;

pub use state::{EndpointState, EndpointStatus};

#[derive(Default)]
struct Link {
    handle: Option<Box<dyn DriverConnection>>,
    events: Option<ConnectionEvents>,
}

/// Owner of a single physical connection and its retry state.
pub struct Endpoint {
    descriptor: Arc<ConnectionDescriptor>,
    driver: Arc<dyn Driver>,
    log: Arc<dyn EventLog>,
    policy: RetryPolicy,
    status: Mutex<EndpointStatus>,
    link: AsyncMutex<Link>,
}

impl std::fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Endpoint")
            .field("descriptor", &self.descriptor)
            .field("driver", &self.driver.name())
            .field("policy", &self.policy)
            .field("status", &self.status())
            .finish_non_exhaustive()
    }
}

impl Endpoint {
    /// Create a disconnected endpoint. No I/O happens until [`Endpoint::connect`].
    #[must_use]
    pub fn new(
        descriptor: Arc<ConnectionDescriptor>,
        driver: Arc<dyn Driver>,
        log: Arc<dyn EventLog>,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            descriptor,
            driver,
            log,
            policy,
            status: Mutex::new(EndpointStatus::default()),
            link: AsyncMutex::new(Link::default()),
        }
    }

    #[must_use]
    pub fn descriptor(&self) -> &Arc<ConnectionDescriptor> {
        &self.descriptor
    }

    #[must_use]
    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.policy
    }

    #[must_use]
    pub fn status(&self) -> EndpointStatus {
        *self.lock_status()
    }

    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.status().state == EndpointState::Connected
    }

    /// Establish the connection, retrying transient failures with backoff.
    ///
    /// Does nothing if a handle is already held. After a terminal failure the
    /// endpoint is reusable: the next call starts a fresh cycle.
    ///
    /// # Errors
    /// Returns `SqlFailoverError::ConnectFailed` once the connect cap is reached, or
    /// `SqlFailoverError::Unrecoverable` for an unknown asynchronous error that was
    /// pending on the current handle.
    pub async fn connect(&self) -> Result<(), SqlFailoverError> {
        let mut link = self.link.lock().await;
        if link.handle.is_some() {
            return self.drain_events(&mut link).await;
        }
        self.connect_cycle(&mut link, EndpointState::Connecting).await
    }

    /// Run a query, reconnecting and re-submitting it while the driver reports
    /// fatal (connection-level) failures.
    ///
    /// Connects first if no handle is held. Parameters go through the driver's
    /// parameterized path with absence markers turned into NULL; a query without
    /// parameters is sent as raw SQL.
    ///
    /// # Errors
    /// - `SqlFailoverError::QueryError` for a statement the database rejected (never retried)
    /// - `SqlFailoverError::QueryRetriesExhausted` once the query cap is reached
    /// - `SqlFailoverError::ConnectFailed` if a reconnect runs out of attempts
    /// - `SqlFailoverError::Unrecoverable` for an unknown asynchronous error
    pub async fn query(&self, query: &QueryAndParams) -> Result<ResultSet, SqlFailoverError> {
        let mut link = self.link.lock().await;
        self.drain_events(&mut link).await?;

        let params = query.normalized_params();
        if self.descriptor.debug {
            tracing::debug!(
                target: "sql_failover",
                endpoint = %self.descriptor,
                params = params.len(),
                "{}",
                query.query
            );
        }

        loop {
            let Some(handle) = link.handle.as_mut() else {
                self.connect_cycle(&mut link, EndpointState::Connecting)
                    .await?;
                continue;
            };

            let outcome = if params.is_empty() {
                handle.execute_raw(&query.query).await
            } else {
                handle.execute_params(&query.query, &params).await
            };

            let err = match outcome {
                Ok(result) => {
                    self.lock_status().query_attempts = 0;
                    return Ok(result);
                }
                Err(err) if err.kind() == FailureKind::FatalQuery => err,
                Err(err) => {
                    self.log
                        .error(&format!("Query error: {err}\n{}\n", query.query));
                    return Err(SqlFailoverError::QueryError(err));
                }
            };

            match self.policy.decide(Operation::Query, self.counters()) {
                RetryDecision::Retry { attempt, delay } => {
                    self.lock_status().query_attempts = attempt;
                    self.log.error(&format!(
                        "(FATAL) query on {} (retrying [{attempt}] in {delay:?}): {err}",
                        self.descriptor
                    ));
                    self.release(&mut link);
                    self.lock_status().state = EndpointState::Reconnecting;
                    let guard = AbandonGuard::arm(&self.status);
                    tokio::time::sleep(delay).await;
                    let reconnected = self
                        .connect_cycle(&mut link, EndpointState::Reconnecting)
                        .await;
                    guard.disarm();
                    if let Err(err) = reconnected {
                        self.lock_status().query_attempts = 0;
                        return Err(err);
                    }
                }
                RetryDecision::GiveUp => {
                    let attempts = self.counters().query;
                    self.release(&mut link);
                    {
                        let mut status = self.lock_status();
                        status.query_attempts = 0;
                        status.state = EndpointState::Disconnected;
                    }
                    self.log.error(&format!(
                        "query on {} failed after {attempts} retries: {err}\n{}\n",
                        self.descriptor, query.query
                    ));
                    return Err(SqlFailoverError::QueryRetriesExhausted {
                        attempts,
                        source: err,
                    });
                }
            }
        }
    }

    /// Apply the asynchronous error policy to `err` as if the live handle had
    /// reported it.
    ///
    /// # Errors
    /// `SqlFailoverError::Unrecoverable` for anything other than a lost connection,
    /// or the error of the reconnect cycle.
    pub async fn handle_connection_error(&self, err: DriverError) -> Result<(), SqlFailoverError> {
        let mut link = self.link.lock().await;
        self.on_connection_error(&mut link, err).await
    }

    /// Handle every asynchronous error the live handle has reported so far.
    ///
    /// # Errors
    /// See [`Endpoint::handle_connection_error`].
    pub async fn process_events(&self) -> Result<(), SqlFailoverError> {
        let mut link = self.link.lock().await;
        self.drain_events(&mut link).await
    }

    /// Release the connection handle, if any. Safe to call repeatedly.
    pub async fn destroy(&self) {
        let mut link = self.link.lock().await;
        self.release(&mut link);
        self.lock_status().state = EndpointState::Disconnected;
    }

    async fn connect_cycle(
        &self,
        link: &mut Link,
        entry_state: EndpointState,
    ) -> Result<(), SqlFailoverError> {
        self.lock_status().state = entry_state;
        let guard = AbandonGuard::arm(&self.status);
        let outcome = self.connect_loop(link).await;
        guard.disarm();
        outcome
    }

    async fn connect_loop(&self, link: &mut Link) -> Result<(), SqlFailoverError> {
        loop {
            let err = match self.driver.connect(&self.descriptor).await {
                Ok(mut handle) => {
                    link.events = handle.take_events();
                    let conn_id = handle
                        .connection_id()
                        .map_or_else(|| "-".to_string(), |id| id.to_string());
                    link.handle = Some(handle);
                    {
                        let mut status = self.lock_status();
                        status.connect_attempts = 0;
                        status.state = EndpointState::Connected;
                    }
                    self.log.log(&format!(
                        "Connected to {} via {} (conn: {conn_id})",
                        self.descriptor,
                        self.driver.name()
                    ));
                    return Ok(());
                }
                Err(err) => err,
            };

            match self.policy.decide(Operation::Connect, self.counters()) {
                RetryDecision::Retry { attempt, delay } => {
                    self.lock_status().connect_attempts = attempt;
                    self.log.error(&format!(
                        "connecting to {} (retrying [{attempt}] in {delay:?}): {err}",
                        self.descriptor
                    ));
                    self.release(link);
                    tokio::time::sleep(delay).await;
                }
                RetryDecision::GiveUp => {
                    let attempts = self.counters().connect;
                    {
                        let mut status = self.lock_status();
                        status.connect_attempts = 0;
                        status.state = EndpointState::Failed;
                    }
                    self.log.error(&format!(
                        "connecting to {} failed after {attempts} retries: {err}",
                        self.descriptor
                    ));
                    return Err(SqlFailoverError::ConnectFailed {
                        host: self.descriptor.host.clone(),
                        attempts,
                        source: err,
                    });
                }
            }
        }
    }

    async fn drain_events(&self, link: &mut Link) -> Result<(), SqlFailoverError> {
        loop {
            let next = match link.events.as_mut() {
                Some(events) => events.try_recv(),
                None => return Ok(()),
            };
            match next {
                Ok(err) => self.on_connection_error(link, err).await?,
                Err(TryRecvError::Empty) => return Ok(()),
                Err(TryRecvError::Disconnected) => {
                    link.events = None;
                    return Ok(());
                }
            }
        }
    }

    async fn on_connection_error(
        &self,
        link: &mut Link,
        err: DriverError,
    ) -> Result<(), SqlFailoverError> {
        let fatal = if err.is_fatal() { "(FATAL) " } else { "" };
        self.log
            .error(&format!("{fatal}connection to {}: {err}", self.descriptor));

        match err.kind() {
            FailureKind::ConnectionLost => {
                self.release(link);
                self.connect_cycle(link, EndpointState::Reconnecting).await
            }
            _ => Err(SqlFailoverError::Unrecoverable(err)),
        }
    }

    fn release(&self, link: &mut Link) {
        link.events = None;
        if let Some(mut handle) = link.handle.take() {
            handle.destroy();
        }
    }

    fn counters(&self) -> AttemptCounters {
        self.lock_status().counters()
    }

    fn lock_status(&self) -> MutexGuard<'_, EndpointStatus> {
        self.status.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Puts the endpoint back to `Disconnected` with zeroed counters when a caller
/// drops a future in the middle of a retry sequence. No handle is held at any
/// point where that can happen.
struct AbandonGuard<'a> {
    status: &'a Mutex<EndpointStatus>,
    armed: bool,
}

impl<'a> AbandonGuard<'a> {
    fn arm(status: &'a Mutex<EndpointStatus>) -> Self {
        Self {
            status,
            armed: true,
        }
    }

    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for AbandonGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            *self.status.lock().unwrap_or_else(PoisonError::into_inner) =
                EndpointStatus::default();
        }
    }
}

impl Drop for Endpoint {
    fn drop(&mut self) {
        let link = self.link.get_mut();
        link.events = None;
        if let Some(mut handle) = link.handle.take() {
            handle.destroy();
        }
    }
}
