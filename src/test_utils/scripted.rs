use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc::{self, UnboundedSender};

use crate::config::ConnectionDescriptor;
use crate::driver::{ConnectionEvents, Driver, DriverConnection, DriverError};
use crate::results::ResultSet;
use crate::types::RowValues;

/// One statement as the scripted driver received it.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutedQuery {
    /// Host of the descriptor the connection was opened with
    pub host: String,
    /// Driver-assigned id of the connection that ran it
    pub conn_id: u64,
    pub sql: String,
    /// `None` for the raw path, `Some` for the parameterized path
    pub params: Option<Vec<RowValues>>,
}

#[derive(Default)]
struct Script {
    connect_outcomes: VecDeque<Option<DriverError>>,
    query_outcomes: VecDeque<Result<ResultSet, DriverError>>,
    connect_delay: Option<Duration>,
    connects: Vec<String>,
    executed: Vec<ExecutedQuery>,
    destroys: usize,
    live: usize,
    max_live: usize,
    next_id: u64,
    event_senders: Vec<UnboundedSender<DriverError>>,
}

/// Driver that replays queued outcomes.
///
/// Unscripted connects succeed; unscripted queries return one row with a `host`
/// column naming the endpoint that served them.
#[derive(Clone, Default)]
pub struct ScriptedDriver {
    script: Arc<Mutex<Script>>,
}

impl std::fmt::Debug for ScriptedDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptedDriver")
            .field("connect_calls", &self.connect_calls())
            .field("query_calls", &self.query_calls())
            .field("destroy_calls", &self.destroy_calls())
            .finish()
    }
}

impl ScriptedDriver {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// This driver as a trait object; call counters stay shared with `self`.
    #[must_use]
    pub fn as_driver(&self) -> Arc<dyn Driver> {
        Arc::new(self.clone())
    }

    /// The next `times` connects fail with `err`.
    pub fn fail_connects(&self, times: usize, err: DriverError) {
        let mut script = self.lock();
        for _ in 0..times {
            script.connect_outcomes.push_back(Some(err.clone()));
        }
    }

    /// The next `times` queries fail with `err`.
    pub fn fail_queries(&self, times: usize, err: DriverError) {
        let mut script = self.lock();
        for _ in 0..times {
            script.query_outcomes.push_back(Err(err.clone()));
        }
    }

    /// Queue a successful query result.
    pub fn push_query_result(&self, result: ResultSet) {
        self.lock().query_outcomes.push_back(Ok(result));
    }

    /// Make every connect wait `delay` before resolving.
    pub fn set_connect_delay(&self, delay: Duration) {
        self.lock().connect_delay = Some(delay);
    }

    /// Deliver `err` as an asynchronous error on the most recent connection.
    /// Returns `false` if no connection is listening.
    pub fn emit_event(&self, err: DriverError) -> bool {
        self.lock()
            .event_senders
            .last()
            .is_some_and(|sender| sender.send(err).is_ok())
    }

    #[must_use]
    pub fn connect_calls(&self) -> usize {
        self.lock().connects.len()
    }

    /// Host of every connect call, failed ones included.
    #[must_use]
    pub fn connected_hosts(&self) -> Vec<String> {
        self.lock().connects.clone()
    }

    #[must_use]
    pub fn query_calls(&self) -> usize {
        self.lock().executed.len()
    }

    #[must_use]
    pub fn executed(&self) -> Vec<ExecutedQuery> {
        self.lock().executed.clone()
    }

    #[must_use]
    pub fn destroy_calls(&self) -> usize {
        self.lock().destroys
    }

    /// Handles created and not yet destroyed or dropped.
    #[must_use]
    pub fn live_handles(&self) -> usize {
        self.lock().live
    }

    /// Highest number of simultaneously live handles seen so far.
    #[must_use]
    pub fn max_live_handles(&self) -> usize {
        self.lock().max_live
    }

    fn lock(&self) -> MutexGuard<'_, Script> {
        self.script.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl Driver for ScriptedDriver {
    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn connect(
        &self,
        descriptor: &ConnectionDescriptor,
    ) -> Result<Box<dyn DriverConnection>, DriverError> {
        let delay = self.lock().connect_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut script = self.lock();
        script.connects.push(descriptor.host.clone());
        if let Some(Some(err)) = script.connect_outcomes.pop_front() {
            return Err(err);
        }

        script.next_id += 1;
        script.live += 1;
        script.max_live = script.max_live.max(script.live);
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        script.event_senders.push(events_tx);

        Ok(Box::new(ScriptedConnection {
            script: Arc::clone(&self.script),
            host: descriptor.host.clone(),
            id: script.next_id,
            events: Some(events_rx),
            released: false,
        }))
    }
}

struct ScriptedConnection {
    script: Arc<Mutex<Script>>,
    host: String,
    id: u64,
    events: Option<ConnectionEvents>,
    released: bool,
}

impl ScriptedConnection {
    fn run(&self, sql: &str, params: Option<&[RowValues]>) -> Result<ResultSet, DriverError> {
        let mut script = self.script.lock().unwrap_or_else(PoisonError::into_inner);
        script.executed.push(ExecutedQuery {
            host: self.host.clone(),
            conn_id: self.id,
            sql: sql.to_string(),
            params: params.map(<[RowValues]>::to_vec),
        });
        script
            .query_outcomes
            .pop_front()
            .unwrap_or_else(|| Ok(self.echo_host()))
    }

    fn echo_host(&self) -> ResultSet {
        let mut result = ResultSet::with_capacity(1);
        result.set_column_names(Arc::new(vec!["host".to_string()]));
        result.add_row_values(vec![RowValues::Text(self.host.clone())]);
        result
    }

    fn release(&mut self, destroyed: bool) {
        if self.released {
            return;
        }
        self.released = true;
        let mut script = self.script.lock().unwrap_or_else(PoisonError::into_inner);
        script.live = script.live.saturating_sub(1);
        if destroyed {
            script.destroys += 1;
        }
    }
}

#[async_trait]
impl DriverConnection for ScriptedConnection {
    fn connection_id(&self) -> Option<u64> {
        Some(self.id)
    }

    async fn execute_raw(&mut self, sql: &str) -> Result<ResultSet, DriverError> {
        self.run(sql, None)
    }

    async fn execute_params(
        &mut self,
        sql: &str,
        params: &[RowValues],
    ) -> Result<ResultSet, DriverError> {
        self.run(sql, Some(params))
    }

    fn take_events(&mut self) -> Option<ConnectionEvents> {
        self.events.take()
    }

    fn destroy(&mut self) {
        self.release(true);
    }
}

impl Drop for ScriptedConnection {
    fn drop(&mut self) {
        self.release(false);
    }
}
