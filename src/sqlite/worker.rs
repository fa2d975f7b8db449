use std::sync::mpsc::{self, Receiver, Sender};
use std::thread;

use rusqlite::types::Value;
use tokio::sync::oneshot;

use super::driver::classify_error;
use super::query::execute;
use crate::driver::{CONNECTION_LOST, DriverError, Phase};
use crate::results::ResultSet;

pub(super) enum Command {
    Execute {
        sql: String,
        params: Option<Vec<Value>>,
        respond_to: oneshot::Sender<Result<ResultSet, DriverError>>,
    },
    Shutdown,
}

/// Handle to the thread that owns one rusqlite connection.
pub(super) struct SqliteWorker {
    sender: Sender<Command>,
}

impl SqliteWorker {
    /// Spawn the worker and wait until it has opened `path`.
    pub(super) async fn spawn(path: String, conn_id: u64) -> Result<Self, DriverError> {
        let (sender, receiver) = mpsc::channel::<Command>();
        let (ready_tx, ready_rx) = oneshot::channel();

        thread::Builder::new()
            .name(format!("sqlite-worker-{conn_id}"))
            .spawn(move || match rusqlite::Connection::open(&path) {
                Ok(conn) => {
                    let _ = ready_tx.send(Ok(()));
                    run_sqlite_worker(&conn, &receiver);
                }
                Err(err) => {
                    let _ = ready_tx.send(Err(classify_error(Phase::Connect, &err)));
                }
            })
            .map_err(|err| {
                DriverError::connect(
                    None::<String>,
                    format!("failed to spawn SQLite worker thread: {err}"),
                )
            })?;

        ready_rx.await.map_err(|_| {
            DriverError::connect(None::<String>, "SQLite worker exited while opening")
        })??;
        Ok(Self { sender })
    }

    pub(super) async fn execute(
        &self,
        sql: String,
        params: Option<Vec<Value>>,
    ) -> Result<ResultSet, DriverError> {
        let (respond_to, response) = oneshot::channel();
        self.sender
            .send(Command::Execute {
                sql,
                params,
                respond_to,
            })
            .map_err(|_| worker_gone())?;
        response.await.map_err(|_| worker_gone())?
    }

    pub(super) fn shutdown(&self) {
        let _ = self.sender.send(Command::Shutdown);
    }
}

fn worker_gone() -> DriverError {
    DriverError::query(true, Some(CONNECTION_LOST), "SQLite worker closed")
}

fn run_sqlite_worker(conn: &rusqlite::Connection, receiver: &Receiver<Command>) {
    while let Ok(command) = receiver.recv() {
        match command {
            Command::Shutdown => break,
            Command::Execute {
                sql,
                params,
                respond_to,
            } => {
                let result = execute(conn, &sql, params.as_deref())
                    .map_err(|err| classify_error(Phase::Query, &err));
                let _ = respond_to.send(result);
            }
        }
    }
}
