//! Resilient read/write splitting in front of a relational database.
//!
//! A [`Router`] owns two [`Endpoint`]s, one for reads and one for writes (the
//! same endpoint when both sides point at the same server). Each query is
//! classified by its leading keyword and sent to the matching endpoint. An
//! endpoint keeps exactly one physical connection and heals it on its own:
//! failed connects and connection-level query failures are retried with linear
//! backoff up to a fixed number of attempts, while statements the database
//! rejects are returned to the caller immediately.
//!
//! ```rust,no_run
//! use sql_failover::prelude::*;
//!
//! # async fn demo() -> Result<(), SqlFailoverError> {
//! let read = ConnectionDescriptor::from_env("DB_READ")?;
//! let write = ConnectionDescriptor::from_env("DB_WRITE").ok();
//! let router = Router::postgres(read, write)?;
//! router.connect().await?;
//!
//! let users = router.query("SELECT id, name FROM users").await?;
//! for row in &users {
//!     println!("{:?}", row.get("name"));
//! }
//! # Ok(())
//! # }
//! ```
//!
//! Drivers for `PostgreSQL` (`postgres` feature) and `SQLite` (`sqlite` feature)
//! are included; anything implementing [`driver::Driver`] can be plugged in.

pub mod backoff;
pub mod classify;
pub mod config;
pub mod driver;
pub mod endpoint;
pub mod error;
pub mod logging;
pub mod prelude;
pub mod query;
pub mod results;
pub mod router;
pub mod types;

#[cfg(feature = "postgres")]
pub mod postgres;
#[cfg(feature = "sqlite")]
pub mod sqlite;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use backoff::{BackoffMode, RetryPolicy};
pub use classify::{QueryKind, classify};
pub use config::{ConnectionDescriptor, DriverKind};
pub use driver::{Driver, DriverConnection, DriverError, FailureKind};
pub use endpoint::{Endpoint, EndpointState, EndpointStatus};
pub use error::SqlFailoverError;
pub use logging::{EventLog, NoopLog, TracingLog};
pub use query::QueryAndParams;
pub use results::{CustomDbRow, ResultSet};
pub use router::{Router, RouterBuilder};
pub use types::RowValues;
