//! Convenient imports for common functionality.

pub use crate::backoff::{BackoffMode, RetryPolicy};
pub use crate::classify::{QueryKind, classify};
pub use crate::config::{ConnectionDescriptor, DriverKind};
pub use crate::endpoint::{Endpoint, EndpointState, EndpointStatus};
pub use crate::error::SqlFailoverError;
pub use crate::logging::{EventLog, NoopLog, TracingLog};
pub use crate::query::QueryAndParams;
pub use crate::results::{CustomDbRow, ResultSet};
pub use crate::router::{Router, RouterBuilder};
pub use crate::types::RowValues;

#[cfg(feature = "postgres")]
pub use crate::postgres::PostgresDriver;
#[cfg(feature = "sqlite")]
pub use crate::sqlite::SqliteDriver;
