// PostgreSQL driver over tokio-postgres
//
// - driver: connect, error classification, the DriverConnection impl
// - params: RowValues -> ToSql
// - query: row extraction into ResultSet

mod driver;
pub mod params;
pub mod query;

pub use driver::{PostgresConnection, PostgresDriver, classify_error, session_ended};
pub use params::Params;
