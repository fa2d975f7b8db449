// SQLite driver over rusqlite
//
// rusqlite connections are blocking, so each handle owns a worker thread and
// talks to it over a command channel:
// - driver: connect, error classification, the DriverConnection impl
// - worker: thread + command loop
// - params / query: value conversion in both directions

mod driver;
pub mod params;
pub mod query;
mod worker;

pub use driver::{SqliteConnection, SqliteDriver, classify_error};
