use postgresql_embedded::PostgreSQL;

use crate::config::ConnectionDescriptor;
use crate::driver::{Driver, DriverConnection};
use crate::postgres::PostgresDriver;

/// A running embedded `PostgreSQL` server and a descriptor for its test database.
pub struct EmbeddedPostgres {
    postgresql: PostgreSQL,
    /// Connects to the database created by [`setup_postgres_embedded`]
    pub descriptor: ConnectionDescriptor,
}

impl EmbeddedPostgres {
    #[must_use]
    pub fn port(&self) -> u16 {
        self.postgresql.settings().port
    }

    /// Stop the server. Its data directory is temporary and goes with it.
    pub async fn stop(self) {
        let _ = self.postgresql.stop().await;
    }
}

/// Set up and start an embedded `PostgreSQL` server, create `database` on it and
/// check that the crate's own driver can run a statement there.
///
/// # Errors
/// Returns an error if the server cannot be installed or started, the database
/// cannot be created, or the post-start connectivity check fails.
pub async fn setup_postgres_embedded(
    database: &str,
) -> Result<EmbeddedPostgres, Box<dyn std::error::Error + Send + Sync>> {
    let mut postgresql = PostgreSQL::default();
    postgresql.setup().await?;
    postgresql.start().await?;
    postgresql.create_database(database).await?;

    let settings = postgresql.settings();
    let descriptor = ConnectionDescriptor::builder()
        .host(settings.host.clone())
        .port(settings.port)
        .user(settings.username.clone())
        .password(settings.password.clone())
        .database(database)
        .build();

    let mut conn = PostgresDriver.connect(&descriptor).await?;
    conn.execute_raw("SELECT 1").await?;
    conn.destroy();

    tracing::info!(target: "sql_failover", "embedded PostgreSQL started on {descriptor}");
    Ok(EmbeddedPostgres {
        postgresql,
        descriptor,
    })
}
