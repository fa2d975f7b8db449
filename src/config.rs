use std::fmt;
use std::sync::Arc;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::driver::Driver;
use crate::error::SqlFailoverError;

/// Parameters identifying and authenticating to one physical database endpoint.
///
/// Immutable once built. Two descriptors that compare equal describe the same
/// physical endpoint, which is how the router decides to share one connection
/// between its read and write sides.
///
/// ```rust
/// use sql_failover::ConnectionDescriptor;
///
/// let primary = ConnectionDescriptor::builder()
///     .host("db-primary")
///     .port(5432)
///     .user("app")
///     .password("secret")
///     .database("orders")
///     .build();
/// assert!(format!("{primary:?}").contains("<redacted>"));
/// ```
#[derive(Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionDescriptor {
    /// Host name, or the database file path for `SQLite`
    pub host: String,
    pub port: Option<u16>,
    pub user: String,
    pub password: String,
    /// Target database name (`SQLite`: path of the database file)
    pub database: String,
    /// Emit every SQL statement at debug level
    pub debug: bool,
}

impl fmt::Debug for ConnectionDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionDescriptor")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .field("database", &self.database)
            .field("debug", &self.debug)
            .finish()
    }
}

impl fmt::Display for ConnectionDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.port {
            Some(port) => write!(f, "{}:{}/{}", self.host, port, self.database),
            None => write!(f, "{}/{}", self.host, self.database),
        }
    }
}

impl ConnectionDescriptor {
    #[must_use]
    pub fn builder() -> ConnectionDescriptorBuilder {
        ConnectionDescriptorBuilder::default()
    }

    /// Descriptor for a `SQLite` database file (or `:memory:`).
    #[must_use]
    pub fn sqlite(path: impl Into<String>) -> Self {
        Self {
            host: "localhost".to_string(),
            database: path.into(),
            ..Self::default()
        }
    }

    /// Read a descriptor from `<PREFIX>_HOST`, `<PREFIX>_PORT`, `<PREFIX>_USER`,
    /// `<PREFIX>_PASSWORD`, `<PREFIX>_DATABASE` and `<PREFIX>_DEBUG`.
    ///
    /// # Errors
    /// Returns `SqlFailoverError::ConfigError` if host or database is missing, or if
    /// port/debug do not parse.
    pub fn from_env(prefix: &str) -> Result<Self, SqlFailoverError> {
        Self::from_lookup(prefix, |key| std::env::var(key).ok())
    }

    /// Same as [`ConnectionDescriptor::from_env`] with a custom variable source.
    ///
    /// # Errors
    /// See [`ConnectionDescriptor::from_env`].
    pub fn from_lookup(
        prefix: &str,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, SqlFailoverError> {
        let var = |name: &str| lookup(&format!("{prefix}_{name}"));
        let required = |name: &str| {
            var(name).filter(|v| !v.is_empty()).ok_or_else(|| {
                SqlFailoverError::ConfigError(format!("{prefix}_{name} is required"))
            })
        };

        let port = var("PORT")
            .map(|raw| {
                raw.parse::<u16>().map_err(|e| {
                    SqlFailoverError::ConfigError(format!("{prefix}_PORT is not a port: {e}"))
                })
            })
            .transpose()?;
        let debug = match var("DEBUG").as_deref() {
            None | Some("" | "0" | "false" | "FALSE" | "no") => false,
            Some("1" | "true" | "TRUE" | "yes") => true,
            Some(other) => {
                return Err(SqlFailoverError::ConfigError(format!(
                    "{prefix}_DEBUG must be a boolean, got {other:?}"
                )));
            }
        };

        Ok(Self {
            host: required("HOST")?,
            port,
            user: var("USER").unwrap_or_default(),
            password: var("PASSWORD").unwrap_or_default(),
            database: required("DATABASE")?,
            debug,
        })
    }
}

/// Builder for [`ConnectionDescriptor`].
#[derive(Debug, Default, Clone)]
pub struct ConnectionDescriptorBuilder {
    inner: ConnectionDescriptor,
}

impl ConnectionDescriptorBuilder {
    #[must_use]
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.inner.host = host.into();
        self
    }

    #[must_use]
    pub fn port(mut self, port: u16) -> Self {
        self.inner.port = Some(port);
        self
    }

    #[must_use]
    pub fn user(mut self, user: impl Into<String>) -> Self {
        self.inner.user = user.into();
        self
    }

    #[must_use]
    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.inner.password = password.into();
        self
    }

    #[must_use]
    pub fn database(mut self, database: impl Into<String>) -> Self {
        self.inner.database = database.into();
        self
    }

    #[must_use]
    pub fn debug(mut self, debug: bool) -> Self {
        self.inner.debug = debug;
        self
    }

    #[must_use]
    pub fn build(self) -> ConnectionDescriptor {
        self.inner
    }
}

/// The database drivers shipped with this crate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DriverKind {
    /// `PostgreSQL` via `tokio-postgres`
    #[cfg(feature = "postgres")]
    Postgres,
    /// `SQLite` via `rusqlite`
    #[cfg(feature = "sqlite")]
    Sqlite,
}

impl DriverKind {
    /// Instantiate the driver for this kind.
    #[must_use]
    pub fn driver(self) -> Arc<dyn Driver> {
        match self {
            #[cfg(feature = "postgres")]
            DriverKind::Postgres => Arc::new(crate::postgres::PostgresDriver),
            #[cfg(feature = "sqlite")]
            DriverKind::Sqlite => Arc::new(crate::sqlite::SqliteDriver),
        }
    }
}
