use crate::classify::{QueryKind, classify};
use crate::types::RowValues;

/// A SQL string and its bound parameters bundled together.
///
/// Raw SQL converts with `From`, so the router accepts either form:
/// ```rust
/// use sql_failover::prelude::*;
///
/// let raw: QueryAndParams = "SELECT 1".into();
/// let bound = QueryAndParams::new(
///     "INSERT INTO t (id, name) VALUES ($1, $2)",
///     vec![RowValues::Int(1), RowValues::Text("alice".into())],
/// );
/// assert!(!raw.has_params());
/// assert!(bound.has_params());
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct QueryAndParams {
    /// The SQL query string
    pub query: String,
    /// The parameters to be bound to the query
    pub params: Vec<RowValues>,
}

impl QueryAndParams {
    /// Create a new `QueryAndParams` with the given query string and parameters
    ///
    /// # Arguments
    ///
    /// * `query` - The SQL query string
    /// * `params` - The parameters to bind to the query
    pub fn new(query: impl Into<String>, params: Vec<RowValues>) -> Self {
        Self {
            query: query.into(),
            params,
        }
    }

    /// Create a new `QueryAndParams` with no parameters
    pub fn new_without_params(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            params: Vec::new(),
        }
    }

    /// Whether this query goes through the parameterized execution path.
    #[must_use]
    pub fn has_params(&self) -> bool {
        !self.params.is_empty()
    }

    /// Parameters as they are submitted to a driver: absence markers become NULL.
    #[must_use]
    pub fn normalized_params(&self) -> Vec<RowValues> {
        self.params.iter().map(RowValues::normalized).collect()
    }

    /// Read/write side this query is routed to.
    #[must_use]
    pub fn kind(&self) -> QueryKind {
        classify(&self.query)
    }
}

impl From<&str> for QueryAndParams {
    fn from(query: &str) -> Self {
        Self::new_without_params(query)
    }
}

impl From<String> for QueryAndParams {
    fn from(query: String) -> Self {
        Self::new_without_params(query)
    }
}

impl From<&QueryAndParams> for QueryAndParams {
    fn from(query: &QueryAndParams) -> Self {
        query.clone()
    }
}
