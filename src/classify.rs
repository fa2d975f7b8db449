//! Read/write classification of SQL text.
//!
//! This is a single-token heuristic, not a parser. Statements that start with a
//! comment, or a `WITH ... SELECT` that writes through a CTE, are routed as
//! writes. Callers that need something else use [`crate::Router::query_as`].

use std::fmt;

/// Side of the router a statement is sent to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueryKind {
    /// Served by the read endpoint
    Read,
    /// Served by the write endpoint
    Write,
}

impl fmt::Display for QueryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueryKind::Read => f.write_str("read"),
            QueryKind::Write => f.write_str("write"),
        }
    }
}

const READ_PREFIX: &str = "SELECT";

/// Classify SQL text by its first six characters after trimming.
///
/// ```rust
/// use sql_failover::{QueryKind, classify};
///
/// assert_eq!(classify("  select * from users"), QueryKind::Read);
/// assert_eq!(classify("INSERT INTO users VALUES (1)"), QueryKind::Write);
/// ```
#[must_use]
pub fn classify(sql: &str) -> QueryKind {
    match sql.trim().get(..READ_PREFIX.len()) {
        Some(head) if head.eq_ignore_ascii_case(READ_PREFIX) => QueryKind::Read,
        _ => QueryKind::Write,
    }
}
