//! Relational (SQL-over-documents) side used for counting.
//!
//! # Invariants
//! - Only the fixed ``SELECT COUNT(*) FROM dfs.`<path>` `` shape is issued.
//! - Failures surface as the connection's own error type, which the template
//!   hands to the error translator. Built-in connections fail with `SqlError`.

use std::error::Error;
use std::fmt::{Display, Formatter};

/// Raw relational failure.
#[derive(Debug)]
pub enum SqlError {
    Sqlite(rusqlite::Error),
    /// No relational connection could be established.
    ConnectionUnavailable,
    /// Statement rejected or produced an unusable result.
    Statement(String),
}

impl Display for SqlError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sqlite(err) => write!(f, "{err}"),
            Self::ConnectionUnavailable => write!(f, "relational connection unavailable"),
            Self::Statement(message) => write!(f, "{message}"),
        }
    }
}

impl Error for SqlError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Sqlite(err) => Some(err),
            Self::ConnectionUnavailable | Self::Statement(_) => None,
        }
    }
}

impl From<rusqlite::Error> for SqlError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Sqlite(value)
    }
}

/// Connection able to run a scalar SQL statement.
pub trait SqlConnection {
    /// Failure type; only `SqlError` is translated into `DataAccessError`.
    type Error: Error + Send + Sync + 'static;

    /// Runs `sql` and returns the first column of the single result row as
    /// text.
    fn query_scalar(&self, sql: &str) -> Result<String, Self::Error>;
}

/// Builds the count statement for an absolute table path.
pub fn count_statement(absolute_path: &str) -> String {
    format!("SELECT COUNT(*) FROM dfs.`{absolute_path}`")
}

#[cfg(test)]
mod tests {
    use super::count_statement;

    #[test]
    fn count_statement_quotes_path_with_backticks() {
        assert_eq!(
            count_statement("/test/users"),
            "SELECT COUNT(*) FROM dfs.`/test/users`"
        );
    }
}
