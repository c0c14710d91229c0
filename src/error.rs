//! Error type shared by the builder, the generator and the execution engine.
//!
//! Configuration and definition errors are raised at build or generation time
//! and never retried. Transport errors from the executor are wrapped without
//! modification. [`QueryError::ActionCancelled`] is the one variant the
//! iteration drivers absorb: returning it from a per-page or per-row callback
//! stops the iteration cleanly.

use may_postgres::Error as PostgresError;
use std::fmt;

/// `lifequery` error type
#[derive(Debug)]
pub enum QueryError {
    /// Invalid builder composition (double group-by, `next_page` without paging,
    /// unresolvable single-column coercion, conflicting combined queries, ...)
    Configuration(String),
    /// A named query could not be resolved by the query catalog
    QueryDefinitionNotFound(String),
    /// Paging was requested but no explicit or schema-derived order-by exists
    PagingRequiresOrderBy(String),
    /// Cooperative early exit raised from an iteration callback
    ActionCancelled,
    /// `PostgreSQL` error from `may_postgres`
    Postgres(PostgresError),
    /// Data source or executor failure
    Execution(String),
    /// Row or value conversion error
    Parse(String),
}

impl QueryError {
    /// Shorthand for a [`QueryError::Configuration`] error.
    pub fn configuration(message: impl Into<String>) -> Self {
        QueryError::Configuration(message.into())
    }

    /// The stop signal for `for_each_page` / `for_each_row` callbacks.
    pub fn cancel() -> Self {
        QueryError::ActionCancelled
    }

    /// Returns `true` for the cooperative stop signal.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, QueryError::ActionCancelled)
    }
}

impl fmt::Display for QueryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueryError::Configuration(s) => {
                write!(f, "Query configuration error: {s}")
            }
            QueryError::QueryDefinitionNotFound(name) => {
                write!(f, "Query definition not found: {name}")
            }
            QueryError::PagingRequiresOrderBy(s) => {
                write!(f, "Paging requires an order by: {s}")
            }
            QueryError::ActionCancelled => {
                write!(f, "Action cancelled")
            }
            QueryError::Postgres(e) => {
                write!(f, "PostgreSQL error: {e}")
            }
            QueryError::Execution(s) => {
                write!(f, "Execution error: {s}")
            }
            QueryError::Parse(s) => {
                write!(f, "Parse error: {s}")
            }
        }
    }
}

impl std::error::Error for QueryError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            QueryError::Postgres(e) => Some(e),
            _ => None,
        }
    }
}

impl From<PostgresError> for QueryError {
    fn from(err: PostgresError) -> Self {
        QueryError::Postgres(err)
    }
}

impl From<crate::value::ValueExtractionError> for QueryError {
    fn from(err: crate::value::ValueExtractionError) -> Self {
        QueryError::Parse(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_error_display() {
        let err = QueryError::configuration("call new_group_by first");
        assert!(err.to_string().contains("Query configuration error"));
        assert!(err.to_string().contains("new_group_by"));
    }

    #[test]
    fn test_query_error_all_variants() {
        let err = QueryError::QueryDefinitionNotFound("cms.article.selectall".to_string());
        assert!(err.to_string().contains("cms.article.selectall"));

        let err = QueryError::PagingRequiresOrderBy("Article".to_string());
        assert!(err.to_string().contains("order by"));

        let err = QueryError::Execution("test".to_string());
        assert!(err.to_string().contains("Execution error"));

        let err = QueryError::Parse("test".to_string());
        assert!(err.to_string().contains("Parse error"));
    }

    #[test]
    fn test_cancellation_is_distinguished() {
        assert!(QueryError::cancel().is_cancellation());
        assert!(!QueryError::configuration("x").is_cancellation());
    }
}
