//! Error types for relmodel.
//!
//! Every failure in the data-access core is reported through [`Error`]. The
//! variants form a deliberately small taxonomy:
//!
//! - [`Error::UnsupportedType`]: no store mapping exists for a type name,
//!   value type or column.
//! - [`Error::UnsupportedOperation`]: an operation was invoked in a state that
//!   forbids it (for example resetting a started cursor).
//! - [`Error::Query`] and [`Error::Connection`]: failures raised by backend
//!   collaborators. These pass through the core unchanged.
//! - [`Error::Cleanup`]: best-effort disposal failed. Kept apart from the
//!   operation that triggered disposal so it never masks that error.

use std::error::Error as StdError;
use std::fmt;

/// Result alias used throughout relmodel.
pub type Result<T> = std::result::Result<T, Error>;

/// The primary error type.
#[derive(Debug)]
pub enum Error {
    /// No mapping could be resolved.
    UnsupportedType(UnsupportedTypeError),
    /// Operation not allowed in the current state.
    UnsupportedOperation(UnsupportedOperationError),
    /// Command execution or row reading failed in the backend.
    Query(QueryError),
    /// Opening, closing or using the connection failed.
    Connection(ConnectionError),
    /// Releasing a reader or connection during disposal failed.
    Cleanup(CleanupError),
    /// Free-form error.
    Custom(String),
}

impl Error {
    /// Unsupported type identified only by its type name.
    pub fn unsupported_type(type_name: impl Into<String>) -> Self {
        Error::UnsupportedType(UnsupportedTypeError {
            type_name: type_name.into(),
            column: None,
        })
    }

    /// Unsupported type for a specific column (`Entity.column`).
    pub fn unsupported_column(type_name: impl Into<String>, column: impl Into<String>) -> Self {
        Error::UnsupportedType(UnsupportedTypeError {
            type_name: type_name.into(),
            column: Some(column.into()),
        })
    }

    /// Operation not supported in the current state.
    pub fn unsupported_operation(operation: &'static str, message: impl Into<String>) -> Self {
        Error::UnsupportedOperation(UnsupportedOperationError {
            operation,
            message: message.into(),
        })
    }

    /// Returns `true` for [`Error::UnsupportedType`].
    pub fn is_unsupported_type(&self) -> bool {
        matches!(self, Error::UnsupportedType(_))
    }

    /// Returns `true` for [`Error::UnsupportedOperation`].
    pub fn is_unsupported_operation(&self) -> bool {
        matches!(self, Error::UnsupportedOperation(_))
    }

    /// The SQL text attached to a query error, if any.
    pub fn sql(&self) -> Option<&str> {
        match self {
            Error::Query(q) => q.sql.as_deref(),
            _ => None,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::UnsupportedType(e) => write!(f, "{}", e),
            Error::UnsupportedOperation(e) => write!(f, "{}", e),
            Error::Query(e) => write!(f, "{}", e),
            Error::Connection(e) => write!(f, "{}", e),
            Error::Cleanup(e) => write!(f, "{}", e),
            Error::Custom(msg) => write!(f, "{}", msg),
        }
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            Error::Query(e) => e
                .source
                .as_ref()
                .map(|s| s.as_ref() as &(dyn StdError + 'static)),
            Error::Connection(e) => e
                .source
                .as_ref()
                .map(|s| s.as_ref() as &(dyn StdError + 'static)),
            Error::Cleanup(e) => Some(e.source.as_ref()),
            _ => None,
        }
    }
}

/// No store mapping for a type or column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnsupportedTypeError {
    /// Offending type name (store type name or logical value type).
    pub type_name: String,
    /// Offending column, formatted as `Entity.column`, when known.
    pub column: Option<String>,
}

impl fmt::Display for UnsupportedTypeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.column {
            Some(column) => write!(
                f,
                "no store type mapping for type '{}' of column '{}'",
                self.type_name, column
            ),
            None => write!(f, "no store type mapping for type '{}'", self.type_name),
        }
    }
}

/// Operation invoked in a state that forbids it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnsupportedOperationError {
    /// Name of the rejected operation.
    pub operation: &'static str,
    /// Why it was rejected.
    pub message: String,
}

impl fmt::Display for UnsupportedOperationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unsupported operation '{}': {}", self.operation, self.message)
    }
}

/// Kinds of backend query failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryErrorKind {
    /// Command execution failed.
    Execution,
    /// The backend timed out.
    Timeout,
    /// The operation was cancelled.
    Cancelled,
    /// Reading a row from a live reader failed.
    Read,
    /// A row could not be materialized into a value buffer.
    Materialization,
}

/// Backend query failure.
#[derive(Debug)]
pub struct QueryError {
    pub kind: QueryErrorKind,
    pub message: String,
    pub sql: Option<String>,
    pub source: Option<Box<dyn StdError + Send + Sync>>,
}

impl QueryError {
    pub fn new(kind: QueryErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            sql: None,
            source: None,
        }
    }

    /// Attach the SQL text being executed.
    pub fn with_sql(mut self, sql: impl Into<String>) -> Self {
        self.sql = Some(sql.into());
        self
    }
}

impl fmt::Display for QueryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "query error ({:?}): {}", self.kind, self.message)?;
        if let Some(sql) = &self.sql {
            write!(f, " [sql: {}]", sql)?;
        }
        Ok(())
    }
}

/// Kinds of connection failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionErrorKind {
    /// Opening the connection failed.
    Connect,
    /// Closing the connection failed.
    Close,
    /// The connection is not open.
    NotOpen,
    /// The connection was lost.
    Disconnected,
}

/// Connection failure.
#[derive(Debug)]
pub struct ConnectionError {
    pub kind: ConnectionErrorKind,
    pub message: String,
    pub source: Option<Box<dyn StdError + Send + Sync>>,
}

impl fmt::Display for ConnectionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "connection error ({:?}): {}", self.kind, self.message)
    }
}

/// Which part of disposal failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CleanupStage {
    /// Closing the live data reader.
    CloseReader,
    /// Closing the shared connection.
    CloseConnection,
}

/// Best-effort cleanup failure.
#[derive(Debug)]
pub struct CleanupError {
    pub stage: CleanupStage,
    pub source: Box<Error>,
}

impl fmt::Display for CleanupError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let stage = match self.stage {
            CleanupStage::CloseReader => "closing data reader",
            CleanupStage::CloseConnection => "closing connection",
        };
        write!(f, "cleanup failed while {}: {}", stage, self.source)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unsupported_type_display() {
        let err = Error::unsupported_type("System.Object");
        assert!(err.is_unsupported_type());
        assert_eq!(err.to_string(), "no store type mapping for type 'System.Object'");
    }

    #[test]
    fn test_unsupported_column_names_column() {
        let err = Error::unsupported_column("Custom(Point)", "Shape.origin");
        let msg = err.to_string();
        assert!(msg.contains("Custom(Point)"));
        assert!(msg.contains("Shape.origin"));
    }

    #[test]
    fn test_unsupported_operation_display() {
        let err = Error::unsupported_operation("reset", "cursor already started");
        assert!(err.is_unsupported_operation());
        assert_eq!(
            err.to_string(),
            "unsupported operation 'reset': cursor already started"
        );
    }

    #[test]
    fn test_query_error_with_sql() {
        let err = Error::Query(
            QueryError::new(QueryErrorKind::Timeout, "timed out").with_sql("SELECT 1"),
        );
        assert_eq!(err.sql(), Some("SELECT 1"));
        assert!(err.to_string().contains("Timeout"));
    }

    #[test]
    fn test_cleanup_error_exposes_source() {
        let err = Error::Cleanup(CleanupError {
            stage: CleanupStage::CloseReader,
            source: Box::new(Error::Custom("socket reset".to_string())),
        });
        assert!(err.to_string().contains("closing data reader"));
        assert!(StdError::source(&err).is_some());
    }
}
