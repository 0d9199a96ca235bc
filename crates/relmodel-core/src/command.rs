//! Backend collaborator contracts: connections, commands, parameters and
//! data readers.
//!
//! Drivers implement [`DataConnection`], [`DbCommand`] and [`DataReader`]. The
//! data-access core only ever talks to a backend through these traits, which
//! keeps type mapping and cursor coordination testable without a real store.
//!
//! Every blocking method has an asynchronous twin returning a boxed future and
//! an [`Outcome`]. The default async implementations check for cancellation and
//! then delegate to the blocking method; drivers with real non-blocking I/O
//! override them.

use std::future::Future;
use std::pin::Pin;

use asupersync::{Cx, Outcome};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::value::Value;

/// A boxed, sendable future.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Lift a blocking result into an [`Outcome`].
pub fn outcome_from<T>(result: Result<T>) -> Outcome<T, Error> {
    match result {
        Ok(v) => Outcome::Ok(v),
        Err(e) => Outcome::Err(e),
    }
}

/// Backend parameter kind assigned to outgoing parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StoreKind {
    AnsiString,
    AnsiStringFixedLength,
    String,
    StringFixedLength,
    Binary,
    Boolean,
    Byte,
    SByte,
    Int16,
    Int32,
    Int64,
    Single,
    Double,
    Decimal,
    Currency,
    Date,
    Time,
    DateTime,
    DateTime2,
    DateTimeOffset,
    Guid,
    Xml,
    Object,
}

/// Direction of a command parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ParameterDirection {
    #[default]
    Input,
    Output,
    InputOutput,
    ReturnValue,
}

/// Declared size of a text or binary parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ParameterSize {
    /// Bounded to this many characters or bytes.
    Bounded(usize),
    /// The unbounded ("max") representation.
    Unbounded,
}

/// An outgoing command parameter.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DbParameter {
    pub name: String,
    pub value: Value,
    pub direction: ParameterDirection,
    /// `None` leaves nullability to the backend default.
    pub nullable: Option<bool>,
    pub store_kind: Option<StoreKind>,
    pub size: Option<ParameterSize>,
}

impl DbParameter {
    /// A named input parameter holding the null sentinel.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }
}

/// An open (or openable) connection to a data source.
///
/// Methods take `&self`; implementations hold their own interior mutability,
/// the same way shared driver connections do.
pub trait DataConnection: Send + Sync {
    /// Open the connection. Must be a no-op when already open.
    fn open(&self) -> Result<()>;

    /// Asynchronously open the connection.
    fn open_async<'a>(&'a self, cx: &'a Cx) -> BoxFuture<'a, Outcome<(), Error>> {
        Box::pin(async move {
            if let Some(reason) = cx.cancel_reason() {
                return Outcome::Cancelled(reason);
            }
            outcome_from(self.open())
        })
    }

    /// Close the connection. Must be a no-op when already closed.
    fn close(&self) -> Result<()>;

    fn is_open(&self) -> bool;

    /// Whether the backend can host several live readers at once.
    fn supports_multiple_active_result_sets(&self) -> bool {
        false
    }

    /// Create an empty command bound to this connection.
    fn create_command(&self) -> Box<dyn DbCommand>;
}

/// An executable command.
pub trait DbCommand: Send {
    fn command_text(&self) -> &str;

    fn set_command_text(&mut self, text: &str);

    fn parameters(&self) -> &[DbParameter];

    /// Create a parameter carrying the backend's defaults.
    fn create_parameter(&self) -> DbParameter {
        DbParameter::default()
    }

    fn add_parameter(&mut self, parameter: DbParameter);

    /// Execute and return a live reader over the results.
    fn execute_reader(&mut self) -> Result<Box<dyn DataReader>>;

    /// Asynchronously execute and return a live reader.
    fn execute_reader_async<'a>(
        &'a mut self,
        cx: &'a Cx,
    ) -> BoxFuture<'a, Outcome<Box<dyn DataReader>, Error>> {
        Box::pin(async move {
            if let Some(reason) = cx.cancel_reason() {
                return Outcome::Cancelled(reason);
            }
            outcome_from(self.execute_reader())
        })
    }
}

/// A forward-only stream of result rows.
///
/// `read` positions the reader on the next row; field accessors read from that
/// row until the next call.
pub trait DataReader: Send {
    /// Advance to the next row. `Ok(false)` once the results are exhausted.
    fn read(&mut self) -> Result<bool>;

    /// Asynchronously advance to the next row.
    fn read_async<'a>(&'a mut self, cx: &'a Cx) -> BoxFuture<'a, Outcome<bool, Error>> {
        Box::pin(async move {
            if let Some(reason) = cx.cancel_reason() {
                return Outcome::Cancelled(reason);
            }
            outcome_from(self.read())
        })
    }

    /// Number of fields in the current row.
    fn field_count(&self) -> usize;

    /// Value of field `ordinal` in the current row.
    fn get_value(&self, ordinal: usize) -> Result<Value>;

    /// Release the reader. Must be a no-op when already closed.
    fn close(&mut self) -> Result<()>;

    fn is_closed(&self) -> bool;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parameter_defaults() {
        let p = DbParameter::new("@p0");
        assert_eq!(p.name, "@p0");
        assert_eq!(p.value, Value::Null);
        assert_eq!(p.direction, ParameterDirection::Input);
        assert!(p.nullable.is_none());
        assert!(p.store_kind.is_none());
    }

    #[test]
    fn test_outcome_from() {
        assert!(matches!(outcome_from(Ok(1)), Outcome::Ok(1)));
        assert!(matches!(
            outcome_from::<()>(Err(Error::Custom("x".to_string()))),
            Outcome::Err(Error::Custom(_))
        ));
    }
}
