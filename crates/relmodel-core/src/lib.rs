//! Core types and traits for relmodel.
//!
//! `relmodel-core` is the **foundation layer** of the workspace. It defines the
//! data model and the collaborator contracts the other crates build on.
//!
//! # Role In The Architecture
//!
//! - **Data model**: `Value`, `ValueType`, `Row`, `ColumnDescriptor` and
//!   `EntityDescriptor` describe logical columns and materialized results.
//! - **Backend contracts**: `DataConnection`, `DbCommand` and `DataReader` are
//!   implemented by drivers; `DbParameter` and `StoreKind` describe outgoing
//!   parameters.
//! - **Diagnostics**: `DiagnosticSink` receives fire-and-forget command events.
//! - **Structured concurrency**: re-exports `Cx` and `Outcome` from asupersync so
//!   every async operation is cancel-correct.
//!
//! # Who Uses This Crate
//!
//! - `relmodel-storage` resolves `ColumnDescriptor`s to store type mappings and
//!   builds `DbParameter`s from them.
//! - `relmodel-query` drives `DataConnection`/`DbCommand`/`DataReader` to stream
//!   `Row`s through result cursors.

// Re-export asupersync primitives for structured concurrency
pub use asupersync::{Cx, Outcome};

pub mod column;
pub mod command;
pub mod diagnostics;
pub mod error;
pub mod row;
pub mod value;

pub use column::{ColumnDescriptor, EntityDescriptor, ValueGenerated};
pub use command::{
    BoxFuture, DataConnection, DataReader, DbCommand, DbParameter, ParameterDirection,
    ParameterSize, StoreKind, outcome_from,
};
pub use diagnostics::{
    AFTER_EXECUTE_COMMAND, BEFORE_EXECUTE_COMMAND, COMMAND_EXECUTION_ERROR, CommandEvent,
    DiagnosticSink, ExecuteMethod, NoopDiagnosticSink, TracingDiagnosticSink,
};
pub use error::{
    CleanupError, CleanupStage, ConnectionError, ConnectionErrorKind, Error, QueryError,
    QueryErrorKind, Result, UnsupportedOperationError, UnsupportedTypeError,
};
pub use row::Row;
pub use value::{Value, ValueType};
