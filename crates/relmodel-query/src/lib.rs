//! Result cursors over a shared connection.
//!
//! `relmodel-query` runs queries through forward-only [`ResultCursor`]s that
//! share one connection via a [`QueryContext`].
//!
//! # Role In The Architecture
//!
//! - **Context**: [`QueryContext`] ref-counts the connection and holds the
//!   parameter values, the [`CursorRegistry`], and the diagnostic sink.
//! - **Cursors**: [`ResultCursor`] defers execution to the first advance and
//!   streams rows until a sibling starts, then buffers what is left.
//! - **Commands**: [`CommandBuilder`] turns parameter values into a command
//!   and a [`RowFactory`] turns reader rows into [`Row`](relmodel_core::Row)s.
//! - **Testing backend**: [`MemoryConnection`] is a scripted in-memory
//!   connection that enforces one live reader unless it allows several.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//!
//! use relmodel_core::{Row, Value};
//! use relmodel_query::{MemoryConnection, QueryContext, RelationalCommandBuilder, ResultCursor};
//!
//! let conn = MemoryConnection::new()
//!     .with_result([Row::new(vec![Value::Int(1)]), Row::new(vec![Value::Int(2)])]);
//! let ctx = Arc::new(QueryContext::new(Arc::new(conn)));
//! let cursor = ResultCursor::new(ctx, Arc::new(RelationalCommandBuilder::new("SELECT id FROM blogs")), None);
//!
//! let rows: Vec<Row> = cursor.collect::<Result<_, _>>().unwrap();
//! assert_eq!(rows.len(), 2);
//! ```

pub mod command_builder;
pub mod config;
pub mod context;
pub mod cursor;
pub mod memory;
pub mod registry;
pub mod row_factory;

pub use command_builder::{CommandBuilder, ParameterBinding, RelationalCommandBuilder};
pub use config::QueryConfig;
pub use context::QueryContext;
pub use cursor::{CursorState, ResultCursor};
pub use memory::{ExecutedCommand, MemoryCommand, MemoryConnection, MemoryReader, MemoryStats};
pub use registry::{CursorRegistry, ValueBufferCursor};
pub use row_factory::{RowFactory, TypedRowFactory, UntypedRowFactory};
