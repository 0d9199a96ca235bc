//! Relational data access in Rust.
//!
//! `relmodel` is the facade crate. It re-exports the layers below so most
//! applications only depend on this crate:
//!
//! - [`relmodel_core`]: values, rows, column descriptors, the collaborator
//!   traits a backend implements, and the error taxonomy.
//! - [`relmodel_storage`]: store type mappings and their resolution.
//! - [`relmodel_query`]: result cursors sharing one connection.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//!
//! use relmodel::prelude::*;
//!
//! let mapper = RelationalTypeMapper::sql_server();
//! let name = ColumnDescriptor::new("Blog", "name", ValueType::Text).max_length(100);
//! assert_eq!(
//!     mapper.mapping_for_column(&name).unwrap().default_type_name(),
//!     "nvarchar(100)"
//! );
//!
//! let conn = MemoryConnection::new().with_result([Row::new(vec![Value::from("rust")])]);
//! let ctx = Arc::new(QueryContext::new(Arc::new(conn)));
//! let mut blogs = ResultCursor::new(
//!     Arc::clone(&ctx),
//!     Arc::new(RelationalCommandBuilder::new("SELECT name FROM blogs")),
//!     None,
//! );
//! assert!(blogs.advance().unwrap());
//! assert_eq!(blogs.current().unwrap()[0], Value::from("rust"));
//! ```

pub use relmodel_core;
pub use relmodel_query;
pub use relmodel_storage;

pub use relmodel_core::{
    ColumnDescriptor, DataConnection, DataReader, DbCommand, DbParameter, DiagnosticSink,
    EntityDescriptor, Error, Result, Row, StoreKind, Value, ValueType,
};
pub use relmodel_query::{
    CommandBuilder, CursorRegistry, CursorState, QueryConfig, QueryContext,
    RelationalCommandBuilder, ResultCursor,
};
pub use relmodel_storage::{
    RelationalTypeMapper, TypeMapper, TypeMapping, TypeMappingCache, validate_entity_mappings,
};

/// Commonly used items.
pub mod prelude {
    pub use asupersync::{Cx, Outcome};

    pub use relmodel_core::{
        ColumnDescriptor, DataConnection, DataReader, DbCommand, DbParameter, DiagnosticSink,
        EntityDescriptor, Error, ParameterSize, Result, Row, StoreKind, TracingDiagnosticSink,
        Value, ValueGenerated, ValueType,
    };
    pub use relmodel_query::{
        CommandBuilder, CursorState, MemoryConnection, ParameterBinding, QueryConfig,
        QueryContext, RelationalCommandBuilder, ResultCursor, RowFactory, TypedRowFactory,
    };
    pub use relmodel_storage::{
        BoundedLengthPolicy, CustomMapping, RelationalTypeMapper, SqlServerTypeMappings,
        TypeMapper, TypeMapping, TypeMappingCache, validate_entity_mappings,
    };
}
