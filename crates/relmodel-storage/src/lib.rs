//! Store type mapping resolution for relmodel.
//!
//! `relmodel-storage` decides how logical columns and values are represented
//! in the store.
//!
//! # Role In The Architecture
//!
//! - **Mappings**: [`TypeMapping`] describes one physical representation and
//!   builds outgoing parameters from it.
//! - **Resolution**: [`RelationalTypeMapper`] implements [`TypeMapper`] with
//!   name and type tables plus a [`CustomMapping`] provider hook.
//! - **Bounded lengths**: [`BoundedLengthPolicy`] and [`BoundedMappings`]
//!   resolve variable-length text and binary, memoized in a
//!   [`TypeMappingCache`].
//! - **Providers**: [`SqlServerTypeMappings`] and
//!   [`RelationalTypeMapper::sql_server`].
//! - **Validation**: [`validate_entity_mappings`] checks a model up front.
//!
//! # Example
//!
//! ```
//! use relmodel_core::{ColumnDescriptor, ValueType};
//! use relmodel_storage::{RelationalTypeMapper, TypeMapper};
//!
//! let mapper = RelationalTypeMapper::sql_server();
//! let title = ColumnDescriptor::new("Blog", "title", ValueType::Text).max_length(200);
//! let mapping = mapper.mapping_for_column(&title).unwrap();
//! assert_eq!(mapping.default_type_name(), "nvarchar(200)");
//! ```

pub mod bounded;
pub mod cache;
pub mod convention;
pub mod mapper;
pub mod mapping;
pub mod sqlserver;
pub mod store_type;

pub use bounded::{BoundedLengthPolicy, BoundedMappings};
pub use cache::TypeMappingCache;
pub use convention::{unmapped_columns, validate_entity_mappings};
pub use mapper::{
    CustomMapping, NoCustomMapping, RelationalTypeMapper, RelationalTypeMapperBuilder, TypeMapper,
};
pub use mapping::{ParameterConfigurer, TypeMapping};
pub use sqlserver::{MaxLengthConfigurer, SqlServerTypeMappings};
pub use store_type::StoreTypeName;
