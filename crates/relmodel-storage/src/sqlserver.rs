//! SQL Server flavoured type mappings.
//!
//! Fixed-width types come from the type and name tables. Text and binary
//! columns go through [`SqlServerTypeMappings`], which applies the bounded
//! length rules: `nvarchar(N)` up to 4000 characters, `varbinary(N)` up to
//! 8000 bytes, dedicated key mappings, and `rowversion` for store-generated
//! concurrency tokens.

use std::sync::Arc;

use relmodel_core::{ColumnDescriptor, DbParameter, ParameterSize, Result, StoreKind, ValueType};

use crate::bounded::{BoundedLengthPolicy, BoundedMappings};
use crate::mapper::{CustomMapping, RelationalTypeMapper, unsupported_column};
use crate::mapping::{ParameterConfigurer, TypeMapping};

/// Longest `nvarchar(N)` before falling back to `nvarchar(max)`.
pub const MAX_BOUNDED_STRING_LENGTH: usize = 4000;

/// Longest `varbinary(N)` before falling back to `varbinary(max)`.
pub const MAX_BOUNDED_BINARY_LENGTH: usize = 8000;

/// Length of string key columns (fits the index key limit).
pub const STRING_KEY_LENGTH: usize = 450;

/// Length of binary key columns (fits the index key limit).
pub const BINARY_KEY_LENGTH: usize = 900;

/// Sizes parameters of unbounded mappings.
///
/// Values that fit the bound are sent with the bounded size so the server can
/// reuse cached plans; longer values are sent as `max`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MaxLengthConfigurer {
    bound: usize,
}

impl MaxLengthConfigurer {
    pub const fn new(bound: usize) -> Self {
        Self { bound }
    }
}

impl ParameterConfigurer for MaxLengthConfigurer {
    fn configure(&self, parameter: &mut DbParameter) {
        let size = match parameter.value.storage_length() {
            Some(len) if len > self.bound => ParameterSize::Unbounded,
            _ => ParameterSize::Bounded(self.bound),
        };
        parameter.size = Some(size);
    }
}

/// Provider hook resolving text and binary columns.
#[derive(Debug, Clone)]
pub struct SqlServerTypeMappings {
    unicode_strings: BoundedLengthPolicy,
    binaries: BoundedLengthPolicy,
}

impl Default for SqlServerTypeMappings {
    fn default() -> Self {
        Self::new()
    }
}

impl SqlServerTypeMappings {
    pub fn new() -> Self {
        let unbounded_string = Arc::new(nvarchar_max());
        let unbounded_binary = Arc::new(varbinary_max());

        let unicode_strings = BoundedLengthPolicy::new(
            MAX_BOUNDED_STRING_LENGTH,
            nvarchar,
            Arc::clone(&unbounded_string),
            unbounded_string,
        )
        .with_key(Arc::new(nvarchar(STRING_KEY_LENGTH)));

        let binaries = BoundedLengthPolicy::new(
            MAX_BOUNDED_BINARY_LENGTH,
            varbinary,
            Arc::clone(&unbounded_binary),
            unbounded_binary,
        )
        .with_key(Arc::new(varbinary(BINARY_KEY_LENGTH)))
        .with_row_version(Arc::new(rowversion()));

        Self {
            unicode_strings,
            binaries,
        }
    }

    pub fn string_policy(&self) -> &BoundedLengthPolicy {
        &self.unicode_strings
    }

    pub fn binary_policy(&self) -> &BoundedLengthPolicy {
        &self.binaries
    }
}

impl CustomMapping for SqlServerTypeMappings {
    fn custom_mapping(
        &self,
        column: &ColumnDescriptor,
        bounded: &BoundedMappings,
    ) -> Result<Arc<TypeMapping>> {
        match column.value_type.unwrap_enum().unwrap_nullable() {
            ValueType::Text => Ok(bounded.string_mapping(column, &self.unicode_strings)),
            ValueType::Bytes => Ok(bounded.binary_mapping(column, &self.binaries)),
            _ => Err(unsupported_column(column)),
        }
    }
}

fn nvarchar(len: usize) -> TypeMapping {
    TypeMapping::named(format!("nvarchar({len})"), Some(ValueType::Text))
        .with_store_kind(StoreKind::String)
        .with_size(ParameterSize::Bounded(len))
}

fn nvarchar_max() -> TypeMapping {
    TypeMapping::named("nvarchar(max)", Some(ValueType::Text))
        .with_store_kind(StoreKind::String)
        .with_configurer(Arc::new(MaxLengthConfigurer::new(MAX_BOUNDED_STRING_LENGTH)))
}

fn varchar_max() -> TypeMapping {
    TypeMapping::named("varchar(max)", Some(ValueType::Text))
        .with_store_kind(StoreKind::AnsiString)
        .with_configurer(Arc::new(MaxLengthConfigurer::new(MAX_BOUNDED_BINARY_LENGTH)))
}

fn varbinary(len: usize) -> TypeMapping {
    TypeMapping::named(format!("varbinary({len})"), Some(ValueType::Bytes))
        .with_store_kind(StoreKind::Binary)
        .with_size(ParameterSize::Bounded(len))
}

fn varbinary_max() -> TypeMapping {
    TypeMapping::named("varbinary(max)", Some(ValueType::Bytes))
        .with_store_kind(StoreKind::Binary)
        .with_configurer(Arc::new(MaxLengthConfigurer::new(MAX_BOUNDED_BINARY_LENGTH)))
}

fn rowversion() -> TypeMapping {
    TypeMapping::named("rowversion", Some(ValueType::Bytes))
        .with_store_kind(StoreKind::Binary)
        .with_size(ParameterSize::Bounded(8))
}

fn fixed(name: &str, value_type: ValueType, kind: StoreKind) -> Arc<TypeMapping> {
    Arc::new(TypeMapping::named(name, Some(value_type)).with_store_kind(kind))
}

impl RelationalTypeMapper {
    /// Mapper with the SQL Server type tables and bounded-length rules.
    pub fn sql_server() -> Self {
        let int = fixed("int", ValueType::Int, StoreKind::Int32);
        let bigint = fixed("bigint", ValueType::BigInt, StoreKind::Int64);
        let smallint = fixed("smallint", ValueType::SmallInt, StoreKind::Int16);
        let tinyint = fixed("tinyint", ValueType::TinyInt, StoreKind::Byte);
        let bit = fixed("bit", ValueType::Bool, StoreKind::Boolean);
        let real = fixed("real", ValueType::Float, StoreKind::Single);
        let float = fixed("float", ValueType::Double, StoreKind::Double);
        let decimal = fixed("decimal(18, 2)", ValueType::Decimal, StoreKind::Decimal);
        let money = fixed("money", ValueType::Decimal, StoreKind::Currency);
        let date = fixed("date", ValueType::Date, StoreKind::Date);
        let time = fixed("time", ValueType::Time, StoreKind::Time);
        let datetime = fixed("datetime", ValueType::Timestamp, StoreKind::DateTime);
        let datetime2 = fixed("datetime2", ValueType::Timestamp, StoreKind::DateTime2);
        let datetimeoffset = fixed(
            "datetimeoffset",
            ValueType::TimestampTz,
            StoreKind::DateTimeOffset,
        );
        let uniqueidentifier = fixed("uniqueidentifier", ValueType::Uuid, StoreKind::Guid);
        let xml = fixed("xml", ValueType::Text, StoreKind::Xml);
        let nvarchar = Arc::new(nvarchar_max());
        let varchar = Arc::new(varchar_max());
        let varbinary = Arc::new(varbinary_max());
        let rowversion = Arc::new(rowversion());

        RelationalTypeMapper::builder()
            .map_type(ValueType::Int, Arc::clone(&int))
            .map_type(ValueType::BigInt, Arc::clone(&bigint))
            .map_type(ValueType::SmallInt, Arc::clone(&smallint))
            .map_type(ValueType::TinyInt, Arc::clone(&tinyint))
            .map_type(ValueType::Bool, Arc::clone(&bit))
            .map_type(ValueType::Float, Arc::clone(&real))
            .map_type(ValueType::Double, Arc::clone(&float))
            .map_type(ValueType::Decimal, Arc::clone(&decimal))
            .map_type(ValueType::Date, Arc::clone(&date))
            .map_type(ValueType::Time, Arc::clone(&time))
            .map_type(ValueType::Timestamp, Arc::clone(&datetime2))
            .map_type(ValueType::TimestampTz, Arc::clone(&datetimeoffset))
            .map_type(ValueType::Uuid, Arc::clone(&uniqueidentifier))
            .map_name("int", int)
            .map_name("bigint", bigint)
            .map_name("smallint", smallint)
            .map_name("tinyint", tinyint)
            .map_name("bit", bit)
            .map_name("real", real)
            .map_name("float", float)
            .map_name("decimal", Arc::clone(&decimal))
            .map_name("numeric", decimal)
            .map_name("money", money)
            .map_name("date", date)
            .map_name("time", time)
            .map_name("datetime", datetime)
            .map_name("datetime2", datetime2)
            .map_name("datetimeoffset", datetimeoffset)
            .map_name("uniqueidentifier", uniqueidentifier)
            .map_name("xml", xml)
            .map_name("nvarchar", Arc::clone(&nvarchar))
            .map_name("ntext", nvarchar)
            .map_name("varchar", Arc::clone(&varchar))
            .map_name("text", varchar)
            .map_name("varbinary", Arc::clone(&varbinary))
            .map_name("image", varbinary)
            .map_name("rowversion", Arc::clone(&rowversion))
            .map_name("timestamp", rowversion)
            .custom_mapping(SqlServerTypeMappings::new())
            .build()
    }
}

#[cfg(test)]
mod tests {
    use relmodel_core::{Error, Value};

    use super::*;
    use crate::mapper::TypeMapper;

    fn text_column() -> ColumnDescriptor {
        ColumnDescriptor::new("Blog", "title", ValueType::Text)
    }

    fn binary_column() -> ColumnDescriptor {
        ColumnDescriptor::new("Blog", "payload", ValueType::Bytes)
    }

    fn resolve(column: &ColumnDescriptor) -> String {
        RelationalTypeMapper::sql_server()
            .mapping_for_column(column)
            .unwrap()
            .default_type_name()
            .to_string()
    }

    #[test]
    fn test_fixed_types() {
        let mapper = RelationalTypeMapper::sql_server();
        let id = ColumnDescriptor::new("Blog", "id", ValueType::Int).primary_key();
        let rating = ColumnDescriptor::new("Blog", "rating", ValueType::nullable(ValueType::Double));
        assert_eq!(mapper.mapping_for_column(&id).unwrap().default_type_name(), "int");
        assert_eq!(mapper.mapping_for_column(&rating).unwrap().default_type_name(), "float");
    }

    #[test]
    fn test_strings() {
        assert_eq!(resolve(&text_column().max_length(256)), "nvarchar(256)");
        assert_eq!(resolve(&text_column().max_length(4000)), "nvarchar(4000)");
        assert_eq!(resolve(&text_column().max_length(4001)), "nvarchar(max)");
        assert_eq!(resolve(&text_column()), "nvarchar(max)");
        assert_eq!(resolve(&text_column().primary_key()), "nvarchar(450)");
        assert_eq!(resolve(&text_column().foreign_key("Author.id")), "nvarchar(450)");
    }

    #[test]
    fn test_binaries() {
        assert_eq!(resolve(&binary_column().max_length(8000)), "varbinary(8000)");
        assert_eq!(resolve(&binary_column().max_length(8001)), "varbinary(max)");
        assert_eq!(resolve(&binary_column()), "varbinary(max)");
        assert_eq!(resolve(&binary_column().primary_key()), "varbinary(900)");
        assert_eq!(resolve(&binary_column().primary_key().row_version()), "rowversion");
    }

    #[test]
    fn test_nullable_text_uses_hook() {
        let col = ColumnDescriptor::new("Blog", "subtitle", ValueType::nullable(ValueType::Text))
            .max_length(80);
        assert_eq!(resolve(&col), "nvarchar(80)");
    }

    #[test]
    fn test_explicit_override_with_facets() {
        let col = ColumnDescriptor::new("Blog", "price", ValueType::Double).column_type("Money");
        assert_eq!(resolve(&col), "money");
        let col = ColumnDescriptor::new("Blog", "rating", ValueType::Double)
            .column_type("DECIMAL(10, 3)");
        assert_eq!(resolve(&col), "decimal(18, 2)");
    }

    #[test]
    fn test_unsupported_json_column() {
        let col = ColumnDescriptor::new("Blog", "meta", ValueType::Json);
        let err = RelationalTypeMapper::sql_server()
            .mapping_for_column(&col)
            .unwrap_err();
        assert!(matches!(err, Error::UnsupportedType(ref e) if e.column.as_deref() == Some("Blog.meta")));
    }

    #[test]
    fn test_bounded_mappings_are_shared() {
        let mapper = RelationalTypeMapper::sql_server();
        let a = mapper.mapping_for_column(&text_column().max_length(32)).unwrap();
        let b = mapper
            .mapping_for_column(&ColumnDescriptor::new("Post", "slug", ValueType::Text).max_length(32))
            .unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(mapper.bounded_mappings().cached_string_count(), 1);
    }

    #[test]
    fn test_max_length_configurer() {
        let mapper = RelationalTypeMapper::sql_server();
        let max = mapper.mapping_for_type_name("nvarchar").unwrap();

        let mut short = DbParameter::new("@p0");
        short.value = Value::from("hello");
        MaxLengthConfigurer::new(MAX_BOUNDED_STRING_LENGTH).configure(&mut short);
        assert_eq!(short.size, Some(ParameterSize::Bounded(4000)));

        let mut long = DbParameter::new("@p1");
        long.value = Value::Text("x".repeat(4001));
        MaxLengthConfigurer::new(MAX_BOUNDED_STRING_LENGTH).configure(&mut long);
        assert_eq!(long.size, Some(ParameterSize::Unbounded));

        assert_eq!(max.store_kind(), Some(StoreKind::String));
    }

    #[test]
    fn test_value_lookup() {
        let mapper = RelationalTypeMapper::sql_server();
        let uuid = mapper.mapping_for_value(Some(&Value::Uuid([0; 16]))).unwrap();
        assert_eq!(uuid.default_type_name(), "uniqueidentifier");
        // Text has no fixed entry in the type table.
        assert!(mapper.mapping_for_value(Some(&Value::from("x"))).is_err());
    }
}
