//! Type mapping resolution.
//!
//! [`RelationalTypeMapper`] decides which [`TypeMapping`] serves a logical
//! column, a store type name, a value type, or a literal value. Providers
//! configure it with two lookup tables and a [`CustomMapping`] hook for
//! everything the tables cannot answer (typically variable-length text and
//! binary, see [`BoundedMappings`]).
//!
//! Resolution by column:
//!
//! 1. An explicit store type override wins when its base name (facets
//!    stripped, lower-cased) is in the name table.
//! 2. Otherwise the column's value type, with enum and nullable wrappers
//!    removed, is looked up in the type table.
//! 3. Otherwise the custom hook decides, or the column is unsupported.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use relmodel_core::{ColumnDescriptor, Error, Result, Value, ValueType};

use crate::bounded::BoundedMappings;
use crate::mapping::TypeMapping;
use crate::store_type::StoreTypeName;

/// Resolves store type mappings.
pub trait TypeMapper: Send + Sync {
    /// Mapping for a logical column.
    fn mapping_for_column(&self, column: &ColumnDescriptor) -> Result<Arc<TypeMapping>>;

    /// Mapping registered under a store type name.
    fn mapping_for_type_name(&self, type_name: &str) -> Result<Arc<TypeMapping>>;

    /// Mapping for a logical value type.
    fn mapping_for_value_type(&self, value_type: &ValueType) -> Result<Arc<TypeMapping>>;

    /// Mapping for a literal value.
    ///
    /// `None` and the null sentinel resolve to [`TypeMapping::null_mapping`]
    /// without consulting the type table.
    fn mapping_for_value(&self, value: Option<&Value>) -> Result<Arc<TypeMapping>> {
        match value.and_then(Value::value_type) {
            None => Ok(TypeMapping::null_mapping()),
            Some(value_type) => self.mapping_for_value_type(&value_type),
        }
    }
}

/// Provider extension point for columns the lookup tables cannot resolve.
pub trait CustomMapping: Send + Sync {
    /// Resolve `column`, or fail with [`Error::UnsupportedType`].
    ///
    /// `bounded` holds the resolver's bounded-length caches.
    fn custom_mapping(
        &self,
        column: &ColumnDescriptor,
        bounded: &BoundedMappings,
    ) -> Result<Arc<TypeMapping>>;
}

/// Hook that resolves nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoCustomMapping;

impl CustomMapping for NoCustomMapping {
    fn custom_mapping(
        &self,
        column: &ColumnDescriptor,
        _bounded: &BoundedMappings,
    ) -> Result<Arc<TypeMapping>> {
        Err(unsupported_column(column))
    }
}

pub(crate) fn unsupported_column(column: &ColumnDescriptor) -> Error {
    Error::unsupported_column(column.value_type.name(), column.qualified_name())
}

/// Table-driven type mapper with a provider hook.
pub struct RelationalTypeMapper {
    type_mappings: HashMap<ValueType, Arc<TypeMapping>>,
    name_mappings: HashMap<String, Arc<TypeMapping>>,
    bounded: BoundedMappings,
    custom: Box<dyn CustomMapping>,
}

impl RelationalTypeMapper {
    /// Start building a mapper.
    #[must_use]
    pub fn builder() -> RelationalTypeMapperBuilder {
        RelationalTypeMapperBuilder::new()
    }

    /// The bounded-length caches used by the custom hook.
    pub fn bounded_mappings(&self) -> &BoundedMappings {
        &self.bounded
    }

    fn find_by_name(&self, type_name: &str) -> Option<&Arc<TypeMapping>> {
        self.name_mappings.get(&type_name.to_lowercase())
    }
}

impl TypeMapper for RelationalTypeMapper {
    fn mapping_for_column(&self, column: &ColumnDescriptor) -> Result<Arc<TypeMapping>> {
        if let Some(column_type) = &column.column_type {
            let parsed = StoreTypeName::parse(column_type);
            if let Some(mapping) = self.name_mappings.get(&parsed.base) {
                tracing::trace!(
                    target: "relmodel::storage",
                    column = %column.qualified_name(),
                    column_type = column_type.as_str(),
                    mapping = mapping.default_type_name(),
                    "resolved by explicit column type"
                );
                return Ok(Arc::clone(mapping));
            }
        }

        let value_type = column.value_type.unwrap_enum().unwrap_nullable();
        if let Some(mapping) = self.type_mappings.get(&value_type) {
            return Ok(Arc::clone(mapping));
        }

        let mapping = self.custom.custom_mapping(column, &self.bounded)?;
        tracing::trace!(
            target: "relmodel::storage",
            column = %column.qualified_name(),
            mapping = mapping.default_type_name(),
            "resolved by provider hook"
        );
        Ok(mapping)
    }

    fn mapping_for_type_name(&self, type_name: &str) -> Result<Arc<TypeMapping>> {
        self.find_by_name(type_name)
            .cloned()
            .ok_or_else(|| Error::unsupported_type(type_name))
    }

    fn mapping_for_value_type(&self, value_type: &ValueType) -> Result<Arc<TypeMapping>> {
        self.type_mappings
            .get(&value_type.unwrap_enum())
            .cloned()
            .ok_or_else(|| Error::unsupported_type(value_type.name()))
    }
}

impl fmt::Debug for RelationalTypeMapper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RelationalTypeMapper")
            .field("type_mappings", &self.type_mappings.len())
            .field("name_mappings", &self.name_mappings.len())
            .field("bounded", &self.bounded)
            .finish_non_exhaustive()
    }
}

/// Builder for [`RelationalTypeMapper`].
pub struct RelationalTypeMapperBuilder {
    type_mappings: HashMap<ValueType, Arc<TypeMapping>>,
    name_mappings: HashMap<String, Arc<TypeMapping>>,
    custom: Box<dyn CustomMapping>,
}

impl Default for RelationalTypeMapperBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl RelationalTypeMapperBuilder {
    /// Create a builder with empty tables and no custom hook.
    #[must_use]
    pub fn new() -> Self {
        Self {
            type_mappings: HashMap::new(),
            name_mappings: HashMap::new(),
            custom: Box::new(NoCustomMapping),
        }
    }

    /// Map a value type.
    #[must_use]
    pub fn map_type(mut self, value_type: ValueType, mapping: Arc<TypeMapping>) -> Self {
        self.type_mappings.insert(value_type, mapping);
        self
    }

    /// Map a store type name (case-insensitive).
    #[must_use]
    pub fn map_name(mut self, type_name: &str, mapping: Arc<TypeMapping>) -> Self {
        self.name_mappings.insert(type_name.to_lowercase(), mapping);
        self
    }

    /// Install the provider hook.
    #[must_use]
    pub fn custom_mapping(mut self, custom: impl CustomMapping + 'static) -> Self {
        self.custom = Box::new(custom);
        self
    }

    pub fn build(self) -> RelationalTypeMapper {
        RelationalTypeMapper {
            type_mappings: self.type_mappings,
            name_mappings: self.name_mappings,
            bounded: BoundedMappings::new(),
            custom: self.custom,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use relmodel_core::StoreKind;

    use super::*;
    use crate::bounded::BoundedLengthPolicy;

    fn mapping(name: &str, ty: ValueType) -> Arc<TypeMapping> {
        Arc::new(TypeMapping::named(name, Some(ty)))
    }

    struct TextHook {
        policy: BoundedLengthPolicy,
        calls: Arc<AtomicUsize>,
    }

    impl CustomMapping for TextHook {
        fn custom_mapping(
            &self,
            column: &ColumnDescriptor,
            bounded: &BoundedMappings,
        ) -> Result<Arc<TypeMapping>> {
            self.calls.fetch_add(1, Ordering::Relaxed);
            match column.value_type.unwrap_nullable() {
                ValueType::Text => Ok(bounded.string_mapping(column, &self.policy)),
                _ => Err(unsupported_column(column)),
            }
        }
    }

    fn mapper() -> (RelationalTypeMapper, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let policy = BoundedLengthPolicy::new(
            255,
            |n| TypeMapping::named(format!("varchar({n})"), Some(ValueType::Text)),
            mapping("text", ValueType::Text),
            mapping("text", ValueType::Text),
        );
        let int = Arc::new(
            TypeMapping::named("int", Some(ValueType::Int)).with_store_kind(StoreKind::Int32),
        );
        let mapper = RelationalTypeMapper::builder()
            .map_type(ValueType::Int, Arc::clone(&int))
            .map_type(ValueType::BigInt, mapping("bigint", ValueType::BigInt))
            .map_name("int", int)
            .map_name("money", mapping("money", ValueType::Decimal))
            .custom_mapping(TextHook {
                policy,
                calls: Arc::clone(&calls),
            })
            .build();
        (mapper, calls)
    }

    #[test]
    fn test_explicit_override_wins() {
        let (mapper, _) = mapper();
        let col = ColumnDescriptor::new("Order", "total", ValueType::BigInt).column_type("MONEY(19, 4)");
        assert_eq!(mapper.mapping_for_column(&col).unwrap().default_type_name(), "money");
    }

    #[test]
    fn test_unknown_override_falls_back_to_value_type() {
        let (mapper, _) = mapper();
        let col = ColumnDescriptor::new("Order", "total", ValueType::BigInt).column_type("hugeint");
        assert_eq!(mapper.mapping_for_column(&col).unwrap().default_type_name(), "bigint");
    }

    #[test]
    fn test_enum_and_nullable_unwrapped_for_columns() {
        let (mapper, _) = mapper();
        let status = ValueType::nullable(ValueType::enumeration("Status", ValueType::Int));
        let col = ColumnDescriptor::new("Order", "status", status);
        let resolved = mapper.mapping_for_column(&col).unwrap();
        assert_eq!(resolved.default_type_name(), "int");
        assert_eq!(resolved.store_kind(), Some(StoreKind::Int32));
    }

    #[test]
    fn test_custom_hook_used_only_after_tables() {
        let (mapper, calls) = mapper();
        mapper
            .mapping_for_column(&ColumnDescriptor::new("Order", "id", ValueType::Int))
            .unwrap();
        assert_eq!(calls.load(Ordering::Relaxed), 0);

        let name = ColumnDescriptor::new("Order", "name", ValueType::Text).max_length(40);
        assert_eq!(mapper.mapping_for_column(&name).unwrap().default_type_name(), "varchar(40)");
        assert_eq!(calls.load(Ordering::Relaxed), 1);
        assert_eq!(mapper.bounded_mappings().cached_string_count(), 1);
    }

    #[test]
    fn test_unsupported_column_names_offender() {
        let (mapper, _) = mapper();
        let col = ColumnDescriptor::new("Shape", "origin", ValueType::Custom("Point".to_string()));
        let err = mapper.mapping_for_column(&col).unwrap_err();
        match err {
            Error::UnsupportedType(e) => {
                assert_eq!(e.type_name, "Point");
                assert_eq!(e.column.as_deref(), Some("Shape.origin"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_mapping_for_type_name() {
        let (mapper, _) = mapper();
        assert_eq!(mapper.mapping_for_type_name("INT").unwrap().default_type_name(), "int");
        let err = mapper.mapping_for_type_name("geography").unwrap_err();
        assert!(err.is_unsupported_type());
        assert!(err.to_string().contains("geography"));
    }

    #[test]
    fn test_type_name_lookup_has_no_custom_fallback() {
        let (mapper, calls) = mapper();
        assert!(mapper.mapping_for_type_name("varchar").is_err());
        assert_eq!(calls.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn test_mapping_for_value_type() {
        let (mapper, _) = mapper();
        let status = ValueType::enumeration("Status", ValueType::BigInt);
        assert_eq!(mapper.mapping_for_value_type(&status).unwrap().default_type_name(), "bigint");

        let err = mapper.mapping_for_value_type(&ValueType::Uuid).unwrap_err();
        assert!(err.is_unsupported_type());
        assert!(err.to_string().contains("uuid"));
    }

    #[test]
    fn test_mapping_for_value() {
        let (mapper, _) = mapper();
        let null = TypeMapping::null_mapping();
        assert!(Arc::ptr_eq(&mapper.mapping_for_value(None).unwrap(), &null));
        assert!(Arc::ptr_eq(&mapper.mapping_for_value(Some(&Value::Null)).unwrap(), &null));
        assert_eq!(
            mapper.mapping_for_value(Some(&Value::Int(4))).unwrap().default_type_name(),
            "int"
        );
        assert!(mapper.mapping_for_value(Some(&Value::Bool(true))).is_err());
    }

    #[test]
    fn test_null_value_needs_no_tables() {
        let mapper = RelationalTypeMapper::builder().build();
        assert_eq!(
            mapper.mapping_for_value(Some(&Value::Null)).unwrap().default_type_name(),
            "NULL"
        );
    }
}
