//! Store type mappings.
//!
//! A [`TypeMapping`] describes one physical storage representation: the store
//! type name used in DDL, the backend parameter kind, and the logical value
//! type it services. Mappings are immutable once built and are shared as
//! `Arc<TypeMapping>` across every column that resolves to them.

use std::fmt;
use std::sync::{Arc, OnceLock};

use relmodel_core::{
    DbCommand, DbParameter, Error, ParameterDirection, ParameterSize, Result, StoreKind, Value,
    ValueType,
};

/// Representation-specific tweaks applied to every parameter a mapping builds.
pub trait ParameterConfigurer: Send + Sync + fmt::Debug {
    fn configure(&self, parameter: &mut DbParameter);
}

/// One physical storage representation.
///
/// Equality compares the descriptive attributes (type name, store kind, value
/// type, size) and ignores any configurer.
#[derive(Debug, Clone)]
pub struct TypeMapping {
    default_type_name: String,
    store_kind: Option<StoreKind>,
    value_type: Option<ValueType>,
    size: Option<ParameterSize>,
    configurer: Option<Arc<dyn ParameterConfigurer>>,
}

impl TypeMapping {
    /// Create a mapping. Fails when `default_type_name` is empty.
    pub fn new(default_type_name: impl Into<String>, value_type: Option<ValueType>) -> Result<Self> {
        let default_type_name = default_type_name.into();
        if default_type_name.trim().is_empty() {
            return Err(Error::Custom(
                "a type mapping requires a non-empty default type name".to_string(),
            ));
        }
        Ok(Self::named(default_type_name, value_type))
    }

    /// Infallible [`new`](Self::new) for names known to be non-empty, such as
    /// provider tables and the factory of a
    /// [`BoundedLengthPolicy`](crate::BoundedLengthPolicy).
    ///
    /// # Panics
    ///
    /// Panics when `default_type_name` is empty or blank.
    pub fn named(default_type_name: impl Into<String>, value_type: Option<ValueType>) -> Self {
        let default_type_name = default_type_name.into();
        assert!(
            !default_type_name.trim().is_empty(),
            "a type mapping requires a non-empty default type name"
        );
        Self {
            default_type_name,
            store_kind: None,
            value_type,
            size: None,
            configurer: None,
        }
    }

    /// Shared mapping used for null literals.
    pub fn null_mapping() -> Arc<TypeMapping> {
        static NULL_MAPPING: OnceLock<Arc<TypeMapping>> = OnceLock::new();
        Arc::clone(NULL_MAPPING.get_or_init(|| Arc::new(TypeMapping::named("NULL", None))))
    }

    /// Set the backend parameter kind.
    pub fn with_store_kind(mut self, kind: StoreKind) -> Self {
        self.store_kind = Some(kind);
        self
    }

    /// Give every parameter built from this mapping a fixed size.
    pub fn with_size(mut self, size: ParameterSize) -> Self {
        self.size = Some(size);
        self
    }

    /// Attach a parameter configurer.
    pub fn with_configurer(mut self, configurer: Arc<dyn ParameterConfigurer>) -> Self {
        self.configurer = Some(configurer);
        self
    }

    pub fn default_type_name(&self) -> &str {
        &self.default_type_name
    }

    pub fn store_kind(&self) -> Option<StoreKind> {
        self.store_kind
    }

    pub fn value_type(&self) -> Option<&ValueType> {
        self.value_type.as_ref()
    }

    pub fn size(&self) -> Option<ParameterSize> {
        self.size
    }

    /// Build an input parameter for `command` bound to `value`.
    ///
    /// `None` is bound as the null sentinel. `nullable` overrides the backend's
    /// nullability only when given.
    pub fn create_parameter(
        &self,
        command: &dyn DbCommand,
        name: &str,
        value: Option<Value>,
        nullable: Option<bool>,
    ) -> DbParameter {
        let mut parameter = command.create_parameter();
        parameter.direction = ParameterDirection::Input;
        parameter.name = name.to_string();
        parameter.value = value.unwrap_or(Value::Null);

        if let Some(nullable) = nullable {
            parameter.nullable = Some(nullable);
        }

        if let Some(kind) = self.store_kind {
            parameter.store_kind = Some(kind);
        }

        self.configure_parameter(&mut parameter);
        parameter
    }

    fn configure_parameter(&self, parameter: &mut DbParameter) {
        if let Some(size) = self.size {
            parameter.size = Some(size);
        }
        if let Some(configurer) = &self.configurer {
            configurer.configure(parameter);
        }
    }
}

impl PartialEq for TypeMapping {
    fn eq(&self, other: &Self) -> bool {
        self.default_type_name == other.default_type_name
            && self.store_kind == other.store_kind
            && self.value_type == other.value_type
            && self.size == other.size
    }
}

impl fmt::Display for TypeMapping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.default_type_name)
    }
}
