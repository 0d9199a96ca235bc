//! Bounded-length resolution for variable-length text and binary columns.

use std::fmt;
use std::sync::Arc;

use relmodel_core::ColumnDescriptor;

use crate::cache::TypeMappingCache;
use crate::mapping::TypeMapping;

type BoundedFactory = Arc<dyn Fn(usize) -> TypeMapping + Send + Sync>;

/// How a provider maps one variable-length type.
///
/// Resolution, identical for text and binary:
///
/// 1. With a declared max length `<= max_bounded_length`: the cached bounded
///    mapping for that exact length, built on first use by `bounded`.
/// 2. With a longer declared max length: `unbounded`.
/// 3. Without a max length: `row_version` for binary row-version columns (when
///    supplied), else `key` for primary/foreign keys (when supplied), else
///    `default`.
#[derive(Clone)]
pub struct BoundedLengthPolicy {
    max_bounded_length: usize,
    bounded: BoundedFactory,
    unbounded: Arc<TypeMapping>,
    default: Arc<TypeMapping>,
    key: Option<Arc<TypeMapping>>,
    row_version: Option<Arc<TypeMapping>>,
}

impl BoundedLengthPolicy {
    /// Create a policy. `bounded` must be a pure function of the length.
    pub fn new<F>(
        max_bounded_length: usize,
        bounded: F,
        unbounded: Arc<TypeMapping>,
        default: Arc<TypeMapping>,
    ) -> Self
    where
        F: Fn(usize) -> TypeMapping + Send + Sync + 'static,
    {
        Self {
            max_bounded_length,
            bounded: Arc::new(bounded),
            unbounded,
            default,
            key: None,
            row_version: None,
        }
    }

    /// Mapping for key columns without a max length.
    pub fn with_key(mut self, key: Arc<TypeMapping>) -> Self {
        self.key = Some(key);
        self
    }

    /// Mapping for binary row-version columns. Ignored for text.
    pub fn with_row_version(mut self, row_version: Arc<TypeMapping>) -> Self {
        self.row_version = Some(row_version);
        self
    }

    pub fn max_bounded_length(&self) -> usize {
        self.max_bounded_length
    }

    pub fn unbounded(&self) -> &Arc<TypeMapping> {
        &self.unbounded
    }

    pub fn default_mapping(&self) -> &Arc<TypeMapping> {
        &self.default
    }

    pub fn key(&self) -> Option<&Arc<TypeMapping>> {
        self.key.as_ref()
    }

    pub fn row_version(&self) -> Option<&Arc<TypeMapping>> {
        self.row_version.as_ref()
    }
}

impl fmt::Debug for BoundedLengthPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BoundedLengthPolicy")
            .field("max_bounded_length", &self.max_bounded_length)
            .field("unbounded", &self.unbounded.default_type_name())
            .field("default", &self.default.default_type_name())
            .field("key", &self.key.as_ref().map(|m| m.default_type_name()))
            .field(
                "row_version",
                &self.row_version.as_ref().map(|m| m.default_type_name()),
            )
            .finish_non_exhaustive()
    }
}

/// Per-resolver caches of bounded text and binary mappings.
#[derive(Debug, Default)]
pub struct BoundedMappings {
    strings: TypeMappingCache,
    binaries: TypeMappingCache,
}

impl BoundedMappings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve a text column under `policy`.
    pub fn string_mapping(
        &self,
        column: &ColumnDescriptor,
        policy: &BoundedLengthPolicy,
    ) -> Arc<TypeMapping> {
        resolve(&self.strings, column, policy, None)
    }

    /// Resolve a binary column under `policy`.
    pub fn binary_mapping(
        &self,
        column: &ColumnDescriptor,
        policy: &BoundedLengthPolicy,
    ) -> Arc<TypeMapping> {
        resolve(&self.binaries, column, policy, policy.row_version.as_ref())
    }

    /// Number of cached bounded text mappings.
    pub fn cached_string_count(&self) -> usize {
        self.strings.len()
    }

    /// Number of cached bounded binary mappings.
    pub fn cached_binary_count(&self) -> usize {
        self.binaries.len()
    }
}

fn resolve(
    cache: &TypeMappingCache,
    column: &ColumnDescriptor,
    policy: &BoundedLengthPolicy,
    row_version: Option<&Arc<TypeMapping>>,
) -> Arc<TypeMapping> {
    match column.max_length {
        Some(len) if len <= policy.max_bounded_length => {
            cache.get_or_add(len, |n| (policy.bounded)(n))
        }
        Some(_) => Arc::clone(&policy.unbounded),
        None => {
            if let Some(row_version) = row_version.filter(|_| column.is_row_version()) {
                return Arc::clone(row_version);
            }
            match &policy.key {
                Some(key) if column.is_key_or_foreign_key() => Arc::clone(key),
                _ => Arc::clone(&policy.default),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use relmodel_core::ValueType;

    use super::*;

    fn text(name: &str) -> Arc<TypeMapping> {
        Arc::new(TypeMapping::named(name, Some(ValueType::Text)))
    }

    fn bytes(name: &str) -> Arc<TypeMapping> {
        Arc::new(TypeMapping::named(name, Some(ValueType::Bytes)))
    }

    fn string_policy() -> BoundedLengthPolicy {
        BoundedLengthPolicy::new(
            4000,
            |n| TypeMapping::named(format!("nvarchar({n})"), Some(ValueType::Text)),
            text("nvarchar(max)"),
            text("nvarchar(max)"),
        )
        .with_key(text("nvarchar(450)"))
    }

    fn binary_policy() -> BoundedLengthPolicy {
        BoundedLengthPolicy::new(
            8000,
            |n| TypeMapping::named(format!("varbinary({n})"), Some(ValueType::Bytes)),
            bytes("varbinary(max)"),
            bytes("varbinary(max)"),
        )
        .with_key(bytes("varbinary(900)"))
        .with_row_version(bytes("rowversion"))
    }

    fn column(ty: ValueType) -> ColumnDescriptor {
        ColumnDescriptor::new("Blog", "value", ty)
    }

    #[test]
    fn test_threshold_boundary() {
        let mappings = BoundedMappings::new();
        let policy = string_policy();

        let at = mappings.string_mapping(&column(ValueType::Text).max_length(4000), &policy);
        let over = mappings.string_mapping(&column(ValueType::Text).max_length(4001), &policy);

        assert_eq!(at.default_type_name(), "nvarchar(4000)");
        assert_eq!(over.default_type_name(), "nvarchar(max)");
        assert_eq!(mappings.cached_string_count(), 1);
    }

    #[test]
    fn test_bounded_is_memoized() {
        let mappings = BoundedMappings::new();
        let policy = string_policy();
        let col = column(ValueType::Text).max_length(64);

        let a = mappings.string_mapping(&col, &policy);
        let b = mappings.string_mapping(&col, &policy);
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn test_key_precedence() {
        let mappings = BoundedMappings::new();
        let policy = string_policy();

        let pk = mappings.string_mapping(&column(ValueType::Text).primary_key(), &policy);
        let fk = mappings.string_mapping(&column(ValueType::Text).foreign_key("blog.id"), &policy);
        let plain = mappings.string_mapping(&column(ValueType::Text), &policy);

        assert_eq!(pk.default_type_name(), "nvarchar(450)");
        assert_eq!(fk.default_type_name(), "nvarchar(450)");
        assert_eq!(plain.default_type_name(), "nvarchar(max)");
    }

    #[test]
    fn test_key_ignored_with_max_length() {
        let mappings = BoundedMappings::new();
        let policy = string_policy();
        let pk = mappings.string_mapping(&column(ValueType::Text).primary_key().max_length(20), &policy);
        assert_eq!(pk.default_type_name(), "nvarchar(20)");
    }

    #[test]
    fn test_key_without_key_mapping_uses_default() {
        let mappings = BoundedMappings::new();
        let policy = BoundedLengthPolicy::new(
            4000,
            |n| TypeMapping::named(format!("varchar({n})"), Some(ValueType::Text)),
            text("varchar(max)"),
            text("text"),
        );
        let pk = mappings.string_mapping(&column(ValueType::Text).primary_key(), &policy);
        assert_eq!(pk.default_type_name(), "text");
    }

    #[test]
    fn test_row_version_beats_key() {
        let mappings = BoundedMappings::new();
        let policy = binary_policy();
        let col = column(ValueType::Bytes).primary_key().row_version();
        assert_eq!(mappings.binary_mapping(&col, &policy).default_type_name(), "rowversion");
    }

    #[test]
    fn test_row_version_with_max_length_is_bounded() {
        let mappings = BoundedMappings::new();
        let col = column(ValueType::Bytes).row_version().max_length(8);
        let mapping = mappings.binary_mapping(&col, &binary_policy());
        assert_eq!(mapping.default_type_name(), "varbinary(8)");
    }

    #[test]
    fn test_row_version_ignored_for_text() {
        let mappings = BoundedMappings::new();
        let policy = string_policy().with_row_version(text("rowversion"));
        let col = column(ValueType::Text).row_version();
        assert_eq!(mappings.string_mapping(&col, &policy).default_type_name(), "nvarchar(max)");
    }

    #[test]
    fn test_binary_caches_separately_from_text() {
        let mappings = BoundedMappings::new();
        mappings.string_mapping(&column(ValueType::Text).max_length(16), &string_policy());
        let bin = mappings.binary_mapping(&column(ValueType::Bytes).max_length(16), &binary_policy());
        assert_eq!(bin.default_type_name(), "varbinary(16)");
        assert_eq!(mappings.cached_string_count(), 1);
        assert_eq!(mappings.cached_binary_count(), 1);
    }
}
