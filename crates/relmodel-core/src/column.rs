//! Logical column and entity descriptions.
//!
//! These are read-only views of model metadata consumed by type mapping. Many
//! columns typically resolve to the same shared store mapping.

use serde::{Deserialize, Serialize};

use crate::value::ValueType;

/// When the store generates a value for a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ValueGenerated {
    /// The application always supplies the value.
    #[default]
    Never,
    /// Generated on insert.
    OnAdd,
    /// Generated on insert and on every update (row versions, timestamps).
    OnAddOrUpdate,
}

/// Metadata about one logical column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnDescriptor {
    /// Name of the entity type declaring this column.
    pub entity: String,
    /// Column name.
    pub name: String,
    /// Declared logical value type.
    pub value_type: ValueType,
    /// Explicit store type override (e.g. "nvarchar(200)", "DECIMAL(10,2)").
    /// When set it takes precedence over `value_type` during resolution.
    pub column_type: Option<String>,
    /// Declared maximum length for text and binary columns.
    pub max_length: Option<usize>,
    /// Whether this column is part of the primary key.
    pub primary_key: bool,
    /// Foreign key reference (`table.column`) when this column is a foreign key.
    pub foreign_key: Option<String>,
    /// Whether this column is used for optimistic concurrency checks.
    pub concurrency_token: bool,
    /// When the store generates the value.
    pub value_generated: ValueGenerated,
}

impl ColumnDescriptor {
    /// Create a new column descriptor.
    pub fn new(entity: impl Into<String>, name: impl Into<String>, value_type: ValueType) -> Self {
        Self {
            entity: entity.into(),
            name: name.into(),
            value_type,
            column_type: None,
            max_length: None,
            primary_key: false,
            foreign_key: None,
            concurrency_token: false,
            value_generated: ValueGenerated::Never,
        }
    }

    /// Set an explicit store type override.
    pub fn column_type(mut self, type_name: impl Into<String>) -> Self {
        self.column_type = Some(type_name.into());
        self
    }

    /// Set the maximum length.
    pub fn max_length(mut self, len: usize) -> Self {
        self.max_length = Some(len);
        self
    }

    /// Mark as primary key.
    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self
    }

    /// Mark as a foreign key referencing `table.column`.
    pub fn foreign_key(mut self, reference: impl Into<String>) -> Self {
        self.foreign_key = Some(reference.into());
        self
    }

    /// Mark as a concurrency token.
    pub fn concurrency_token(mut self) -> Self {
        self.concurrency_token = true;
        self
    }

    /// Set when the store generates values.
    pub fn value_generated(mut self, generated: ValueGenerated) -> Self {
        self.value_generated = generated;
        self
    }

    /// Shorthand for a store-generated row version: a concurrency token
    /// regenerated on every insert and update.
    pub fn row_version(self) -> Self {
        self.concurrency_token()
            .value_generated(ValueGenerated::OnAddOrUpdate)
    }

    /// Whether this column is a primary key or a foreign key.
    pub fn is_key_or_foreign_key(&self) -> bool {
        self.primary_key || self.foreign_key.is_some()
    }

    /// Whether this column is a concurrency token regenerated on every write.
    pub fn is_row_version(&self) -> bool {
        self.concurrency_token && self.value_generated == ValueGenerated::OnAddOrUpdate
    }

    /// `Entity.column`, used to identify the column in errors.
    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.entity, self.name)
    }
}

/// An entity type and its columns, in declaration order.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct EntityDescriptor {
    pub name: String,
    pub columns: Vec<ColumnDescriptor>,
}

impl EntityDescriptor {
    /// Create an entity without columns.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            columns: Vec::new(),
        }
    }

    /// Add a column declared on this entity.
    ///
    /// `build` receives a descriptor already tied to this entity.
    pub fn column(
        mut self,
        name: impl Into<String>,
        value_type: ValueType,
        build: impl FnOnce(ColumnDescriptor) -> ColumnDescriptor,
    ) -> Self {
        let column = build(ColumnDescriptor::new(self.name.clone(), name, value_type));
        self.columns.push(column);
        self
    }

    /// Find a column by name.
    pub fn find_column(&self, name: &str) -> Option<&ColumnDescriptor> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Primary key columns.
    pub fn primary_key_columns(&self) -> Vec<&ColumnDescriptor> {
        self.columns.iter().filter(|c| c.primary_key).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_column_builder() {
        let col = ColumnDescriptor::new("Blog", "title", ValueType::Text)
            .max_length(200)
            .column_type("nvarchar(200)");
        assert_eq!(col.max_length, Some(200));
        assert_eq!(col.column_type.as_deref(), Some("nvarchar(200)"));
        assert_eq!(col.qualified_name(), "Blog.title");
        assert!(!col.is_key_or_foreign_key());
    }

    #[test]
    fn test_key_flags() {
        let pk = ColumnDescriptor::new("Blog", "id", ValueType::Text).primary_key();
        let fk = ColumnDescriptor::new("Post", "blog_id", ValueType::Text).foreign_key("blog.id");
        assert!(pk.is_key_or_foreign_key());
        assert!(fk.is_key_or_foreign_key());
    }

    #[test]
    fn test_row_version_flags() {
        let col = ColumnDescriptor::new("Blog", "version", ValueType::Bytes).row_version();
        assert!(col.is_row_version());

        let token_only = ColumnDescriptor::new("Blog", "stamp", ValueType::Bytes).concurrency_token();
        assert!(!token_only.is_row_version());
    }

    #[test]
    fn test_entity_columns() {
        let entity = EntityDescriptor::new("Blog")
            .column("id", ValueType::Int, |c| c.primary_key())
            .column("name", ValueType::Text, |c| c.max_length(64));

        assert_eq!(entity.columns.len(), 2);
        assert_eq!(entity.columns[1].entity, "Blog");
        assert_eq!(entity.primary_key_columns().len(), 1);
        assert_eq!(entity.find_column("name").and_then(|c| c.max_length), Some(64));
    }
}
