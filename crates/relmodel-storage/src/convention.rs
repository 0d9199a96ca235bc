//! Model validation: every column must resolve to a store mapping.

use relmodel_core::{ColumnDescriptor, EntityDescriptor, Error, Result};

use crate::mapper::TypeMapper;

/// Resolve every column of every entity.
///
/// Fails with the first [`Error::UnsupportedType`], naming `Entity.column`.
/// Other resolution errors propagate unchanged.
pub fn validate_entity_mappings(
    mapper: &dyn TypeMapper,
    entities: &[EntityDescriptor],
) -> Result<()> {
    for entity in entities {
        for column in &entity.columns {
            mapper.mapping_for_column(column).map_err(|e| match e {
                Error::UnsupportedType(inner) if inner.column.is_none() => {
                    Error::unsupported_column(inner.type_name, column.qualified_name())
                }
                other => other,
            })?;
        }
        tracing::trace!(
            target: "relmodel::storage",
            entity = entity.name.as_str(),
            columns = entity.columns.len(),
            "entity mappings validated"
        );
    }
    Ok(())
}

/// Every column that does not resolve, in declaration order.
pub fn unmapped_columns<'a>(
    mapper: &dyn TypeMapper,
    entities: &'a [EntityDescriptor],
) -> Vec<&'a ColumnDescriptor> {
    entities
        .iter()
        .flat_map(|entity| entity.columns.iter())
        .filter(|column| {
            mapper
                .mapping_for_column(column)
                .is_err_and(|e| e.is_unsupported_type())
        })
        .collect()
}
