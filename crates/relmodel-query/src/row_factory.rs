//! Materialization of reader rows into [`Row`] value buffers.

use relmodel_core::{DataReader, Error, QueryError, QueryErrorKind, Result, Row, ValueType};

/// Turns the reader's current row into a [`Row`].
pub trait RowFactory: Send + Sync {
    fn create(&self, reader: &dyn DataReader) -> Result<Row>;
}

/// Reads every field in ordinal order.
#[derive(Debug, Clone, Copy, Default)]
pub struct UntypedRowFactory;

impl RowFactory for UntypedRowFactory {
    fn create(&self, reader: &dyn DataReader) -> Result<Row> {
        let values = (0..reader.field_count())
            .map(|ordinal| reader.get_value(ordinal))
            .collect::<Result<Vec<_>>>()?;
        Ok(Row::new(values))
    }
}

/// Reads a projection of fields, checking each against its expected type.
#[derive(Debug, Clone, Default)]
pub struct TypedRowFactory {
    columns: Vec<(usize, ValueType)>,
}

impl TypedRowFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Project field `ordinal`, expected to hold `value_type`.
    pub fn column(mut self, ordinal: usize, value_type: ValueType) -> Self {
        self.columns.push((ordinal, value_type));
        self
    }

    pub fn columns(&self) -> &[(usize, ValueType)] {
        &self.columns
    }
}

impl RowFactory for TypedRowFactory {
    fn create(&self, reader: &dyn DataReader) -> Result<Row> {
        let mut values = Vec::with_capacity(self.columns.len());
        for (ordinal, expected) in &self.columns {
            let value = reader.get_value(*ordinal)?;
            if value.is_null() && !expected.is_nullable() {
                return Err(materialization(format!(
                    "null in non-nullable field {ordinal} of type {expected}"
                )));
            }
            if !expected.accepts(&value) {
                let actual = value.value_type().map_or_else(String::new, |t| t.name());
                return Err(materialization(format!(
                    "field {ordinal} holds {actual}, expected {expected}"
                )));
            }
            values.push(value);
        }
        Ok(Row::new(values))
    }
}

fn materialization(message: String) -> Error {
    Error::Query(QueryError::new(QueryErrorKind::Materialization, message))
}
