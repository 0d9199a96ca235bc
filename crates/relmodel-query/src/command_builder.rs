//! Building executable commands from query parameter values.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use relmodel_core::{DataConnection, DataReader, DbCommand, Error, Result, Value};
use relmodel_storage::TypeMapping;

use crate::row_factory::{RowFactory, UntypedRowFactory};

/// Produces the command a cursor executes and materializes its rows.
pub trait CommandBuilder: Send + Sync {
    /// Build a command on `connection` bound to `parameter_values`.
    fn build(
        &self,
        connection: &dyn DataConnection,
        parameter_values: &HashMap<String, Value>,
    ) -> Result<Box<dyn DbCommand>>;

    fn row_factory(&self) -> &dyn RowFactory;

    /// Called once a reader exists, before any row is read. Output parameters
    /// can be extracted here.
    fn notify_reader_created(&self, reader: &dyn DataReader) {
        let _ = reader;
    }
}

/// Binds one query parameter value to a command parameter.
#[derive(Debug, Clone)]
pub struct ParameterBinding {
    /// Key in the context's parameter values.
    pub invariant_name: String,
    /// Placeholder name in the command text (`@p0`).
    pub name: String,
    pub mapping: Arc<TypeMapping>,
    pub nullable: Option<bool>,
}

impl ParameterBinding {
    pub fn new(
        invariant_name: impl Into<String>,
        name: impl Into<String>,
        mapping: Arc<TypeMapping>,
    ) -> Self {
        Self {
            invariant_name: invariant_name.into(),
            name: name.into(),
            mapping,
            nullable: None,
        }
    }

    /// Override the parameter's nullability.
    pub fn nullable(mut self, nullable: bool) -> Self {
        self.nullable = Some(nullable);
        self
    }
}

/// Command builder for a fixed SQL text and parameter list.
pub struct RelationalCommandBuilder {
    command_text: String,
    parameters: Vec<ParameterBinding>,
    row_factory: Box<dyn RowFactory>,
    readers_created: AtomicUsize,
}

impl RelationalCommandBuilder {
    /// Builder for `command_text` reading every field of each row.
    pub fn new(command_text: impl Into<String>) -> Self {
        Self {
            command_text: command_text.into(),
            parameters: Vec::new(),
            row_factory: Box::new(UntypedRowFactory),
            readers_created: AtomicUsize::new(0),
        }
    }

    /// Add a parameter binding.
    pub fn parameter(mut self, binding: ParameterBinding) -> Self {
        self.parameters.push(binding);
        self
    }

    /// Replace the row factory.
    pub fn row_factory_with(mut self, factory: impl RowFactory + 'static) -> Self {
        self.row_factory = Box::new(factory);
        self
    }

    pub fn command_text(&self) -> &str {
        &self.command_text
    }

    pub fn parameters(&self) -> &[ParameterBinding] {
        &self.parameters
    }

    /// Readers created from commands this builder built.
    pub fn readers_created(&self) -> usize {
        self.readers_created.load(Ordering::Relaxed)
    }
}

impl CommandBuilder for RelationalCommandBuilder {
    fn build(
        &self,
        connection: &dyn DataConnection,
        parameter_values: &HashMap<String, Value>,
    ) -> Result<Box<dyn DbCommand>> {
        let mut command = connection.create_command();
        command.set_command_text(&self.command_text);

        for binding in &self.parameters {
            let value = parameter_values
                .get(&binding.invariant_name)
                .cloned()
                .ok_or_else(|| {
                    Error::Custom(format!(
                        "no value supplied for query parameter '{}'",
                        binding.invariant_name
                    ))
                })?;
            let parameter = binding.mapping.create_parameter(
                command.as_ref(),
                &binding.name,
                Some(value),
                binding.nullable,
            );
            command.add_parameter(parameter);
        }

        Ok(command)
    }

    fn row_factory(&self) -> &dyn RowFactory {
        self.row_factory.as_ref()
    }

    fn notify_reader_created(&self, _reader: &dyn DataReader) {
        self.readers_created.fetch_add(1, Ordering::Relaxed);
    }
}

impl std::fmt::Debug for RelationalCommandBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelationalCommandBuilder")
            .field("command_text", &self.command_text)
            .field("parameters", &self.parameters)
            .field("readers_created", &self.readers_created())
            .finish_non_exhaustive()
    }
}
