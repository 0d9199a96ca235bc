//! Fire-and-forget diagnostic events for command execution.
//!
//! Cursors emit a named event before executing a command, after it succeeds,
//! and when it fails. A sink may record, forward or ignore them. A failing sink
//! never affects the operation that emitted the event: its error is logged and
//! dropped.

use std::fmt;

use crate::command::DbCommand;
use crate::error::{Error, Result};

/// Emitted just before a command executes.
pub const BEFORE_EXECUTE_COMMAND: &str = "relmodel.BeforeExecuteCommand";
/// Emitted after a command executed successfully.
pub const AFTER_EXECUTE_COMMAND: &str = "relmodel.AfterExecuteCommand";
/// Emitted when command execution failed.
pub const COMMAND_EXECUTION_ERROR: &str = "relmodel.CommandExecutionError";

/// How a command was executed. Cursors only read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecuteMethod {
    ExecuteReader,
}

impl ExecuteMethod {
    pub const fn as_str(self) -> &'static str {
        match self {
            ExecuteMethod::ExecuteReader => "ExecuteReader",
        }
    }
}

impl fmt::Display for ExecuteMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Payload of a command diagnostic event.
#[derive(Debug, Clone)]
pub struct CommandEvent<'a> {
    /// SQL text of the command.
    pub command_text: &'a str,
    /// Names of the bound parameters, in binding order.
    pub parameter_names: Vec<&'a str>,
    pub execute_method: ExecuteMethod,
    pub is_async: bool,
    /// The execution error, for [`COMMAND_EXECUTION_ERROR`] only.
    pub error: Option<&'a Error>,
}

impl<'a> CommandEvent<'a> {
    /// Describe `command`.
    pub fn new(command: &'a dyn DbCommand, execute_method: ExecuteMethod, is_async: bool) -> Self {
        Self {
            command_text: command.command_text(),
            parameter_names: command.parameters().iter().map(|p| p.name.as_str()).collect(),
            execute_method,
            is_async,
            error: None,
        }
    }

    /// Attach the execution error.
    pub fn with_error(mut self, error: &'a Error) -> Self {
        self.error = Some(error);
        self
    }
}

/// Receiver of named diagnostic events.
pub trait DiagnosticSink: Send + Sync {
    /// Whether the sink wants events named `name`. Events are not built when
    /// this returns `false`.
    fn is_enabled(&self, name: &str) -> bool {
        let _ = name;
        true
    }

    /// Receive one event.
    fn write(&self, name: &str, event: &CommandEvent<'_>) -> Result<()>;
}

/// Deliver an event to `sink`, logging (not propagating) sink failures.
pub fn emit(sink: &dyn DiagnosticSink, name: &str, event: &CommandEvent<'_>) {
    if !sink.is_enabled(name) {
        return;
    }
    if let Err(e) = sink.write(name, event) {
        tracing::warn!(
            target: "relmodel::diagnostics",
            event = name,
            error = %e,
            "diagnostic sink failed; event dropped"
        );
    }
}

/// Sink that discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopDiagnosticSink;

impl DiagnosticSink for NoopDiagnosticSink {
    fn is_enabled(&self, _name: &str) -> bool {
        false
    }

    fn write(&self, _name: &str, _event: &CommandEvent<'_>) -> Result<()> {
        Ok(())
    }
}

/// Sink that forwards events to `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingDiagnosticSink;

impl DiagnosticSink for TracingDiagnosticSink {
    fn write(&self, name: &str, event: &CommandEvent<'_>) -> Result<()> {
        match event.error {
            Some(error) => tracing::error!(
                target: "relmodel::diagnostics",
                event = name,
                method = %event.execute_method,
                is_async = event.is_async,
                sql = event.command_text,
                error = %error,
                "command failed"
            ),
            None => tracing::trace!(
                target: "relmodel::diagnostics",
                event = name,
                method = %event.execute_method,
                is_async = event.is_async,
                sql = event.command_text,
                parameters = ?event.parameter_names,
            ),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    struct FailingSink {
        calls: Mutex<usize>,
    }

    impl DiagnosticSink for FailingSink {
        fn write(&self, _name: &str, _event: &CommandEvent<'_>) -> Result<()> {
            *self.calls.lock().unwrap() += 1;
            Err(Error::Custom("sink offline".to_string()))
        }
    }

    fn event() -> CommandEvent<'static> {
        CommandEvent {
            command_text: "SELECT 1",
            parameter_names: Vec::new(),
            execute_method: ExecuteMethod::ExecuteReader,
            is_async: false,
            error: None,
        }
    }

    #[test]
    fn test_emit_swallows_sink_failure() {
        let sink = FailingSink {
            calls: Mutex::new(0),
        };
        emit(&sink, BEFORE_EXECUTE_COMMAND, &event());
        assert_eq!(*sink.calls.lock().unwrap(), 1);
    }

    #[test]
    fn test_noop_sink_is_disabled() {
        assert!(!NoopDiagnosticSink.is_enabled(AFTER_EXECUTE_COMMAND));
        emit(&NoopDiagnosticSink, AFTER_EXECUTE_COMMAND, &event());
    }

    #[test]
    fn test_execute_method_names() {
        assert_eq!(ExecuteMethod::ExecuteReader.to_string(), "ExecuteReader");
        assert_eq!(ExecuteMethod::ExecuteReader.as_str(), "ExecuteReader");
    }
}
