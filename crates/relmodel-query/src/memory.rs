//! In-memory backend.
//!
//! [`MemoryConnection`] serves scripted result sets and records what was
//! executed. Like most real backends it refuses to execute while another
//! reader is open on the connection, unless multiple active result sets are
//! enabled. Failures can be injected at every collaborator step.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use relmodel_core::{
    ConnectionError, ConnectionErrorKind, DataConnection, DataReader, DbCommand, DbParameter,
    Error, QueryError, QueryErrorKind, Result, Row, Value,
};

/// Counters describing how the backend was used.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MemoryStats {
    /// Physical opens.
    pub opens: usize,
    /// Physical closes.
    pub closes: usize,
    /// Execute attempts, including failed ones.
    pub executions: usize,
    /// Rows handed out by readers.
    pub rows_read: usize,
    /// Readers currently open.
    pub live_readers: usize,
    /// Highest number of readers open at once.
    pub max_live_readers: usize,
    /// Readers released, by an explicit close or by drop.
    pub readers_closed: usize,
}

/// A command as it reached the backend.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutedCommand {
    pub text: String,
    pub parameters: Vec<DbParameter>,
}

#[derive(Debug)]
enum ScriptedResult {
    Rows(Vec<Row>),
    ExecuteError(String),
    ReadError { rows: Vec<Row>, message: String },
}

#[derive(Debug, Default)]
struct MemoryState {
    open: bool,
    multiple_active_result_sets: bool,
    script: VecDeque<ScriptedResult>,
    fail_next_open: Option<String>,
    fail_next_close: Option<String>,
    fail_next_reader_close: Option<String>,
    executed: Vec<ExecutedCommand>,
    stats: MemoryStats,
}

#[derive(Debug, Default)]
struct MemoryShared {
    state: Mutex<MemoryState>,
}

impl MemoryShared {
    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Scripted in-memory connection.
///
/// Each execution consumes the next scripted result; an empty script yields
/// an empty result set.
#[derive(Debug, Clone, Default)]
pub struct MemoryConnection {
    shared: Arc<MemoryShared>,
}

impl MemoryConnection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allow several readers to be open at once.
    pub fn with_multiple_active_result_sets(self) -> Self {
        self.shared.lock().multiple_active_result_sets = true;
        self
    }

    /// Script the next result set.
    pub fn with_result(self, rows: impl IntoIterator<Item = Row>) -> Self {
        self.push_result(rows);
        self
    }

    pub fn push_result(&self, rows: impl IntoIterator<Item = Row>) {
        self.shared
            .lock()
            .script
            .push_back(ScriptedResult::Rows(rows.into_iter().collect()));
    }

    /// Script an execution failure.
    pub fn push_execute_error(&self, message: impl Into<String>) {
        self.shared
            .lock()
            .script
            .push_back(ScriptedResult::ExecuteError(message.into()));
    }

    /// Script a result set whose reader fails after yielding `rows`.
    pub fn push_read_error(&self, rows: impl IntoIterator<Item = Row>, message: impl Into<String>) {
        self.shared.lock().script.push_back(ScriptedResult::ReadError {
            rows: rows.into_iter().collect(),
            message: message.into(),
        });
    }

    pub fn fail_next_open(&self, message: impl Into<String>) {
        self.shared.lock().fail_next_open = Some(message.into());
    }

    pub fn fail_next_close(&self, message: impl Into<String>) {
        self.shared.lock().fail_next_close = Some(message.into());
    }

    pub fn fail_next_reader_close(&self, message: impl Into<String>) {
        self.shared.lock().fail_next_reader_close = Some(message.into());
    }

    pub fn stats(&self) -> MemoryStats {
        self.shared.lock().stats
    }

    /// Commands executed so far, in order.
    pub fn executed(&self) -> Vec<ExecutedCommand> {
        self.shared.lock().executed.clone()
    }
}

impl DataConnection for MemoryConnection {
    fn open(&self) -> Result<()> {
        let mut state = self.shared.lock();
        if state.open {
            return Ok(());
        }
        if let Some(message) = state.fail_next_open.take() {
            return Err(Error::Connection(ConnectionError {
                kind: ConnectionErrorKind::Connect,
                message,
                source: None,
            }));
        }
        state.open = true;
        state.stats.opens += 1;
        Ok(())
    }

    fn close(&self) -> Result<()> {
        let mut state = self.shared.lock();
        if !state.open {
            return Ok(());
        }
        if let Some(message) = state.fail_next_close.take() {
            return Err(Error::Connection(ConnectionError {
                kind: ConnectionErrorKind::Close,
                message,
                source: None,
            }));
        }
        state.open = false;
        state.stats.closes += 1;
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.shared.lock().open
    }

    fn supports_multiple_active_result_sets(&self) -> bool {
        self.shared.lock().multiple_active_result_sets
    }

    fn create_command(&self) -> Box<dyn DbCommand> {
        Box::new(MemoryCommand {
            shared: Arc::clone(&self.shared),
            text: String::new(),
            parameters: Vec::new(),
        })
    }
}

/// Command created by [`MemoryConnection`].
#[derive(Debug)]
pub struct MemoryCommand {
    shared: Arc<MemoryShared>,
    text: String,
    parameters: Vec<DbParameter>,
}

impl DbCommand for MemoryCommand {
    fn command_text(&self) -> &str {
        &self.text
    }

    fn set_command_text(&mut self, text: &str) {
        self.text = text.to_string();
    }

    fn parameters(&self) -> &[DbParameter] {
        &self.parameters
    }

    fn add_parameter(&mut self, parameter: DbParameter) {
        self.parameters.push(parameter);
    }

    fn execute_reader(&mut self) -> Result<Box<dyn DataReader>> {
        let mut state = self.shared.lock();
        if !state.open {
            return Err(Error::Connection(ConnectionError {
                kind: ConnectionErrorKind::NotOpen,
                message: "connection is not open".to_string(),
                source: None,
            }));
        }
        state.stats.executions += 1;
        if !state.multiple_active_result_sets && state.stats.live_readers > 0 {
            return Err(Error::Query(
                QueryError::new(
                    QueryErrorKind::Execution,
                    "there is already an open reader on this connection",
                )
                .with_sql(self.text.clone()),
            ));
        }
        state.executed.push(ExecutedCommand {
            text: self.text.clone(),
            parameters: self.parameters.clone(),
        });

        let (rows, fail) = match state.script.pop_front() {
            None => (Vec::new(), None),
            Some(ScriptedResult::Rows(rows)) => (rows, None),
            Some(ScriptedResult::ExecuteError(message)) => {
                return Err(Error::Query(
                    QueryError::new(QueryErrorKind::Execution, message).with_sql(self.text.clone()),
                ));
            }
            Some(ScriptedResult::ReadError { rows, message }) => (rows, Some(message)),
        };

        state.stats.live_readers += 1;
        state.stats.max_live_readers = state.stats.max_live_readers.max(state.stats.live_readers);
        Ok(Box::new(MemoryReader {
            shared: Arc::clone(&self.shared),
            rows: rows.into(),
            current: None,
            fail,
            closed: false,
        }))
    }
}

/// Reader over one scripted result set.
#[derive(Debug)]
pub struct MemoryReader {
    shared: Arc<MemoryShared>,
    rows: VecDeque<Row>,
    current: Option<Row>,
    fail: Option<String>,
    closed: bool,
}

impl MemoryReader {
    fn release(&mut self) -> Option<String> {
        if self.closed {
            return None;
        }
        self.closed = true;
        self.current = None;
        let mut state = self.shared.lock();
        state.stats.live_readers = state.stats.live_readers.saturating_sub(1);
        state.stats.readers_closed += 1;
        state.fail_next_reader_close.take()
    }
}

impl DataReader for MemoryReader {
    fn read(&mut self) -> Result<bool> {
        if self.closed {
            return Err(Error::Query(QueryError::new(
                QueryErrorKind::Read,
                "reader is closed",
            )));
        }
        match self.rows.pop_front() {
            Some(row) => {
                self.shared.lock().stats.rows_read += 1;
                self.current = Some(row);
                Ok(true)
            }
            None => {
                self.current = None;
                match self.fail.take() {
                    Some(message) => Err(Error::Query(QueryError::new(QueryErrorKind::Read, message))),
                    None => Ok(false),
                }
            }
        }
    }

    fn field_count(&self) -> usize {
        self.current.as_ref().map_or(0, Row::len)
    }

    fn get_value(&self, ordinal: usize) -> Result<Value> {
        self.current
            .as_ref()
            .and_then(|row| row.get(ordinal))
            .cloned()
            .ok_or_else(|| {
                Error::Query(QueryError::new(
                    QueryErrorKind::Read,
                    format!("no field at ordinal {ordinal}"),
                ))
            })
    }

    fn close(&mut self) -> Result<()> {
        match self.release() {
            Some(message) => Err(Error::Query(QueryError::new(QueryErrorKind::Read, message))),
            None => Ok(()),
        }
    }

    fn is_closed(&self) -> bool {
        self.closed
    }
}

impl Drop for MemoryReader {
    fn drop(&mut self) {
        let _ = self.release();
    }
}
