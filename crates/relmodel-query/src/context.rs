//! Query execution context.
//!
//! A [`QueryContext`] owns what every cursor of one query execution shares:
//! the connection, the current parameter values, the cursor registry, the
//! diagnostic sink, and the configuration.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use asupersync::{Cx, Outcome};
use relmodel_core::{
    ConnectionError, ConnectionErrorKind, DataConnection, DiagnosticSink, Error,
    NoopDiagnosticSink, Result, Value,
};

use crate::config::QueryConfig;
use crate::registry::{CursorRegistry, ValueBufferCursor};

#[derive(Debug, Default)]
struct ConnectionState {
    open_count: usize,
    /// The context opened the backend connection and closes it on release.
    close_on_release: bool,
    /// An asynchronous open is in flight.
    opening: bool,
}

/// Shared state of one query execution.
pub struct QueryContext {
    connection: Arc<dyn DataConnection>,
    connection_state: Mutex<ConnectionState>,
    /// Serializes asynchronous opens of the backend connection.
    open_gate: asupersync::sync::Mutex<()>,
    parameter_values: RwLock<HashMap<String, Value>>,
    registry: CursorRegistry,
    config: QueryConfig,
    diagnostics: Arc<dyn DiagnosticSink>,
}

impl QueryContext {
    /// Create a context with default configuration.
    pub fn new(connection: Arc<dyn DataConnection>) -> Self {
        Self::with_config(connection, QueryConfig::default())
    }

    /// Create a context with custom configuration.
    pub fn with_config(connection: Arc<dyn DataConnection>, config: QueryConfig) -> Self {
        let mars =
            config.multiple_active_result_sets || connection.supports_multiple_active_result_sets();
        Self {
            connection,
            connection_state: Mutex::new(ConnectionState::default()),
            open_gate: asupersync::sync::Mutex::new(()),
            parameter_values: RwLock::new(HashMap::new()),
            registry: CursorRegistry::new(mars),
            config,
            diagnostics: Arc::new(NoopDiagnosticSink),
        }
    }

    /// Route command diagnostics to `sink`.
    pub fn with_diagnostics(mut self, sink: Arc<dyn DiagnosticSink>) -> Self {
        self.diagnostics = sink;
        self
    }

    pub fn connection(&self) -> &dyn DataConnection {
        self.connection.as_ref()
    }

    pub fn config(&self) -> &QueryConfig {
        &self.config
    }

    pub fn diagnostics(&self) -> &dyn DiagnosticSink {
        self.diagnostics.as_ref()
    }

    pub fn registry(&self) -> &CursorRegistry {
        &self.registry
    }

    /// Set the value of a named query parameter.
    pub fn add_parameter(&self, name: impl Into<String>, value: impl Into<Value>) {
        self.parameter_values
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.into(), value.into());
    }

    /// Snapshot of the current parameter values.
    pub fn parameter_values(&self) -> HashMap<String, Value> {
        self.parameter_values
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Acquire the shared connection, opening it on first use.
    ///
    /// Every successful call must be paired with [`close_connection`](Self::close_connection).
    /// A connection that was already open when first acquired is left open.
    ///
    /// Fails while an asynchronous open of the same context is in flight.
    pub fn open_connection(&self) -> Result<()> {
        let mut state = self.state();
        if state.open_count == 0 {
            if state.opening {
                return Err(connect_error("connection is being opened asynchronously"));
            }
            state.close_on_release = !self.connection.is_open();
            if state.close_on_release {
                self.connection.open()?;
                tracing::debug!(target: "relmodel::command", "connection opened");
            }
        }
        state.open_count += 1;
        Ok(())
    }

    /// Asynchronous [`open_connection`](Self::open_connection).
    ///
    /// Concurrent callers wait for one physical open; the acquisition count
    /// changes atomically with the open-state check.
    pub async fn open_connection_async(&self, cx: &Cx) -> Outcome<(), Error> {
        if self.try_acquire_open() {
            return Outcome::Ok(());
        }
        let Ok(_gate) = self.open_gate.lock(cx).await else {
            return Outcome::Err(connect_error("failed to acquire connection open lock"));
        };
        if self.try_acquire_open() {
            return Outcome::Ok(());
        }

        let flag = OpeningFlag::raise(self);
        match self.connection.open_async(cx).await {
            Outcome::Ok(()) => {
                tracing::debug!(target: "relmodel::command", "connection opened");
            }
            Outcome::Err(e) => return Outcome::Err(e),
            Outcome::Cancelled(r) => return Outcome::Cancelled(r),
            Outcome::Panicked(p) => return Outcome::Panicked(p),
        }
        {
            let mut state = self.state();
            state.close_on_release = true;
            state.open_count += 1;
        }
        drop(flag);
        Outcome::Ok(())
    }

    /// Count an acquisition when no physical open is needed.
    fn try_acquire_open(&self) -> bool {
        let mut state = self.state();
        if state.open_count == 0 {
            if state.opening || !self.connection.is_open() {
                return false;
            }
            state.close_on_release = false;
        }
        state.open_count += 1;
        true
    }

    /// Release the shared connection. The last release closes it if this
    /// context opened it. Releasing more often than acquiring is a no-op.
    pub fn close_connection(&self) -> Result<()> {
        let mut state = self.state();
        match state.open_count {
            0 => Ok(()),
            1 => {
                state.open_count = 0;
                if std::mem::take(&mut state.close_on_release) {
                    self.connection.close()?;
                    tracing::debug!(target: "relmodel::command", "connection closed");
                }
                Ok(())
            }
            _ => {
                state.open_count -= 1;
                Ok(())
            }
        }
    }

    /// Outstanding acquisitions of the shared connection.
    pub fn open_count(&self) -> usize {
        self.state().open_count
    }

    /// Register a starting cursor, buffering its siblings.
    pub fn register_cursor(
        &self,
        cursor: &Arc<dyn ValueBufferCursor>,
        query_index: Option<usize>,
    ) -> Result<()> {
        self.registry.register(cursor, query_index)
    }

    /// Asynchronous [`register_cursor`](Self::register_cursor).
    pub async fn register_cursor_async(
        &self,
        cx: &Cx,
        cursor: &Arc<dyn ValueBufferCursor>,
        query_index: Option<usize>,
    ) -> Outcome<(), Error> {
        self.registry.register_async(cx, cursor, query_index).await
    }

    pub fn deregister_cursor(&self, cursor_id: u64) -> bool {
        self.registry.deregister(cursor_id)
    }

    fn state(&self) -> MutexGuard<'_, ConnectionState> {
        self.connection_state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

/// Marks an asynchronous open in flight; lowered on drop, so a cancelled
/// open does not wedge the context.
struct OpeningFlag<'a> {
    context: &'a QueryContext,
}

impl<'a> OpeningFlag<'a> {
    fn raise(context: &'a QueryContext) -> Self {
        context.state().opening = true;
        Self { context }
    }
}

impl Drop for OpeningFlag<'_> {
    fn drop(&mut self) {
        self.context.state().opening = false;
    }
}

fn connect_error(message: &str) -> Error {
    Error::Connection(ConnectionError {
        kind: ConnectionErrorKind::Connect,
        message: message.to_string(),
        source: None,
    })
}

impl std::fmt::Debug for QueryContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryContext")
            .field("open_count", &self.open_count())
            .field("registry", &self.registry)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
