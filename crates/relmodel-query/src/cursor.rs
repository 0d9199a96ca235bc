//! Result cursors.
//!
//! A [`ResultCursor`] is a forward-only, pull-based iterator over the rows of
//! one query. Execution is deferred to the first advance. From then on the
//! cursor either streams from a live reader or, once a sibling cursor on the
//! same [`QueryContext`] starts a query, serves rows from an in-memory queue
//! filled by draining its reader.
//!
//! ```text
//! NotStarted ──advance──▶ Streaming ──buffer_all──▶ Buffered
//!      │                      │                        │
//!      └──────────────────────┴────────dispose─────────┴──▶ Disposed
//! ```

use std::collections::VecDeque;
use std::mem;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use asupersync::{Cx, Outcome};
use relmodel_core::diagnostics::emit;
use relmodel_core::{
    AFTER_EXECUTE_COMMAND, BEFORE_EXECUTE_COMMAND, BoxFuture, COMMAND_EXECUTION_ERROR,
    CleanupError, CleanupStage, CommandEvent, DataReader, DbCommand, Error, ExecuteMethod, Result,
    Row, outcome_from,
};

use crate::command_builder::CommandBuilder;
use crate::context::QueryContext;
use crate::registry::ValueBufferCursor;
use crate::row_factory::RowFactory;

static NEXT_CURSOR_ID: AtomicU64 = AtomicU64::new(1);

/// Observable lifecycle state of a [`ResultCursor`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CursorState {
    /// No command executed yet.
    NotStarted,
    /// Reading from a live reader.
    Streaming,
    /// Serving rows drained from the reader into memory.
    Buffered,
    /// Resources released.
    Disposed,
}

enum Phase {
    NotStarted,
    /// `reader` is `None` while an asynchronous read holds it.
    Streaming {
        reader: Option<Box<dyn DataReader>>,
        exhausted: bool,
    },
    /// `error` ended the drain early; it is reported once `rows` run out.
    Buffered {
        rows: VecDeque<Row>,
        error: Option<Error>,
    },
    Disposed,
}

impl Phase {
    /// Take the live reader out of a streaming phase that may still yield rows.
    fn take_reader(&mut self) -> Option<Box<dyn DataReader>> {
        match self {
            Phase::Streaming {
                reader,
                exhausted: false,
            } => reader.take(),
            _ => None,
        }
    }
}

struct CursorInner {
    phase: Phase,
    current: Option<Row>,
    /// Holds one acquisition of the context's connection.
    connection_acquired: bool,
    registered: bool,
    /// A sibling asked for buffering while the reader was taken.
    buffer_requested: bool,
}

struct CursorCore {
    id: u64,
    context: Arc<QueryContext>,
    command_builder: Arc<dyn CommandBuilder>,
    query_index: Option<usize>,
    inner: Mutex<CursorInner>,
}

impl CursorCore {
    fn lock(&self) -> MutexGuard<'_, CursorInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn state(&self) -> CursorState {
        match self.lock().phase {
            Phase::NotStarted => CursorState::NotStarted,
            Phase::Streaming { .. } => CursorState::Streaming,
            Phase::Buffered { .. } => CursorState::Buffered,
            Phase::Disposed => CursorState::Disposed,
        }
    }

    fn row_factory(&self) -> &dyn RowFactory {
        self.command_builder.row_factory()
    }

    /// Move to the next row of a started cursor.
    fn step(&self, inner: &mut CursorInner) -> Result<bool> {
        let CursorInner { phase, current, .. } = inner;
        match phase {
            Phase::Buffered { rows, error } => {
                *current = rows.pop_front();
                if current.is_some() {
                    return Ok(true);
                }
                error.take().map_or(Ok(false), Err)
            }
            Phase::Streaming {
                exhausted: true, ..
            } => {
                *current = None;
                Ok(false)
            }
            Phase::Streaming {
                reader: Some(reader),
                exhausted,
            } => {
                if reader.read()? {
                    *current = Some(self.row_factory().create(&**reader)?);
                    Ok(true)
                } else {
                    *exhausted = true;
                    *current = None;
                    Ok(false)
                }
            }
            Phase::Streaming { reader: None, .. } => Err(read_in_progress("advance")),
            Phase::NotStarted => Ok(false),
            Phase::Disposed => Err(disposed("advance")),
        }
    }

    fn begin_streaming(&self, reader: Box<dyn DataReader>) {
        let mut inner = self.lock();
        inner.phase = Phase::Streaming {
            reader: Some(reader),
            exhausted: false,
        };
        tracing::trace!(target: "relmodel::cursor", cursor = self.id, "cursor streaming");
    }

    /// Drain the live reader into memory and release it.
    fn force_buffer(&self) -> Result<()> {
        let mut guard = self.lock();
        let inner = &mut *guard;
        let Phase::Streaming { reader, exhausted } = &mut inner.phase else {
            return Ok(());
        };
        let Some(mut live) = reader.take() else {
            inner.buffer_requested = true;
            return Ok(());
        };

        let mut rows = VecDeque::new();
        let drained = if *exhausted {
            Ok(())
        } else {
            drain(&mut *live, self.row_factory(), &mut rows)
        };
        let count = rows.len();
        inner.phase = Phase::Buffered {
            rows,
            error: self.drain_failed(drained.err()),
        };
        inner.buffer_requested = false;
        drop(guard);

        let closed = live.close();
        tracing::debug!(target: "relmodel::cursor", cursor = self.id, rows = count, "cursor buffered");
        closed.map_err(|e| cleanup(CleanupStage::CloseReader, e))
    }

    /// Keep a drain failure for the cursor's own caller; the sibling that
    /// asked for buffering can proceed since the reader is released.
    fn drain_failed(&self, error: Option<Error>) -> Option<Error> {
        if let Some(e) = &error {
            tracing::warn!(
                target: "relmodel::cursor",
                cursor = self.id,
                error = %e,
                "buffering stopped early; error deferred to the end of buffered rows"
            );
        }
        error
    }

    async fn force_buffer_async(&self, cx: &Cx) -> Outcome<(), Error> {
        let (mut live, exhausted) = {
            let mut guard = self.lock();
            let inner = &mut *guard;
            let Phase::Streaming { reader, exhausted } = &mut inner.phase else {
                return Outcome::Ok(());
            };
            let Some(live) = reader.take() else {
                inner.buffer_requested = true;
                return Outcome::Ok(());
            };
            (live, *exhausted)
        };

        let mut rows = VecDeque::new();
        let drained = if exhausted {
            Outcome::Ok(())
        } else {
            drain_async(&mut *live, cx, self.row_factory(), &mut rows).await
        };
        let (error, interrupted) = match drained {
            Outcome::Ok(()) => (None, None),
            Outcome::Err(e) => (Some(e), None),
            Outcome::Cancelled(r) => (None, Some(Outcome::Cancelled(r))),
            Outcome::Panicked(p) => (None, Some(Outcome::Panicked(p))),
        };
        let count = rows.len();
        {
            let mut inner = self.lock();
            inner.buffer_requested = false;
            if matches!(inner.phase, Phase::Streaming { .. }) {
                inner.phase = Phase::Buffered {
                    rows,
                    error: self.drain_failed(error),
                };
            }
        }

        let closed = live.close();
        tracing::debug!(target: "relmodel::cursor", cursor = self.id, rows = count, "cursor buffered");
        match interrupted {
            Some(outcome) => outcome,
            None => outcome_from(closed.map_err(|e| cleanup(CleanupStage::CloseReader, e))),
        }
    }

    /// Release the reader, the registration and the connection. Idempotent.
    fn dispose(&self) -> Result<()> {
        let (reader, registered, acquired) = {
            let mut inner = self.lock();
            if matches!(inner.phase, Phase::Disposed) {
                return Ok(());
            }
            let previous = mem::replace(&mut inner.phase, Phase::Disposed);
            inner.current = None;
            inner.buffer_requested = false;
            let reader = match previous {
                Phase::Streaming { reader, .. } => reader,
                _ => None,
            };
            (
                reader,
                mem::take(&mut inner.registered),
                mem::take(&mut inner.connection_acquired),
            )
        };

        let mut failure = None;
        if let Some(mut reader) = reader {
            if let Err(e) = reader.close() {
                failure = Some(cleanup(CleanupStage::CloseReader, e));
            }
        }
        if registered {
            self.context.deregister_cursor(self.id);
        }
        if acquired {
            if let Err(e) = self.context.close_connection() {
                failure.get_or_insert(cleanup(CleanupStage::CloseConnection, e));
            }
        }

        tracing::trace!(target: "relmodel::cursor", cursor = self.id, "cursor disposed");
        failure.map_or(Ok(()), Err)
    }

    fn log_command(&self, command: &dyn DbCommand) {
        if self.context.config().log_sensitive_data {
            let parameters: Vec<String> = command
                .parameters()
                .iter()
                .map(|p| format!("{}={:?}", p.name, p.value))
                .collect();
            tracing::debug!(
                target: "relmodel::command",
                cursor = self.id,
                sql = command.command_text(),
                parameters = ?parameters,
                "executing command"
            );
        } else {
            let parameters: Vec<&str> = command.parameters().iter().map(|p| p.name.as_str()).collect();
            tracing::debug!(
                target: "relmodel::command",
                cursor = self.id,
                sql = command.command_text(),
                parameters = ?parameters,
                "executing command"
            );
        }
    }

    fn notify(&self, name: &str, command: &dyn DbCommand, is_async: bool, error: Option<&Error>) {
        let sink = self.context.diagnostics();
        if !sink.is_enabled(name) {
            return;
        }
        let mut event = CommandEvent::new(command, ExecuteMethod::ExecuteReader, is_async);
        if let Some(error) = error {
            event = event.with_error(error);
        }
        emit(sink, name, &event);
    }
}

impl ValueBufferCursor for CursorCore {
    fn cursor_id(&self) -> u64 {
        self.id
    }

    fn current_row(&self) -> Option<Row> {
        self.lock().current.clone()
    }

    fn buffer_all(&self) -> Result<()> {
        self.force_buffer()
    }

    fn buffer_all_async<'a>(&'a self, cx: &'a Cx) -> BoxFuture<'a, Outcome<(), Error>> {
        Box::pin(self.force_buffer_async(cx))
    }
}

fn drain(
    reader: &mut dyn DataReader,
    factory: &dyn RowFactory,
    rows: &mut VecDeque<Row>,
) -> Result<()> {
    while reader.read()? {
        rows.push_back(factory.create(reader)?);
    }
    Ok(())
}

async fn drain_async(
    reader: &mut dyn DataReader,
    cx: &Cx,
    factory: &dyn RowFactory,
    rows: &mut VecDeque<Row>,
) -> Outcome<(), Error> {
    loop {
        match reader.read_async(cx).await {
            Outcome::Ok(true) => match factory.create(reader) {
                Ok(row) => rows.push_back(row),
                Err(e) => return Outcome::Err(e),
            },
            Outcome::Ok(false) => return Outcome::Ok(()),
            Outcome::Err(e) => return Outcome::Err(e),
            Outcome::Cancelled(r) => return Outcome::Cancelled(r),
            Outcome::Panicked(p) => return Outcome::Panicked(p),
        }
    }
}

fn disposed(operation: &'static str) -> Error {
    Error::unsupported_operation(operation, "the cursor has been disposed")
}

fn read_in_progress(operation: &'static str) -> Error {
    Error::unsupported_operation(operation, "an asynchronous read is in progress")
}

fn cleanup(stage: CleanupStage, source: Error) -> Error {
    Error::Cleanup(CleanupError {
        stage,
        source: Box::new(source),
    })
}

/// Forward-only cursor over the rows of one query.
///
/// Dropping a cursor disposes it; cleanup failures on drop are logged.
pub struct ResultCursor {
    core: Arc<CursorCore>,
}

impl ResultCursor {
    /// Create a cursor. Nothing executes until the first advance.
    ///
    /// `query_index` identifies the cursor among the context's cursors for
    /// [`CursorRegistry::include_row`](crate::CursorRegistry::include_row).
    pub fn new(
        context: Arc<QueryContext>,
        command_builder: Arc<dyn CommandBuilder>,
        query_index: Option<usize>,
    ) -> Self {
        Self {
            core: Arc::new(CursorCore {
                id: NEXT_CURSOR_ID.fetch_add(1, Ordering::Relaxed),
                context,
                command_builder,
                query_index,
                inner: Mutex::new(CursorInner {
                    phase: Phase::NotStarted,
                    current: None,
                    connection_acquired: false,
                    registered: false,
                    buffer_requested: false,
                }),
            }),
        }
    }

    pub fn id(&self) -> u64 {
        self.core.id
    }

    pub fn query_index(&self) -> Option<usize> {
        self.core.query_index
    }

    pub fn state(&self) -> CursorState {
        self.core.state()
    }

    /// The row the last successful advance moved to.
    pub fn current(&self) -> Option<Row> {
        self.core.current_row()
    }

    /// Rows waiting in memory, when buffered.
    pub fn buffered_len(&self) -> Option<usize> {
        match &self.core.lock().phase {
            Phase::Buffered { rows, .. } => Some(rows.len()),
            _ => None,
        }
    }

    /// Move to the next row. Returns `false` once the results are exhausted.
    ///
    /// The first call opens the connection, buffers sibling cursors and
    /// executes the command. Execution errors are reported to the context's
    /// diagnostic sink and returned unchanged.
    pub fn advance(&mut self) -> Result<bool> {
        if self.core.state() == CursorState::NotStarted {
            self.start()?;
        }
        let mut inner = self.core.lock();
        self.core.step(&mut inner)
    }

    fn start(&self) -> Result<()> {
        let core = &self.core;
        let context = &core.context;

        let acquired = core.lock().connection_acquired;
        if !acquired {
            context.open_connection()?;
            core.lock().connection_acquired = true;
        }

        let mut command = core
            .command_builder
            .build(context.connection(), &context.parameter_values())?;

        let handle = Arc::clone(core) as Arc<dyn ValueBufferCursor>;
        context.register_cursor(&handle, core.query_index)?;
        core.lock().registered = true;

        core.log_command(command.as_ref());
        core.notify(BEFORE_EXECUTE_COMMAND, command.as_ref(), false, None);
        let reader = match command.execute_reader() {
            Ok(reader) => reader,
            Err(e) => {
                core.notify(COMMAND_EXECUTION_ERROR, command.as_ref(), false, Some(&e));
                return Err(e);
            }
        };
        core.notify(AFTER_EXECUTE_COMMAND, command.as_ref(), false, None);

        core.command_builder.notify_reader_created(reader.as_ref());
        core.begin_streaming(reader);
        Ok(())
    }

    /// Asynchronous [`advance`](Self::advance).
    ///
    /// A buffer request from a sibling that arrives while the read is in
    /// flight is carried out as soon as the read completes.
    pub async fn advance_async(&mut self, cx: &Cx) -> Outcome<bool, Error> {
        if let Some(reason) = cx.cancel_reason() {
            return Outcome::Cancelled(reason);
        }

        if self.core.state() == CursorState::NotStarted {
            match self.start_async(cx).await {
                Outcome::Ok(()) => {}
                Outcome::Err(e) => return Outcome::Err(e),
                Outcome::Cancelled(r) => return Outcome::Cancelled(r),
                Outcome::Panicked(p) => return Outcome::Panicked(p),
            }
        }

        let mut reader = {
            let mut inner = self.core.lock();
            match inner.phase.take_reader() {
                Some(reader) => reader,
                None => return outcome_from(self.core.step(&mut inner)),
            }
        };

        let read = match reader.read_async(cx).await {
            Outcome::Ok(true) => match self.core.row_factory().create(reader.as_ref()) {
                Ok(row) => Outcome::Ok(Some(row)),
                Err(e) => Outcome::Err(e),
            },
            Outcome::Ok(false) => Outcome::Ok(None),
            Outcome::Err(e) => Outcome::Err(e),
            Outcome::Cancelled(r) => Outcome::Cancelled(r),
            Outcome::Panicked(p) => Outcome::Panicked(p),
        };

        let buffer_requested = {
            let mut guard = self.core.lock();
            let inner = &mut *guard;
            if let Phase::Streaming {
                reader: slot,
                exhausted,
            } = &mut inner.phase
            {
                *slot = Some(reader);
                if matches!(read, Outcome::Ok(None)) {
                    *exhausted = true;
                }
            }
            inner.current = match &read {
                Outcome::Ok(row) => row.clone(),
                _ => None,
            };
            mem::take(&mut inner.buffer_requested)
        };

        if buffer_requested {
            match self.core.force_buffer_async(cx).await {
                Outcome::Ok(()) => {}
                Outcome::Err(e) => return Outcome::Err(e),
                Outcome::Cancelled(r) => return Outcome::Cancelled(r),
                Outcome::Panicked(p) => return Outcome::Panicked(p),
            }
        }

        match read {
            Outcome::Ok(row) => Outcome::Ok(row.is_some()),
            Outcome::Err(e) => Outcome::Err(e),
            Outcome::Cancelled(r) => Outcome::Cancelled(r),
            Outcome::Panicked(p) => Outcome::Panicked(p),
        }
    }

    async fn start_async(&self, cx: &Cx) -> Outcome<(), Error> {
        let core = &self.core;
        let context = &core.context;

        let acquired = core.lock().connection_acquired;
        if !acquired {
            match context.open_connection_async(cx).await {
                Outcome::Ok(()) => {}
                Outcome::Err(e) => return Outcome::Err(e),
                Outcome::Cancelled(r) => return Outcome::Cancelled(r),
                Outcome::Panicked(p) => return Outcome::Panicked(p),
            }
            core.lock().connection_acquired = true;
        }

        let mut command = match core
            .command_builder
            .build(context.connection(), &context.parameter_values())
        {
            Ok(command) => command,
            Err(e) => return Outcome::Err(e),
        };

        let handle = Arc::clone(core) as Arc<dyn ValueBufferCursor>;
        match context
            .register_cursor_async(cx, &handle, core.query_index)
            .await
        {
            Outcome::Ok(()) => {}
            Outcome::Err(e) => return Outcome::Err(e),
            Outcome::Cancelled(r) => return Outcome::Cancelled(r),
            Outcome::Panicked(p) => return Outcome::Panicked(p),
        }
        core.lock().registered = true;

        core.log_command(command.as_ref());
        core.notify(BEFORE_EXECUTE_COMMAND, command.as_ref(), true, None);
        let reader = match command.execute_reader_async(cx).await {
            Outcome::Ok(reader) => reader,
            Outcome::Err(e) => {
                core.notify(COMMAND_EXECUTION_ERROR, command.as_ref(), true, Some(&e));
                return Outcome::Err(e);
            }
            Outcome::Cancelled(r) => return Outcome::Cancelled(r),
            Outcome::Panicked(p) => return Outcome::Panicked(p),
        };
        core.notify(AFTER_EXECUTE_COMMAND, command.as_ref(), true, None);

        core.command_builder.notify_reader_created(reader.as_ref());
        core.begin_streaming(reader);
        Outcome::Ok(())
    }

    /// Drain the remaining rows into memory and release the reader.
    ///
    /// No-op unless streaming. If the drain fails, the rows read before the
    /// failure stay buffered and the failure is returned by the advance that
    /// would have moved past them.
    pub fn buffer_all(&mut self) -> Result<()> {
        self.core.force_buffer()
    }

    /// Asynchronous [`buffer_all`](Self::buffer_all).
    pub async fn buffer_all_async(&mut self, cx: &Cx) -> Outcome<(), Error> {
        self.core.force_buffer_async(cx).await
    }

    /// Rewind to the first row. Only a cursor that has not started can be
    /// "rewound"; every other state fails with
    /// [`Error::UnsupportedOperation`].
    pub fn reset(&mut self) -> Result<()> {
        match self.state() {
            CursorState::NotStarted => Ok(()),
            CursorState::Disposed => Err(disposed("reset")),
            CursorState::Streaming | CursorState::Buffered => Err(Error::unsupported_operation(
                "reset",
                "result cursors are forward-only",
            )),
        }
    }

    /// Release the reader, deregister, and release the connection.
    ///
    /// Idempotent. Cleanup failures are returned as [`Error::Cleanup`] after
    /// every step has been attempted.
    pub fn dispose(&mut self) -> Result<()> {
        self.core.dispose()
    }
}

impl Iterator for ResultCursor {
    type Item = Result<Row>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.advance() {
            Ok(true) => self.current().map(Ok),
            Ok(false) => None,
            Err(e) => Some(Err(e)),
        }
    }
}

impl Drop for ResultCursor {
    fn drop(&mut self) {
        if let Err(e) = self.core.dispose() {
            tracing::warn!(
                target: "relmodel::cursor",
                cursor = self.core.id,
                error = %e,
                "cursor cleanup failed on drop"
            );
        }
    }
}

impl std::fmt::Debug for ResultCursor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResultCursor")
            .field("id", &self.core.id)
            .field("query_index", &self.core.query_index)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}
