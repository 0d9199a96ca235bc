//! Coordination of cursors sharing one connection.
//!
//! Most backends host a single live reader per connection. When a cursor
//! starts a query, every other open cursor on the same context is told to
//! buffer its remaining rows first, which releases its reader without losing
//! data. Backends with multiple active result sets skip this step.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use asupersync::{Cx, Outcome};
use relmodel_core::{BoxFuture, Error, Result, Row};

/// A cursor the registry can coordinate.
pub trait ValueBufferCursor: Send + Sync {
    /// Identity, unique per process.
    fn cursor_id(&self) -> u64;

    /// The row the cursor is positioned on.
    fn current_row(&self) -> Option<Row>;

    /// Drain the live reader into memory and release it. No-op unless the
    /// cursor is streaming.
    fn buffer_all(&self) -> Result<()>;

    /// Asynchronous [`buffer_all`](Self::buffer_all).
    fn buffer_all_async<'a>(&'a self, cx: &'a Cx) -> BoxFuture<'a, Outcome<(), Error>>;
}

type CursorRef = Weak<dyn ValueBufferCursor>;

#[derive(Default)]
struct Entries {
    /// Open cursors in registration order.
    active: Vec<(u64, CursorRef)>,
    /// Cursors registered under a query position index.
    indexed: HashMap<usize, (u64, CursorRef)>,
}

/// Per-context registry of open cursors.
///
/// Holds weak references; a dropped cursor simply stops being a sibling.
pub struct CursorRegistry {
    multiple_active_result_sets: bool,
    entries: Mutex<Entries>,
}

impl CursorRegistry {
    /// Create a registry. With `multiple_active_result_sets` siblings are
    /// never buffered on registration.
    pub fn new(multiple_active_result_sets: bool) -> Self {
        Self {
            multiple_active_result_sets,
            entries: Mutex::new(Entries::default()),
        }
    }

    pub fn multiple_active_result_sets(&self) -> bool {
        self.multiple_active_result_sets
    }

    /// Admit `cursor`, buffering open siblings first.
    ///
    /// When a sibling fails to buffer, the error is returned and `cursor` is
    /// not registered.
    pub fn register(
        &self,
        cursor: &Arc<dyn ValueBufferCursor>,
        query_index: Option<usize>,
    ) -> Result<()> {
        for sibling in self.siblings_to_buffer(cursor.cursor_id()) {
            sibling.buffer_all()?;
        }
        self.admit(cursor, query_index);
        Ok(())
    }

    /// Asynchronous [`register`](Self::register).
    pub async fn register_async(
        &self,
        cx: &Cx,
        cursor: &Arc<dyn ValueBufferCursor>,
        query_index: Option<usize>,
    ) -> Outcome<(), Error> {
        for sibling in self.siblings_to_buffer(cursor.cursor_id()) {
            match sibling.buffer_all_async(cx).await {
                Outcome::Ok(()) => {}
                Outcome::Err(e) => return Outcome::Err(e),
                Outcome::Cancelled(r) => return Outcome::Cancelled(r),
                Outcome::Panicked(p) => return Outcome::Panicked(p),
            }
        }
        self.admit(cursor, query_index);
        Outcome::Ok(())
    }

    /// Remove a cursor. Returns `false` when it was not registered.
    pub fn deregister(&self, cursor_id: u64) -> bool {
        let mut entries = self.lock();
        let before = entries.active.len();
        entries.active.retain(|(id, _)| *id != cursor_id);
        entries.indexed.retain(|_, (id, _)| *id != cursor_id);
        let removed = entries.active.len() != before;
        if removed {
            tracing::trace!(
                target: "relmodel::cursor",
                cursor = cursor_id,
                active = entries.active.len(),
                "cursor deregistered"
            );
        }
        removed
    }

    /// Current row of the cursor registered under `query_index`.
    pub fn include_row(&self, query_index: usize) -> Option<Row> {
        let cursor = {
            let entries = self.lock();
            entries.indexed.get(&query_index)?.1.upgrade()?
        };
        cursor.current_row()
    }

    /// Number of live registered cursors.
    pub fn active_count(&self) -> usize {
        self.lock()
            .active
            .iter()
            .filter(|(_, cursor)| cursor.strong_count() > 0)
            .count()
    }

    pub fn is_registered(&self, cursor_id: u64) -> bool {
        self.lock().active.iter().any(|(id, _)| *id == cursor_id)
    }

    fn siblings_to_buffer(&self, cursor_id: u64) -> Vec<Arc<dyn ValueBufferCursor>> {
        if self.multiple_active_result_sets {
            return Vec::new();
        }
        let mut entries = self.lock();
        entries.active.retain(|(_, cursor)| cursor.strong_count() > 0);
        entries
            .active
            .iter()
            .filter(|(id, _)| *id != cursor_id)
            .filter_map(|(_, cursor)| cursor.upgrade())
            .collect()
    }

    fn admit(&self, cursor: &Arc<dyn ValueBufferCursor>, query_index: Option<usize>) {
        let cursor_id = cursor.cursor_id();
        let weak = Arc::downgrade(cursor);
        let mut entries = self.lock();
        entries.active.retain(|(id, _)| *id != cursor_id);
        entries.active.push((cursor_id, weak.clone()));
        if let Some(index) = query_index {
            entries.indexed.insert(index, (cursor_id, weak));
        }
        tracing::trace!(
            target: "relmodel::cursor",
            cursor = cursor_id,
            query_index = ?query_index,
            active = entries.active.len(),
            "cursor registered"
        );
    }

    fn lock(&self) -> MutexGuard<'_, Entries> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for CursorRegistry {
    fn default() -> Self {
        Self::new(false)
    }
}

impl std::fmt::Debug for CursorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CursorRegistry")
            .field("multiple_active_result_sets", &self.multiple_active_result_sets)
            .field("active", &self.active_count())
            .finish()
    }
}
