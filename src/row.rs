//! The logical tuple `(key, value|none, expirationTime)` that every index ultimately stores a
//! reference to (`§3 DATA MODEL`).
//!
//! A [`Row`] plays two roles at once: it is the durable record an index holds once an insert
//! commits, and, via [`RowDescriptor`], the ephemeral "search row" used purely for lookups. The
//! source models these as the same type; we do too, rather than introduce a parallel hierarchy.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use parking_lot::{Condvar, Mutex};

use crate::index_value::IndexValue;

/// A `Debug`-derived, displayable rendering of a row's key, used only for error messages, indexes
/// compare and hash rows through their own `compareRows` contract (`§3`), never through this.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowKey(String);

impl RowKey {
    pub(crate) fn of<K: fmt::Debug>(key: &K) -> Self {
        RowKey(format!("{key:?}"))
    }
}

impl fmt::Display for RowKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One-shot synchronization point for concurrent inserts of the same logical row into a unique
/// index (`§3`, `§9` "Row insert synchronization").
///
/// The source models this as a latch on the `Row` itself; we keep that placement (rather than a
/// side-table of pending inserts) since the row that's being raced over *is* the natural owner of
/// the completion state. `finish_insert` is idempotent-safe to call at most once per row; calling
/// it twice would indicate a bug in `doUpdate` and is guarded by a debug assertion.
pub(crate) struct InsertLatch {
    state: Mutex<Option<bool>>,
    condvar: Condvar,
}

impl fmt::Debug for InsertLatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InsertLatch")
            .field("state", &*self.state.lock())
            .finish()
    }
}

impl Default for InsertLatch {
    fn default() -> Self {
        InsertLatch {
            state: Mutex::new(None),
            condvar: Condvar::new(),
        }
    }
}

impl InsertLatch {
    /// A latch that is already resolved; used for rows constructed outside of the concurrent
    /// insert path (e.g. rebuilt rows, or rows materialized purely for lookups) so that
    /// `wait_insert_complete` never blocks on them.
    pub(crate) fn resolved(success: bool) -> Self {
        InsertLatch {
            state: Mutex::new(Some(success)),
            condvar: Condvar::new(),
        }
    }

    /// Blocks the calling thread until [`Self::finish_insert`] has been called, returning `true`
    /// if the insert committed and `false` if it rolled back.
    pub(crate) fn wait_insert_complete(&self) -> bool {
        let mut state = self.state.lock();
        while state.is_none() {
            self.condvar.wait(&mut state);
        }
        state.expect("loop only exits once state is Some")
    }

    /// Resolves the latch, waking any thread blocked in [`Self::wait_insert_complete`]. Must be
    /// called exactly once per row that was constructed unresolved.
    pub(crate) fn finish_insert(&self, success: bool) {
        let mut state = self.state.lock();
        debug_assert!(state.is_none(), "finish_insert called more than once");
        *state = Some(success);
        self.condvar.notify_all();
    }
}

/// A logical `(key, value, expiration)` tuple, addressable from every index of a [`Table`].
///
/// [`Table`]: crate::table::Table
pub struct Row<K, V> {
    key: K,
    value: Mutex<Option<V>>,
    /// Each secondary index's key for this row, derived once from `value` at construction time
    /// and never touched again, in particular never by [`Row::on_swap`]/[`Row::on_unswap`].
    ///
    /// `put`/`remove` on a secondary index need this row's key again on every later delete or
    /// replace (`Table::do_delete`, `Table::do_insert`'s rollback/cleanup paths), including after
    /// the row has been swapped out and `value` has gone back to `None`. Re-deriving the key from
    /// `value` at that point would either panic (a unique/non-unique secondary's `KeyExtractor`
    /// requires a populated value) or, if `value` had since been reinstated with different column
    /// values by `on_unswap`, silently look the row up under the wrong key. Caching the
    /// derivation's result once, alongside the row, avoids both.
    secondary_keys: Vec<IndexValue>,
    expiration: Option<Instant>,
    swapped: AtomicBool,
    insert_latch: InsertLatch,
}

impl<K: fmt::Debug, V: fmt::Debug> fmt::Debug for Row<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Row")
            .field("key", &self.key)
            .field("value", &*self.value.lock())
            .field("expiration", &self.expiration)
            .field("swapped", &self.swapped.load(Ordering::Acquire))
            .finish()
    }
}

impl<K, V> Row<K, V> {
    /// Construct a fully-formed row that is immediately committed (not participating in the
    /// concurrent-insert protocol). Used for rows built outside `doUpdate`'s insert path, e.g.
    /// during `rebuild_indexes`.
    pub fn new(key: K, value: V, expiration: Option<Instant>) -> Self {
        Row {
            key,
            value: Mutex::new(Some(value)),
            secondary_keys: Vec::new(),
            expiration,
            swapped: AtomicBool::new(false),
            insert_latch: InsertLatch::resolved(true),
        }
    }

    /// Construct a row that participates in the concurrent-insert protocol: other threads racing
    /// to insert a conflicting row can call [`Row::wait_insert_complete`] until the inserter calls
    /// [`Row::finish_insert`].
    pub(crate) fn new_inserting(key: K, value: V, expiration: Option<Instant>) -> Self {
        Row {
            key,
            value: Mutex::new(Some(value)),
            secondary_keys: Vec::new(),
            expiration,
            swapped: AtomicBool::new(false),
            insert_latch: InsertLatch::default(),
        }
    }

    /// A key-only search row: carries `key` and nothing else. Used to drive a lookup or removal
    /// by primary key, whose key extraction never touches a row's value, so no placeholder value
    /// is needed (`§3`: "a Row is also a SearchRow").
    pub(crate) fn search(key: K) -> Self {
        Row {
            key,
            value: Mutex::new(None),
            secondary_keys: Vec::new(),
            expiration: None,
            swapped: AtomicBool::new(false),
            insert_latch: InsertLatch::resolved(true),
        }
    }

    pub fn key(&self) -> &K {
        &self.key
    }

    pub fn expiration(&self) -> Option<Instant> {
        self.expiration
    }

    /// Populates this row's per-secondary-index key cache, in the same order as the table's
    /// secondary indexes (`indexes[2..]`). Called exactly once, by `Table::do_insert`, before the
    /// row is wrapped in an `Arc` and becomes reachable by anything else (`§4.2`, `§4.3`).
    pub(crate) fn set_secondary_keys(&mut self, keys: Vec<IndexValue>) {
        self.secondary_keys = keys;
    }

    /// The cached key this row was assigned for the `slot`-th secondary index (0-based, matching
    /// `indexes[2..]`'s order), regardless of whether the row is currently swapped out.
    pub(crate) fn secondary_key(&self, slot: usize) -> IndexValue {
        self.secondary_keys[slot].clone()
    }

    /// Returns `true` if this row's value has been relocated to external (swapped) storage.
    pub fn is_swapped(&self) -> bool {
        self.swapped.load(Ordering::Acquire)
    }

    /// Mark this row's value as swapped out to external storage (`§4.3`).
    pub fn on_swap(&self) {
        *self.value.lock() = None;
        self.swapped.store(true, Ordering::Release);
    }

    /// Mark this row's value as restored from external storage (`§4.3`). Forbidden to call with
    /// an absent value, the source documents `onUnswap(key, value=none)` as disallowed, so this
    /// takes `V` rather than `Option<V>`.
    pub fn on_unswap(&self, value: V) {
        *self.value.lock() = Some(value);
        self.swapped.store(false, Ordering::Release);
    }

    /// Returns a clone of the current value, or `None` if the row is currently swapped out.
    pub fn value(&self) -> Option<V>
    where
        V: Clone,
    {
        self.value.lock().clone()
    }

    pub(crate) fn wait_insert_complete(&self) -> bool {
        self.insert_latch.wait_insert_complete()
    }

    pub(crate) fn finish_insert(&self, success: bool) {
        self.insert_latch.finish_insert(success)
    }
}
