//! The ordered `SearchRow -> Row` mapping every [`Table`](crate::table::Table) index implements
//! (`§3 DATA MODEL`, `Index (abstract)` in `§2`).

mod scan_index;
mod tree_index;

use std::collections::BTreeMap;
use std::fmt;
use std::ops::Bound;
use std::sync::Arc;

pub use scan_index::ScanIndex;
pub use tree_index::{KeyExtractor, TreeIndex};

use crate::index_value::IndexValue;
use crate::row::Row;

/// A reference-counted, point-in-time view of one index's live contents, taken under the table's
/// write lock (`§4.1`).
///
/// Cloning a `Snapshot` is an `Arc` clone, this *is* the "reference-count semantics" `§3`
/// describes for `takeSnapshot`/`releaseSnapshot`: acquiring a reference is `clone`, releasing one
/// is simply dropping the clone. There is deliberately no explicit `release` method; Rust's
/// ownership already gives us that for free, and the uniform (`take`-returns-an-owned-handle)
/// shape matches how every index participates in `Table::lock`.
pub struct Snapshot<K, V>(Arc<BTreeMap<IndexValue, Arc<Row<K, V>>>>);

impl<K, V> Clone for Snapshot<K, V> {
    fn clone(&self) -> Self {
        Snapshot(Arc::clone(&self.0))
    }
}

impl<K, V> fmt::Debug for Snapshot<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Snapshot").field("len", &self.0.len()).finish()
    }
}

impl<K, V> Snapshot<K, V> {
    fn materialize(entries: impl Iterator<Item = (IndexValue, Arc<Row<K, V>>)>) -> Self {
        Snapshot(Arc::new(entries.collect()))
    }

    /// Look up a single row by its exact index key as it stood when this snapshot was taken.
    pub fn find_one(&self, key: &IndexValue) -> Option<Arc<Row<K, V>>> {
        self.0.get(key).cloned()
    }

    /// Iterate the inclusive range `[first, last]` as it stood when this snapshot was taken.
    pub fn find_range(
        &self,
        first: Bound<IndexValue>,
        last: Bound<IndexValue>,
    ) -> impl Iterator<Item = Arc<Row<K, V>>> + '_ {
        self.0.range((first, last)).map(|(_, row)| Arc::clone(row))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// An ordered `SearchRow -> Row` mapping (`§3`).
///
/// Implementations are required to be internally thread-safe: `§5` requires that "individual
/// Index entries are concurrently mutated under the read lock using their own internal
/// concurrency," since `Table::do_update` only ever holds the table's *read* lock while mutating
/// indexes (`§4.1`).
pub trait Index<K, V>: Send + Sync + fmt::Debug
where
    K: Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    /// Name used in `IndexUpdateFailed` errors and host-engine introspection.
    fn name(&self) -> &str;

    /// Whether this index enforces a unique-constraint (the primary index and unique secondaries
    /// do; non-unique secondaries do not).
    fn is_unique(&self) -> bool;

    /// This row's key for this index, as used by `put`/`remove` (the primary index's is the
    /// identity projection of the cache key; a secondary index's is whatever projection of `V` it
    /// was constructed with, read back from the row's insertion-time key cache rather than
    /// re-derived from the row's current value, so it stays valid even if the row has since been
    /// swapped out, see [`Row::secondary_key`](crate::row::Row)).
    fn key_of(&self, row: &Row<K, V>) -> IndexValue;

    /// Derive this index's key directly from `row`'s *current* value, bypassing any cached key
    /// material. Used exactly once per row, by `Table::do_insert`, to populate the row's
    /// secondary-key cache immediately after construction, while its value is still guaranteed to
    /// be present (`§4.2`). Not used by `put`/`remove` themselves; those call [`Index::key_of`].
    fn key_from_value(&self, row: &Row<K, V>) -> IndexValue;

    /// Insert `row`, returning the row it displaced (by this index's key), or `None` if the slot
    /// was empty.
    ///
    /// If `if_absent` is `true` and a row with an equal key is already present, performs **no**
    /// mutation and returns that row (`§3`).
    fn put(&self, row: Arc<Row<K, V>>, if_absent: bool) -> Option<Arc<Row<K, V>>>;

    /// Remove the row keyed like `row` (by this index's key extraction), returning it if present.
    fn remove(&self, row: &Row<K, V>) -> Option<Arc<Row<K, V>>>;

    /// Point lookup against this index's *live* contents (used internally by the update protocol;
    /// query-time lookups go through a [`Snapshot`] instead, see `§4.1`).
    fn find_one(&self, key: &IndexValue) -> Option<Arc<Row<K, V>>>;

    /// Range lookup against this index's live contents, inclusive of both bounds per the supplied
    /// [`Bound`]s.
    fn find_range(
        &self,
        first: Bound<IndexValue>,
        last: Bound<IndexValue>,
    ) -> Box<dyn Iterator<Item = Arc<Row<K, V>>> + '_>;

    /// Take a snapshot of this index's current contents. If `prev` is given, the index may (and
    /// the concrete [`TreeIndex`] always does) simply hand back a clone of it rather than
    /// re-materializing, see `§3`'s "reference-count semantics."
    fn take_snapshot(&self, prev: Option<&Snapshot<K, V>>) -> Snapshot<K, V>;

    /// Current number of rows in this index.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Build a fresh index with the same contents (`§4.4`); the old instance is discarded by the
    /// caller.
    fn rebuild(&self) -> Box<dyn Index<K, V>>;

    /// Remove every row. Used only by `Table::close` (`§3` Lifecycle).
    fn clear(&self);
}

/// The primary index's key extractor: the identity projection of the cache key itself.
pub fn identity_key<K, V>() -> KeyExtractor<K, V>
where
    K: Into<IndexValue> + Clone + Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    Arc::new(|row: &Row<K, V>| row.key().clone().into())
}

/// A secondary index's key extractor, built from `project` (the declared column projection of a
/// row's value).
///
/// A unique index's key is `project`'s output directly, uniqueness of that projection across rows
/// is exactly what the index is meant to enforce. A non-unique index instead stores
/// `(project(value), primary_key)`: without the primary key suffix, every row sharing the same
/// projected value would collide on a single `SkipMap` slot, silently losing all but one of them.
/// The suffix disambiguates storage position while `Tuple`'s lexicographic `Ord` keeps all rows for
/// a given projected value contiguous and then ordered by primary key, so range scans over the
/// projected columns still behave like a normal secondary index.
pub fn projected_key<K, V, F>(project: F, unique: bool) -> KeyExtractor<K, V>
where
    K: Into<IndexValue> + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
    F: Fn(&V) -> IndexValue + Send + Sync + 'static,
{
    if unique {
        Arc::new(move |row: &Row<K, V>| {
            let value = row
                .value()
                .expect("secondary index key extraction requires a populated row");
            project(&value)
        })
    } else {
        Arc::new(move |row: &Row<K, V>| {
            let value = row
                .value()
                .expect("secondary index key extraction requires a populated row");
            IndexValue::Tuple(vec![project(&value), row.key().clone().into()])
        })
    }
}
