//! The dispatch wrapper at `indexes[0]` that exposes the primary index to the planner as a
//! full-scan-capable, non-ordered-for-planning-purposes index (`§2`, `§9` "Scan index as dispatch
//! wrapper").
//!
//! The source models this via inheritance from the primary index's class; we model it as a tagged
//! variant holding a handle to the primary instead (`§9` explicitly asks for this), since Rust has
//! no implementation inheritance and a newtype wrapper is the idiomatic equivalent.

use std::fmt;
use std::ops::Bound;
use std::sync::Arc;

use super::{Index, Snapshot};
use crate::index_value::IndexValue;
use crate::row::Row;

/// Wraps the primary index for the SQL planner's full-table-scan path. All mutating operations
/// delegate straight through; DDL-shaped operations (rename, schema changes) are not part of this
/// trait at all and are rejected one level up, by `Table`'s `TableEngineHandle` impl (`§6`), so
/// there is nothing to no-op here beyond delegation.
pub struct ScanIndex<K, V> {
    primary: Arc<dyn Index<K, V>>,
}

impl<K, V> fmt::Debug for ScanIndex<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScanIndex").field("primary", &self.primary).finish()
    }
}

impl<K, V> ScanIndex<K, V>
where
    K: Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    pub fn new(primary: Arc<dyn Index<K, V>>) -> Self {
        ScanIndex { primary }
    }

    /// A cost-model hook for the planner (`§2`): full scans through this index always cost
    /// proportional to the primary's row count, regardless of any predicate pushed down to it,
    /// since it does not maintain its own ordering.
    pub fn scan_cost_estimate(&self) -> usize {
        self.primary.len()
    }
}

impl<K, V> Index<K, V> for ScanIndex<K, V>
where
    K: Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    fn name(&self) -> &str {
        "PRIMARY_SCAN"
    }

    fn is_unique(&self) -> bool {
        false
    }

    fn key_of(&self, row: &Row<K, V>) -> IndexValue {
        self.primary.key_of(row)
    }

    fn key_from_value(&self, row: &Row<K, V>) -> IndexValue {
        self.primary.key_from_value(row)
    }

    fn put(&self, row: Arc<Row<K, V>>, if_absent: bool) -> Option<Arc<Row<K, V>>> {
        self.primary.put(row, if_absent)
    }

    fn remove(&self, row: &Row<K, V>) -> Option<Arc<Row<K, V>>> {
        self.primary.remove(row)
    }

    fn find_one(&self, key: &IndexValue) -> Option<Arc<Row<K, V>>> {
        self.primary.find_one(key)
    }

    fn find_range(
        &self,
        first: Bound<IndexValue>,
        last: Bound<IndexValue>,
    ) -> Box<dyn Iterator<Item = Arc<Row<K, V>>> + '_> {
        self.primary.find_range(first, last)
    }

    fn take_snapshot(&self, prev: Option<&Snapshot<K, V>>) -> Snapshot<K, V> {
        self.primary.take_snapshot(prev)
    }

    fn len(&self) -> usize {
        self.primary.len()
    }

    fn rebuild(&self) -> Box<dyn Index<K, V>> {
        Box::new(ScanIndex {
            primary: Arc::from(self.primary.rebuild()),
        })
    }

    fn clear(&self) {
        self.primary.clear()
    }
}
