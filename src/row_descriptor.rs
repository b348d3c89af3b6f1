//! Factory for search-rows and full rows, and owner of a table's optional off-heap memory region
//! (`§2` `RowDescriptor`).

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use crate::offheap::OffHeapMemory;
use crate::row::Row;

/// Builds [`Row`]s on behalf of a [`Table`](crate::table::Table), and carries the off-heap memory
/// region (if any) that row values in the table are allocated from.
///
/// `Table::lock`'s decision to publish a snapshot or keep it caller-local hinges entirely on
/// whether `memory()` is `Some` (`§4.1` step 3), everything else about off-heap memory is this
/// crate's coordination hook (`OffHeapScope`, `§5`), not an allocator.
pub struct RowDescriptor<K, V> {
    memory: Option<Arc<dyn OffHeapMemory>>,
    _marker: std::marker::PhantomData<fn() -> (K, V)>,
}

impl<K, V> fmt::Debug for RowDescriptor<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RowDescriptor")
            .field("has_memory", &self.memory.is_some())
            .finish()
    }
}

impl<K, V> Default for RowDescriptor<K, V> {
    fn default() -> Self {
        RowDescriptor {
            memory: None,
            _marker: std::marker::PhantomData,
        }
    }
}

impl<K, V> RowDescriptor<K, V> {
    /// A descriptor with no off-heap memory; snapshot publication behaves normally.
    pub fn new() -> Self {
        Self::default()
    }

    /// A descriptor backed by `memory`; disables snapshot publication (`§4.1`).
    pub fn with_memory(memory: Arc<dyn OffHeapMemory>) -> Self {
        RowDescriptor {
            memory: Some(memory),
            _marker: std::marker::PhantomData,
        }
    }

    pub fn memory(&self) -> Option<&dyn OffHeapMemory> {
        self.memory.as_deref()
    }

    /// Construct an unresolved row participating in the concurrent-insert protocol, as used by
    /// `Table::do_update`'s insert/replace path (`§4.2`).
    pub(crate) fn full_row_for_insert(&self, key: K, value: V, expiration: Option<Instant>) -> Row<K, V> {
        Row::new_inserting(key, value, expiration)
    }

    /// Construct a key-only row used purely to drive a lookup or a by-key removal (`§3`
    /// `SearchRow`).
    pub fn search_row(&self, key: K) -> Row<K, V> {
        Row::search(key)
    }
}
