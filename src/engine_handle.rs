//! The host SQL engine contract this crate satisfies (`§6 EXTERNAL INTERFACES`, "Host SQL engine
//! contract").
//!
//! The source describes this surface as a set of methods the host engine invokes on whatever
//! object `TableEngine.createTable` returns. We express it as a single object-safe trait,
//! implemented directly by [`Table`](crate::table::Table) rather than through a separate adapter
//! type, since the host contract *is* what a `Table` must satisfy end to end and an indirection
//! layer between the two would add nothing. Every predicate and DDL-mutation method here has no
//! real behavior beyond "always this constant," matching the source's own hard-coded answers.

use std::sync::Arc;

use crate::error::{Result, TableError};
use crate::index::Index;
use crate::session::SessionId;
use crate::table::{Table, TableSnapshot};

/// Sentinel returned by [`TableEngineHandle::get_table_type`]: the host engine's "this table's rows
/// are supplied externally, not stored by the SQL engine itself" marker.
pub const EXTERNAL_TABLE_TYPE: &str = "EXTERNAL";

/// The operations a host SQL engine drives against a constructed table (`§6`).
pub trait TableEngineHandle<K, V> {
    /// Acquire `session`'s snapshot-isolated view (`§4.1`).
    fn lock(&self, session: SessionId) -> Result<Arc<TableSnapshot<K, V>>>;

    /// Release `session`'s snapshot (`§4.1`).
    fn unlock(&self, session: SessionId) -> Result<()>;

    /// Per-session close hook, called once a query's cursor is fully done with this table (`§3`
    /// Lifecycle, `§9` Open Question 3: requires `unlock` to have already run for `session`).
    fn close(&self, session: SessionId) -> Result<()>;

    /// `indexes[0]`: the scan-index dispatch wrapper exposed to the planner's full-scan path.
    fn get_scan_index(&self) -> Arc<dyn Index<K, V>>;

    /// `indexes[1]`: the unique primary index.
    fn get_unique_index(&self) -> Arc<dyn Index<K, V>>;

    /// The full, ordered index list (`indexes[0..N]`).
    fn get_indexes(&self) -> Vec<Arc<dyn Index<K, V>>>;

    /// Exact row count, delegated to the primary index.
    fn get_row_count(&self) -> usize;

    /// No maintained statistics to approximate from; returns the exact count, matching the
    /// source's behavior for an in-memory table with no query planner histogram.
    fn get_row_count_approximation(&self) -> usize;

    /// Always zero: this table has no on-disk representation (`§1` Non-goals: "no disk
    /// persistence"; `§9` Open Question 2, resolved).
    fn disk_space_used(&self) -> u64;

    /// Always `false`: this table never holds an exclusive lock across query boundaries, the
    /// inverted lock discipline (`§4.1`) never leaves a session holding the write lock.
    fn is_locked_exclusively(&self) -> bool;

    /// Always `true`: given the same snapshot, this table's reads are deterministic.
    fn is_deterministic(&self) -> bool;

    /// Always `true`: row count is always available without a scan.
    fn can_get_row_count(&self) -> bool;

    /// Always `true`: a table built by this engine can always be dropped.
    fn can_drop(&self) -> bool;

    /// The host engine's external-table type sentinel (`§6` `getTableType`).
    fn get_table_type(&self) -> &'static str;

    /// Rejects schema mutation: this table is append-only via the cache's `update` path (`§6`).
    fn add_index(&self) -> Result<()>;

    /// Rejects direct row mutation outside the cache's `update` path (`§6`).
    fn add_row(&self) -> Result<()>;

    /// Rejects direct row mutation outside the cache's `update` path (`§6`).
    fn remove_row(&self) -> Result<()>;

    /// Rejects truncation: only the cache can remove rows, one key at a time (`§6`).
    fn truncate(&self) -> Result<()>;

    /// Rejects `ALTER TABLE`: no schema evolution (`§1` Non-goals, `§6`).
    fn check_support_alter(&self) -> Result<()>;

    /// Rejects `RENAME TABLE` (`§6`).
    fn check_rename(&self) -> Result<()>;
}

impl<K, V> TableEngineHandle<K, V> for Table<K, V>
where
    K: Into<crate::index_value::IndexValue> + Clone + Send + Sync + std::fmt::Debug + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn lock(&self, session: SessionId) -> Result<Arc<TableSnapshot<K, V>>> {
        Table::lock(self, session)
    }

    fn unlock(&self, session: SessionId) -> Result<()> {
        Table::unlock(self, session)
    }

    fn close(&self, session: SessionId) -> Result<()> {
        Table::close_session(self, session)
    }

    fn get_scan_index(&self) -> Arc<dyn Index<K, V>> {
        self.index_at(0)
    }

    fn get_unique_index(&self) -> Arc<dyn Index<K, V>> {
        self.index_at(1)
    }

    fn get_indexes(&self) -> Vec<Arc<dyn Index<K, V>>> {
        self.all_indexes()
    }

    fn get_row_count(&self) -> usize {
        Table::row_count(self)
    }

    fn get_row_count_approximation(&self) -> usize {
        Table::row_count_approximation(self)
    }

    fn disk_space_used(&self) -> u64 {
        0
    }

    fn is_locked_exclusively(&self) -> bool {
        false
    }

    fn is_deterministic(&self) -> bool {
        true
    }

    fn can_get_row_count(&self) -> bool {
        true
    }

    fn can_drop(&self) -> bool {
        true
    }

    fn get_table_type(&self) -> &'static str {
        EXTERNAL_TABLE_TYPE
    }

    fn add_index(&self) -> Result<()> {
        Err(TableError::UnsupportedDdl("ADD INDEX"))
    }

    fn add_row(&self) -> Result<()> {
        Err(TableError::UnsupportedDdl("ADD ROW"))
    }

    fn remove_row(&self) -> Result<()> {
        Err(TableError::UnsupportedDdl("REMOVE ROW"))
    }

    fn truncate(&self) -> Result<()> {
        Err(TableError::UnsupportedDdl("TRUNCATE TABLE"))
    }

    fn check_support_alter(&self) -> Result<()> {
        Err(TableError::UnsupportedDdl("ALTER TABLE"))
    }

    fn check_rename(&self) -> Result<()> {
        Err(TableError::UnsupportedDdl("RENAME TABLE"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TableConfig;
    use crate::engine::{IndexFactory, IndexSpec};
    use crate::index::identity_key;
    use crate::row_descriptor::RowDescriptor;
    use vec1::vec1;

    struct SingleIndex;

    impl IndexFactory<u64, u64> for SingleIndex {
        fn create_indexes(&self) -> vec1::Vec1<IndexSpec<u64, u64>> {
            vec1![IndexSpec::new("PRIMARY", true, identity_key())]
        }
    }

    fn new_table() -> Table<u64, u64> {
        Table::new("t", TableConfig::default(), RowDescriptor::new(), &SingleIndex)
    }

    #[test]
    fn ddl_mutation_hooks_are_rejected() {
        let table = new_table();
        assert!(matches!(
            TableEngineHandle::<u64, u64>::add_index(&table),
            Err(TableError::UnsupportedDdl(_))
        ));
        assert!(matches!(
            TableEngineHandle::<u64, u64>::add_row(&table),
            Err(TableError::UnsupportedDdl(_))
        ));
        assert!(matches!(
            TableEngineHandle::<u64, u64>::remove_row(&table),
            Err(TableError::UnsupportedDdl(_))
        ));
        assert!(matches!(
            TableEngineHandle::<u64, u64>::truncate(&table),
            Err(TableError::UnsupportedDdl(_))
        ));
        assert!(matches!(
            TableEngineHandle::<u64, u64>::check_support_alter(&table),
            Err(TableError::UnsupportedDdl(_))
        ));
        assert!(matches!(
            TableEngineHandle::<u64, u64>::check_rename(&table),
            Err(TableError::UnsupportedDdl(_))
        ));
    }

    #[test]
    fn predicates_and_constants_match_the_source() {
        let table = new_table();
        assert!(!TableEngineHandle::<u64, u64>::is_locked_exclusively(&table));
        assert!(TableEngineHandle::<u64, u64>::is_deterministic(&table));
        assert!(TableEngineHandle::<u64, u64>::can_get_row_count(&table));
        assert!(TableEngineHandle::<u64, u64>::can_drop(&table));
        assert_eq!(TableEngineHandle::<u64, u64>::disk_space_used(&table), 0);
        assert_eq!(TableEngineHandle::<u64, u64>::get_table_type(&table), EXTERNAL_TABLE_TYPE);
    }

    #[test]
    fn scan_and_unique_index_accessors_see_inserted_rows() {
        let table = new_table();
        table.update(1, Some(1), None).unwrap();
        assert_eq!(TableEngineHandle::<u64, u64>::get_scan_index(&table).len(), 1);
        assert_eq!(TableEngineHandle::<u64, u64>::get_unique_index(&table).len(), 1);
        assert_eq!(TableEngineHandle::<u64, u64>::get_indexes(&table).len(), 2);
    }
}
