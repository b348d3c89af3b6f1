//! The process-scoped registry used to pass a descriptor and index factory to the host SQL
//! engine during DDL execution (`§2` `Engine`, `§4.5`, `§9` "Global registry for DDL handoff").
//!
//! The source passes this state through a single bare global, cleared by convention after the
//! host engine's `CREATE TABLE ... ENGINE=...` callback runs. `§9` asks for better: a DDL-scoped
//! context keyed by an opaque token embedded in the DDL string, with creation single-threaded per
//! token and cleared on return. We implement exactly that, `take_ddl` *removes* the entry, so a
//! second call for the same token structurally cannot observe stale state, rather than merely
//! being disciplined about clearing it.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use vec1::Vec1;

use crate::index::KeyExtractor;
use crate::row_descriptor::RowDescriptor;

/// Opaque handle embedded in the `CREATE TABLE ... ENGINE=...` DDL text so the host engine's
/// callback can retrieve the matching [`DdlContext`] (`§9`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DdlToken(u64);

impl DdlToken {
    /// Render this token for embedding into DDL text (e.g. as a table comment or option).
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

/// The specification for one index, as returned by an [`IndexFactory`] (`§6` "Index factory
/// contract"): the primary index first, then unique secondaries, then non-unique secondaries.
pub struct IndexSpec<K, V> {
    pub name: String,
    pub unique: bool,
    pub key_fn: KeyExtractor<K, V>,
}

impl<K, V> IndexSpec<K, V> {
    pub fn new(name: impl Into<String>, unique: bool, key_fn: KeyExtractor<K, V>) -> Self {
        IndexSpec {
            name: name.into(),
            unique,
            key_fn,
        }
    }
}

/// Supplies the ordered list of indexes for a table being created (`§6`).
pub trait IndexFactory<K, V>: Send + Sync {
    /// Returns index specs ordered primary-first, then unique secondaries, then non-unique
    /// secondaries. [`Vec1`] rules out the empty case the source guards against at runtime; the
    /// remaining requirement, that the first spec is the unique primary, is still checked by
    /// `Table::new`, as a programmer error rather than a runtime one (`§4.5`).
    fn create_indexes(&self) -> Vec1<IndexSpec<K, V>>;
}

/// What a DDL caller hands to the host engine: the row descriptor and index factory for the table
/// about to be created, plus the keyspace/table name the host passes back through
/// `CreateTableData` (`§4.5`).
pub struct DdlContext<K, V> {
    pub descriptor: RowDescriptor<K, V>,
    pub factory: Arc<dyn IndexFactory<K, V>>,
    pub space_name: String,
}

static NEXT_TOKEN: AtomicU64 = AtomicU64::new(1);

/// The DDL handoff registry for one `(K, V)` instantiation.
///
/// The host keeps a single shared `Engine` (typically behind an `Arc`, stashed in whatever state
/// its `CREATE TABLE` dispatch already threads through) for the lifetime of the process, this is
/// the one piece of long-lived mutable state this crate carries outside of a `Table` instance,
/// exactly as `§9` permits for the scoped-handoff case.
pub struct Engine<K, V> {
    registry: Mutex<HashMap<DdlToken, DdlContext<K, V>>>,
}

impl<K, V> Engine<K, V>
where
    K: Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    /// Registers a `(descriptor, factory, space_name)` triple for one pending `CREATE TABLE`,
    /// returning the token to embed in the DDL text handed to the host engine.
    pub fn begin_ddl(
        &self,
        descriptor: RowDescriptor<K, V>,
        factory: Arc<dyn IndexFactory<K, V>>,
        space_name: impl Into<String>,
    ) -> DdlToken {
        let token = DdlToken(NEXT_TOKEN.fetch_add(1, Ordering::Relaxed));
        self.registry.lock().insert(
            token,
            DdlContext {
                descriptor,
                factory,
                space_name: space_name.into(),
            },
        );
        token
    }

    /// Retrieves and removes the context registered under `token`. Returns `None` if `token` was
    /// never registered, or has already been taken, this is what makes the handoff safe to call
    /// at most once rather than merely documented as such.
    pub fn take_ddl(&self, token: DdlToken) -> Option<DdlContext<K, V>> {
        self.registry.lock().remove(&token)
    }

    /// Number of DDL handoffs registered but not yet taken, should be `0` outside of the brief
    /// window between `begin_ddl` and the host engine's `createTable` callback; a persistently
    /// nonzero value indicates a `CREATE TABLE` that never completed.
    pub fn pending_count(&self) -> usize {
        self.registry.lock().len()
    }
}

impl<K, V> Default for Engine<K, V> {
    fn default() -> Self {
        Engine {
            registry: Mutex::new(HashMap::new()),
        }
    }
}
