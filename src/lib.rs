//! An indexed, in-memory table with atomic multi-index updates and snapshot-isolated reads,
//! meant to back one `ENGINE=...`-style table in a host SQL engine, the storage primitive a
//! distributed cache uses so the engine can run predicate pushdown and full scans directly over
//! cached rows instead of materializing them into a generic result set first.
//!
//! The three pieces a host wires together:
//!
//! - [`Engine`] registers a [`RowDescriptor`] and [`IndexFactory`] for one pending `CREATE TABLE`
//!   and hands back a [`DdlToken`](engine::DdlToken) the host embeds in the DDL text it passes to
//!   its SQL engine; the engine's `CREATE TABLE ... ENGINE=...` callback uses that token to
//!   retrieve the context and construct the [`Table`].
//! - [`Table`] is the core: [`Table::update`] is the only mutation entry point (insert, replace,
//!   or delete, keyed by whether a value is supplied), and [`Table::lock`]/[`Table::unlock`]
//!   bracket a query session's snapshot-isolated view.
//! - [`TableConfig`] tunes the lock discipline backing snapshot installation.
//!
//! Rows are addressed by an application-defined key type `K` and carry an application-defined
//! value type `V`; every index key this crate produces is erased to the small closed
//! [`IndexValue`] enum so indexes can be stored as `dyn Index<K, V>` trait objects.

mod config;
mod engine;
mod engine_handle;
mod error;
mod index;
mod index_value;
mod offheap;
mod row;
mod row_descriptor;
mod session;
mod table;

pub use config::TableConfig;
pub use engine::{DdlContext, DdlToken, Engine, IndexFactory, IndexSpec};
pub use engine_handle::{TableEngineHandle, EXTERNAL_TABLE_TYPE};
pub use error::{Result, TableError};
pub use index::{identity_key, projected_key, Index, KeyExtractor, ScanIndex, Snapshot, TreeIndex};
pub use index_value::IndexValue;
pub use offheap::{CountingOffHeapMemory, NoOffHeapMemory, OffHeapMemory, OffHeapScope, OpToken};
pub use row::{Row, RowKey};
pub use row_descriptor::RowDescriptor;
pub use session::SessionId;
pub use table::{Table, TableSnapshot};
