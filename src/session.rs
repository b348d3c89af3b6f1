//! Query session identity (`§3`: "sessions: set of query sessions currently holding a snapshot on
//! this table").

use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

/// Opaque identifier for a query session, minted by the host SQL engine's connection layer (out of
/// scope, `§1`) and handed back to [`Table::lock`](crate::table::Table::lock)/
/// [`Table::unlock`](crate::table::Table::unlock) for the lifetime of one query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(u64);

impl SessionId {
    /// Mints a fresh, process-unique session id.
    pub fn new() -> Self {
        SessionId(NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for SessionId {
    fn default() -> Self {
        SessionId::new()
    }
}
