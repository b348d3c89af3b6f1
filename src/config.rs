//! Construction-time knobs for a [`Table`](crate::table::Table).

use std::time::Duration;

/// Configuration for a [`Table`](crate::table::Table)'s lock discipline.
///
/// `write_lock_wait_time` and `write_lock_wait_time_max` resolve the source's open question about
/// whether the exponential backoff in `§4.1` step 2 should be capped: the source doubles the
/// timeout on every retry with no upper bound, which under sustained write-lock contention would
/// let a single query's wait grow without limit. We decided (see `DESIGN.md`) that this was an
/// omission rather than an intentional design choice, and impose a ceiling.
#[derive(Debug, Clone)]
pub struct TableConfig {
    /// Whether the underlying reader/writer lock favors writers over a continuous stream of
    /// readers (`fair = true`), or allows readers to starve a waiting writer indefinitely under
    /// sufficient read pressure. The source allows this to be configured per-table at
    /// construction; we expose the same knob, implemented with `parking_lot`'s fair unlocking.
    pub fair: bool,

    /// Initial timeout passed to the write lock's try-acquire when installing a snapshot (`§4.1`
    /// step 2).
    pub write_lock_wait_time: Duration,

    /// Upper bound the doubling backoff in `§4.1` step 2 will not exceed.
    pub write_lock_wait_time_max: Duration,
}

impl Default for TableConfig {
    fn default() -> Self {
        TableConfig {
            fair: false,
            write_lock_wait_time: Duration::from_millis(50),
            write_lock_wait_time_max: Duration::from_secs(5),
        }
    }
}

impl TableConfig {
    /// Starts from [`TableConfig::default`] with `fair` set.
    pub fn with_fair_lock(fair: bool) -> Self {
        TableConfig {
            fair,
            ..Default::default()
        }
    }
}
