//! The off-heap memory hook and its scoped begin/end guard (`§2` `OffHeapOp scope`, `§5`
//! "Off-heap memory").
//!
//! A [`RowDescriptor`](crate::row_descriptor::RowDescriptor) may own a region of externally
//! managed memory that backs some or all of a table's row values. This crate does not implement an
//! allocator for such a region (out of scope, `§1` Non-goals: "no disk persistence" and the
//! broader pure-in-memory framing), it only implements the *coordination* hook: every traversal
//! that might dereference off-heap memory is bracketed by [`OffHeapMemory::begin`] /
//! [`OffHeapMemory::end`] so that a concurrent compaction of that region cannot reclaim pages out
//! from under a reader.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// A token identifying one begin/end-bracketed operation, returned by [`OffHeapMemory::begin`] and
/// consumed by [`OffHeapMemory::end`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpToken(u64);

/// An externally managed memory region that row values may be allocated from.
///
/// When a [`Table`](crate::table::Table)'s descriptor has no off-heap memory (the common case),
/// [`NoOffHeapMemory`] is used, and snapshot publication proceeds normally (`§4.1` step 3).
/// When one is present, publication is disabled: a freshly taken snapshot is used only by the
/// caller that took it, never published to `actualSnapshot`, because pages referenced by a
/// published, long-lived snapshot could be reclaimed by a later mutation.
pub trait OffHeapMemory: Send + Sync + fmt::Debug {
    /// Marks the start of an operation that may dereference off-heap memory.
    fn begin(&self) -> OpToken;

    /// Marks the end of the operation started by `begin`.
    fn end(&self, token: OpToken);
}

/// The default: no off-heap memory is attached, so bracketing is a no-op and snapshot publication
/// proceeds normally.
#[derive(Debug, Default)]
pub struct NoOffHeapMemory;

impl OffHeapMemory for NoOffHeapMemory {
    fn begin(&self) -> OpToken {
        OpToken(0)
    }

    fn end(&self, _token: OpToken) {}
}

/// A scoped RAII guard: calls [`OffHeapMemory::begin`] on construction and
/// [`OffHeapMemory::end`] on drop, so that every exit path out of a traversal, including an early
/// return or a panic, closes the bracket (`§9`: "OffHeapOp scope").
pub struct OffHeapScope<'a> {
    memory: &'a dyn OffHeapMemory,
    token: OpToken,
}

impl<'a> OffHeapScope<'a> {
    pub fn enter(memory: &'a dyn OffHeapMemory) -> Self {
        let token = memory.begin();
        OffHeapScope { memory, token }
    }
}

impl Drop for OffHeapScope<'_> {
    fn drop(&mut self) {
        self.memory.end(self.token);
    }
}

/// Test double that asserts every `begin` is eventually matched by exactly one `end`, used to
/// verify `Table`'s bracketing discipline (`§5`).
#[derive(Debug, Default)]
pub struct CountingOffHeapMemory {
    next: AtomicU64,
    open: AtomicU64,
}

impl CountingOffHeapMemory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of `begin` calls not yet matched by an `end`. Should be `0` whenever no traversal is
    /// in flight.
    pub fn open_count(&self) -> u64 {
        self.open.load(Ordering::SeqCst)
    }
}

impl OffHeapMemory for CountingOffHeapMemory {
    fn begin(&self) -> OpToken {
        self.open.fetch_add(1, Ordering::SeqCst);
        OpToken(self.next.fetch_add(1, Ordering::SeqCst))
    }

    fn end(&self, _token: OpToken) {
        let prev = self.open.fetch_sub(1, Ordering::SeqCst);
        debug_assert!(prev > 0, "end() called more times than begin()");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scope_pairs_begin_and_end() {
        let mem = CountingOffHeapMemory::new();
        {
            let _scope = OffHeapScope::enter(&mem);
            assert_eq!(mem.open_count(), 1);
        }
        assert_eq!(mem.open_count(), 0);
    }

    #[test]
    fn scope_closes_on_panic() {
        let mem = CountingOffHeapMemory::new();
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _scope = OffHeapScope::enter(&mem);
            panic!("boom");
        }));
        assert!(result.is_err());
        assert_eq!(mem.open_count(), 0);
    }
}
