//! Allocation and scope-lifecycle statistics.
//!
//! All counters use `Relaxed` ordering — they are observational only and not
//! used as synchronization primitives. The pool spinlocks provide the
//! ordering guarantees for correctness; these counters are purely for
//! monitoring (surfaced via `BASIC_MEMORY_STATS=1` or `samm_print_stats`).
//!
//! Obtain a [`Snapshot`] with [`snapshot()`]. Individual counter loads are
//! individually atomic but not globally consistent with each other.

use std::sync::atomic::{AtomicU64, Ordering};

pub(crate) struct Stats {
    /// Total `samm_alloc_object` calls served from a slab pool.
    pub pool_hits: AtomicU64,
    /// Total `samm_alloc_object` calls that fell through to the raw-heap
    /// overflow path (oversized request or pool exhaustion).
    pub overflow_allocs: AtomicU64,
    /// Total bytes requested across all `samm_alloc_object` calls.
    pub alloc_bytes: AtomicU64,
    /// Total `samm_track*` calls.
    pub objects_tracked: AtomicU64,
    /// Total `samm_untrack` calls that found and removed a record.
    pub objects_untracked: AtomicU64,
    /// Total `samm_enter_scope` calls.
    pub scopes_entered: AtomicU64,
    /// Total `samm_exit_scope` calls.
    pub scopes_exited: AtomicU64,
    /// Total scope-vectors handed to the cleanup queue.
    pub batches_submitted: AtomicU64,
    /// Total scope-vectors the worker has finished processing.
    pub batches_processed: AtomicU64,
    /// Total tracked records cleaned up by the worker (sum across batches).
    pub records_cleaned: AtomicU64,
    /// Calls to `platform::page_alloc` made while growing a slab pool.
    pub os_alloc_count: AtomicU64,
    /// Bytes requested from the OS via `platform::page_alloc`.
    pub os_alloc_bytes: AtomicU64,
    /// Times the Bloom filter reported a probable double-free.
    pub double_free_flagged: AtomicU64,
    /// Bytes reported freed via `samm_record_bytes_freed` (host-owned
    /// buffers released outside SAMM's own pool/overflow accounting).
    pub bytes_freed_external: AtomicU64,
}

impl Stats {
    const fn new() -> Self {
        Self {
            pool_hits: AtomicU64::new(0),
            overflow_allocs: AtomicU64::new(0),
            alloc_bytes: AtomicU64::new(0),
            objects_tracked: AtomicU64::new(0),
            objects_untracked: AtomicU64::new(0),
            scopes_entered: AtomicU64::new(0),
            scopes_exited: AtomicU64::new(0),
            batches_submitted: AtomicU64::new(0),
            batches_processed: AtomicU64::new(0),
            records_cleaned: AtomicU64::new(0),
            os_alloc_count: AtomicU64::new(0),
            os_alloc_bytes: AtomicU64::new(0),
            double_free_flagged: AtomicU64::new(0),
            bytes_freed_external: AtomicU64::new(0),
        }
    }
}

pub(crate) static STATS: Stats = Stats::new();

/// A point-in-time snapshot of all SAMM statistics.
///
/// Fields are plain `u64` values loaded from the global atomic counters.
/// Individual fields are each atomically read, but the snapshot as a whole
/// is not globally consistent — concurrent calls may race between loads.
/// For monitoring purposes this is always sufficient.
#[derive(Clone, Copy, Debug, Default)]
pub struct Snapshot {
    pub pool_hits: u64,
    pub overflow_allocs: u64,
    pub alloc_bytes: u64,
    pub objects_tracked: u64,
    pub objects_untracked: u64,
    pub scopes_entered: u64,
    pub scopes_exited: u64,
    pub batches_submitted: u64,
    pub batches_processed: u64,
    pub records_cleaned: u64,
    pub os_alloc_count: u64,
    pub os_alloc_bytes: u64,
    pub double_free_flagged: u64,
    pub bytes_freed_external: u64,
}

/// Load all counters with `Relaxed` ordering and return a [`Snapshot`].
pub fn snapshot() -> Snapshot {
    let s = &STATS;
    Snapshot {
        pool_hits: s.pool_hits.load(Ordering::Relaxed),
        overflow_allocs: s.overflow_allocs.load(Ordering::Relaxed),
        alloc_bytes: s.alloc_bytes.load(Ordering::Relaxed),
        objects_tracked: s.objects_tracked.load(Ordering::Relaxed),
        objects_untracked: s.objects_untracked.load(Ordering::Relaxed),
        scopes_entered: s.scopes_entered.load(Ordering::Relaxed),
        scopes_exited: s.scopes_exited.load(Ordering::Relaxed),
        batches_submitted: s.batches_submitted.load(Ordering::Relaxed),
        batches_processed: s.batches_processed.load(Ordering::Relaxed),
        records_cleaned: s.records_cleaned.load(Ordering::Relaxed),
        os_alloc_count: s.os_alloc_count.load(Ordering::Relaxed),
        os_alloc_bytes: s.os_alloc_bytes.load(Ordering::Relaxed),
        double_free_flagged: s.double_free_flagged.load(Ordering::Relaxed),
        bytes_freed_external: s.bytes_freed_external.load(Ordering::Relaxed),
    }
}

/// Render a snapshot as the `stderr` report `samm_print_stats`/
/// `BASIC_MEMORY_STATS=1` emit at shutdown.
pub fn format_report(snap: &Snapshot) -> String {
    format!(
        "samm stats: pool_hits={} overflow_allocs={} alloc_bytes={} \
         objects_tracked={} objects_untracked={} scopes_entered={} scopes_exited={} \
         batches_submitted={} batches_processed={} records_cleaned={} \
         os_alloc_count={} os_alloc_bytes={} double_free_flagged={} bytes_freed_external={}",
        snap.pool_hits,
        snap.overflow_allocs,
        snap.alloc_bytes,
        snap.objects_tracked,
        snap.objects_untracked,
        snap.scopes_entered,
        snap.scopes_exited,
        snap.batches_submitted,
        snap.batches_processed,
        snap.records_cleaned,
        snap.os_alloc_count,
        snap.os_alloc_bytes,
        snap.double_free_flagged,
        snap.bytes_freed_external,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_reflects_counter_increments() {
        let before = snapshot().objects_tracked;
        STATS.objects_tracked.fetch_add(1, Ordering::Relaxed);
        let after = snapshot().objects_tracked;
        assert_eq!(after, before + 1);
    }

    #[test]
    fn format_report_mentions_all_fields() {
        let snap = snapshot();
        let report = format_report(&snap);
        assert!(report.contains("pool_hits"));
        assert!(report.contains("double_free_flagged"));
    }
}
