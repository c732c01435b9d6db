//! The SAMM public surface: the glue between the scope stack, the pool
//! registry, the cleanup queue, the Bloom filter, and runtime configuration
//! (SPEC_FULL.md §4.5).
//!
//! `Samm` owns everything created at `samm_init` and torn down at
//! `samm_shutdown`. A single instance is meant to back one process; the
//! `ffi` module exposes it as a lazily-initialized singleton the same way
//! the teacher crate exposes its allocator globals.

use crate::alloc_type::AllocType;
use crate::cleanup::{Callbacks, CleanupFn, CleanupQueue};
use crate::config::{self, RuntimeConfig};
use crate::pool_registry::PoolRegistry;
use crate::stats::Snapshot;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// The scope-aware memory manager. Construct with [`Samm::init`], tear down
/// with [`Samm::shutdown`].
pub struct Samm {
    registry: Arc<PoolRegistry>,
    // Held behind a lock (rather than `Option<CleanupQueue>` directly) so
    // `shutdown`/`force_abandon` can consume the queue through `&self`: both
    // are meant to be callable from `protected_exec`, which only ever holds
    // a shared reference to the running instance.
    queue: crate::sync::SpinMutex<Option<CleanupQueue>>,
    enabled: AtomicBool,
    trace: AtomicBool,
    config: RuntimeConfig,
}

impl Samm {
    /// Bring up pools, the cleanup worker, and the default logger (if none
    /// is installed yet). Reads `RuntimeConfig` from the environment once.
    pub fn init() -> Self {
        config::init_default_logger();
        let cfg = config::config().clone();
        let registry = Arc::new(PoolRegistry::new());
        let queue = CleanupQueue::start(Arc::clone(&registry), cfg.queue_depth, Callbacks::default());
        log::info!("samm initialized (queue_depth={})", cfg.queue_depth);
        Self {
            registry,
            queue: crate::sync::SpinMutex::new(Some(queue)),
            enabled: AtomicBool::new(true),
            trace: AtomicBool::new(false),
            config: cfg,
        }
    }

    /// Globally enable/disable SAMM. Disabled mode bypasses pools, the scope
    /// stack, and tracking: `alloc_object` goes straight to the raw heap,
    /// `free_object` straight back, and `track`/`retain`/scope calls become
    /// no-ops — useful for isolating SAMM's own overhead during profiling.
    pub fn set_enabled(&self, on: bool) {
        self.enabled.store(on, Ordering::Release);
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    /// Toggle the handful of non-feature-gated `debug!`/`info!` call sites
    /// (scope enter/exit, worker batch completion, pool exhaustion).
    pub fn set_trace(&self, on: bool) {
        self.trace.store(on, Ordering::Release);
    }

    pub fn is_tracing(&self) -> bool {
        self.trace.load(Ordering::Acquire)
    }

    /// Allocate a zeroed block of at least `size` bytes. Does not track it —
    /// callers invoke [`Samm::track_object`]/[`Samm::track_string`]/etc.
    /// themselves once the value is fully formed (vtable/class id stamped
    /// for objects).
    pub fn alloc_object(&self, size: usize) -> *mut u8 {
        if !self.is_enabled() {
            // Same libc::calloc/free pairing the registry's overflow path
            // uses, for the same reason: free_object only ever gets the
            // bare pointer back, never the original size.
            return unsafe { libc::calloc(1, size.max(1)) as *mut u8 };
        }
        let (ptr, _class) = self.registry.alloc_object(size);
        ptr
    }

    /// Free a pointer previously returned by [`Samm::alloc_object`], routed
    /// back to its owning pool (or the raw heap for overflow allocations).
    ///
    /// # Safety
    /// `ptr` must be a live allocation from this instance, not already freed.
    pub unsafe fn free_object(&self, ptr: *mut u8) {
        if !self.is_enabled() {
            if !ptr.is_null() {
                unsafe { libc::free(ptr as *mut libc::c_void) };
            }
            return;
        }
        let owned = unsafe { self.registry.free_object(ptr, None) };
        if !owned && !ptr.is_null() {
            crate::bloom::mark_freed(ptr as usize);
        }
    }

    /// Allocate a zeroed slot from the fixed-size `StringDesc` pool directly
    /// (bypassing [`crate::string_desc::new_ascii`]'s `Box`-backed header —
    /// see the `ffi` string-slot entry points that build a descriptor in
    /// place on top of this).
    pub fn alloc_string_slot(&self) -> *mut u8 {
        if !self.is_enabled() {
            return unsafe { libc::calloc(1, crate::pool_registry::STRING_DESC_SIZE) as *mut u8 };
        }
        self.registry.string_desc.alloc(&self.registry.addr_map)
    }

    pub fn alloc_list_header(&self) -> *mut u8 {
        if !self.is_enabled() {
            return unsafe { libc::calloc(1, crate::pool_registry::LIST_HEADER_SIZE) as *mut u8 };
        }
        self.registry.list_header.alloc(&self.registry.addr_map)
    }

    pub fn alloc_list_atom(&self) -> *mut u8 {
        if !self.is_enabled() {
            return unsafe { libc::calloc(1, crate::pool_registry::LIST_ATOM_SIZE) as *mut u8 };
        }
        self.registry.list_atom.alloc(&self.registry.addr_map)
    }

    /// Borrow the pool registry, for class/string intrinsics that need
    /// direct pool access (`class_runtime`'s `object_new`/`object_delete`).
    pub fn registry(&self) -> &PoolRegistry {
        &self.registry
    }

    /// Record a tracked pointer in the current scope frame (or the global
    /// frame at depth 0, which is accepted — see SPEC_FULL.md §12). A no-op
    /// when SAMM is disabled.
    pub fn track(&self, ptr: *mut u8, alloc_type: AllocType) {
        if !self.is_enabled() {
            return;
        }
        crate::scope::track(ptr, alloc_type);
    }

    pub fn track_object(&self, ptr: *mut u8) {
        self.track(ptr, AllocType::Object);
    }

    pub fn track_string(&self, ptr: *mut u8) {
        self.track(ptr, AllocType::String);
    }

    pub fn track_list(&self, ptr: *mut u8) {
        self.track(ptr, AllocType::List);
    }

    /// Remove a pointer from the current scope's tracking vector.
    pub fn untrack(&self, ptr: *mut u8) {
        if !self.is_enabled() {
            return;
        }
        crate::scope::untrack(ptr);
    }

    pub fn enter_scope(&self) -> Result<(), crate::SammError> {
        if !self.is_enabled() {
            return Ok(());
        }
        if self.is_tracing() {
            log::debug!("enter_scope -> depth {}", crate::scope::depth() + 1);
        }
        crate::scope::enter_scope()
    }

    /// Pop the current scope and submit its tracked records to the cleanup
    /// worker. A no-op (and immediately `Ok`) when SAMM is disabled.
    pub fn exit_scope(&self) -> Result<(), crate::SammError> {
        if !self.is_enabled() {
            return Ok(());
        }
        let records = crate::scope::exit_scope()?;
        if self.is_tracing() {
            log::debug!("exit_scope: submitting {} record(s)", records.len());
        }
        if let Some(q) = self.queue.lock().as_ref() {
            q.submit(records);
        }
        Ok(())
    }

    pub fn retain(&self, ptr: *mut u8, k: usize) -> Result<(), crate::SammError> {
        if !self.is_enabled() {
            return Ok(());
        }
        crate::scope::retain(ptr, k)
    }

    pub fn retain_parent(&self, ptr: *mut u8) -> Result<(), crate::SammError> {
        self.retain(ptr, 1)
    }

    /// Override the cleanup callback for one alloc type.
    pub fn register_cleanup(&self, alloc_type: AllocType, f: CleanupFn) {
        if let Some(q) = self.queue.lock().as_ref() {
            q.register_cleanup(alloc_type, f);
        }
    }

    /// Block until the cleanup queue is fully drained and the worker is
    /// idle. Called before stats reporting and before shutdown.
    pub fn wait(&self) {
        if let Some(q) = self.queue.lock().as_ref() {
            q.wait_drained();
        }
    }

    /// A snapshot of the allocation/scope/worker counters.
    pub fn get_stats(&self) -> Snapshot {
        crate::stats::snapshot()
    }

    /// Print the stats report to stderr, as `BASIC_MEMORY_STATS=1` does
    /// automatically at shutdown.
    pub fn print_stats(&self) {
        let snap = self.get_stats();
        eprintln!("{}", crate::stats::format_report(&snap));
    }

    /// Account for bytes freed outside of SAMM's own tracking (e.g. a host
    /// embedder releasing a buffer it owns) for the stats report.
    pub fn record_bytes_freed(&self, bytes: u64) {
        crate::stat_add!(bytes_freed_external, bytes);
    }

    /// Whether `ptr` has probably been freed before (Bloom filter check,
    /// overflow allocations only — see SPEC_FULL.md §4.2).
    pub fn is_probably_freed(&self, ptr: *const u8) -> bool {
        let flagged = crate::bloom::probably_freed(ptr as usize);
        if flagged {
            crate::stat_inc!(double_free_flagged);
        }
        flagged
    }

    /// Orderly shutdown: drain the cleanup queue, join the worker, and
    /// optionally print stats (`BASIC_MEMORY_STATS=1`). Idempotent — a
    /// second call finds the queue already taken and is a no-op beyond
    /// logging.
    pub fn shutdown(&self) {
        self.wait();
        if self.config.stats_on_exit {
            self.print_stats();
        }
        if let Some(q) = self.queue.lock().take() {
            q.shutdown();
        }
        log::info!("samm shutdown");
    }

    /// Abandon the cleanup queue without joining the worker — used on the
    /// timeout path where pool mutexes may be held and joining risks
    /// deadlock (SPEC_FULL.md §4.4).
    pub fn force_abandon(&self) {
        if let Some(q) = self.queue.lock().take() {
            q.force_abandon();
        }
        log::warn!("samm force-abandoned (timeout path)");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_samm_alloc_and_free_are_raw_passthrough() {
        let samm = Samm::init();
        samm.set_enabled(false);
        let p = samm.alloc_object(64);
        assert!(!p.is_null());
        unsafe { samm.free_object(p) };
        samm.set_enabled(true);
    }

    #[test]
    fn enter_exit_scope_roundtrip() {
        let samm = Samm::init();
        samm.enter_scope().unwrap();
        let p = samm.alloc_object(32);
        samm.track_object(p);
        samm.exit_scope().unwrap();
        samm.wait();
    }

    #[test]
    fn stats_snapshot_is_queryable() {
        let samm = Samm::init();
        let snap = samm.get_stats();
        let _ = snap.pool_hits;
    }
}
