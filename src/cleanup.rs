//! The scope-exit cleanup queue and its dedicated background worker
//! (SPEC_FULL.md §4.4).
//!
//! One producer (the mutator thread, via `exit_scope`) hands detached scope
//! vectors to one consumer (the worker thread). `crossbeam_channel::bounded`
//! gives us exactly the blocking-when-full semantics the spec calls for,
//! without hand-rolling a condition variable the way the teacher crate's
//! single-threaded pool code does for its own locks.

use crate::alloc_type::AllocType;
use crate::pool_registry::PoolRegistry;
use crate::scope::TrackRecord;
use crossbeam_channel::{bounded, Receiver, Sender};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

/// A user-registered cleanup callback for one alloc type. Receives the raw
/// pointer; returning control to SAMM means "this pointer's resources (if
/// any beyond the pool slot itself) have been released." `extern "C"` since
/// compiled BASIC code (via `ffi::samm_register_cleanup`) may install one
/// directly.
pub type CleanupFn = extern "C" fn(*mut u8);

extern "C" fn default_object_cleanup(ptr: *mut u8) {
    if ptr.is_null() {
        return;
    }
    unsafe {
        let vtable = *(ptr as *const *const u8);
        if !vtable.is_null() {
            let dtor_slot = vtable.add(3 * core::mem::size_of::<usize>()) as *const usize;
            let dtor = *dtor_slot;
            if dtor != 0 {
                let dtor: extern "C" fn(*mut u8) = core::mem::transmute(dtor);
                dtor(ptr);
            }
        }
    }
}

extern "C" fn default_string_cleanup(ptr: *mut u8) {
    crate::string_desc::release_raw(ptr);
}

// List/ListAtom pointers are always pool-owned: `process_batch` routes them
// through `registry.free_object` right after this callback runs, so their
// default must stay a no-op — calling `libc::free` on a slab-pool address
// here would both be UB (never came from `malloc`) and a double free once
// `free_object` runs.
extern "C" fn default_pool_owned_cleanup(_ptr: *mut u8) {}

// Array/Generic/Unknown pointers are never routed through `registry.free_object`
// (see `process_batch`): they aren't necessarily pool addresses, so the only
// way to reclaim one absent a caller-registered override is a raw free.
extern "C" fn default_generic_cleanup(ptr: *mut u8) {
    if !ptr.is_null() {
        unsafe { libc::free(ptr as *mut libc::c_void) };
    }
}

pub struct Callbacks {
    pub object: CleanupFn,
    pub string: CleanupFn,
    pub list: CleanupFn,
    pub list_atom: CleanupFn,
    pub generic: CleanupFn,
}

impl Default for Callbacks {
    fn default() -> Self {
        Self {
            object: default_object_cleanup,
            string: default_string_cleanup,
            list: default_pool_owned_cleanup,
            list_atom: default_pool_owned_cleanup,
            generic: default_generic_cleanup,
        }
    }
}

pub struct CleanupQueue {
    sender: Sender<Vec<TrackRecord>>,
    receiver_handle: Option<JoinHandle<()>>,
    shutdown: Arc<AtomicBool>,
    callbacks: Arc<crate::sync::SpinMutex<Callbacks>>,
}

impl CleanupQueue {
    /// Start the worker thread, bound to `registry`'s lifetime via an `Arc`.
    pub fn start(registry: Arc<PoolRegistry>, depth: usize, callbacks: Callbacks) -> Self {
        let (tx, rx): (Sender<Vec<TrackRecord>>, Receiver<Vec<TrackRecord>>) = bounded(depth);
        let shutdown = Arc::new(AtomicBool::new(false));
        let shutdown_worker = Arc::clone(&shutdown);
        let callbacks = Arc::new(crate::sync::SpinMutex::new(callbacks));
        let callbacks_worker = Arc::clone(&callbacks);

        let handle = std::thread::Builder::new()
            .name("samm-cleanup-worker".into())
            .spawn(move || {
                worker_loop(rx, registry, callbacks_worker, shutdown_worker);
            })
            .expect("failed to spawn cleanup worker thread");

        Self {
            sender: tx,
            receiver_handle: Some(handle),
            shutdown,
            callbacks,
        }
    }

    /// Override the cleanup callback for one alloc type at runtime.
    pub fn register_cleanup(&self, alloc_type: AllocType, f: CleanupFn) {
        let mut cb = self.callbacks.lock();
        match alloc_type {
            AllocType::Object => cb.object = f,
            AllocType::String => cb.string = f,
            AllocType::List => cb.list = f,
            AllocType::ListAtom => cb.list_atom = f,
            AllocType::Array | AllocType::Generic | AllocType::Unknown => cb.generic = f,
        }
    }

    /// Hand a detached scope vector to the worker. Blocks if the queue is
    /// full (bounded at `depth` batches).
    pub fn submit(&self, batch: Vec<TrackRecord>) {
        if batch.is_empty() {
            return;
        }
        crate::stat_inc!(batches_submitted);
        // A closed receiver means we are shutting down; drop the batch
        // rather than panic on send.
        let _ = self.sender.send(batch);
    }

    /// Block until the worker has drained all currently queued batches.
    /// Implemented by sending a marker batch and waiting for an empty-queue
    /// signal would require a second channel; instead we poll the channel's
    /// length, which crossbeam exposes cheaply.
    pub fn wait_drained(&self) {
        while self.sender.len() > 0 {
            std::thread::yield_now();
        }
    }

    /// Signal the worker to stop after finishing its current batch, and
    /// join it.
    pub fn shutdown(mut self) {
        self.wait_drained();
        self.shutdown.store(true, Ordering::Release);
        drop(self.sender.clone());
        if let Some(h) = self.receiver_handle.take() {
            let _ = h.join();
        }
    }

    /// Drop all queued work immediately without waiting — used on the
    /// timeout/abort path where pool mutexes may be held and joining the
    /// worker risks deadlock (SPEC_FULL.md §4.4).
    pub fn force_abandon(self) {
        self.shutdown.store(true, Ordering::Release);
        // Intentionally do not join; the worker thread is leaked along with
        // whatever batch it was mid-processing.
    }
}

fn worker_loop(
    rx: Receiver<Vec<TrackRecord>>,
    registry: Arc<PoolRegistry>,
    callbacks: Arc<crate::sync::SpinMutex<Callbacks>>,
    shutdown: Arc<AtomicBool>,
) {
    loop {
        match rx.recv_timeout(std::time::Duration::from_millis(50)) {
            Ok(batch) => process_batch(&registry, &callbacks, batch),
            Err(crossbeam_channel::RecvTimeoutError::Timeout) => {
                if shutdown.load(Ordering::Acquire) {
                    return;
                }
            }
            Err(crossbeam_channel::RecvTimeoutError::Disconnected) => return,
        }
    }
}

fn process_batch(
    registry: &PoolRegistry,
    callbacks: &crate::sync::SpinMutex<Callbacks>,
    batch: Vec<TrackRecord>,
) {
    crate::stat_inc!(batches_processed);
    // Reverse track order: LIFO cleanup mirrors stack semantics.
    for record in batch.into_iter().rev() {
        crate::stat_inc!(records_cleaned);
        let cb = {
            let guard = callbacks.lock();
            match record.alloc_type {
                AllocType::Object => guard.object,
                AllocType::String => guard.string,
                AllocType::List => guard.list,
                AllocType::ListAtom => guard.list_atom,
                AllocType::Array | AllocType::Generic | AllocType::Unknown => guard.generic,
            }
        };
        cb(record.ptr);
        // Only Object/List/ListAtom pointers are pool-owned by SAMM itself —
        // their default callbacks run a destructor or do nothing, leaving the
        // pool slot to be reclaimed here. String's default callback already
        // fully frees the descriptor (`release_raw`), and Generic/Array/
        // Unknown pointers are whatever the registered callback says they
        // are, not necessarily pool addresses at all — routing either of
        // those through `free_object` would free a foreign or already-freed
        // pointer via the overflow `libc::free` path.
        match record.alloc_type {
            AllocType::Object | AllocType::List | AllocType::ListAtom => unsafe {
                registry.free_object(record.ptr, None);
            },
            AllocType::String | AllocType::Array | AllocType::Generic | AllocType::Unknown => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alloc_type::AllocType;

    #[test]
    fn worker_drains_a_batch_in_lifo_order() {
        static mut ORDER: Vec<usize> = Vec::new();

        extern "C" fn cb(ptr: *mut u8) {
            unsafe {
                #[allow(static_mut_refs)]
                ORDER.push(ptr as usize);
            }
        }

        let registry = Arc::new(PoolRegistry::new());
        let callbacks = Callbacks {
            generic: cb,
            ..Callbacks::default()
        };
        let queue = CleanupQueue::start(Arc::clone(&registry), 8, callbacks);

        let batch = vec![
            TrackRecord { ptr: 1 as *mut u8, alloc_type: AllocType::Generic },
            TrackRecord { ptr: 2 as *mut u8, alloc_type: AllocType::Generic },
            TrackRecord { ptr: 3 as *mut u8, alloc_type: AllocType::Generic },
        ];
        queue.submit(batch);
        queue.wait_drained();
        std::thread::sleep(std::time::Duration::from_millis(20));

        unsafe {
            #[allow(static_mut_refs)]
            assert_eq!(ORDER, vec![3, 2, 1]);
        }
        queue.shutdown();
    }
}
