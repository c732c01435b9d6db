//! Scope lifecycle: enter/exit accounting, round-trip cleanup, and LIFO
//! destructor ordering across the real cleanup worker.

use samm::alloc_type::AllocType;
use samm::samm::Samm;
use samm::stats;
use std::time::Duration;

// `Samm::wait` only guarantees the channel is empty, not that the worker has
// finished acting on the batch it just dequeued (see `cleanup.rs`'s own
// `worker_drains_a_batch_in_lifo_order` test for the same workaround) — give
// it a moment to finish running callbacks/frees before asserting on their
// effects.
fn wait_and_settle(samm: &Samm) {
    samm.wait();
    std::thread::sleep(Duration::from_millis(20));
}

#[test]
fn scopes_entered_matches_exited_plus_current_depth() {
    let samm = Samm::init();
    let before = stats::snapshot();
    samm.enter_scope().unwrap();
    samm.enter_scope().unwrap();
    samm.enter_scope().unwrap();
    samm.exit_scope().unwrap();
    wait_and_settle(&samm);
    let after = stats::snapshot();
    let entered = after.scopes_entered - before.scopes_entered;
    let exited = after.scopes_exited - before.scopes_exited;
    assert_eq!(entered, exited + 2); // two scopes still open
    samm.exit_scope().unwrap();
    samm.exit_scope().unwrap();
    wait_and_settle(&samm);
}

#[test]
fn round_trip_cleanup_returns_pool_to_baseline() {
    let samm = Samm::init();
    let baseline = samm.registry().stats().objects[0].in_use; // 32-byte class

    samm.enter_scope().unwrap();
    for _ in 0..10 {
        let p = samm.alloc_object(32);
        samm.track_object(p);
    }
    assert_eq!(samm.registry().stats().objects[0].in_use, baseline + 10);

    samm.exit_scope().unwrap();
    wait_and_settle(&samm);

    assert_eq!(samm.registry().stats().objects[0].in_use, baseline);
}

#[test]
fn cleanup_runs_destructors_in_lifo_order() {
    static ORDER: std::sync::Mutex<Vec<usize>> = std::sync::Mutex::new(Vec::new());

    extern "C" fn record(ptr: *mut u8) {
        ORDER.lock().unwrap().push(ptr as usize);
    }

    let samm = Samm::init();
    samm.register_cleanup(AllocType::Generic, record);

    samm.enter_scope().unwrap();
    // Bogus (non-pool) addresses: fine here since `Generic` records skip the
    // registry's `free_object` entirely and are left solely to the callback.
    let a = 1usize as *mut u8;
    let b = 2usize as *mut u8;
    let c = 3usize as *mut u8;
    samm.track(a, AllocType::Generic);
    samm.track(b, AllocType::Generic);
    samm.track(c, AllocType::Generic);
    samm.exit_scope().unwrap();
    wait_and_settle(&samm);

    let order = ORDER.lock().unwrap();
    assert_eq!(*order, vec![3, 2, 1]); // tracked a,b,c -> cleaned LIFO: c,b,a
}
