//! Pool-level invariants: `in_use + free_list == total_capacity`, zeroed
//! allocations, and multi-slab growth.

use samm::addr_map::AddrMap;
use samm::pool_registry::PoolRegistry;
use samm::slab_pool::SlabPool;

#[test]
fn pool_grows_across_slabs_on_overflow() {
    // 257 allocations from a pool with 256 slots/slab must span two slabs.
    let map = AddrMap::new();
    let pool = SlabPool::new(32, 256, 50);
    let mut ptrs = Vec::new();
    for _ in 0..257 {
        let p = pool.alloc(&map);
        assert!(!p.is_null());
        ptrs.push(p);
    }
    let stats = pool.stats();
    assert_eq!(stats.num_slabs, 2);
    assert_eq!(stats.in_use, 257);
    assert_eq!(stats.total_capacity, 512);
    for p in ptrs {
        unsafe { pool.free(p) };
    }
}

#[test]
fn pool_integrity_holds_through_alloc_free_churn() {
    let map = AddrMap::new();
    let pool = SlabPool::new(64, 32, 51);
    let mut live = Vec::new();
    for round in 0..500 {
        let p = pool.alloc(&map);
        live.push(p);
        if round % 2 == 0 {
            let p = live.pop().unwrap();
            unsafe { pool.free(p) };
        }
        assert!(pool.validate(), "free list diverged from total_capacity accounting");
    }
    for p in live {
        unsafe { pool.free(p) };
    }
    assert!(pool.validate());
    assert_eq!(pool.stats().in_use, 0);
}

#[test]
fn allocations_are_always_zeroed() {
    let registry = PoolRegistry::new();
    for size in [16usize, 100, 300, 600, 1000] {
        let (p, _class) = registry.alloc_object(size);
        assert!(!p.is_null());
        unsafe {
            for i in 0..size {
                assert_eq!(*p.add(i), 0, "byte {i} of a fresh {size}-byte allocation was not zeroed");
            }
        }
        unsafe { registry.free_object(p, None) };
    }
}

#[test]
fn every_object_size_class_routes_through_its_own_pool() {
    let registry = PoolRegistry::new();
    let before = registry.stats();
    let (p, class) = registry.alloc_object(200);
    assert_eq!(class, Some(3)); // rounds up to the 256-byte class
    let after = registry.stats();
    assert_eq!(after.objects[3].in_use, before.objects[3].in_use + 1);
    unsafe { registry.free_object(p, None) };
}
