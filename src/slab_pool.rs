//! A generic fixed-slot-size slab allocator with an intrusive free list.
//!
//! Generalizes the teacher crate's `span.rs` (bump-allocated metadata, OS
//! page backing) and `central_free_list.rs` (single-lock free-list discipline)
//! into the single pool contract SPEC_FULL.md §4.1 describes: no per-thread
//! cache tier, no central/page-heap split — SAMM's concurrency model is one
//! mutator thread plus one background worker, so a pool only ever needs one
//! lock.

use crate::addr_map::AddrMap;
use crate::platform;
use crate::sync::SpinMutex;
use crate::PAGE_SIZE;
use std::ptr;

/// Hard cap on the number of slabs a single pool will grow to before
/// `alloc` starts falling back to the raw heap.
pub const MAX_SLABS: usize = 1024;

/// An intrusive free-list node overlaid on the first machine word of a free
/// slot. Only valid while the slot is free; `alloc` overwrites it when
/// zeroing the slot before handing it to the caller.
#[repr(C)]
struct FreeNode {
    next: *mut FreeNode,
}

struct Slab {
    data: *mut u8,
    next: *mut Slab,
}

struct SlabPoolInner {
    slot_size: usize,
    slots_per_slab: usize,
    free_list: *mut FreeNode,
    slabs: *mut Slab,
    total_capacity: usize,
    in_use: usize,
    peak_use: usize,
    num_slabs: usize,
}

unsafe impl Send for SlabPoolInner {}

impl SlabPoolInner {
    const fn new(slot_size: usize, slots_per_slab: usize) -> Self {
        Self {
            slot_size,
            slots_per_slab,
            free_list: ptr::null_mut(),
            slabs: ptr::null_mut(),
            total_capacity: 0,
            in_use: 0,
            peak_use: 0,
            num_slabs: 0,
        }
    }

    /// Allocate one fresh slab from the OS and thread its slots onto the
    /// free list in reverse index order, so slot 0 becomes the list head
    /// (sequential allocations out of a fresh slab land at increasing
    /// addresses).
    fn grow(&mut self, addr_map: &AddrMap, pool_id: u8) -> bool {
        if self.num_slabs >= MAX_SLABS {
            return false;
        }
        let region_size = self.slot_size * self.slots_per_slab;
        let alloc_size = (region_size + PAGE_SIZE - 1) & !(PAGE_SIZE - 1);
        let region = unsafe { platform::page_alloc(alloc_size) };
        if region.is_null() {
            return false;
        }
        crate::stat_inc!(os_alloc_count);
        crate::stat_add!(os_alloc_bytes, alloc_size);

        // Slab metadata piggybacks on a small bump area at the front of a
        // dedicated metadata page rather than the main allocator, mirroring
        // the teacher's span-struct bootstrapping discipline.
        let meta = unsafe { platform::page_alloc(PAGE_SIZE) } as *mut Slab;
        if meta.is_null() {
            unsafe { platform::page_dealloc(region, alloc_size) };
            return false;
        }
        unsafe {
            (*meta).data = region;
            (*meta).next = self.slabs;
        }
        self.slabs = meta;
        self.num_slabs += 1;

        addr_map.register_range(region as usize, region_size, pool_id);

        for i in (0..self.slots_per_slab).rev() {
            let slot = unsafe { region.add(i * self.slot_size) } as *mut FreeNode;
            unsafe {
                (*slot).next = self.free_list;
            }
            self.free_list = slot;
        }
        self.total_capacity += self.slots_per_slab;
        true
    }

    fn alloc(&mut self, addr_map: &AddrMap, pool_id: u8) -> *mut u8 {
        if self.free_list.is_null() && !self.grow(addr_map, pool_id) {
            return ptr::null_mut();
        }
        let node = self.free_list;
        if node.is_null() {
            return ptr::null_mut();
        }
        self.free_list = unsafe { (*node).next };
        let slot = node as *mut u8;
        unsafe { ptr::write_bytes(slot, 0, self.slot_size) };
        self.in_use += 1;
        if self.in_use > self.peak_use {
            self.peak_use = self.in_use;
        }
        slot
    }

    /// # Safety
    /// `ptr` must be a slot previously returned by `alloc` on this pool and
    /// not currently free.
    unsafe fn free(&mut self, ptr: *mut u8) {
        let node = ptr as *mut FreeNode;
        unsafe {
            (*node).next = self.free_list;
        }
        self.free_list = node;
        self.in_use -= 1;
    }

    fn validate(&self) -> bool {
        let mut count = 0usize;
        let mut cur = self.free_list;
        while !cur.is_null() {
            count += 1;
            if count > self.total_capacity {
                return false; // cycle
            }
            cur = unsafe { (*cur).next };
        }
        count + self.in_use == self.total_capacity
    }
}

/// A slab pool for one fixed slot size, guarded by a single spinlock.
pub struct SlabPool {
    inner: SpinMutex<SlabPoolInner>,
    pool_id: u8,
}

impl SlabPool {
    pub const fn new(slot_size: usize, slots_per_slab: usize, pool_id: u8) -> Self {
        Self {
            inner: SpinMutex::new(SlabPoolInner::new(slot_size, slots_per_slab)),
            pool_id,
        }
    }

    /// Allocate one zeroed slot, or null if the pool is exhausted (caller
    /// falls back to the raw heap per SPEC_FULL.md §7).
    pub fn alloc(&self, addr_map: &AddrMap) -> *mut u8 {
        self.inner.lock().alloc(addr_map, self.pool_id)
    }

    /// # Safety
    /// `ptr` must have come from [`alloc`] on this pool and must not already
    /// be free.
    pub unsafe fn free(&self, ptr: *mut u8) {
        unsafe { self.inner.lock().free(ptr) };
    }

    pub fn validate(&self) -> bool {
        self.inner.lock().validate()
    }

    pub fn stats(&self) -> PoolStats {
        let g = self.inner.lock();
        PoolStats {
            slot_size: g.slot_size,
            total_capacity: g.total_capacity,
            in_use: g.in_use,
            peak_use: g.peak_use,
            num_slabs: g.num_slabs,
        }
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct PoolStats {
    pub slot_size: usize,
    pub total_capacity: usize,
    pub in_use: usize,
    pub peak_use: usize,
    pub num_slabs: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alloc_returns_zeroed_memory() {
        let map = AddrMap::new();
        let pool = SlabPool::new(64, 16, 1);
        let p = pool.alloc(&map);
        assert!(!p.is_null());
        unsafe {
            for i in 0..64 {
                assert_eq!(*p.add(i), 0);
            }
        }
        unsafe { pool.free(p) };
    }

    #[test]
    fn grows_across_multiple_slabs() {
        let map = AddrMap::new();
        let pool = SlabPool::new(32, 4, 2);
        let mut ptrs = Vec::new();
        for _ in 0..10 {
            let p = pool.alloc(&map);
            assert!(!p.is_null());
            ptrs.push(p);
        }
        let stats = pool.stats();
        assert_eq!(stats.num_slabs, 3); // ceil(10/4)
        assert_eq!(stats.in_use, 10);
        for p in ptrs {
            unsafe { pool.free(p) };
        }
        assert_eq!(pool.stats().in_use, 0);
    }

    #[test]
    fn pool_integrity_holds_after_alloc_free_cycles() {
        let map = AddrMap::new();
        let pool = SlabPool::new(128, 8, 3);
        let mut live = Vec::new();
        for round in 0..20 {
            let p = pool.alloc(&map);
            assert!(!p.is_null());
            live.push(p);
            if round % 3 == 0 {
                let p = live.pop().unwrap();
                unsafe { pool.free(p) };
            }
            assert!(pool.validate());
        }
        for p in live {
            unsafe { pool.free(p) };
        }
        assert!(pool.validate());
    }

    #[test]
    fn lifo_reuse_returns_most_recently_freed_slot() {
        let map = AddrMap::new();
        let pool = SlabPool::new(32, 8, 4);
        let a = pool.alloc(&map);
        let b = pool.alloc(&map);
        unsafe { pool.free(b) };
        let c = pool.alloc(&map);
        assert_eq!(b, c);
        unsafe {
            pool.free(a);
            pool.free(c);
        }
    }

    #[test]
    fn freed_addresses_stay_registered_in_addr_map() {
        let map = AddrMap::new();
        let pool = SlabPool::new(64, 4, 9);
        let p = pool.alloc(&map);
        let page = (p as usize) >> crate::PAGE_SHIFT;
        assert_eq!(map.get(page), 9);
        unsafe { pool.free(p) };
        // Still registered — freeing a slot does not unregister the slab.
        assert_eq!(map.get(page), 9);
    }
}
