//! 3-level radix tree mapping a page id to the id of the pool that owns it.
//!
//! `samm_free_object`/`str_release`/list cleanup receive only a bare pointer
//! — no size or class — so each slab registers its backing address range
//! against its owning pool's class id here, letting free-time code recover
//! "which pool does this pointer belong to" in O(1). Structurally this is
//! the teacher crate's `pagemap.rs` radix tree verbatim; only the leaf
//! payload changed, from `*mut Span` to a one-byte pool/class id (0 means
//! "no pool registered here", since overflow allocations are never
//! registered and are instead identified by their tracking-record alloc
//! type).
//!
//! Reads are lock-free (`Acquire` loads). Writes must happen under external
//! synchronization — in practice, each pool's own lock, since a pool only
//! ever registers addresses inside slabs it allocated itself.

use crate::platform;
use crate::PAGE_SIZE;
use std::sync::atomic::{AtomicU8, Ordering};

const ROOT_BITS: usize = 12;
const MID_BITS: usize = 12;
const LEAF_BITS: usize = 11;

const ROOT_LEN: usize = 1 << ROOT_BITS;
const MID_LEN: usize = 1 << MID_BITS;
const LEAF_LEN: usize = 1 << LEAF_BITS;

const MID_SHIFT: usize = LEAF_BITS;
const ROOT_SHIFT: usize = LEAF_BITS + MID_BITS;

const MID_MASK: usize = (1 << MID_BITS) - 1;
const LEAF_MASK: usize = (1 << LEAF_BITS) - 1;

/// Sentinel meaning "no pool is registered for this page".
pub const NO_POOL: u8 = 0;

struct MidNode {
    children: [std::sync::atomic::AtomicPtr<LeafNode>; MID_LEN],
}

struct LeafNode {
    ids: [AtomicU8; LEAF_LEN],
}

pub struct AddrMap {
    root: [std::sync::atomic::AtomicPtr<MidNode>; ROOT_LEN],
}

unsafe impl Send for AddrMap {}
unsafe impl Sync for AddrMap {}

macro_rules! null_atomic_ptr_array {
    ($len:expr, $T:ty) => {{
        // SAFETY: a null AtomicPtr has the same bit pattern as a zeroed usize.
        unsafe {
            core::mem::transmute::<[usize; $len], [std::sync::atomic::AtomicPtr<$T>; $len]>(
                [0usize; $len],
            )
        }
    }};
}

impl AddrMap {
    pub const fn new() -> Self {
        Self {
            root: null_atomic_ptr_array!(ROOT_LEN, MidNode),
        }
    }

    fn indices(page_id: usize) -> (usize, usize, usize) {
        (
            page_id >> ROOT_SHIFT,
            (page_id >> MID_SHIFT) & MID_MASK,
            page_id & LEAF_MASK,
        )
    }

    /// Look up the pool/class id registered for `page_id`, or [`NO_POOL`].
    #[inline]
    pub fn get(&self, page_id: usize) -> u8 {
        let (root_idx, mid_idx, leaf_idx) = Self::indices(page_id);
        if root_idx >= ROOT_LEN {
            return NO_POOL;
        }
        let mid = self.root[root_idx].load(Ordering::Acquire);
        if mid.is_null() {
            return NO_POOL;
        }
        let leaf = unsafe { (*mid).children[mid_idx].load(Ordering::Acquire) };
        if leaf.is_null() {
            return NO_POOL;
        }
        unsafe { (*leaf).ids[leaf_idx].load(Ordering::Acquire) }
    }

    /// Register `page_id` as owned by `pool_id`. Must be externally
    /// synchronized (by the owning pool's lock).
    pub fn set(&self, page_id: usize, pool_id: u8) {
        let (root_idx, mid_idx, leaf_idx) = Self::indices(page_id);
        assert!(root_idx < ROOT_LEN, "page_id out of range for addr map");

        let mut mid = self.root[root_idx].load(Ordering::Acquire);
        if mid.is_null() {
            mid = Self::alloc_mid_node();
            self.root[root_idx].store(mid, Ordering::Release);
        }

        let mut leaf = unsafe { (*mid).children[mid_idx].load(Ordering::Acquire) };
        if leaf.is_null() {
            leaf = Self::alloc_leaf_node();
            unsafe { (*mid).children[mid_idx].store(leaf, Ordering::Release) };
        }

        unsafe { (*leaf).ids[leaf_idx].store(pool_id, Ordering::Release) };
    }

    /// Register every page covered by `[start_addr, start_addr+len)` as
    /// owned by `pool_id`.
    pub fn register_range(&self, start_addr: usize, len: usize, pool_id: u8) {
        let start_page = start_addr >> crate::PAGE_SHIFT;
        let end_page = (start_addr + len + PAGE_SIZE - 1) >> crate::PAGE_SHIFT;
        for page in start_page..end_page.max(start_page + 1) {
            self.set(page, pool_id);
        }
    }

    fn alloc_mid_node() -> *mut MidNode {
        let size = core::mem::size_of::<MidNode>();
        let alloc_size = (size + PAGE_SIZE - 1) & !(PAGE_SIZE - 1);
        let ptr = unsafe { platform::page_alloc(alloc_size) };
        ptr.cast::<MidNode>()
    }

    fn alloc_leaf_node() -> *mut LeafNode {
        let size = core::mem::size_of::<LeafNode>();
        let alloc_size = (size + PAGE_SIZE - 1) & !(PAGE_SIZE - 1);
        let ptr = unsafe { platform::page_alloc(alloc_size) };
        ptr.cast::<LeafNode>()
    }
}

impl Default for AddrMap {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_map_returns_no_pool() {
        let map = AddrMap::new();
        assert_eq!(map.get(0), NO_POOL);
        assert_eq!(map.get(123_456), NO_POOL);
    }

    #[test]
    fn set_then_get_roundtrips() {
        let map = AddrMap::new();
        map.set(42, 7);
        assert_eq!(map.get(42), 7);
        assert_eq!(map.get(41), NO_POOL);
        assert_eq!(map.get(43), NO_POOL);
    }

    #[test]
    fn register_range_covers_all_pages() {
        let map = AddrMap::new();
        let start = 100 * PAGE_SIZE;
        map.register_range(start, PAGE_SIZE * 5, 3);
        for p in 100..105 {
            assert_eq!(map.get(p), 3);
        }
        assert_eq!(map.get(99), NO_POOL);
        assert_eq!(map.get(105), NO_POOL);
    }

    #[test]
    fn high_address_exercises_all_three_levels() {
        let map = AddrMap::new();
        let page_id = (1 << 20) + (1 << 15) + 42;
        map.set(page_id, 5);
        assert_eq!(map.get(page_id), 5);
        assert_eq!(map.get(page_id - 1), NO_POOL);
    }
}
