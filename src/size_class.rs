//! Size classing for `samm_alloc_object`.
//!
//! Objects are bucketed into one of six fixed classes (32 to 1024 bytes);
//! anything larger bypasses slab pools entirely and goes to the raw heap
//! (SPEC_FULL.md §3, §4.5). This table is deliberately small and hardcoded —
//! unlike the teacher crate's externally tunable, build-time-generated
//! 46-class table, SAMM's classes are part of the compiler ABI and are never
//! meant to be retuned per deployment.

/// Object size classes, smallest to largest. Index into [`OBJECT_CLASSES`]
/// doubles as the pool-registry class id for object pools.
pub const OBJECT_CLASSES: [usize; 6] = [32, 64, 128, 256, 512, 1024];

/// Allocations larger than this go straight to the raw heap (overflow path),
/// bypassing slab pools and becoming eligible for Bloom-filter double-free
/// tracking.
pub const MAX_POOLED_OBJECT_SIZE: usize = 1024;

/// Map a requested object size to the smallest class index in
/// [`OBJECT_CLASSES`] that fits it, or `None` if it must go to the overflow
/// (raw heap) path.
#[inline]
pub fn object_class_for(size: usize) -> Option<usize> {
    if size == 0 {
        return Some(0);
    }
    if size > MAX_POOLED_OBJECT_SIZE {
        return None;
    }
    OBJECT_CLASSES.iter().position(|&c| c >= size)
}

/// The allocation size (bytes) actually handed out for a given class index.
#[inline]
pub fn class_size(class: usize) -> usize {
    OBJECT_CLASSES[class]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_sizes_map_to_themselves() {
        for (i, &sz) in OBJECT_CLASSES.iter().enumerate() {
            assert_eq!(object_class_for(sz), Some(i));
            assert_eq!(class_size(i), sz);
        }
    }

    #[test]
    fn rounds_up_to_next_class() {
        assert_eq!(object_class_for(1), Some(0));
        assert_eq!(object_class_for(33), Some(1));
        assert_eq!(object_class_for(129), Some(3));
    }

    #[test]
    fn oversized_falls_to_overflow() {
        assert_eq!(object_class_for(1025), None);
        assert_eq!(object_class_for(1_000_000), None);
    }

    #[test]
    fn classes_strictly_increasing() {
        for w in OBJECT_CLASSES.windows(2) {
            assert!(w[1] > w[0]);
        }
    }
}
