//! Lazily-allocated Bloom filter for probabilistic double-free detection on
//! the overflow (raw-heap) allocation path (SPEC_FULL.md §4.2).
//!
//! Pool-managed addresses are never inserted here — a pool's own
//! `in_use`/free-list accounting already makes a double-free on a pooled
//! slot detectable deterministically. This filter exists purely for
//! allocations large enough to bypass pools entirely.

use crate::sync::SpinMutex;
use std::sync::OnceLock;

const BITS: usize = 64 * 1024 * 8; // 64 KiB of bits
const NUM_HASHES: usize = 7;

struct Filter {
    bits: Vec<u64>,
}

impl Filter {
    fn new() -> Self {
        Self {
            bits: vec![0u64; BITS / 64],
        }
    }

    fn hashes(addr: usize) -> [usize; NUM_HASHES] {
        let mut out = [0usize; NUM_HASHES];
        for (i, slot) in out.iter_mut().enumerate() {
            // FNV-1a seeded differently per round via the round index mixed
            // into the offset basis, giving NUM_HASHES independent-enough
            // hash functions from one primitive.
            let mut hash: u64 = 0xcbf29ce484222325 ^ (i as u64).wrapping_mul(0x100000001b3);
            let bytes = addr.to_le_bytes();
            for &b in &bytes {
                hash ^= b as u64;
                hash = hash.wrapping_mul(0x100000001b3);
            }
            *slot = (hash as usize) % BITS;
        }
        out
    }

    fn mark(&mut self, addr: usize) {
        for bit in Self::hashes(addr) {
            self.bits[bit / 64] |= 1 << (bit % 64);
        }
    }

    fn probably_contains(&self, addr: usize) -> bool {
        Self::hashes(addr)
            .iter()
            .all(|&bit| self.bits[bit / 64] & (1 << (bit % 64)) != 0)
    }
}

static FILTER: OnceLock<SpinMutex<Filter>> = OnceLock::new();

/// Record `addr` as freed. Allocates the filter's backing bit array on
/// first use.
pub fn mark_freed(addr: usize) {
    FILTER
        .get_or_init(|| SpinMutex::new(Filter::new()))
        .lock()
        .mark(addr);
}

/// Check whether `addr` has probably been freed before. Never false
/// negative; may rarely false positive. Returns `false` if the filter has
/// never been allocated (nothing overflow-class has been freed yet).
pub fn probably_freed(addr: usize) -> bool {
    match FILTER.get() {
        Some(f) => f.lock().probably_contains(addr),
        None => false,
    }
}
