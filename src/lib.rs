//! samm: the scope-aware memory manager backing a compiled BASIC runtime.
//!
//! Provides a hybrid allocator (fixed-size slab pools over an overflow raw
//! heap), a per-thread stack of scope frames that track every allocation
//! made within a `BEGIN`/`END` block, a background worker that drains scopes
//! on exit, refcounted string descriptors, a small class/object runtime, and
//! a JIT "protection harness" for intercepting runtime aborts and timeouts.
//!
//! Compiled BASIC programs are expected to link against the `ffi` surface in
//! [`ffi`]; the rest of this crate is the Rust-native implementation behind
//! that surface.

pub mod addr_map;
pub mod alloc_type;
pub mod bloom;
pub mod class_runtime;
pub mod cleanup;
pub mod config;
#[cfg(feature = "ffi")]
pub mod ffi;
pub mod macros;
pub mod platform;
pub mod pool_registry;
pub mod protection;
pub mod samm;
pub mod scope;
pub mod size_class;
pub mod slab_pool;
#[cfg(feature = "stats")]
pub mod stats;
pub mod string_desc;
pub mod sync;

pub mod error;

/// Page size used for OS-backed slab growth (8 KiB).
pub const PAGE_SHIFT: usize = 13;
pub const PAGE_SIZE: usize = 1 << PAGE_SHIFT;

pub use alloc_type::AllocType;
pub use error::{BasicErrorCode, SammError};
pub use samm::Samm;
