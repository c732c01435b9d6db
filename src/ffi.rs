//! C-ABI exports consumed by compiler-emitted BASIC code (SPEC_FULL.md §6).
//!
//! Gated behind `features = ["ffi"]`. Every export here is a thin,
//! panic-free wrapper around the Rust-native modules: fallible internal
//! operations are converted to either a raw sentinel or a `FATAL:`
//! diagnostic plus `runtime_exit(1)` at this boundary, never a `Result`
//! crossing into compiled code (SPEC_FULL.md §10.1).
//!
//! The process-wide [`Samm`] instance is a lazily-initialized singleton,
//! the same shape the teacher crate used for its global allocator statics —
//! here `samm_init` is still the documented entry point, but any export
//! that runs before it (or after a crash skipped it) brings the singleton
//! up on first touch rather than dereferencing an uninitialized global.

use crate::alloc_type::AllocType;
use crate::cleanup::CleanupFn;
use crate::samm::Samm;
use crate::string_desc::StringDescriptor;
use std::ffi::{c_char, c_void, CStr};
use std::sync::OnceLock;

static SAMM: OnceLock<Samm> = OnceLock::new();

fn samm() -> &'static Samm {
    SAMM.get_or_init(Samm::init)
}

unsafe fn c_str_to_str<'a>(s: *const c_char) -> &'a str {
    if s.is_null() {
        return "";
    }
    unsafe { CStr::from_ptr(s).to_str().unwrap_or("") }
}

/// Print a `FATAL:` diagnostic and unwind out of the innermost protection
/// slot (or exit the process if none is active), matching the internal-
/// invariant propagation rule in SPEC_FULL.md §7.
fn fatal(msg: &str) -> ! {
    log::error!("FATAL: {msg}");
    eprintln!("FATAL: {msg}");
    crate::protection::runtime_exit(1);
}

// ---- Lifecycle ----

#[unsafe(no_mangle)]
pub extern "C" fn samm_init() {
    samm();
}

#[unsafe(no_mangle)]
pub extern "C" fn samm_shutdown() {
    samm().shutdown();
}

#[unsafe(no_mangle)]
pub extern "C" fn samm_set_enabled(on: i32) {
    samm().set_enabled(on != 0);
}

#[unsafe(no_mangle)]
pub extern "C" fn samm_is_enabled() -> i32 {
    samm().is_enabled() as i32
}

#[unsafe(no_mangle)]
pub extern "C" fn samm_wait() {
    samm().wait();
}

#[unsafe(no_mangle)]
pub extern "C" fn samm_set_trace(on: i32) {
    samm().set_trace(on != 0);
}

// ---- Scope ----

#[unsafe(no_mangle)]
pub extern "C" fn samm_enter_scope() {
    if let Err(e) = samm().enter_scope() {
        fatal(&e.to_string());
    }
}

#[unsafe(no_mangle)]
pub extern "C" fn samm_exit_scope() {
    if let Err(e) = samm().exit_scope() {
        fatal(&e.to_string());
    }
}

#[unsafe(no_mangle)]
pub extern "C" fn samm_scope_depth() -> usize {
    crate::scope::depth()
}

// ---- Allocation ----

#[unsafe(no_mangle)]
pub extern "C" fn samm_alloc_object(size: usize) -> *mut u8 {
    samm().alloc_object(size)
}

#[unsafe(no_mangle)]
pub extern "C" fn samm_alloc_string() -> *mut u8 {
    samm().alloc_string_slot()
}

#[unsafe(no_mangle)]
pub extern "C" fn samm_alloc_list() -> *mut u8 {
    samm().alloc_list_header()
}

#[unsafe(no_mangle)]
pub extern "C" fn samm_alloc_list_atom() -> *mut u8 {
    samm().alloc_list_atom()
}

/// # Safety
/// `ptr` must be a live allocation from `samm_alloc_*`, not already freed.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn samm_free_object(ptr: *mut u8) {
    unsafe { samm().free_object(ptr) };
}

// ---- Tracking ----

#[unsafe(no_mangle)]
pub extern "C" fn samm_track(ptr: *mut u8, alloc_type: u8) {
    samm().track(ptr, AllocType::from_u8(alloc_type));
}

#[unsafe(no_mangle)]
pub extern "C" fn samm_track_object(ptr: *mut u8) {
    samm().track_object(ptr);
}

#[unsafe(no_mangle)]
pub extern "C" fn samm_track_string(ptr: *mut u8) {
    samm().track_string(ptr);
}

#[unsafe(no_mangle)]
pub extern "C" fn samm_track_list(ptr: *mut u8) {
    samm().track_list(ptr);
}

#[unsafe(no_mangle)]
pub extern "C" fn samm_untrack(ptr: *mut u8) {
    samm().untrack(ptr);
}

// ---- Retention ----

#[unsafe(no_mangle)]
pub extern "C" fn samm_retain(ptr: *mut u8, k: usize) {
    if let Err(e) = samm().retain(ptr, k) {
        fatal(&e.to_string());
    }
}

#[unsafe(no_mangle)]
pub extern "C" fn samm_retain_parent(ptr: *mut u8) {
    if let Err(e) = samm().retain_parent(ptr) {
        fatal(&e.to_string());
    }
}

// ---- Diagnostics ----

/// Mirrors [`crate::stats::Snapshot`] field-for-field for the C ABI.
#[repr(C)]
pub struct SammStatsFfi {
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

impl From<crate::stats::Snapshot> for SammStatsFfi {
    fn from(s: crate::stats::Snapshot) -> Self {
        Self {
            pool_hits: s.pool_hits,
            overflow_allocs: s.overflow_allocs,
            alloc_bytes: s.alloc_bytes,
            objects_tracked: s.objects_tracked,
            objects_untracked: s.objects_untracked,
            scopes_entered: s.scopes_entered,
            scopes_exited: s.scopes_exited,
            batches_submitted: s.batches_submitted,
            batches_processed: s.batches_processed,
            records_cleaned: s.records_cleaned,
            os_alloc_count: s.os_alloc_count,
            os_alloc_bytes: s.os_alloc_bytes,
            double_free_flagged: s.double_free_flagged,
            bytes_freed_external: s.bytes_freed_external,
        }
    }
}

/// # Safety
/// `out` must point to a valid, writable `SammStatsFfi`.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn samm_get_stats(out: *mut SammStatsFfi) {
    if out.is_null() {
        return;
    }
    unsafe { *out = samm().get_stats().into() };
}

#[unsafe(no_mangle)]
pub extern "C" fn samm_print_stats() {
    samm().print_stats();
}

#[unsafe(no_mangle)]
pub extern "C" fn samm_record_bytes_freed(bytes: u64) {
    samm().record_bytes_freed(bytes);
}

#[unsafe(no_mangle)]
pub extern "C" fn samm_is_probably_freed(ptr: *const u8) -> i32 {
    samm().is_probably_freed(ptr) as i32
}

// ---- Cleanup registration ----

#[unsafe(no_mangle)]
pub extern "C" fn samm_register_cleanup(alloc_type: u8, f: CleanupFn) {
    samm().register_cleanup(AllocType::from_u8(alloc_type), f);
}

// ---- Standalone slab pool (direct use outside the registry, e.g. the JIT
// host's own fixed-size arenas) ----

/// A `SlabPool` paired with its own address map, since `SlabPool::alloc`
/// needs somewhere to register freshly grown ranges and a standalone pool
/// isn't part of the registry's shared [`crate::addr_map::AddrMap`].
pub struct SammSlabPool {
    pool: crate::slab_pool::SlabPool,
    addr_map: crate::addr_map::AddrMap,
}

#[unsafe(no_mangle)]
pub extern "C" fn samm_slab_pool_init(slot_size: usize, slots_per_slab: usize) -> *mut SammSlabPool {
    Box::into_raw(Box::new(SammSlabPool {
        pool: crate::slab_pool::SlabPool::new(slot_size, slots_per_slab, 0),
        addr_map: crate::addr_map::AddrMap::new(),
    }))
}

/// # Safety
/// `pool` must be a live pointer from `samm_slab_pool_init`, not already
/// destroyed.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn samm_slab_pool_destroy(pool: *mut SammSlabPool) {
    if !pool.is_null() {
        drop(unsafe { Box::from_raw(pool) });
    }
}

/// # Safety
/// `pool` must be a live pointer from `samm_slab_pool_init`.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn samm_slab_pool_alloc(pool: *mut SammSlabPool) -> *mut u8 {
    let pool = unsafe { &*pool };
    pool.pool.alloc(&pool.addr_map)
}

/// # Safety
/// `pool` must be a live pointer from `samm_slab_pool_init`; `ptr` must be a
/// live allocation from that pool, not already freed.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn samm_slab_pool_free(pool: *mut SammSlabPool, ptr: *mut u8) {
    let pool = unsafe { &*pool };
    unsafe { pool.pool.free(ptr) };
}

/// # Safety
/// `pool` must be a live pointer from `samm_slab_pool_init`.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn samm_slab_pool_validate(pool: *mut SammSlabPool) -> i32 {
    let pool = unsafe { &*pool };
    pool.pool.validate() as i32
}

/// # Safety
/// `pool` must be a live pointer from `samm_slab_pool_init`.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn samm_slab_pool_check_leaks(pool: *mut SammSlabPool) -> i32 {
    let pool = unsafe { &*pool };
    (pool.pool.stats().in_use == 0) as i32
}

/// # Safety
/// `pool` must be a live pointer from `samm_slab_pool_init`.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn samm_slab_pool_total_allocs(pool: *mut SammSlabPool) -> usize {
    let pool = unsafe { &*pool };
    pool.pool.stats().total_capacity
}

/// # Safety
/// `pool` must be a live pointer from `samm_slab_pool_init`.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn samm_slab_pool_usage_percent(pool: *mut SammSlabPool) -> f64 {
    let pool = unsafe { &*pool };
    let s = pool.pool.stats();
    if s.total_capacity == 0 {
        0.0
    } else {
        (s.in_use as f64 / s.total_capacity as f64) * 100.0
    }
}

/// # Safety
/// `pool` must be a live pointer from `samm_slab_pool_init`.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn samm_slab_pool_print_stats(pool: *mut SammSlabPool) {
    let pool = unsafe { &*pool };
    let s = pool.pool.stats();
    eprintln!(
        "slab pool: slot_size={} total_capacity={} in_use={} peak_use={} num_slabs={}",
        s.slot_size, s.total_capacity, s.in_use, s.peak_use, s.num_slabs
    );
}

// ---- Class runtime ----

/// # Safety
/// `vtable` must point to a statically emitted, valid vtable; `size` must be
/// at least 16.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn class_object_new(size: usize, vtable: *const u8, class_id: i64) -> *mut u8 {
    unsafe { crate::class_runtime::object_new(samm(), size, vtable, class_id) }
}

/// # Safety
/// `var` must point to a valid `*mut u8` slot (possibly null).
#[unsafe(no_mangle)]
pub unsafe extern "C" fn class_object_delete(var: *mut *mut u8) {
    unsafe { crate::class_runtime::object_delete(samm(), var) };
}

/// # Safety
/// If non-null, `obj` must point to a live object with a valid vtable chain.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn class_is_instance(obj: *const u8, target_class_id: i64) -> i32 {
    unsafe { crate::class_runtime::is_instance(obj, target_class_id) as i32 }
}

/// Reports a method call on a NOTHING reference and exits with code 1; never
/// returns (SPEC_FULL.md §4.7).
///
/// # Safety
/// `location` and `method` must be valid, NUL-terminated C strings.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn class_null_method_error(location: *const c_char, method: *const c_char) -> ! {
    let location = unsafe { c_str_to_str(location) };
    let method = unsafe { c_str_to_str(method) };
    fatal(&crate::class_runtime::null_method_error(location, method));
}

/// Reports a field access on a NOTHING reference and exits with code 1;
/// never returns (SPEC_FULL.md §4.7).
///
/// # Safety
/// `location` and `field` must be valid, NUL-terminated C strings.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn class_null_field_error(location: *const c_char, field: *const c_char) -> ! {
    let location = unsafe { c_str_to_str(location) };
    let field = unsafe { c_str_to_str(field) };
    fatal(&crate::class_runtime::null_field_error(location, field));
}

// ---- String intrinsics (ASCII descriptors) ----

fn track_and_return(desc: *mut StringDescriptor) -> *mut StringDescriptor {
    samm().track_string(desc as *mut u8);
    desc
}

/// # Safety
/// `s` must be a valid, NUL-terminated C string.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn str_new(s: *const c_char) -> *mut StringDescriptor {
    let s = unsafe { c_str_to_str(s) };
    track_and_return(crate::string_desc::new_ascii(s))
}

/// # Safety
/// `desc` must be a live descriptor (or null, a no-op).
#[unsafe(no_mangle)]
pub unsafe extern "C" fn str_release(desc: *mut StringDescriptor) {
    if desc.is_null() {
        return;
    }
    samm().untrack(desc as *mut u8);
    unsafe { crate::string_desc::release(desc) };
}

/// # Safety
/// `desc` must be a live descriptor.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn str_retain(desc: *mut StringDescriptor) {
    if !desc.is_null() {
        unsafe { crate::string_desc::retain(desc) };
    }
}

/// # Safety
/// `a` and `b` must be live descriptors.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn str_concat(a: *mut StringDescriptor, b: *mut StringDescriptor) -> *mut StringDescriptor {
    let (sa, sb) = unsafe { (StringDescriptor::as_str(a), StringDescriptor::as_str(b)) };
    let out = crate::string_desc::concat(sa, sb);
    track_and_return(crate::string_desc::new_ascii(&out))
}

/// `MID$(s, start, len)`.
///
/// # Safety
/// `s` must be a live descriptor.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn str_substr(s: *mut StringDescriptor, start: i64, len: i64) -> *mut StringDescriptor {
    let s = unsafe { StringDescriptor::as_str(s) };
    let out = crate::string_desc::mid(s, start.max(0) as usize, len.max(0) as usize);
    track_and_return(crate::string_desc::new_ascii(&out))
}

/// # Safety
/// `s` must be a live descriptor.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn str_left(s: *mut StringDescriptor, n: i64) -> *mut StringDescriptor {
    let s = unsafe { StringDescriptor::as_str(s) };
    let out = crate::string_desc::left(s, n.max(0) as usize);
    track_and_return(crate::string_desc::new_ascii(&out))
}

/// # Safety
/// `s` must be a live descriptor.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn str_right(s: *mut StringDescriptor, n: i64) -> *mut StringDescriptor {
    let s = unsafe { StringDescriptor::as_str(s) };
    let out = crate::string_desc::right(s, n.max(0) as usize);
    track_and_return(crate::string_desc::new_ascii(&out))
}

/// # Safety
/// `s` must be a live descriptor.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn str_upper(s: *mut StringDescriptor) -> *mut StringDescriptor {
    let s = unsafe { StringDescriptor::as_str(s) };
    let out = crate::string_desc::upper(s);
    track_and_return(crate::string_desc::new_ascii(&out))
}

/// # Safety
/// `s` must be a live descriptor.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn str_lower(s: *mut StringDescriptor) -> *mut StringDescriptor {
    let s = unsafe { StringDescriptor::as_str(s) };
    let out = crate::string_desc::lower(s);
    track_and_return(crate::string_desc::new_ascii(&out))
}

/// # Safety
/// `s` must be a live descriptor.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn str_trim(s: *mut StringDescriptor) -> *mut StringDescriptor {
    let s = unsafe { StringDescriptor::as_str(s) };
    let out = crate::string_desc::trim(s);
    track_and_return(crate::string_desc::new_ascii(&out))
}

/// # Safety
/// `s` and `needle` must be live descriptors.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn str_instr(s: *mut StringDescriptor, needle: *mut StringDescriptor) -> i64 {
    let (s, needle) = unsafe { (StringDescriptor::as_str(s), StringDescriptor::as_str(needle)) };
    crate::string_desc::instr(s, needle) as i64
}

/// # Safety
/// `s`, `from`, `to` must be live descriptors.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn str_replace(
    s: *mut StringDescriptor,
    from: *mut StringDescriptor,
    to: *mut StringDescriptor,
) -> *mut StringDescriptor {
    let (s, from, to) = unsafe {
        (StringDescriptor::as_str(s), StringDescriptor::as_str(from), StringDescriptor::as_str(to))
    };
    let out = crate::string_desc::replace(s, from, to);
    track_and_return(crate::string_desc::new_ascii(&out))
}

/// # Safety
/// `a` and `b` must be live descriptors.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn str_compare(a: *mut StringDescriptor, b: *mut StringDescriptor) -> i32 {
    match unsafe { crate::string_desc::compare(a, b) } {
        std::cmp::Ordering::Less => -1,
        std::cmp::Ordering::Equal => 0,
        std::cmp::Ordering::Greater => 1,
    }
}

// ---- String intrinsics (UTF-32 descriptors, `string_` prefix) ----

/// # Safety
/// `s` must be a valid, NUL-terminated C string.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn string_new(s: *const c_char) -> *mut StringDescriptor {
    let s = unsafe { c_str_to_str(s) };
    track_and_return(crate::string_desc::new_utf32(s))
}

/// # Safety
/// `desc` must be a live descriptor (or null, a no-op).
#[unsafe(no_mangle)]
pub unsafe extern "C" fn string_release(desc: *mut StringDescriptor) {
    unsafe { str_release(desc) };
}

/// # Safety
/// `desc` must be a live descriptor.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn string_retain(desc: *mut StringDescriptor) {
    unsafe { str_retain(desc) };
}

/// # Safety
/// `a` and `b` must be live descriptors.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn string_concat(a: *mut StringDescriptor, b: *mut StringDescriptor) -> *mut StringDescriptor {
    let (sa, sb) = unsafe { (StringDescriptor::as_str(a), StringDescriptor::as_str(b)) };
    let out = crate::string_desc::concat(sa, sb);
    track_and_return(crate::string_desc::new_utf32(&out))
}

/// # Safety
/// `s` must be a live descriptor.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn string_substr(s: *mut StringDescriptor, start: i64, len: i64) -> *mut StringDescriptor {
    let s = unsafe { StringDescriptor::as_str(s) };
    let out = crate::string_desc::mid(s, start.max(0) as usize, len.max(0) as usize);
    track_and_return(crate::string_desc::new_utf32(&out))
}

/// # Safety
/// `s` must be a live descriptor.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn string_upper(s: *mut StringDescriptor) -> *mut StringDescriptor {
    let s = unsafe { StringDescriptor::as_str(s) };
    let out = crate::string_desc::upper(s);
    track_and_return(crate::string_desc::new_utf32(&out))
}

/// # Safety
/// `s` must be a live descriptor.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn string_lower(s: *mut StringDescriptor) -> *mut StringDescriptor {
    let s = unsafe { StringDescriptor::as_str(s) };
    let out = crate::string_desc::lower(s);
    track_and_return(crate::string_desc::new_utf32(&out))
}

/// # Safety
/// `a` and `b` must be live descriptors.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn string_compare(a: *mut StringDescriptor, b: *mut StringDescriptor) -> i32 {
    unsafe { str_compare(a, b) }
}

// ---- Protection harness ----

/// Signature expected by `protected_call`/`basic_jit_call`: a JIT-compiled
/// function taking an opaque context and returning an i64 result.
pub type BasicJitFn = extern "C" fn(*mut c_void) -> i64;

/// Signature expected by `protected_exec`: a JIT-compiled `main`.
pub type BasicMainFn = extern "C" fn(i32, *const *const c_char) -> i32;

/// Runs `f(ctx)` under the protection harness. Returns `f`'s value on normal
/// completion, or `-(exit_code + 1)` if `f` triggered `runtime_exit`,
/// `SIGABRT`, or `SIGALRM` (SPEC_FULL.md §4.8).
///
/// # Safety
/// `f` must be safe to call with `ctx`.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn protected_call(f: BasicJitFn, ctx: *mut c_void) -> i64 {
    match crate::protection::protected_call(|| f(ctx)) {
        Ok(v) => v,
        Err((_, code)) => -(code as i64 + 1),
    }
}

/// Alias for [`protected_call`], matching the JIT host's own naming.
///
/// # Safety
/// Same as [`protected_call`].
#[unsafe(no_mangle)]
pub unsafe extern "C" fn basic_jit_call(f: BasicJitFn, ctx: *mut c_void) -> i64 {
    unsafe { protected_call(f, ctx) }
}

/// Runs JIT `main(argc, argv)` under the protection harness, performing an
/// orderly `samm_shutdown` or timeout `samm_force_abandon` on a jump
/// (SPEC_FULL.md §4.8).
///
/// # Safety
/// `f` must be safe to call with `(argc, argv)`.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn protected_exec(f: BasicMainFn, argc: i32, argv: *const *const c_char) -> i32 {
    crate::protection::protected_exec(|| f(argc, argv), samm())
}

#[unsafe(no_mangle)]
pub extern "C" fn set_timeout(seconds: u32) {
    crate::protection::set_timeout(seconds);
}

#[unsafe(no_mangle)]
pub extern "C" fn arm_signals() {
    crate::protection::arm_signals();
}

#[unsafe(no_mangle)]
pub extern "C" fn disarm_signals() {
    crate::protection::disarm_signals();
}

#[unsafe(no_mangle)]
pub extern "C" fn suppress_stdout() {
    crate::protection::suppress_stdout();
}

#[unsafe(no_mangle)]
pub extern "C" fn restore_stdout() {
    crate::protection::restore_stdout();
}

// ---- Exception handling (TRY/CATCH) ----

/// `TRY`-block signature for `basic_try`: a JIT-compiled function running
/// the protected region, returning its opaque i64 result.
pub type BasicTryFn = extern "C" fn(*mut c_void) -> i64;

/// `CATCH`-block signature: receives the thrown error code alongside the
/// same context pointer, returns the block's opaque i64 result.
pub type BasicCatchFn = extern "C" fn(i32, *mut c_void) -> i64;

/// Runs `try_fn(ctx)` as a `TRY` block. If it throws, every scope it opened
/// is drained and `catch_fn(code, ctx)` runs instead, its result returned in
/// place of `try_fn`'s (SPEC_FULL.md §7, §11).
///
/// # Safety
/// `try_fn` and `catch_fn` must be safe to call with `ctx`.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn basic_try(try_fn: BasicTryFn, catch_fn: BasicCatchFn, ctx: *mut c_void) -> i64 {
    match crate::error::try_catch(samm(), || try_fn(ctx)) {
        Ok(v) => v,
        Err(code) => catch_fn(code, ctx),
    }
}

/// Sets `ERR`/`ERL` and unwinds to the innermost active `basic_try` handler.
/// With no handler active this is definitionally unhandled: reports the
/// taxonomy diagnostic and exits. Never returns.
#[unsafe(no_mangle)]
pub extern "C" fn basic_throw(code: i32, line: i32) -> ! {
    crate::error::throw(code, line);
    fatal(&crate::error::unhandled_message(code, line));
}

/// Re-raises the last thrown error to the next outer `basic_try` handler.
/// With none left this degrades to the unhandled path, same as
/// [`basic_throw`]. Never returns.
#[unsafe(no_mangle)]
pub extern "C" fn basic_rethrow() -> ! {
    crate::error::rethrow();
    fatal(&crate::error::unhandled_message(crate::error::err(), crate::error::erl()));
}

#[unsafe(no_mangle)]
pub extern "C" fn basic_err() -> i32 {
    crate::error::err()
}

#[unsafe(no_mangle)]
pub extern "C" fn basic_erl() -> i32 {
    crate::error::erl()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alloc_and_free_object_roundtrip() {
        let p = samm_alloc_object(64);
        assert!(!p.is_null());
        unsafe { samm_free_object(p) };
    }

    #[test]
    fn scope_enter_exit_and_depth() {
        let before = samm_scope_depth();
        samm_enter_scope();
        assert_eq!(samm_scope_depth(), before + 1);
        samm_exit_scope();
        assert_eq!(samm_scope_depth(), before);
    }

    #[test]
    fn str_new_release_roundtrip() {
        let c = std::ffi::CString::new("hello").unwrap();
        unsafe {
            let desc = str_new(c.as_ptr());
            assert!(!desc.is_null());
            assert_eq!(StringDescriptor::as_str(desc), "hello");
            str_release(desc);
        }
    }

    #[test]
    fn str_instr_and_compare() {
        let a = std::ffi::CString::new("hello").unwrap();
        let b = std::ffi::CString::new("ll").unwrap();
        unsafe {
            let da = str_new(a.as_ptr());
            let db = str_new(b.as_ptr());
            assert_eq!(str_instr(da, db), 3);
            str_release(da);
            str_release(db);
        }
    }

    #[test]
    fn protected_call_reports_normal_completion() {
        extern "C" fn ok(_ctx: *mut c_void) -> i64 {
            7
        }
        let r = unsafe { protected_call(ok, std::ptr::null_mut()) };
        assert_eq!(r, 7);
    }

    #[test]
    fn class_is_instance_on_null_is_false() {
        assert_eq!(unsafe { class_is_instance(std::ptr::null(), 1) }, 0);
    }

    #[test]
    fn basic_try_runs_catch_fn_on_a_throw() {
        extern "C" fn try_fn(_ctx: *mut c_void) -> i64 {
            basic_throw(11, 1);
        }
        extern "C" fn catch_fn(code: i32, _ctx: *mut c_void) -> i64 {
            code as i64
        }
        let r = unsafe { basic_try(try_fn, catch_fn, std::ptr::null_mut()) };
        assert_eq!(r, 11);
        assert_eq!(basic_err(), 11);
    }

    #[test]
    fn standalone_slab_pool_alloc_free_cycle() {
        let pool = samm_slab_pool_init(32, 4);
        unsafe {
            let p = samm_slab_pool_alloc(pool);
            assert!(!p.is_null());
            assert_eq!(samm_slab_pool_check_leaks(pool), 0);
            samm_slab_pool_free(pool, p);
            assert_eq!(samm_slab_pool_check_leaks(pool), 1);
            samm_slab_pool_destroy(pool);
        }
    }
}
