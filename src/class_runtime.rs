//! Object allocation/destruction and `IS` type checking via a single-
//! inheritance vtable walk (SPEC_FULL.md §3, §4.7).
//!
//! Object layout: `[0..8)` vtable pointer, `[8..16)` class id, fields after.
//! VTable layout (emitted by the compiler, opaque to us beyond slot
//! offsets): `[0]` class id, `[1]` parent vtable pointer, `[2]` class name
//! C string, `[3]` destructor pointer, `[4..]` method slots.

use crate::samm::Samm;
use std::os::raw::c_char;

const WORD: usize = std::mem::size_of::<usize>();
const VTABLE_SLOT_CLASS_ID: usize = 0;
const VTABLE_SLOT_PARENT: usize = 1;
const VTABLE_SLOT_NAME: usize = 2;
const VTABLE_SLOT_DTOR: usize = 3;

unsafe fn vtable_slot(vtable: *const u8, slot: usize) -> usize {
    unsafe { *(vtable.add(slot * WORD) as *const usize) }
}

/// Allocate a zeroed object of `size` bytes, stamp its header with
/// `vtable`/`class_id`, and track it in the current scope.
///
/// Routed entirely through `samm` (rather than taking a bare
/// `&PoolRegistry`) so a disabled `Samm` falls back to `libc::calloc` and
/// skips tracking, the same no-op contract every other allocation kind
/// gets under `samm_set_enabled(false)`.
///
/// # Safety
/// `vtable` must point to a statically emitted, valid vtable. `size` must be
/// at least 16 (room for the header).
pub unsafe fn object_new(samm: &Samm, size: usize, vtable: *const u8, class_id: i64) -> *mut u8 {
    assert!(size >= 16, "class object size must be at least 16 bytes (header)");
    let ptr = samm.alloc_object(size);
    if ptr.is_null() {
        return std::ptr::null_mut();
    }
    unsafe {
        *(ptr as *mut *const u8) = vtable;
        *(ptr.add(WORD) as *mut i64) = class_id;
    }
    samm.track_object(ptr);
    ptr
}

/// Run the object's destructor (if any) and free it. Safe to call with a
/// null `*var`; clears `*var` to null afterwards.
///
/// # Safety
/// `var` must point to a valid `*mut u8` slot (possibly null).
pub unsafe fn object_delete(samm: &Samm, var: *mut *mut u8) {
    unsafe {
        let obj = *var;
        if obj.is_null() {
            return;
        }
        let vtable = *(obj as *const *const u8);
        if !vtable.is_null() {
            let dtor = vtable_slot(vtable, VTABLE_SLOT_DTOR);
            if dtor != 0 {
                let dtor: extern "C" fn(*mut u8) = std::mem::transmute(dtor);
                dtor(obj);
            }
        }
        samm.untrack(obj);
        samm.free_object(obj);
        *var = std::ptr::null_mut();
    }
}

/// `IS` type check: fast path on exact class id match, slow path walking
/// single-inheritance parent vtables. Always `false` for a null object
/// (matching the NOTHING-reference semantics in SPEC_FULL.md §4.7).
///
/// # Safety
/// If non-null, `obj` must point to a live object with a valid vtable chain.
pub unsafe fn is_instance(obj: *const u8, target_class_id: i64) -> bool {
    if obj.is_null() {
        return false;
    }
    unsafe {
        let obj_class_id = *(obj.add(WORD) as *const i64);
        if obj_class_id == target_class_id {
            return true;
        }
        let mut vtable = *(obj as *const *const u8);
        loop {
            if vtable.is_null() {
                return false;
            }
            let id = vtable_slot(vtable, VTABLE_SLOT_CLASS_ID) as i64;
            if id == target_class_id {
                return true;
            }
            let parent = vtable_slot(vtable, VTABLE_SLOT_PARENT);
            if parent == 0 {
                return false;
            }
            vtable = parent as *const u8;
        }
    }
}

/// Format the diagnostic for a method call on a NOTHING reference.
pub fn null_method_error(location: &str, method: &str) -> String {
    format!("Method call on NOTHING reference at {location} (method: {method})")
}

/// Format the diagnostic for a field access on a NOTHING reference.
pub fn null_field_error(location: &str, field: &str) -> String {
    format!("Field access on NOTHING reference at {location} (field: {field})")
}

/// Read a vtable's class name, assumed to be a NUL-terminated C string.
///
/// # Safety
/// `vtable` must be a valid vtable pointer.
pub unsafe fn class_name<'a>(vtable: *const u8) -> &'a str {
    unsafe {
        let name_ptr = vtable_slot(vtable, VTABLE_SLOT_NAME) as *const c_char;
        std::ffi::CStr::from_ptr(name_ptr).to_str().unwrap_or("<invalid class name>")
    }
}
