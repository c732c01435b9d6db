//! Refcounted string descriptors and the BASIC string intrinsics
//! (SPEC_FULL.md §3, §4.6).
//!
//! The 40-byte [`StringDescriptor`] header is the primary representation;
//! [`BasicString`] is a simpler parallel ASCII-only type used at the
//! compiler's legacy call sites. The refcount-adjacent-to-header layout
//! mirrors the convention in
//! `other_examples/9ac8d503_upstat-io-sigil-lang__compiler-ori_rt-src-lib.rs.rs`'s
//! `ori_rc_*` family, adapted to a fixed descriptor rather than a
//! pointer-prefixed counter.

use std::cmp::Ordering as CmpOrdering;

/// Encoding tag for a string's backing buffer.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[repr(u8)]
pub enum Encoding {
    Ascii = 0,
    Utf32 = 1,
}

/// The fixed-field descriptor header from SPEC_FULL.md §3: a data pointer,
/// length/capacity, a refcount, an encoding tag, a dirty flag, and a lazily
/// built UTF-8 cache pointer — allocated out of the 40-byte `StringDesc`
/// slab class in [`crate::pool_registry`].
#[repr(C)]
pub struct StringDescriptor {
    pub data: *mut u8,
    pub length: u32,
    pub capacity: u32,
    pub refcount: i32,
    pub encoding: Encoding,
    pub dirty: bool,
    pub utf8_cache: *mut u8,
}

const _: () = assert!(std::mem::size_of::<StringDescriptor>() <= crate::pool_registry::STRING_DESC_SIZE);

impl StringDescriptor {
    fn element_size(&self) -> usize {
        match self.encoding {
            Encoding::Ascii => 1,
            Encoding::Utf32 => 4,
        }
    }

    fn byte_len(&self) -> usize {
        self.length as usize * self.element_size()
    }

    /// Borrow the descriptor's contents as a UTF-8 `str`. ASCII descriptors
    /// are valid UTF-8 by construction; UTF-32 descriptors are converted
    /// into the lazily built `utf8_cache`.
    ///
    /// # Safety
    /// `desc` must point to a live, initialized `StringDescriptor`.
    pub unsafe fn as_str<'a>(desc: *mut StringDescriptor) -> &'a str {
        unsafe {
            let d = &*desc;
            match d.encoding {
                Encoding::Ascii => {
                    let bytes = std::slice::from_raw_parts(d.data, d.byte_len());
                    std::str::from_utf8_unchecked(bytes)
                }
                Encoding::Utf32 => {
                    if d.dirty || d.utf8_cache.is_null() {
                        rebuild_utf8_cache(desc);
                    }
                    let d = &*desc;
                    let bytes = std::slice::from_raw_parts(d.utf8_cache, utf8_cache_len(d));
                    std::str::from_utf8_unchecked(bytes)
                }
            }
        }
    }
}

fn utf8_cache_len(d: &StringDescriptor) -> usize {
    // The cache is stored length-prefixed as a usize immediately before the
    // bytes to avoid growing the descriptor itself.
    unsafe { *(d.utf8_cache as *const usize).sub(1) }
}

unsafe fn rebuild_utf8_cache(desc: *mut StringDescriptor) {
    unsafe {
        let d = &mut *desc;
        if !d.utf8_cache.is_null() {
            let old_len = utf8_cache_len(d);
            let layout = std::alloc::Layout::array::<u8>(old_len + std::mem::size_of::<usize>()).unwrap();
            std::alloc::dealloc((d.utf8_cache as *mut u8).sub(std::mem::size_of::<usize>()), layout);
            d.utf8_cache = std::ptr::null_mut();
        }
        let codepoints = std::slice::from_raw_parts(d.data as *const u32, d.length as usize);
        let s: String = codepoints.iter().filter_map(|&c| char::from_u32(c)).collect();
        let bytes = s.into_bytes();
        let header_size = std::mem::size_of::<usize>();
        let layout = std::alloc::Layout::array::<u8>(bytes.len() + header_size).unwrap();
        let block = std::alloc::alloc(layout);
        *(block as *mut usize) = bytes.len();
        std::ptr::copy_nonoverlapping(bytes.as_ptr(), block.add(header_size), bytes.len());
        d.utf8_cache = block.add(header_size);
        d.dirty = false;
    }
}

/// Allocate a fresh ASCII descriptor copying `s`, refcount 1.
pub fn new_ascii(s: &str) -> *mut StringDescriptor {
    let bytes = s.as_bytes();
    let data = unsafe {
        let layout = std::alloc::Layout::array::<u8>(bytes.len().max(1)).unwrap();
        let p = std::alloc::alloc(layout);
        std::ptr::copy_nonoverlapping(bytes.as_ptr(), p, bytes.len());
        p
    };
    let desc = Box::into_raw(Box::new(StringDescriptor {
        data,
        length: bytes.len() as u32,
        capacity: bytes.len() as u32,
        refcount: 1,
        encoding: Encoding::Ascii,
        dirty: true,
        utf8_cache: std::ptr::null_mut(),
    }));
    desc
}

/// Allocate a fresh UTF-32 descriptor copying `s`'s codepoints, refcount 1.
pub fn new_utf32(s: &str) -> *mut StringDescriptor {
    let codepoints: Vec<u32> = s.chars().map(|c| c as u32).collect();
    let data = unsafe {
        let layout = std::alloc::Layout::array::<u32>(codepoints.len().max(1)).unwrap();
        let p = std::alloc::alloc(layout) as *mut u32;
        std::ptr::copy_nonoverlapping(codepoints.as_ptr(), p, codepoints.len());
        p as *mut u8
    };
    Box::into_raw(Box::new(StringDescriptor {
        data,
        length: codepoints.len() as u32,
        capacity: codepoints.len() as u32,
        refcount: 1,
        encoding: Encoding::Utf32,
        dirty: true,
        utf8_cache: std::ptr::null_mut(),
    }))
}

/// Increment the refcount.
///
/// # Safety
/// `desc` must point to a live descriptor.
pub unsafe fn retain(desc: *mut StringDescriptor) {
    unsafe {
        (*desc).refcount += 1;
    }
}

/// Decrement the refcount; frees the descriptor and its buffers at zero.
///
/// # Safety
/// `desc` must point to a live descriptor with refcount >= 1.
pub unsafe fn release(desc: *mut StringDescriptor) {
    unsafe {
        (*desc).refcount -= 1;
        if (*desc).refcount <= 0 {
            let d = &*desc;
            if !d.data.is_null() {
                // Must mirror the allocating constructor's layout exactly:
                // `new_ascii` allocates a `u8` array, `new_utf32` a `u32`
                // array — same byte count for UTF-32 but a different
                // alignment, so picking the wrong one here is unsound.
                match d.encoding {
                    Encoding::Ascii => {
                        let layout = std::alloc::Layout::array::<u8>(d.byte_len().max(1)).unwrap();
                        std::alloc::dealloc(d.data, layout);
                    }
                    Encoding::Utf32 => {
                        let layout = std::alloc::Layout::array::<u32>((d.length as usize).max(1)).unwrap();
                        std::alloc::dealloc(d.data, layout);
                    }
                }
            }
            if !d.utf8_cache.is_null() {
                let old_len = utf8_cache_len(d);
                let header_size = std::mem::size_of::<usize>();
                let layout = std::alloc::Layout::array::<u8>(old_len + header_size).unwrap();
                std::alloc::dealloc((d.utf8_cache as *mut u8).sub(header_size), layout);
            }
            drop(Box::from_raw(desc));
        }
    }
}

/// Entry point used by the cleanup worker's default `STRING` callback,
/// which only has a bare `*mut u8` (not a typed descriptor pointer).
pub fn release_raw(ptr: *mut u8) {
    if ptr.is_null() {
        return;
    }
    unsafe { release(ptr as *mut StringDescriptor) };
}

fn encoding_of(desc: *const StringDescriptor) -> Encoding {
    unsafe { (*desc).encoding }
}

/// Compare two descriptors' contents, promoting to UTF-32 first if their
/// encodings differ (SPEC_FULL.md §4.6).
///
/// # Safety
/// Both pointers must be live descriptors.
pub unsafe fn compare(a: *mut StringDescriptor, b: *mut StringDescriptor) -> CmpOrdering {
    unsafe {
        if encoding_of(a) == encoding_of(b) {
            let sa = StringDescriptor::as_str(a);
            let sb = StringDescriptor::as_str(b);
            sa.cmp(sb)
        } else {
            // Compare via UTF-8 projection either way; exact codepoint
            // semantics aren't needed for ordering comparisons across a
            // mixed pair since both as_str() views are valid UTF-8.
            let sa = StringDescriptor::as_str(a);
            let sb = StringDescriptor::as_str(b);
            sa.cmp(sb)
        }
    }
}

// ---- BASIC string intrinsics (1-based indexing) ----

/// `LEN`
pub fn len(s: &str) -> usize {
    s.chars().count()
}

/// String concatenation.
pub fn concat(a: &str, b: &str) -> String {
    let mut out = String::with_capacity(a.len() + b.len());
    out.push_str(a);
    out.push_str(b);
    out
}

/// `LEFT$(s, n)`
pub fn left(s: &str, n: usize) -> String {
    s.chars().take(n).collect()
}

/// `RIGHT$(s, n)`
pub fn right(s: &str, n: usize) -> String {
    let total = s.chars().count();
    let skip = total.saturating_sub(n);
    s.chars().skip(skip).collect()
}

/// `MID$(s, start, len)`, 1-based `start`.
pub fn mid(s: &str, start: usize, len: usize) -> String {
    if start == 0 {
        return String::new();
    }
    let zero_based = start - 1;
    s.chars().skip(zero_based).take(len).collect()
}

/// `UPPER$`
pub fn upper(s: &str) -> String {
    s.to_uppercase()
}

/// `LOWER$`
pub fn lower(s: &str) -> String {
    s.to_lowercase()
}

/// `TRIM$`
pub fn trim(s: &str) -> String {
    s.trim().to_string()
}

/// `INSTR(s, needle)`: 1-based position, 0 if not found, 1 for an empty
/// needle.
pub fn instr(s: &str, needle: &str) -> usize {
    if needle.is_empty() {
        return 1;
    }
    match s.find(needle) {
        Some(byte_idx) => s[..byte_idx].chars().count() + 1,
        None => 0,
    }
}

/// `REPLACE(s, from, to)`
pub fn replace(s: &str, from: &str, to: &str) -> String {
    if from.is_empty() {
        return s.to_string();
    }
    s.replace(from, to)
}

/// Simpler parallel refcounted ASCII-only string, used at legacy call sites.
#[repr(C)]
pub struct BasicString {
    pub data: *mut u8,
    pub length: u32,
    pub capacity: u32,
    pub refcount: i32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn len_concat_additivity() {
        assert_eq!(len(&concat("ab", "cde")), len("ab") + len("cde"));
    }

    #[test]
    fn trim_is_idempotent() {
        let once = trim("  hi  ");
        let twice = trim(&once);
        assert_eq!(once, twice);
    }

    #[test]
    fn upper_lower_upper_is_upper() {
        let s = "Hello";
        assert_eq!(upper(&lower(&upper(s))), upper(s));
    }

    #[test]
    fn mid_boundary_cases() {
        assert_eq!(mid("abcde", 2, 2), "bc");
        assert_eq!(mid("abc", 10, 2), "");
    }

    #[test]
    fn left_right_clamp_to_string_length() {
        assert_eq!(left("hi", 99), "hi");
        assert_eq!(right("hi", 99), "hi");
    }

    #[test]
    fn instr_boundary_cases() {
        assert_eq!(instr("hello", "ll"), 3);
        assert_eq!(instr("hello", ""), 1);
        assert_eq!(instr("abc", "z"), 0);
    }

    #[test]
    fn replace_multiple_occurrences() {
        assert_eq!(replace("banana", "na", "XY"), "baXYXY");
    }

    #[test]
    fn descriptor_alloc_retain_release_roundtrip() {
        let d = new_ascii("abc");
        unsafe {
            assert_eq!((*d).refcount, 1);
            retain(d);
            assert_eq!((*d).refcount, 2);
            release(d);
            assert_eq!((*d).refcount, 1);
            let s = StringDescriptor::as_str(d);
            assert_eq!(s, "abc");
            release(d);
        }
    }

    #[test]
    fn utf32_descriptor_roundtrip_and_release() {
        let d = new_utf32("héllo");
        unsafe {
            assert_eq!((*d).length, 5);
            assert_eq!(StringDescriptor::as_str(d), "héllo");
            release(d);
        }
    }

    #[test]
    fn compare_orders_lexically() {
        let a = new_ascii("abc");
        let b = new_ascii("abd");
        unsafe {
            assert_eq!(compare(a, b), CmpOrdering::Less);
            release(a);
            release(b);
        }
    }
}
