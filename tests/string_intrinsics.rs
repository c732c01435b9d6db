//! BASIC string intrinsics through the descriptor layer: idempotence,
//! 1-based boundary behavior, and ordering.

use samm::string_desc::{self, Encoding, StringDescriptor};

#[test]
fn trim_is_idempotent_through_the_descriptor() {
    let once = string_desc::trim("  padded  ");
    let twice = string_desc::trim(&once);
    assert_eq!(once, twice);
}

#[test]
fn upper_lower_upper_converges() {
    let s = "MiXeD Case";
    assert_eq!(string_desc::upper(&string_desc::lower(&string_desc::upper(s))), string_desc::upper(s));
}

#[test]
fn len_of_concat_is_additive() {
    let a = "hello";
    let b = " world";
    assert_eq!(string_desc::len(&string_desc::concat(a, b)), string_desc::len(a) + string_desc::len(b));
}

#[test]
fn mid_and_left_respect_one_based_indexing_and_clamp() {
    assert_eq!(string_desc::mid("basic", 2, 3), "asi");
    assert_eq!(string_desc::mid("basic", 0, 3), ""); // 0 is not a valid 1-based start
    assert_eq!(string_desc::left("basic", 2), "ba");
    assert_eq!(string_desc::left("basic", 99), "basic"); // clamps, doesn't panic
    assert_eq!(string_desc::right("basic", 2), "ic");
}

#[test]
fn instr_boundaries() {
    assert_eq!(string_desc::instr("scope aware", "aware"), 7);
    assert_eq!(string_desc::instr("scope aware", ""), 1);
    assert_eq!(string_desc::instr("scope aware", "nope"), 0);
}

#[test]
fn replace_all_occurrences() {
    assert_eq!(string_desc::replace("banana", "na", "XY"), "baXYXY");
}

#[test]
fn compare_orders_lexically_via_descriptors() {
    let a = string_desc::new_ascii("abc");
    let b = string_desc::new_ascii("abd");
    unsafe {
        assert_eq!(string_desc::compare(a, b), std::cmp::Ordering::Less);
        string_desc::release(a);
        string_desc::release(b);
    }
}

#[test]
fn mixed_encoding_compare_promotes_through_utf8_projection() {
    let ascii = string_desc::new_ascii("hello");
    let utf32 = string_desc::new_utf32("hello");
    unsafe {
        assert_eq!((*ascii).encoding, Encoding::Ascii);
        assert_eq!((*utf32).encoding, Encoding::Utf32);
        assert_eq!(string_desc::compare(ascii, utf32), std::cmp::Ordering::Equal);
        string_desc::release(ascii);
        string_desc::release(utf32);
    }
}

#[test]
fn retain_release_roundtrip_frees_exactly_at_zero() {
    let d: *mut StringDescriptor = string_desc::new_utf32("counted");
    unsafe {
        assert_eq!((*d).refcount, 1);
        string_desc::retain(d);
        string_desc::retain(d);
        assert_eq!((*d).refcount, 3);
        string_desc::release(d);
        string_desc::release(d);
        assert_eq!((*d).refcount, 1);
        assert_eq!(StringDescriptor::as_str(d), "counted");
        string_desc::release(d); // drops to 0, frees
    }
}
