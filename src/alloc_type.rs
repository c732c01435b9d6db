//! Tag recorded alongside every tracked pointer, selecting its cleanup path.
//!
//! Numeric discriminants are part of the C ABI contract with compiler-emitted
//! code (SPEC_FULL.md §6) and must never be renumbered.

/// What kind of value a tracked pointer refers to.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[repr(u8)]
pub enum AllocType {
    Unknown = 0,
    Object = 1,
    String = 2,
    Array = 3,
    List = 4,
    ListAtom = 5,
    Generic = 6,
}

impl AllocType {
    /// Reconstruct from the raw C-ABI discriminant. Unknown values fold to
    /// `Unknown` rather than panicking, since this is on the boundary with
    /// compiler-emitted code.
    pub fn from_u8(v: u8) -> Self {
        match v {
            1 => AllocType::Object,
            2 => AllocType::String,
            3 => AllocType::Array,
            4 => AllocType::List,
            5 => AllocType::ListAtom,
            6 => AllocType::Generic,
            _ => AllocType::Unknown,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_all_known_values() {
        for v in 0u8..=6 {
            let t = AllocType::from_u8(v);
            assert_eq!(t as u8, v);
        }
    }

    #[test]
    fn unknown_discriminant_folds_to_unknown() {
        assert_eq!(AllocType::from_u8(200), AllocType::Unknown);
    }
}
