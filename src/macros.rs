/// Increment a stats counter by 1.
///
/// Compiles to nothing when the `stats` feature is disabled.
#[macro_export]
macro_rules! stat_inc {
    ($counter:ident) => {
        #[cfg(feature = "stats")]
        {
            $crate::stats::STATS
                .$counter
                .fetch_add(1, ::std::sync::atomic::Ordering::Relaxed);
        }
    };
}

/// Add a value to a stats counter.
///
/// Compiles to nothing (including the value expression) when the `stats`
/// feature is disabled.
#[macro_export]
macro_rules! stat_add {
    ($counter:ident, $val:expr) => {
        #[cfg(feature = "stats")]
        {
            $crate::stats::STATS
                .$counter
                .fetch_add($val as u64, ::std::sync::atomic::Ordering::Relaxed);
        }
    };
}

/// Hot-path trace logging (slab alloc/free, scope push/pop). Off by default;
/// compiles to nothing unless the `trace` feature is enabled, so it costs
/// nothing in a release build that doesn't opt in (SPEC_FULL.md §10.2).
#[macro_export]
macro_rules! trace_hot {
    ($($arg:tt)*) => {
        #[cfg(feature = "trace")]
        {
            ::log::trace!($($arg)*);
        }
    };
}
