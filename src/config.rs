//! Runtime configuration, read once at [`crate::samm::Samm::init`] and frozen.
//!
//! Unlike the teacher crate's build-time TOML size-class generator, SAMM's
//! pool registry is a small, ABI-fixed set (see [`crate::pool_registry`]) and
//! is not meant to be externally tunable. The only things configuration
//! covers are operational knobs: whether to print stats on exit, the
//! cleanup-queue depth, and a log-filter override.

use std::sync::OnceLock;

/// Default bound on the number of detached scope vectors the cleanup queue
/// will hold before `exit_scope` blocks (SPEC_FULL.md §4.4).
pub const DEFAULT_QUEUE_DEPTH: usize = 1024;

/// Maximum nesting depth of scope frames (SPEC_FULL.md §3).
pub const MAX_SCOPE_DEPTH: usize = 256;

/// Maximum nesting depth of the protection harness's jump-target stack
/// (SPEC_FULL.md §4.8).
pub const MAX_PROTECTION_DEPTH: usize = 4;

#[derive(Clone, Debug)]
pub struct RuntimeConfig {
    /// `BASIC_MEMORY_STATS`: print memory/SAMM stats at normal cleanup.
    pub stats_on_exit: bool,
    /// `SAMM_QUEUE_DEPTH`: override the cleanup queue bound.
    pub queue_depth: usize,
    /// `SAMM_LOG`: override the default log filter.
    pub log_filter: Option<String>,
}

impl RuntimeConfig {
    fn from_env() -> Self {
        let stats_on_exit = std::env::var_os("BASIC_MEMORY_STATS").is_some();
        let queue_depth = std::env::var("SAMM_QUEUE_DEPTH")
            .ok()
            .and_then(|v| v.parse::<usize>().ok())
            .filter(|&n| n > 0)
            .unwrap_or(DEFAULT_QUEUE_DEPTH);
        let log_filter = std::env::var("SAMM_LOG").ok();
        Self {
            stats_on_exit,
            queue_depth,
            log_filter,
        }
    }
}

static CONFIG: OnceLock<RuntimeConfig> = OnceLock::new();

/// Read (or re-read, on first call) the frozen runtime configuration.
pub fn config() -> &'static RuntimeConfig {
    CONFIG.get_or_init(RuntimeConfig::from_env)
}

/// Install a default `env_logger` subscriber if no global logger is set yet.
/// Embedders that install their own `log` subscriber before calling
/// `samm_init` are left untouched.
pub fn init_default_logger() {
    let cfg = config();
    let mut builder = env_logger::Builder::from_default_env();
    if let Some(filter) = &cfg.log_filter {
        builder.parse_filters(filter);
    }
    // `try_init` is a no-op (returns Err) if a logger is already installed.
    let _ = builder.try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_stable() {
        assert_eq!(DEFAULT_QUEUE_DEPTH, 1024);
        assert_eq!(MAX_SCOPE_DEPTH, 256);
        assert_eq!(MAX_PROTECTION_DEPTH, 4);
    }
}
