//! Library configuration.
//!
//! # Responsibility
//! - Hold the knobs the catalog, uniqueness guard and logging read at
//!   construction time.
//!
//! # Invariants
//! - Defaults reproduce the behavior callers get without any configuration.

use std::path::PathBuf;
use std::time::Duration;

/// Default lifetime of a uniqueness-guard token.
pub const DEFAULT_GUARD_TTL: Duration = Duration::from_secs(3);

/// What `Catalog::define` does when a name is already registered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RedefinitionPolicy {
    /// Replace the previous entry (last writer wins) and log a warning.
    #[default]
    Permissive,
    /// Reject the second definition with `RegistryError::AlreadyDefined`.
    Strict,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CatalogConfig {
    pub redefinition: RedefinitionPolicy,
}

impl CatalogConfig {
    pub fn strict() -> Self {
        Self {
            redefinition: RedefinitionPolicy::Strict,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GuardConfig {
    /// How long a create stays "in creating state" for the guard.
    pub ttl: Duration,
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            ttl: DEFAULT_GUARD_TTL,
        }
    }
}

/// File logging settings consumed by `init_logging`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingConfig {
    /// One of `trace|debug|info|warn|error` (case-insensitive).
    pub level: String,
    /// Absolute directory for rolling log files.
    pub log_dir: PathBuf,
    /// Mirror warnings and errors to stderr.
    pub mirror_warnings: bool,
}

impl LoggingConfig {
    pub fn new(level: impl Into<String>, log_dir: impl Into<PathBuf>) -> Self {
        Self {
            level: level.into(),
            log_dir: log_dir.into(),
            mirror_warnings: false,
        }
    }

    pub fn with_mirror_warnings(mut self, enabled: bool) -> Self {
        self.mirror_warnings = enabled;
        self
    }
}
