//! Environment variable names understood by [`LogConfig::from_env`].
//!
//! These are purely helpers; the logger, sinks and searcher only ever see
//! an explicit [`LogConfig`] and never read the environment themselves.

use crate::config::LogConfig;

/// Base directory of the archive, e.g. `/var/log/apps`.
pub const LOG_BASE_DIR_ENV: &str = "LOG_BASE_DIR";

/// `true` (any case) enables the colored console mirror.
pub const LOG_CONSOLE_ENV: &str = "LOG_CONSOLE";

/// Rotation threshold in bytes.
pub const LOG_ROTATION_SIZE_ENV: &str = "LOG_ROTATION_SIZE";

/// Number of rotated backups to keep.
pub const LOG_BACKUP_COUNT_ENV: &str = "LOG_BACKUP_COUNT";

impl LogConfig {
    /// [`LogConfig::from_defaults`] with any of the `LOG_*` variables above
    /// applied on top.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Like [`from_env`](Self::from_env) with a custom variable source.
    /// Unparseable numbers keep their default.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::from_defaults();

        if let Some(dir) = lookup(LOG_BASE_DIR_ENV).filter(|d| !d.is_empty()) {
            config.base_dir = dir.into();
        }
        if let Some(flag) = lookup(LOG_CONSOLE_ENV) {
            config.console_enabled = flag.trim().eq_ignore_ascii_case("true");
        }
        if let Some(size) = lookup(LOG_ROTATION_SIZE_ENV).and_then(|v| v.trim().parse().ok()) {
            config.rotation.max_bytes = size;
        }
        if let Some(count) = lookup(LOG_BACKUP_COUNT_ENV).and_then(|v| v.trim().parse().ok()) {
            config.rotation.backup_count = count;
        }
        config
    }
}
