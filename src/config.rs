use std::path::{Path, PathBuf};

use crate::defaults;
use crate::record::Level;
use crate::sink::RotationConfig;

/// Configuration consumed by [`Logger`](crate::logger::Logger) and
/// [`LogSearcher`](crate::search::LogSearcher).
///
/// Built once and then shared read-only. The app name and base directory are
/// captured when the config is created, so later changes to the
/// process-wide defaults do not affect loggers built from it.
///
/// **Fields**
/// - `base_dir`: root of the archive, `<base_dir>/<app>/<YYYY-MM>/...`.
/// - `app_name`: owning application, first path component under `base_dir`.
/// - `use_json`: NDJSON file output when `true`, plain text otherwise.
/// - `console_enabled`: mirror records to stderr with colors.
/// - `console_level`: minimum level shown on the console.
/// - `rotation`: size-based rotation of the dated files.
#[derive(Clone, Debug, PartialEq)]
pub struct LogConfig {
    pub base_dir: PathBuf,
    pub app_name: String,
    pub use_json: bool,
    pub console_enabled: bool,
    pub console_level: Level,
    pub rotation: RotationConfig,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self::from_defaults()
    }
}

impl LogConfig {
    /// Snapshot the process-wide defaults.
    pub fn from_defaults() -> Self {
        let (app_name, base_dir) = defaults::snapshot();
        Self {
            base_dir,
            app_name,
            use_json: true,
            console_enabled: true,
            console_level: Level::Info,
            rotation: RotationConfig::default(),
        }
    }

    /// Explicit base directory and app name, everything else default.
    pub fn new(base_dir: impl Into<PathBuf>, app_name: impl Into<String>) -> Self {
        Self {
            base_dir: base_dir.into(),
            app_name: app_name.into(),
            ..Self::from_defaults()
        }
    }

    #[must_use]
    pub fn with_base_dir(mut self, base_dir: impl Into<PathBuf>) -> Self {
        self.base_dir = base_dir.into();
        self
    }

    #[must_use]
    pub fn with_app_name(mut self, app_name: impl Into<String>) -> Self {
        self.app_name = app_name.into();
        self
    }

    #[must_use]
    pub fn with_json(mut self, use_json: bool) -> Self {
        self.use_json = use_json;
        self
    }

    #[must_use]
    pub fn with_console(mut self, enabled: bool) -> Self {
        self.console_enabled = enabled;
        self
    }

    #[must_use]
    pub fn with_console_level(mut self, level: Level) -> Self {
        self.console_level = level;
        self
    }

    #[must_use]
    pub fn with_rotation(mut self, rotation: RotationConfig) -> Self {
        self.rotation = rotation;
        self
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::defaults::test_support::DEFAULTS_GUARD;
    use crate::defaults::{set_default_app_name, set_default_log_dir, snapshot};

    #[test]
    fn defaults_are_captured_at_construction() {
        let _guard = DEFAULTS_GUARD.lock();
        let (old_app, old_dir) = snapshot();

        set_default_app_name("billing");
        set_default_log_dir("/srv/logs");
        let config = LogConfig::from_defaults();

        set_default_app_name("other");
        assert_eq!(config.app_name, "billing");
        assert_eq!(config.base_dir, PathBuf::from("/srv/logs"));
        assert_eq!(LogConfig::from_defaults().app_name, "other");

        set_default_app_name(old_app);
        set_default_log_dir(old_dir);
    }

    #[test]
    fn builder_overrides() {
        let config = LogConfig::new("/tmp/logs", "shop")
            .with_json(false)
            .with_console(false)
            .with_console_level(Level::Warning)
            .with_rotation(RotationConfig::default().with_max_bytes(1024));

        assert_eq!(config.base_dir(), Path::new("/tmp/logs"));
        assert_eq!(config.app_name, "shop");
        assert!(!config.use_json);
        assert!(!config.console_enabled);
        assert_eq!(config.console_level, Level::Warning);
        assert_eq!(config.rotation.max_bytes, 1024);
        assert_eq!(config.rotation.backup_count, 5);
    }
}
