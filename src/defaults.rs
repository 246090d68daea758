use once_cell::sync::Lazy;
use parking_lot::RwLock;
use std::path::PathBuf;

/// Initial app name used when none was configured.
pub const DEFAULT_APP_NAME: &str = "default";

/// Initial base directory, relative to the working directory.
pub const DEFAULT_LOG_DIR: &str = "./logs";

struct Defaults {
    app_name: String,
    log_dir: PathBuf,
}

static DEFAULTS: Lazy<RwLock<Defaults>> = Lazy::new(|| {
    RwLock::new(Defaults {
        app_name: DEFAULT_APP_NAME.to_string(),
        log_dir: PathBuf::from(DEFAULT_LOG_DIR),
    })
});

/// Set the process-wide default app name. Last write wins; loggers and
/// configs created earlier keep the name they resolved at creation.
pub fn set_default_app_name(app_name: impl Into<String>) {
    DEFAULTS.write().app_name = app_name.into();
}

pub fn default_app_name() -> String {
    DEFAULTS.read().app_name.clone()
}

/// Set the process-wide default base log directory.
pub fn set_default_log_dir(path: impl Into<PathBuf>) {
    DEFAULTS.write().log_dir = path.into();
}

pub fn default_log_dir() -> PathBuf {
    DEFAULTS.read().log_dir.clone()
}

/// Read both defaults under one lock acquisition.
pub(crate) fn snapshot() -> (String, PathBuf) {
    let guard = DEFAULTS.read();
    (guard.app_name.clone(), guard.log_dir.clone())
}
