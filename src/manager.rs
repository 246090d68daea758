use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::Result;
use crate::sink::{FileSink, LogSink, RotationConfig};

static GLOBAL: Lazy<Arc<SinkManager>> = Lazy::new(|| Arc::new(SinkManager::new()));

/// `<base_dir>/<app>/<YYYY-MM>/<app>-<YYYY-MM-DD>.log` for the UTC date of
/// `instant`. Pure path computation, nothing is created.
pub fn dated_path(base_dir: &Path, app_name: &str, instant: DateTime<Utc>) -> PathBuf {
    base_dir
        .join(app_name)
        .join(instant.format("%Y-%m").to_string())
        .join(format!("{}-{}.log", app_name, instant.format("%Y-%m-%d")))
}

/// Same as [`dated_path`], creating the month directory if needed.
pub fn resolve_path(base_dir: &Path, app_name: &str, instant: DateTime<Utc>) -> Result<PathBuf> {
    let path = dated_path(base_dir, app_name, instant);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    Ok(path)
}

/// Registry of open file sinks, keyed by absolute path.
///
/// All lookups and insertions go through one lock so two threads can never
/// open two sinks for the same file. A process normally shares
/// [`SinkManager::global`]; separate instances are handy in tests.
#[derive(Default)]
pub struct SinkManager {
    sinks: Mutex<HashMap<PathBuf, Arc<FileSink>>>,
}

impl SinkManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Process-wide manager used by loggers that were not given their own.
    pub fn global() -> Arc<SinkManager> {
        Arc::clone(&GLOBAL)
    }

    /// Return the sink already open for `path`, or open and register one.
    ///
    /// **Parameters**
    /// - `path`: resolved log file path; relative paths are made absolute
    ///   against the current directory before lookup.
    /// - `rotation`: policy applied if a new sink has to be opened. An
    ///   existing sink keeps the policy it was opened with.
    pub fn get_or_create_sink(&self, path: &Path, rotation: &RotationConfig) -> Result<Arc<FileSink>> {
        let key = std::path::absolute(path)?;

        let mut sinks = self.sinks.lock();
        if let Some(sink) = sinks.get(&key) {
            return Ok(Arc::clone(sink));
        }

        if let Some(parent) = key.parent() {
            fs::create_dir_all(parent)?;
        }
        let sink = Arc::new(FileSink::open(key.clone(), rotation.clone())?);
        sinks.insert(key, Arc::clone(&sink));
        Ok(sink)
    }

    /// Sink for the dated file of `app_name` at `instant`. A new UTC day
    /// resolves to a new path and therefore a new sink.
    pub fn sink_for(
        &self,
        base_dir: &Path,
        app_name: &str,
        instant: DateTime<Utc>,
        rotation: &RotationConfig,
    ) -> Result<Arc<FileSink>> {
        self.get_or_create_sink(&dated_path(base_dir, app_name, instant), rotation)
    }

    pub fn len(&self) -> usize {
        self.sinks.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.lock().is_empty()
    }

    /// Flush every open sink, returning the first error seen.
    pub fn flush_all(&self) -> Result<()> {
        let sinks: Vec<_> = self.sinks.lock().values().cloned().collect();
        let mut first_err = None;
        for sink in sinks {
            if let Err(e) = sink.flush() {
                first_err.get_or_insert(e);
            }
        }
        first_err.map_or(Ok(()), Err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::TempDir;

    #[test]
    fn dated_path_layout() {
        let ts = Utc.with_ymd_and_hms(2025, 2, 9, 23, 59, 59).unwrap();
        let path = dated_path(Path::new("/var/log/apps"), "shop", ts);
        assert_eq!(
            path,
            PathBuf::from("/var/log/apps/shop/2025-02/shop-2025-02-09.log")
        );
    }

    #[test]
    fn resolve_path_creates_directories_idempotently() {
        let dir = TempDir::new().unwrap();
        let ts = Utc.with_ymd_and_hms(2024, 12, 31, 12, 0, 0).unwrap();

        let path = resolve_path(dir.path(), "shop", ts).unwrap();
        assert!(path.parent().unwrap().is_dir());
        assert!(!path.exists());

        let again = resolve_path(dir.path(), "shop", ts).unwrap();
        assert_eq!(path, again);
    }

    #[test]
    fn resolve_path_fails_on_unwritable_base() {
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("not-a-dir");
        fs::write(&blocker, b"x").unwrap();

        let err = resolve_path(&blocker, "shop", Utc::now()).unwrap_err();
        assert!(matches!(err, crate::error::LogError::Io(_)));
    }

    #[test]
    fn same_path_yields_same_sink() {
        let dir = TempDir::new().unwrap();
        let manager = SinkManager::new();
        let path = resolve_path(dir.path(), "shop", Utc::now()).unwrap();

        let a = manager.get_or_create_sink(&path, &RotationConfig::default()).unwrap();
        let b = manager.get_or_create_sink(&path, &RotationConfig::default()).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(manager.len(), 1);

        a.write_line("one").unwrap();
        b.write_line("two").unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "one\ntwo\n");
    }

    #[test]
    fn dedup_uses_absolute_path() {
        let dir = TempDir::new().unwrap();
        let manager = SinkManager::new();
        let path = resolve_path(dir.path(), "shop", Utc::now()).unwrap();
        let dotted = path
            .parent()
            .unwrap()
            .join(".")
            .join(path.file_name().unwrap());

        let a = manager.get_or_create_sink(&path, &RotationConfig::default()).unwrap();
        let b = manager.get_or_create_sink(&dotted, &RotationConfig::default()).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn new_day_opens_new_sink() {
        let dir = TempDir::new().unwrap();
        let manager = SinkManager::new();
        let rotation = RotationConfig::default();
        let day1 = Utc.with_ymd_and_hms(2025, 1, 31, 23, 0, 0).unwrap();
        let day2 = Utc.with_ymd_and_hms(2025, 2, 1, 0, 0, 1).unwrap();

        let a = manager.sink_for(dir.path(), "shop", day1, &rotation).unwrap();
        let b = manager.sink_for(dir.path(), "shop", day2, &rotation).unwrap();
        assert!(!Arc::ptr_eq(&a, &b));
        assert_eq!(manager.len(), 2);
        assert!(a.path().ends_with("shop/2025-01/shop-2025-01-31.log"));
        assert!(b.path().ends_with("shop/2025-02/shop-2025-02-01.log"));
    }
}
