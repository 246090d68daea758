use chrono::{DateTime, Duration, Months, NaiveDate, Utc};
use regex::{Regex, RegexBuilder};
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufRead, BufReader};
use std::ops::ControlFlow;
use std::path::{Path, PathBuf};

use crate::config::LogConfig;
use crate::defaults;
use crate::error::Result;
use crate::record::{Level, LogEntry};

/// Bucket used by [`LogSearcher::count_logs`] for lines without a level.
pub const UNKNOWN_LEVEL: &str = "UNKNOWN";

/// Read-only query engine over the dated NDJSON archive written by
/// [`Logger`](crate::logger::Logger).
///
/// Holds no mutable state and can be shared freely between threads. Lines
/// that fail to parse (partial writes, foreign content, a file caught in the
/// middle of rotation) are skipped; files that disappear between listing and
/// opening are skipped too.
#[derive(Debug, Clone)]
pub struct LogSearcher {
    base_dir: PathBuf,
    now: Option<DateTime<Utc>>,
}

impl LogSearcher {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        LogSearcher {
            base_dir: base_dir.into(),
            now: None,
        }
    }

    pub fn from_config(config: &LogConfig) -> Self {
        Self::new(config.base_dir.clone())
    }

    /// Searcher over the process-wide default log directory.
    pub fn from_defaults() -> Self {
        Self::new(defaults::default_log_dir())
    }

    /// Pin "now" used for look-back windows instead of the wall clock.
    #[must_use]
    pub fn at(mut self, now: DateTime<Utc>) -> Self {
        self.now = Some(now);
        self
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    fn now(&self) -> DateTime<Utc> {
        self.now.unwrap_or_else(Utc::now)
    }

    /// Log files of `app_name` whose month may hold records from the last
    /// `days_back` days, in lexicographic (and therefore chronological) order.
    ///
    /// Month directories are filtered loosely: a month is kept unless it
    /// ended more than `days_back + 31` days ago. Directory names that are
    /// not `YYYY-MM` are ignored. With `include_rotated == false` only the
    /// primary `.log` files are returned, not their `.log.N` backups.
    pub fn find_log_files(&self, app_name: &str, days_back: u32, include_rotated: bool) -> Vec<PathBuf> {
        // A window reaching past the earliest representable date keeps everything.
        let cutoff = self
            .now()
            .date_naive()
            .checked_sub_signed(Duration::days(i64::from(days_back) + 31))
            .unwrap_or(NaiveDate::MIN);
        let Ok(months) = fs::read_dir(self.base_dir.join(app_name)) else {
            return Vec::new();
        };

        let mut files = Vec::new();
        for month in months.flatten() {
            let month_dir = month.path();
            if !month_dir.is_dir() {
                continue;
            }
            let Some(end) = month_dir
                .file_name()
                .and_then(|n| n.to_str())
                .and_then(month_end)
            else {
                continue;
            };
            if end < cutoff {
                continue;
            }

            let Ok(entries) = fs::read_dir(&month_dir) else {
                continue;
            };
            for entry in entries.flatten() {
                let path = entry.path();
                let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                    continue;
                };
                if !name.contains(".log") || !path.is_file() {
                    continue;
                }
                if !include_rotated && !name.ends_with(".log") {
                    continue;
                }
                files.push(path);
            }
        }

        files.sort();
        files
    }

    /// Matching records in file then line order, at most `max_results`.
    ///
    /// **Parameters**
    /// - `query`: case-insensitive regular expression matched against the
    ///   `message` field.
    /// - `level`: keep only records with exactly this level.
    ///
    /// **Returns**
    /// - `Err(InvalidQuery)` if `query` is not a valid regex. Bad file
    ///   content never produces an error.
    pub fn search_logs(
        &self,
        app_name: &str,
        query: Option<&str>,
        level: Option<Level>,
        days_back: u32,
        max_results: usize,
    ) -> Result<Vec<LogEntry>> {
        let regex = query.map(compile_query).transpose()?;
        let mut results = Vec::new();
        if max_results == 0 {
            return Ok(results);
        }

        for path in self.find_log_files(app_name, days_back, true) {
            let flow = scan_file(&path, |entry| {
                if !level_matches(&entry, level) {
                    return ControlFlow::Continue(());
                }
                if let Some(regex) = &regex {
                    if !regex.is_match(entry.message().unwrap_or("")) {
                        return ControlFlow::Continue(());
                    }
                }
                results.push(entry);
                if results.len() >= max_results {
                    ControlFlow::Break(())
                } else {
                    ControlFlow::Continue(())
                }
            });
            if flow.is_break() {
                break;
            }
        }
        Ok(results)
    }

    /// Records with a timestamp in `[start, end]`, optionally of one level,
    /// sorted by timestamp across all files.
    ///
    /// Records with a missing or unparseable timestamp are left out.
    pub fn get_logs_by_time_range(
        &self,
        app_name: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        level: Option<Level>,
    ) -> Vec<LogEntry> {
        let days_back = (self.now() - start).num_days().saturating_add(1).max(0);
        let days_back = u32::try_from(days_back).unwrap_or(u32::MAX);

        let mut results = Vec::new();
        for path in self.find_log_files(app_name, days_back, true) {
            let _ = scan_file(&path, |entry| {
                let in_range = entry
                    .timestamp()
                    .is_some_and(|ts| start <= ts && ts <= end);
                if in_range && level_matches(&entry, level) {
                    results.push(entry);
                }
                ControlFlow::Continue(())
            });
        }

        results.sort_by(|a, b| a.timestamp_str().cmp(&b.timestamp_str()));
        results
    }

    /// Number of records per level over the look-back window. Lines without
    /// a string `level` count as [`UNKNOWN_LEVEL`].
    pub fn count_logs(&self, app_name: &str, level: Option<Level>, days_back: u32) -> BTreeMap<String, usize> {
        let mut counts = BTreeMap::new();
        for path in self.find_log_files(app_name, days_back, true) {
            let _ = scan_file(&path, |entry| {
                let entry_level = entry.level().unwrap_or(UNKNOWN_LEVEL);
                if level.map_or(true, |l| l.as_str() == entry_level) {
                    *counts.entry(entry_level.to_string()).or_insert(0) += 1;
                }
                ControlFlow::Continue(())
            });
        }
        counts
    }
}

fn compile_query(query: &str) -> Result<Regex> {
    Ok(RegexBuilder::new(query).case_insensitive(true).build()?)
}

fn level_matches(entry: &LogEntry, level: Option<Level>) -> bool {
    level.map_or(true, |l| entry.level() == Some(l.as_str()))
}

/// Last calendar day of a `YYYY-MM` month directory name.
fn month_end(name: &str) -> Option<NaiveDate> {
    let bytes = name.as_bytes();
    if bytes.len() != 7 || bytes[4] != b'-' {
        return None;
    }
    if !bytes[..4].iter().chain(&bytes[5..]).all(u8::is_ascii_digit) {
        return None;
    }
    let year: i32 = name[..4].parse().ok()?;
    let month: u32 = name[5..].parse().ok()?;
    let first = NaiveDate::from_ymd_opt(year, month, 1)?;
    let next = first.checked_add_months(Months::new(1))?;
    next.pred_opt()
}

/// Feed every parseable, non-empty JSON object in `path` to `visit` until
/// it breaks.
fn scan_file(path: &Path, mut visit: impl FnMut(LogEntry) -> ControlFlow<()>) -> ControlFlow<()> {
    let Ok(file) = File::open(path) else {
        return ControlFlow::Continue(());
    };
    for line in BufReader::new(file).split(b'\n') {
        let Ok(line) = line else {
            break;
        };
        let Ok(entry) = LogEntry::parse(&line) else {
            continue;
        };
        if entry.is_empty() {
            continue;
        }
        visit(entry)?;
    }
    ControlFlow::Continue(())
}
