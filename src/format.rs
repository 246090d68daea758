use crate::record::{Level, LogRecord};
use serde_json::Value;

/// Renders a [`LogRecord`] into a single line of text.
///
/// The returned string never carries a trailing newline; sinks append the
/// line separator themselves.
pub trait Formatter: Send + Sync {
    fn render(&self, record: &LogRecord) -> String;
}

/// One JSON object per record, as consumed by log aggregation pipelines
/// and by [`LogSearcher`](crate::search::LogSearcher).
///
/// Every extra field is emitted alongside the standard ones. Values with no
/// JSON form are expected to have been stored as strings already (see
/// [`Extra::insert_display`](crate::record::Extra::insert_display));
/// non-finite floats end up as `null`. Exception text, when present, is a
/// JSON array of strings under `exc_info`.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonFormatter;

impl Formatter for JsonFormatter {
    fn render(&self, record: &LogRecord) -> String {
        Value::Object(record.to_json_map()).to_string()
    }
}

/// `<timestamp> - <LEVEL> - <logger> - <message>` with a UTC timestamp.
///
/// Used for the file sink when JSON output is switched off.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlainTextFormatter;

impl Formatter for PlainTextFormatter {
    fn render(&self, record: &LogRecord) -> String {
        plain_line(record)
    }
}

pub const RESET: &str = "\x1b[0m";

/// Same layout as [`PlainTextFormatter`], wrapped in an ANSI color picked by
/// level. Meant for terminals only, never for the archive.
#[derive(Debug, Clone, Copy, Default)]
pub struct ColoredConsoleFormatter;

impl ColoredConsoleFormatter {
    pub const fn color(level: Level) -> &'static str {
        match level {
            Level::Debug => "\x1b[36m",
            Level::Info => "\x1b[32m",
            Level::Warning => "\x1b[33m",
            Level::Error => "\x1b[31m",
            Level::Critical => "\x1b[35m",
        }
    }
}

impl Formatter for ColoredConsoleFormatter {
    fn render(&self, record: &LogRecord) -> String {
        format!("{}{}{}", Self::color(record.level()), plain_line(record), RESET)
    }
}

fn plain_line(record: &LogRecord) -> String {
    format!(
        "{} - {} - {} - {}",
        record.timestamp().format("%Y-%m-%d %H:%M:%S,%3f"),
        record.level(),
        record.logger_name(),
        record.message()
    )
}
