use std::fmt::Display;
use std::sync::Arc;

use crate::config::LogConfig;
use crate::context::{merge, Context};
use crate::format::{ColoredConsoleFormatter, Formatter, JsonFormatter, PlainTextFormatter};
use crate::manager::SinkManager;
use crate::record::{Fields, Level, LogRecord};
use crate::sink::{ConsoleSink, LogSink};

/// Logging facade bound to one logger name, one app and one ambient
/// [`Context`].
///
/// The five severity methods all funnel into [`Logger::log`], which merges
/// context, builds the [`LogRecord`] and hands it to [`Logger::emit`].
/// Emission never fails from the caller's point of view: sink errors are
/// reported on stderr together with the rendered line.
///
/// Cloning is cheap and clones share the same sinks.
#[derive(Clone)]
pub struct Logger {
    name: String,
    config: LogConfig,
    context: Context,
    formatter: Arc<dyn Formatter>,
    manager: Arc<SinkManager>,
    console: Option<Arc<dyn LogSink>>,
    taps: Vec<Arc<dyn LogSink>>,
}

impl Logger {
    /// Build a logger writing through the process-wide [`SinkManager`].
    pub fn new(name: impl Into<String>, config: LogConfig) -> Self {
        Self::with_manager(name, config, SinkManager::global())
    }

    /// Build a logger writing through a specific [`SinkManager`].
    pub fn with_manager(name: impl Into<String>, config: LogConfig, manager: Arc<SinkManager>) -> Self {
        let formatter: Arc<dyn Formatter> = if config.use_json {
            Arc::new(JsonFormatter)
        } else {
            Arc::new(PlainTextFormatter)
        };
        let console = config
            .console_enabled
            .then(|| Arc::new(ConsoleSink::new()) as Arc<dyn LogSink>);

        Logger {
            name: name.into(),
            config,
            context: Context::default(),
            formatter,
            manager,
            console,
            taps: Vec::new(),
        }
    }

    /// Merge `context` into the ambient context; new keys win.
    #[must_use]
    pub fn with_context(mut self, context: Context) -> Self {
        self.context = self.context.merged_with(&context);
        self
    }

    #[must_use]
    pub fn with_username(mut self, username: impl Into<String>) -> Self {
        self.context = self.context.clone().with_username(username);
        self
    }

    /// Replace the formatter used for the file sink and taps.
    #[must_use]
    pub fn with_formatter(mut self, formatter: Arc<dyn Formatter>) -> Self {
        self.formatter = formatter;
        self
    }

    /// Mirror coloured lines to `sink` instead of stderr. Replaces any
    /// previous console sink and enables mirroring.
    #[must_use]
    pub fn with_console_sink(mut self, sink: Arc<dyn LogSink>) -> Self {
        self.config.console_enabled = true;
        self.console = Some(sink);
        self
    }

    /// Additionally send every rendered file line to `sink`.
    #[must_use]
    pub fn with_tap(mut self, sink: Arc<dyn LogSink>) -> Self {
        self.taps.push(sink);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn app_name(&self) -> &str {
        &self.config.app_name
    }

    pub fn config(&self) -> &LogConfig {
        &self.config
    }

    pub fn context(&self) -> &Context {
        &self.context
    }

    pub fn debug(&self, message: impl Into<String>, fields: Fields) {
        self.log(Level::Debug, message, fields);
    }

    pub fn info(&self, message: impl Into<String>, fields: Fields) {
        self.log(Level::Info, message, fields);
    }

    pub fn warning(&self, message: impl Into<String>, fields: Fields) {
        self.log(Level::Warning, message, fields);
    }

    pub fn error(&self, message: impl Into<String>, fields: Fields) {
        self.log(Level::Error, message, fields);
    }

    pub fn critical(&self, message: impl Into<String>, fields: Fields) {
        self.log(Level::Critical, message, fields);
    }

    /// Single entry point behind every severity method.
    pub fn log(&self, level: Level, message: impl Into<String>, fields: Fields) {
        self.log_as(&self.name, level, message, fields);
    }

    /// Like [`log`](Self::log) with a different logger name on the record,
    /// e.g. a `tracing` target. Context and sinks stay those of `self`.
    pub fn log_as(&self, logger_name: &str, level: Level, message: impl Into<String>, fields: Fields) {
        let fields = merge(&self.context, fields);
        let record = LogRecord::new(level, logger_name, message, fields);
        self.emit(&record);
    }

    /// Log with a severity given by name. An unknown name is reported on
    /// stderr and the record is dropped.
    pub fn log_named(&self, level: &str, message: impl Into<String>, fields: Fields) {
        let message: String = message.into();
        match level.parse::<Level>() {
            Ok(level) => self.log(level, message, fields),
            Err(e) => report("record dropped", &e, &message),
        }
    }

    /// Write an already built record to the dated file, the taps and, if
    /// enabled and the level qualifies, the console.
    pub fn emit(&self, record: &LogRecord) {
        let line = self.formatter.render(record);

        let written = self
            .manager
            .sink_for(
                &self.config.base_dir,
                &self.config.app_name,
                record.timestamp(),
                &self.config.rotation,
            )
            .and_then(|sink| sink.write_line(&line));
        if let Err(e) = written {
            report("log file write failed", &e, &line);
        }

        for tap in &self.taps {
            if let Err(e) = tap.write_line(&line) {
                report("log tap write failed", &e, &line);
            }
        }

        if let Some(console) = &self.console {
            if record.level() >= self.config.console_level {
                let colored = ColoredConsoleFormatter.render(record);
                if let Err(e) = console.write_line(&colored) {
                    report("console write failed", &e, &line);
                }
            }
        }
    }
}

fn report(what: &str, err: &dyn Display, line: &str) {
    eprintln!("{what}: {err}; record: {line}");
}

/// Logger named `name` built from the process-wide defaults.
pub fn get_logger(name: impl Into<String>) -> Logger {
    Logger::new(name, LogConfig::from_defaults())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory_sink::MemorySink;
    use crate::record::{LogEntry, NO_USER};
    use serde_json::{json, Value};
    use std::fs;
    use tempfile::TempDir;

    fn test_logger(dir: &TempDir) -> (Logger, Arc<MemorySink>) {
        let tap = Arc::new(MemorySink::new());
        let config = LogConfig::new(dir.path(), "shop").with_console(false);
        let logger = Logger::with_manager("shop.api", config, Arc::new(SinkManager::new()))
            .with_tap(tap.clone());
        (logger, tap)
    }

    fn parsed(line: &str) -> serde_json::Map<String, Value> {
        LogEntry::parse(line.as_bytes()).unwrap().into_map()
    }

    #[test]
    fn writes_json_line_to_dated_file() {
        let dir = TempDir::new().unwrap();
        let (logger, _tap) = test_logger(&dir);

        logger.info("hello", Fields::new().action("START"));

        let path = crate::manager::dated_path(dir.path(), "shop", chrono::Utc::now());
        let content = fs::read_to_string(path).unwrap();
        let map = parsed(content.trim_end());
        assert_eq!(map["message"], json!("hello"));
        assert_eq!(map["level"], json!("INFO"));
        assert_eq!(map["logger"], json!("shop.api"));
        assert_eq!(map["action"], json!("START"));
        assert_eq!(map["username"], json!(NO_USER));
    }

    #[test]
    fn all_severities_share_merge_semantics() {
        let dir = TempDir::new().unwrap();
        let (logger, tap) = test_logger(&dir);
        let logger = logger.with_context(
            Context::new()
                .with_username("ambient")
                .with("tenant", "acme")
                .with("region", "eu"),
        );

        let call = || {
            Fields::new()
                .action("ACT")
                .extra("username", "from-extra")
                .extra("region", "us")
                .extra("duration_ms", 1.5)
        };
        logger.debug("m", call());
        logger.info("m", call());
        logger.warning("m", call());
        logger.error("m", call());
        logger.critical("m", call());

        let lines = tap.lines();
        assert_eq!(lines.len(), 5);
        let levels: Vec<Value> = lines.iter().map(|l| parsed(l)["level"].clone()).collect();
        assert_eq!(
            levels,
            vec![json!("DEBUG"), json!("INFO"), json!("WARNING"), json!("ERROR"), json!("CRITICAL")]
        );

        let strip = |line: &str| {
            let mut map = parsed(line);
            map.remove("level");
            map.remove("timestamp");
            map
        };
        let first = strip(&lines[0]);
        assert_eq!(first["username"], json!("from-extra"));
        assert_eq!(first["action"], json!("ACT"));
        assert_eq!(first["tenant"], json!("acme"));
        assert_eq!(first["region"], json!("us"));
        assert_eq!(first["duration_ms"], json!(1.5));
        for line in &lines[1..] {
            assert_eq!(strip(line), first);
        }
    }

    #[test]
    fn log_named_rejects_unknown_levels() {
        let dir = TempDir::new().unwrap();
        let (logger, tap) = test_logger(&dir);

        logger.log_named("warn", "ok", Fields::new());
        logger.log_named("LOUD", "dropped", Fields::new());

        let lines = tap.lines();
        assert_eq!(lines.len(), 1);
        assert_eq!(parsed(&lines[0])["level"], json!("WARNING"));
    }

    #[test]
    fn plain_text_file_format() {
        let dir = TempDir::new().unwrap();
        let config = LogConfig::new(dir.path(), "shop")
            .with_console(false)
            .with_json(false);
        let tap = Arc::new(MemorySink::new());
        let logger = Logger::with_manager("shop.cli", config, Arc::new(SinkManager::new()))
            .with_tap(tap.clone());

        logger.warning("disk almost full", Fields::new());
        assert!(tap.lines()[0].ends_with(" - WARNING - shop.cli - disk almost full"));
    }

    #[test]
    fn loggers_sharing_a_path_share_a_sink() {
        let dir = TempDir::new().unwrap();
        let manager = Arc::new(SinkManager::new());
        let config = LogConfig::new(dir.path(), "shop").with_console(false);
        let a = Logger::with_manager("shop.a", config.clone(), manager.clone());
        let b = Logger::with_manager("shop.b", config, manager.clone());

        a.info("from a", Fields::new());
        b.info("from b", Fields::new());

        assert_eq!(manager.len(), 1);
        let path = crate::manager::dated_path(dir.path(), "shop", chrono::Utc::now());
        assert_eq!(fs::read_to_string(path).unwrap().lines().count(), 2);
    }

    #[test]
    fn unwritable_base_dir_does_not_panic() {
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("file");
        fs::write(&blocker, b"x").unwrap();
        let tap = Arc::new(MemorySink::new());
        let config = LogConfig::new(&blocker, "shop").with_console(false);
        let logger = Logger::with_manager("shop", config, Arc::new(SinkManager::new()))
            .with_tap(tap.clone());

        logger.error("still delivered to taps", Fields::new());
        assert_eq!(tap.len(), 1);
    }

    #[test]
    fn console_mirrors_info_and_above() {
        let dir = TempDir::new().unwrap();
        let (logger, _tap) = test_logger(&dir);
        let console = Arc::new(MemorySink::new());
        let logger = logger.with_console_sink(console.clone());
        let clone = logger.clone();

        logger.debug("too chatty", Fields::new());
        logger.info("ready", Fields::new());
        clone.error("failed", Fields::new());

        let lines = console.lines();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with(ColoredConsoleFormatter::color(Level::Info)));
        assert!(lines[0].contains(" - INFO - shop.api - ready"));
        assert!(lines[0].ends_with(crate::format::RESET));
        assert!(lines[1].starts_with(ColoredConsoleFormatter::color(Level::Error)));
    }

    #[test]
    fn console_level_is_configurable() {
        let dir = TempDir::new().unwrap();
        let console = Arc::new(MemorySink::new());
        let config = LogConfig::new(dir.path(), "shop").with_console_level(Level::Debug);
        let logger = Logger::with_manager("shop", config, Arc::new(SinkManager::new()))
            .with_console_sink(console.clone());

        logger.debug("now visible", Fields::new());
        assert_eq!(console.len(), 1);
    }

    #[test]
    fn console_disabled_by_config_writes_nothing() {
        let dir = TempDir::new().unwrap();
        let (logger, tap) = test_logger(&dir);

        assert!(logger.console.is_none());
        logger.critical("file only", Fields::new());
        assert_eq!(tap.len(), 1);
    }

    #[test]
    fn console_enabled_by_config_installs_one_sink() {
        let dir = TempDir::new().unwrap();
        let config = LogConfig::new(dir.path(), "shop").with_console(true);
        let logger = Logger::with_manager("shop", config, Arc::new(SinkManager::new()));
        let clone = logger.clone();

        let (Some(a), Some(b)) = (&logger.console, &clone.console) else {
            panic!("console sink missing");
        };
        assert!(Arc::ptr_eq(a, b));
    }

    #[test]
    fn with_username_sets_ambient_identity() {
        let dir = TempDir::new().unwrap();
        let (logger, tap) = test_logger(&dir);
        let logger = logger.with_username("carol");

        logger.info("a", Fields::new());
        logger.info("b", Fields::new().username("dave"));

        let lines = tap.lines();
        assert_eq!(parsed(&lines[0])["username"], json!("carol"));
        assert_eq!(parsed(&lines[1])["username"], json!("dave"));
    }
}
