use chrono::{DateTime, NaiveDateTime, SecondsFormat, SubsecRound, Utc};
use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::error::Error;
use std::fmt;
use std::ops::Deref;
use std::str::FromStr;

use crate::error::{LogError, Result};

/// Username recorded when no identity is known.
pub const NO_USER: &str = "-";

/// JSON keys owned by the record itself. Entries in [`Extra`] with one of
/// these names are dropped when a [`LogRecord`] is built.
pub const RESERVED_FIELDS: &[&str] = &[
    "timestamp",
    "level",
    "logger",
    "message",
    "action",
    "method",
    "username",
    "module",
    "exc_info",
];

/// Record severity, ordered from least to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Level {
    Debug,
    Info,
    Warning,
    Error,
    Critical,
}

impl Level {
    pub const ALL: [Level; 5] = [
        Level::Debug,
        Level::Info,
        Level::Warning,
        Level::Error,
        Level::Critical,
    ];

    /// Canonical upper-case name, as written to the archive.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Level::Debug => "DEBUG",
            Level::Info => "INFO",
            Level::Warning => "WARNING",
            Level::Error => "ERROR",
            Level::Critical => "CRITICAL",
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parses a severity name case-insensitively. `WARN` is accepted as an
/// alias for `WARNING`; anything else fails with [`LogError::InvalidLevel`].
impl FromStr for Level {
    type Err = LogError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "DEBUG" => Ok(Level::Debug),
            "INFO" => Ok(Level::Info),
            "WARNING" | "WARN" => Ok(Level::Warning),
            "ERROR" => Ok(Level::Error),
            "CRITICAL" => Ok(Level::Critical),
            _ => Err(LogError::InvalidLevel(s.to_string())),
        }
    }
}

/// Open-ended structured fields carried alongside a record.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Extra(BTreeMap<String, Value>);

impl Extra {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.0.insert(key.into(), value.into())
    }

    /// Stores the `Display` form of a value that has no JSON representation
    /// of its own (errors, paths, ids).
    pub fn insert_display(&mut self, key: impl Into<String>, value: &dyn fmt::Display) {
        self.0.insert(key.into(), Value::String(value.to_string()));
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.0.remove(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    /// Copies every entry of `other` over `self`, `other` winning on collision.
    pub fn extend_from(&mut self, other: &Extra) {
        for (k, v) in other.iter() {
            self.0.insert(k.clone(), v.clone());
        }
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Extra {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Extra(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

impl IntoIterator for Extra {
    type Item = (String, Value);
    type IntoIter = std::collections::btree_map::IntoIter<String, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

/// Call-site semantic arguments plus caller-supplied structured fields.
///
/// This is the "positional then keyword" part of every logging call:
/// `action`, `method`, `username`, `module_name`, then `extra`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Fields {
    pub action: Option<String>,
    pub method: Option<String>,
    pub username: Option<String>,
    pub module_name: Option<String>,
    pub extra: Extra,
}

impl Fields {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn action(mut self, action: impl Into<String>) -> Self {
        self.action = Some(action.into());
        self
    }

    pub fn method(mut self, method: impl Into<String>) -> Self {
        self.method = Some(method.into());
        self
    }

    pub fn username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    pub fn module_name(mut self, module_name: impl Into<String>) -> Self {
        self.module_name = Some(module_name.into());
        self
    }

    pub fn extra(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.extra.insert(key, value);
        self
    }

    pub fn with_extra(mut self, extra: Extra) -> Self {
        self.extra.extend_from(&extra);
        self
    }
}

/// One structured log event.
///
/// Built at the moment of emission and only read afterwards: the `with_*`
/// adjustments consume the record before it is handed to a logger. The
/// message is already interpolated.
#[derive(Debug, Clone, PartialEq)]
pub struct LogRecord {
    timestamp: DateTime<Utc>,
    level: Level,
    logger_name: String,
    message: String,
    action: Option<String>,
    method: Option<String>,
    username: Option<String>,
    module_name: Option<String>,
    exc_info: Option<Vec<String>>,
    extra: Extra,
}

impl LogRecord {
    /// Build a record stamped with the current UTC time.
    ///
    /// A missing username becomes [`NO_USER`]. Keys of `fields.extra` that
    /// collide with [`RESERVED_FIELDS`] are dropped.
    pub fn new(
        level: Level,
        logger_name: impl Into<String>,
        message: impl Into<String>,
        fields: Fields,
    ) -> Self {
        let Fields {
            action,
            method,
            username,
            module_name,
            mut extra,
        } = fields;
        for key in RESERVED_FIELDS {
            extra.remove(key);
        }

        LogRecord {
            timestamp: Utc::now().trunc_subsecs(6),
            level,
            logger_name: logger_name.into(),
            message: message.into(),
            action,
            method,
            username: Some(username.unwrap_or_else(|| NO_USER.to_string())),
            module_name,
            exc_info: None,
            extra,
        }
    }

    /// Override the emission time. Precision is cut to microseconds, the
    /// resolution of the archive format.
    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp.trunc_subsecs(6);
        self
    }

    /// Attach pre-formatted exception text, one entry per line of the trace.
    pub fn with_exc_info(mut self, lines: Vec<String>) -> Self {
        self.exc_info = Some(lines);
        self
    }

    /// Attach an error and its `source()` chain as `exc_info`.
    pub fn with_error(self, err: &(dyn Error + 'static)) -> Self {
        let lines = error_chain(err);
        self.with_exc_info(lines)
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn level(&self) -> Level {
        self.level
    }

    pub fn logger_name(&self) -> &str {
        &self.logger_name
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn action(&self) -> Option<&str> {
        self.action.as_deref()
    }

    pub fn method(&self) -> Option<&str> {
        self.method.as_deref()
    }

    pub fn username(&self) -> Option<&str> {
        self.username.as_deref()
    }

    pub fn module_name(&self) -> Option<&str> {
        self.module_name.as_deref()
    }

    pub fn exc_info(&self) -> Option<&[String]> {
        self.exc_info.as_deref()
    }

    pub fn extra(&self) -> &Extra {
        &self.extra
    }

    /// Timestamp as written to the archive: RFC 3339, microseconds, `Z`.
    pub fn timestamp_string(&self) -> String {
        format_timestamp(self.timestamp)
    }

    /// Flatten the record into the JSON object written on one archive line.
    ///
    /// Extra entries go in first so the standard fields always win.
    pub fn to_json_map(&self) -> Map<String, Value> {
        let mut map: Map<String, Value> = self
            .extra
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        map.insert("timestamp".into(), Value::String(self.timestamp_string()));
        map.insert("level".into(), Value::String(self.level.as_str().into()));
        map.insert("logger".into(), Value::String(self.logger_name.clone()));
        map.insert("message".into(), Value::String(self.message.clone()));
        map.insert("action".into(), opt_string(&self.action));
        map.insert("method".into(), opt_string(&self.method));
        map.insert("username".into(), opt_string(&self.username));
        if let Some(module) = &self.module_name {
            map.insert("module".into(), Value::String(module.clone()));
        }
        if let Some(lines) = &self.exc_info {
            map.insert(
                "exc_info".into(),
                Value::Array(lines.iter().cloned().map(Value::String).collect()),
            );
        }
        map
    }
}

impl Serialize for LogRecord {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.to_json_map().serialize(serializer)
    }
}

fn opt_string(value: &Option<String>) -> Value {
    value.clone().map(Value::String).unwrap_or(Value::Null)
}

pub(crate) fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parse an archived timestamp. Offsets (including a literal `Z`) are
/// honoured; a timestamp without offset is taken as UTC.
pub fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(s) {
        return Some(ts.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

/// Display of an error followed by each of its sources.
pub fn error_chain(err: &(dyn Error + 'static)) -> Vec<String> {
    let mut lines = vec![err.to_string()];
    let mut source = err.source();
    while let Some(cause) = source {
        lines.push(format!("Caused by: {cause}"));
        source = cause.source();
    }
    lines
}

/// One archived line, parsed back into a JSON object.
///
/// The searcher hands these out rather than [`LogRecord`]s because archive
/// lines may carry levels or fields this crate did not write.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct LogEntry(Map<String, Value>);

impl LogEntry {
    /// Parse one NDJSON line. Anything that is not a JSON object is a
    /// [`LogError::MalformedRecord`].
    pub fn parse(line: &[u8]) -> Result<Self> {
        match serde_json::from_slice::<Value>(line) {
            Ok(Value::Object(map)) => Ok(LogEntry(map)),
            Ok(other) => Err(LogError::MalformedRecord(format!(
                "expected a JSON object, found {other}"
            ))),
            Err(e) => Err(LogError::MalformedRecord(e.to_string())),
        }
    }

    fn str_field(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str)
    }

    pub fn level(&self) -> Option<&str> {
        self.str_field("level")
    }

    pub fn message(&self) -> Option<&str> {
        self.str_field("message")
    }

    pub fn timestamp_str(&self) -> Option<&str> {
        self.str_field("timestamp")
    }

    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        self.timestamp_str().and_then(parse_timestamp)
    }

    pub fn action(&self) -> Option<&str> {
        self.str_field("action")
    }

    pub fn method(&self) -> Option<&str> {
        self.str_field("method")
    }

    pub fn username(&self) -> Option<&str> {
        self.str_field("username")
    }

    pub fn into_map(self) -> Map<String, Value> {
        self.0
    }

    /// Rebuild a typed record from the parsed line.
    pub fn to_record(&self) -> Result<LogRecord> {
        let level: Level = self
            .level()
            .ok_or_else(|| LogError::MalformedRecord("missing level".into()))?
            .parse()
            .map_err(|e: LogError| LogError::MalformedRecord(e.to_string()))?;
        let message = self
            .message()
            .ok_or_else(|| LogError::MalformedRecord("missing message".into()))?;
        let timestamp = self
            .timestamp()
            .ok_or_else(|| LogError::MalformedRecord("missing or invalid timestamp".into()))?;

        let own = |key: &str| self.str_field(key).map(str::to_string);
        let extra: Extra = self
            .0
            .iter()
            .filter(|(k, _)| !RESERVED_FIELDS.contains(&k.as_str()))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        let fields = Fields {
            action: own("action"),
            method: own("method"),
            username: own("username"),
            module_name: own("module"),
            extra,
        };
        let mut record = LogRecord::new(level, own("logger").unwrap_or_default(), message, fields)
            .with_timestamp(timestamp);

        if let Some(Value::Array(lines)) = self.0.get("exc_info") {
            let lines = lines
                .iter()
                .map(|v| v.as_str().map(str::to_string).unwrap_or_else(|| v.to_string()))
                .collect();
            record = record.with_exc_info(lines);
        }
        Ok(record)
    }
}

impl Deref for LogEntry {
    type Target = Map<String, Value>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}
