use serde_json::Value;
use tracing::field::{Field, Visit};
use tracing::{Event, Level as TracingLevel, Subscriber};
use tracing_subscriber::layer::{Context, Layer};
use tracing_subscriber::registry::LookupSpan;

use crate::logger::Logger;
use crate::record::{Fields, Level};

/// `tracing_subscriber` layer that turns every event into a record and
/// emits it through a [`Logger`].
///
/// Event fields named `action`, `method`, `username` and `module` become
/// the record's semantic fields, `message` becomes its message and all
/// remaining fields go to `extra`. The event target is used as the logger
/// name. `TRACE` events are recorded as DEBUG.
pub struct ArchiveLayer {
    logger: Logger,
    min_level: Level,
}

impl ArchiveLayer {
    pub fn new(logger: Logger) -> Self {
        Self {
            logger,
            min_level: Level::Debug,
        }
    }

    /// Drop events below `level`.
    #[must_use]
    pub fn with_min_level(mut self, level: Level) -> Self {
        self.min_level = level;
        self
    }
}

pub fn map_level(level: &TracingLevel) -> Level {
    match *level {
        TracingLevel::ERROR => Level::Error,
        TracingLevel::WARN => Level::Warning,
        TracingLevel::INFO => Level::Info,
        _ => Level::Debug,
    }
}

impl<S> Layer<S> for ArchiveLayer
where
    S: Subscriber + for<'span> LookupSpan<'span>,
{
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let meta = event.metadata();
        let level = map_level(meta.level());
        if level < self.min_level {
            return;
        }

        let mut fields = Fields::new();
        let mut message: Option<String> = None;
        let mut visitor = FieldVisitor {
            fields: &mut fields,
            message: &mut message,
        };
        event.record(&mut visitor);

        // The logger's own name is kept when the event carries no target.
        let target = meta.target();
        let name = if target.is_empty() { self.logger.name() } else { target };
        self.logger
            .log_as(name, level, message.unwrap_or_default(), fields);
    }
}

pub struct FieldVisitor<'a> {
    pub fields: &'a mut Fields,
    pub message: &'a mut Option<String>,
}

impl FieldVisitor<'_> {
    fn put(&mut self, field: &Field, value: Value) {
        match field.name() {
            "message" => *self.message = Some(as_text(&value)),
            "action" => self.fields.action = Some(as_text(&value)),
            "method" => self.fields.method = Some(as_text(&value)),
            "username" => self.fields.username = Some(as_text(&value)),
            "module" => self.fields.module_name = Some(as_text(&value)),
            name => {
                self.fields.extra.insert(name, value);
            }
        }
    }
}

fn as_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

impl Visit for FieldVisitor<'_> {
    fn record_str(&mut self, field: &Field, value: &str) {
        self.put(field, Value::String(value.to_string()));
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.put(field, Value::from(value));
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.put(field, Value::from(value));
    }

    fn record_f64(&mut self, field: &Field, value: f64) {
        self.put(field, Value::from(value));
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.put(field, Value::from(value));
    }

    fn record_error(&mut self, field: &Field, value: &(dyn std::error::Error + 'static)) {
        self.put(field, Value::String(value.to_string()));
    }

    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        self.put(field, Value::String(format!("{:?}", value)));
    }
}
