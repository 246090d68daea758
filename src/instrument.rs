use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt::{Debug, Display};
use std::future::Future;
use std::time::Instant;

use crate::logger::Logger;
use crate::record::{Extra, Fields, Level, LogRecord};

/// Default slow-call threshold for the performance variant.
pub const DEFAULT_THRESHOLD_MS: f64 = 1000.0;

const CALL_METHOD: &str = "CALL";
const SYSTEM_USER: &str = "system";

/// Request data produced by an external extractor (an HTTP framework
/// integration, typically). Every field is optional; whatever is present is
/// copied into the ENTRY record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RequestContext {
    pub method: Option<String>,
    pub url: Option<String>,
    pub path: Option<String>,
    pub query_params: Option<Value>,
    pub headers: Option<Value>,
    pub client_host: Option<String>,
    pub body: Option<Value>,
    pub username: Option<String>,
}

impl RequestContext {
    /// Request fields as record extras. `bulky` controls whether body,
    /// headers and query parameters are included.
    fn to_extra(&self, bulky: bool) -> Extra {
        let mut extra = Extra::new();
        let mut put = |key: &str, value: Option<Value>| {
            if let Some(v) = value {
                extra.insert(key, v);
            }
        };
        put("url", self.url.clone().map(Value::String));
        put("path", self.path.clone().map(Value::String));
        put("client_host", self.client_host.clone().map(Value::String));
        if bulky {
            put("query_params", self.query_params.clone());
            put("headers", self.headers.clone());
            put("body", self.body.clone());
        }
        extra
    }
}

/// Source of [`RequestContext`] that may need to suspend, e.g. to read a
/// request body. Awaited once, before the ENTRY record is written.
#[async_trait]
pub trait RequestContextExtractor: Send + Sync {
    async fn extract(&self) -> RequestContext;
}

/// Passed explicitly into the wrapped unit of work.
#[derive(Debug, Clone, PartialEq)]
pub struct CallContext {
    pub app_name: String,
    pub call_name: String,
    pub request: RequestContext,
}

/// Wraps units of work with entry/exit or performance records.
///
/// Both variants exist for plain closures and for futures; the records
/// written are the same in either case. Errors returned by the wrapped work
/// are logged and handed back unchanged.
///
/// If the work never completes (a panic unwinding through the closure, or
/// the future being dropped before it resolves), an ERROR record with action
/// `CANCELLED` and the elapsed `duration_ms` is written when the wrapper is
/// torn down.
///
/// ```no_run
/// use daily_log_sink::config::LogConfig;
/// use daily_log_sink::instrument::CallSite;
/// use daily_log_sink::logger::Logger;
///
/// let logger = Logger::new("shop.orders", LogConfig::new("./logs", "shop"));
/// let site = CallSite::new(&logger, "orders::place");
/// let total: Result<u32, String> = site.entry_exit(|_cx| Ok(42));
/// ```
#[derive(Clone)]
pub struct CallSite {
    logger: Logger,
    call_name: String,
    request: RequestContext,
}

impl CallSite {
    pub fn new(logger: &Logger, call_name: impl Into<String>) -> Self {
        CallSite {
            logger: logger.clone(),
            call_name: call_name.into(),
            request: RequestContext::default(),
        }
    }

    #[must_use]
    pub fn with_request(mut self, request: RequestContext) -> Self {
        self.request = request;
        self
    }

    /// Await `extractor` and attach its result.
    pub async fn with_extracted_request(mut self, extractor: &dyn RequestContextExtractor) -> Self {
        self.request = extractor.extract().await;
        self
    }

    pub fn call_name(&self) -> &str {
        &self.call_name
    }

    pub fn context(&self) -> CallContext {
        CallContext {
            app_name: self.logger.app_name().to_string(),
            call_name: self.call_name.clone(),
            request: self.request.clone(),
        }
    }

    /// Run `f` between an ENTRY and an EXIT (or EXCEPTION) record.
    pub fn entry_exit<T, E, F>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(&CallContext) -> Result<T, E>,
        E: Display,
    {
        let cx = self.context();
        self.log_entry();
        let guard = CallGuard::arm(self);
        let result = f(&cx);
        let started = guard.disarm();
        self.log_outcome(&result, started);
        result
    }

    /// Async form of [`entry_exit`](Self::entry_exit).
    pub async fn entry_exit_async<T, E, F, Fut>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(CallContext) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
    {
        let cx = self.context();
        self.log_entry();
        let guard = CallGuard::arm(self);
        let result = f(cx).await;
        let started = guard.disarm();
        self.log_outcome(&result, started);
        result
    }

    /// Run `f` and write one timing record afterwards: WARNING above
    /// `threshold_ms`, DEBUG otherwise, ERROR if `f` failed.
    pub fn performance<T, E, F>(&self, threshold_ms: f64, f: F) -> Result<T, E>
    where
        F: FnOnce(&CallContext) -> Result<T, E>,
        E: Display + Debug,
    {
        let cx = self.context();
        let guard = CallGuard::arm(self);
        let result = f(&cx);
        let started = guard.disarm();
        self.log_timing(&result, started, threshold_ms);
        result
    }

    /// Async form of [`performance`](Self::performance).
    pub async fn performance_async<T, E, F, Fut>(&self, threshold_ms: f64, f: F) -> Result<T, E>
    where
        F: FnOnce(CallContext) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display + Debug,
    {
        let cx = self.context();
        let guard = CallGuard::arm(self);
        let result = f(cx).await;
        let started = guard.disarm();
        self.log_timing(&result, started, threshold_ms);
        result
    }

    fn fields(&self, action: &str, extra: Extra) -> Fields {
        Fields::new()
            .action(action)
            .method(self.request.method.as_deref().unwrap_or(CALL_METHOD))
            .username(self.request.username.as_deref().unwrap_or(SYSTEM_USER))
            .module_name(self.logger.app_name())
            .extra("function", self.call_name.as_str())
            .with_extra(extra)
    }

    fn log_entry(&self) {
        let fields = self.fields("ENTRY", self.request.to_extra(true));
        self.logger
            .debug(format!("Entering {}", self.call_name), fields);
    }

    fn log_outcome<T, E: Display>(&self, result: &Result<T, E>, started: Instant) {
        let mut extra = self.request.to_extra(false);
        extra.insert("duration_ms", elapsed_ms(started));

        match result {
            Ok(_) => {
                let fields = self.fields("EXIT", extra);
                self.logger.debug(format!("Exiting {}", self.call_name), fields);
            }
            Err(e) => {
                extra.insert_display("error", e);
                let fields = self.fields("EXCEPTION", extra);
                self.logger
                    .error(format!("Exception in {}: {}", self.call_name, e), fields);
            }
        }
    }

    fn log_timing<T, E: Display + Debug>(&self, result: &Result<T, E>, started: Instant, threshold_ms: f64) {
        let duration = elapsed_ms(started);
        let mut extra = Extra::new();
        extra.insert("duration_ms", duration);

        let (level, message, exc_info) = match result {
            Ok(_) if duration > threshold_ms => {
                extra.insert("threshold_ms", threshold_ms);
                (
                    Level::Warning,
                    format!(
                        "Slow execution in {}: {:.2}ms (threshold: {:.2}ms)",
                        self.call_name, duration, threshold_ms
                    ),
                    None,
                )
            }
            Ok(_) => (
                Level::Debug,
                format!("Execution time in {}: {:.2}ms", self.call_name, duration),
                None,
            ),
            Err(e) => {
                extra.insert_display("error", e);
                let lines = format!("{e:?}").lines().map(str::to_string).collect();
                (
                    Level::Error,
                    format!("Exception in {} after {:.2}ms: {}", self.call_name, duration, e),
                    Some(lines),
                )
            }
        };

        let fields = crate::context::merge(self.logger.context(), self.fields("PERFORMANCE", extra));
        let mut record = LogRecord::new(level, self.logger.name(), message, fields);
        if let Some(lines) = exc_info {
            record = record.with_exc_info(lines);
        }
        self.logger.emit(&record);
    }

    fn log_cancelled(&self, started: Instant) {
        let mut extra = Extra::new();
        extra.insert("duration_ms", elapsed_ms(started));
        let fields = self.fields("CANCELLED", extra);
        self.logger
            .error(format!("Call {} did not complete", self.call_name), fields);
    }
}

/// Writes the CANCELLED record if dropped while still armed.
struct CallGuard<'a> {
    site: &'a CallSite,
    started: Instant,
    armed: bool,
}

impl<'a> CallGuard<'a> {
    fn arm(site: &'a CallSite) -> Self {
        CallGuard {
            site,
            started: Instant::now(),
            armed: true,
        }
    }

    fn disarm(mut self) -> Instant {
        self.armed = false;
        self.started
    }
}

impl Drop for CallGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.site.log_cancelled(self.started);
        }
    }
}

/// Milliseconds since `started`, rounded to two decimals.
fn elapsed_ms(started: Instant) -> f64 {
    let ms = started.elapsed().as_secs_f64() * 1000.0;
    (ms * 100.0).round() / 100.0
}
