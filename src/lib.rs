pub mod error;
pub mod record;
pub mod format;
pub mod context;
pub mod sink;
pub mod memory_sink;
pub mod manager;
pub mod defaults;
pub mod config;
pub mod env;
pub mod logger;
pub mod instrument;
pub mod search;

#[cfg(feature = "bridge")]
pub mod layer;
#[cfg(feature = "bridge")]
pub mod init;

pub use config::LogConfig;
pub use context::Context;
pub use error::{LogError, Result};
pub use instrument::{CallContext, CallSite, RequestContext, RequestContextExtractor};
pub use logger::{get_logger, Logger};
pub use record::{Extra, Fields, Level, LogEntry, LogRecord};
pub use search::LogSearcher;
