/// Errors produced by the logging pipeline and the log searcher.
///
/// Emission paths never hand these back to application code; they are
/// reported on stderr instead. Search and configuration APIs return them
/// through [`Result`].
#[derive(thiserror::Error, Debug)]
pub enum LogError {
    /// Directory creation, file open, rotation or write failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A severity name that is not one of DEBUG/INFO/WARNING/ERROR/CRITICAL.
    #[error("invalid log level: {0}")]
    InvalidLevel(String),

    /// An archived line that could not be turned back into a record.
    #[error("malformed record: {0}")]
    MalformedRecord(String),

    /// The free-text query passed to the searcher is not a valid regex.
    #[error("invalid search query: {0}")]
    InvalidQuery(#[from] regex::Error),

    /// Installing the global `tracing` subscriber failed.
    #[error("failed to install subscriber: {0}")]
    SubscriberInit(String),
}

/// Result type alias for fallible operations in this crate.
pub type Result<T> = std::result::Result<T, LogError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_messages() {
        let err = LogError::InvalidLevel("VERBOSE".to_string());
        assert_eq!(err.to_string(), "invalid log level: VERBOSE");

        let err = LogError::MalformedRecord("missing level".to_string());
        assert_eq!(err.to_string(), "malformed record: missing level");
    }

    #[test]
    fn io_errors_convert() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err: LogError = io_err.into();
        assert!(matches!(err, LogError::Io(_)));
        assert!(err.to_string().contains("denied"));
    }

    #[test]
    fn regex_errors_convert() {
        let err: LogError = regex::Regex::new("(").unwrap_err().into();
        assert!(matches!(err, LogError::InvalidQuery(_)));
    }

    #[test]
    fn error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<LogError>();
    }
}
