//! User-supplied log sinks.
//!
//! The client always reports through `tracing`. Applications that keep
//! their own log pipeline can additionally install a [`LogSink`] in
//! [`ClientConfig`](crate::ClientConfig); it receives the session-level
//! events (endpoint attempts, handshake outcome, close).

use std::fmt;
use std::sync::Arc;

/// Severity of a log event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LogLevel {
    /// Verbose diagnostics.
    Debug,
    /// Normal lifecycle events.
    Info,
    /// Recoverable problems.
    Warning,
    /// Failures.
    Error,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogLevel::Debug => write!(f, "DEBUG"),
            LogLevel::Info => write!(f, "INFO"),
            LogLevel::Warning => write!(f, "WARN"),
            LogLevel::Error => write!(f, "ERROR"),
        }
    }
}

/// Receiver of client log events.
///
/// Called concurrently from client IO threads.
pub trait LogSink: Send + Sync {
    /// Records one event.
    fn log(&self, level: LogLevel, message: &str);

    /// Returns false to skip formatting events of this level.
    fn is_enabled(&self, _level: LogLevel) -> bool {
        true
    }
}

impl<F> LogSink for F
where
    F: Fn(LogLevel, &str) + Send + Sync,
{
    fn log(&self, level: LogLevel, message: &str) {
        self(level, message)
    }
}

/// Forwards session events to `tracing` and to the optional user sink.
#[derive(Clone, Default)]
pub(crate) struct SessionLogger {
    sink: Option<Arc<dyn LogSink>>,
}

impl SessionLogger {
    pub(crate) fn new(sink: Option<Arc<dyn LogSink>>) -> Self {
        Self { sink }
    }

    pub(crate) fn debug(&self, message: impl AsRef<str>) {
        tracing::debug!("{}", message.as_ref());
        self.forward(LogLevel::Debug, message.as_ref());
    }

    pub(crate) fn info(&self, message: impl AsRef<str>) {
        tracing::info!("{}", message.as_ref());
        self.forward(LogLevel::Info, message.as_ref());
    }

    pub(crate) fn warn(&self, message: impl AsRef<str>) {
        tracing::warn!("{}", message.as_ref());
        self.forward(LogLevel::Warning, message.as_ref());
    }

    pub(crate) fn error(&self, message: impl AsRef<str>) {
        tracing::error!("{}", message.as_ref());
        self.forward(LogLevel::Error, message.as_ref());
    }

    fn forward(&self, level: LogLevel, message: &str) {
        if let Some(sink) = &self.sink {
            if sink.is_enabled(level) {
                sink.log(level, message);
            }
        }
    }
}

impl fmt::Debug for SessionLogger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionLogger")
            .field("has_sink", &self.sink.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[test]
    fn test_closure_sink_receives_events() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let captured = Arc::clone(&seen);
        let sink: Arc<dyn LogSink> = Arc::new(move |level: LogLevel, msg: &str| {
            captured.lock().push((level, msg.to_string()));
        });

        let logger = SessionLogger::new(Some(sink));
        logger.info("connected");
        logger.warn("retrying");

        let seen = seen.lock();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0], (LogLevel::Info, "connected".to_string()));
        assert_eq!(seen[1].0, LogLevel::Warning);
    }

    struct ErrorsOnly(Mutex<usize>);

    impl LogSink for ErrorsOnly {
        fn log(&self, _level: LogLevel, _message: &str) {
            *self.0.lock() += 1;
        }

        fn is_enabled(&self, level: LogLevel) -> bool {
            level >= LogLevel::Error
        }
    }

    #[test]
    fn test_level_filter() {
        let sink = Arc::new(ErrorsOnly(Mutex::new(0)));
        let logger = SessionLogger::new(Some(sink.clone()));
        logger.debug("noise");
        logger.info("noise");
        logger.error("failure");
        assert_eq!(*sink.0.lock(), 1);
    }

    #[test]
    fn test_without_sink() {
        SessionLogger::default().info("nobody listening");
    }
}
