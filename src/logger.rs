//! The access logger: shared sink and formatting configuration.

use chrono::{DateTime, Utc};
use std::{
    fmt,
    io::Write,
    panic::Location,
    sync::Arc,
};
use tracing::error;

use crate::{
    config::{AccessLogConfig, Flags},
    format::AccessRecord,
    handler::{Handler, LoggedHandler},
    sink::LineLogger,
    AccessLogLayer,
};

/// Source of the timestamps written to the access line.
pub type Clock = fn() -> DateTime<Utc>;

/// Writes one combined-format line per request to a shared sink.
///
/// The logger itself only holds the sink and its configuration. Everything
/// observed about a request lives in state created for that request, so one
/// logger can be cloned into any number of handlers and services.
///
/// # Examples
///
/// ```rust
/// use combined_log::{handler_fn, AccessLogger, Flags, ResponseWriter};
///
/// let logger = AccessLogger::new(std::io::stdout(), "", Flags::NONE);
/// let handler = logger.handler(handler_fn(|w, _req| {
///     let _ = w.write(b"hello");
/// }));
/// ```
#[derive(Clone)]
pub struct AccessLogger {
    log: Arc<LineLogger>,
    clock: Clock,
}

impl AccessLogger {
    /// Create a logger writing to `out` through a base logger configured with
    /// `prefix` and `flags`.
    pub fn new<W>(out: W, prefix: impl Into<String>, flags: Flags) -> Self
    where
        W: Write + Send + 'static,
    {
        Self::from_line_logger(LineLogger::new(out, prefix, flags))
    }

    pub fn from_config<W>(out: W, config: &AccessLogConfig) -> Self
    where
        W: Write + Send + 'static,
    {
        Self::from_line_logger(LineLogger::from_config(out, config))
    }

    pub fn from_line_logger(log: LineLogger) -> Self {
        Self {
            log: Arc::new(log),
            clock: Utc::now,
        }
    }

    /// Replace the clock used for the start and finish timestamps.
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    /// Wrap `next` so every request it serves produces one access line.
    pub fn handler<H: Handler>(&self, next: H) -> LoggedHandler<H> {
        LoggedHandler::new(self.clone(), next)
    }

    /// Tower layer logging every request that passes through it.
    pub fn layer(&self) -> AccessLogLayer {
        AccessLogLayer::new(self.clone())
    }

    /// The base line logger.
    pub fn line_logger(&self) -> &LineLogger {
        &self.log
    }

    pub(crate) fn now(&self) -> DateTime<Utc> {
        (self.clock)()
    }

    /// Write the access line for a completed request.
    pub(crate) fn emit(&self, record: &AccessRecord) {
        if let Err(e) = self.log.output(Location::caller(), &record.to_string()) {
            error!(error = %e, uri = %record.uri, "Failed to write access log line");
        }
    }

    /// See [`LineLogger::print`].
    #[track_caller]
    pub fn print(&self, args: fmt::Arguments<'_>) -> std::io::Result<()> {
        self.log.print(args)
    }

    /// See [`LineLogger::fatal`].
    #[track_caller]
    pub fn fatal(&self, args: fmt::Arguments<'_>) -> ! {
        self.log.fatal(args)
    }

    /// See [`LineLogger::panic`].
    #[track_caller]
    pub fn panic(&self, args: fmt::Arguments<'_>) -> ! {
        self.log.panic(args)
    }

    /// See [`LineLogger::set_flags`].
    pub fn set_flags(&self, flags: Flags) {
        self.log.set_flags(flags);
    }

    /// See [`LineLogger::set_prefix`].
    pub fn set_prefix(&self, prefix: impl Into<String>) {
        self.log.set_prefix(prefix);
    }

    /// See [`LineLogger::set_output`].
    pub fn set_output<W>(&self, out: W)
    where
        W: Write + Send + 'static,
    {
        self.log.set_output(out);
    }
}

impl fmt::Debug for AccessLogger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessLogger")
            .field("log", &self.log)
            .finish_non_exhaustive()
    }
}
