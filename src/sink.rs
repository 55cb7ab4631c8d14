//! Line-oriented base logger that owns the output sink.
//!
//! Every access line goes through [`LineLogger::output`], which prepends the
//! configured prefix and the flag-controlled decoration, and writes the whole
//! line to the sink under a lock so lines from concurrent requests never
//! interleave.

use chrono::{Local, NaiveDateTime, Utc};
use std::{
    fmt,
    io::{self, Write},
    panic::Location,
    sync::{Mutex, MutexGuard, PoisonError},
};

use crate::config::{AccessLogConfig, Flags};

/// Any byte sink the logger can write lines to.
pub type Sink = Box<dyn Write + Send>;

struct Inner {
    out: Sink,
    prefix: String,
    flags: Flags,
}

/// A minimal line logger: prefix, optional date/time/file decoration, message.
///
/// # Examples
///
/// ```rust
/// use combined_log::{Flags, LineLogger};
///
/// let logger = LineLogger::new(std::io::stderr(), "app: ", Flags::NONE);
/// logger.print(format_args!("listening on {}", 8080)).unwrap();
/// ```
pub struct LineLogger {
    inner: Mutex<Inner>,
}

impl LineLogger {
    /// Create a logger writing to `out`, with the given prefix and flags.
    pub fn new<W>(out: W, prefix: impl Into<String>, flags: Flags) -> Self
    where
        W: Write + Send + 'static,
    {
        Self {
            inner: Mutex::new(Inner {
                out: Box::new(out),
                prefix: prefix.into(),
                flags,
            }),
        }
    }

    /// Create a logger from an [`AccessLogConfig`].
    pub fn from_config<W>(out: W, config: &AccessLogConfig) -> Self
    where
        W: Write + Send + 'static,
    {
        Self::new(out, config.prefix.clone(), config.flags)
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // A panic while holding the lock leaves nothing half-updated we care about.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Write one line. A trailing newline is added when `message` lacks one.
    ///
    /// `location` is the call site reported by [`Flags::LONG_FILE`] and
    /// [`Flags::SHORT_FILE`].
    pub fn output(&self, location: &Location<'_>, message: &str) -> io::Result<()> {
        let mut inner = self.lock();

        let mut line = String::with_capacity(inner.prefix.len() + message.len() + 48);
        if !inner.flags.contains(Flags::MSG_PREFIX) {
            line.push_str(&inner.prefix);
        }
        format_header(&mut line, inner.flags, location);
        if inner.flags.contains(Flags::MSG_PREFIX) {
            line.push_str(&inner.prefix);
        }
        line.push_str(message);
        if !message.ends_with('\n') {
            line.push('\n');
        }

        inner.out.write_all(line.as_bytes())?;
        inner.out.flush()
    }

    /// Format `args` and write them as one line.
    #[track_caller]
    pub fn print(&self, args: fmt::Arguments<'_>) -> io::Result<()> {
        let location = Location::caller();
        match args.as_str() {
            Some(message) => self.output(location, message),
            None => self.output(location, &args.to_string()),
        }
    }

    /// Write the message, then exit the process with status 1.
    #[track_caller]
    pub fn fatal(&self, args: fmt::Arguments<'_>) -> ! {
        let _ = self.output(Location::caller(), &args.to_string());
        std::process::exit(1)
    }

    /// Write the message, then panic with it.
    #[track_caller]
    pub fn panic(&self, args: fmt::Arguments<'_>) -> ! {
        let message = args.to_string();
        let _ = self.output(Location::caller(), &message);
        panic!("{message}")
    }

    pub fn flags(&self) -> Flags {
        self.lock().flags
    }

    pub fn set_flags(&self, flags: Flags) {
        self.lock().flags = flags;
    }

    pub fn prefix(&self) -> String {
        self.lock().prefix.clone()
    }

    pub fn set_prefix(&self, prefix: impl Into<String>) {
        self.lock().prefix = prefix.into();
    }

    /// Replace the output sink. Lines already written are unaffected.
    pub fn set_output<W>(&self, out: W)
    where
        W: Write + Send + 'static,
    {
        self.lock().out = Box::new(out);
    }
}

impl fmt::Debug for LineLogger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.lock();
        f.debug_struct("LineLogger")
            .field("prefix", &inner.prefix)
            .field("flags", &inner.flags)
            .finish_non_exhaustive()
    }
}

fn format_header(buf: &mut String, flags: Flags, location: &Location<'_>) {
    use std::fmt::Write as _;

    if flags.contains(Flags::DATE) || flags.contains(Flags::TIME) || flags.contains(Flags::MICROSECONDS)
    {
        let now: NaiveDateTime = if flags.contains(Flags::UTC) {
            Utc::now().naive_utc()
        } else {
            Local::now().naive_local()
        };
        if flags.contains(Flags::DATE) {
            let _ = write!(buf, "{} ", now.format("%Y/%m/%d"));
        }
        if flags.contains(Flags::MICROSECONDS) {
            let _ = write!(buf, "{} ", now.format("%H:%M:%S%.6f"));
        } else if flags.contains(Flags::TIME) {
            let _ = write!(buf, "{} ", now.format("%H:%M:%S"));
        }
    }

    if flags.contains(Flags::SHORT_FILE) || flags.contains(Flags::LONG_FILE) {
        let mut file = location.file();
        if flags.contains(Flags::SHORT_FILE) {
            file = file.rsplit(['/', '\\']).next().unwrap_or(file);
        }
        let _ = write!(buf, "{}:{}: ", file, location.line());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[derive(Clone, Default)]
    struct Capture(Arc<Mutex<Vec<u8>>>);

    impl Capture {
        fn contents(&self) -> String {
            String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
        }
    }

    impl Write for Capture {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_prefix_and_newline() {
        let capture = Capture::default();
        let logger = LineLogger::new(capture.clone(), "web: ", Flags::NONE);

        logger.print(format_args!("hello")).unwrap();
        logger.print(format_args!("already terminated\n")).unwrap();

        assert_eq!(capture.contents(), "web: hello\nweb: already terminated\n");
    }

    #[test]
    fn test_msg_prefix_moves_prefix_after_header() {
        let capture = Capture::default();
        let logger = LineLogger::new(capture.clone(), "web: ", Flags::SHORT_FILE | Flags::MSG_PREFIX);

        logger.print(format_args!("x={}", 1)).unwrap();

        let line = capture.contents();
        assert!(line.starts_with("sink.rs:"), "unexpected line: {line}");
        assert!(line.ends_with(": web: x=1\n"), "unexpected line: {line}");
    }

    #[test]
    fn test_date_time_header_shape() {
        let capture = Capture::default();
        let logger = LineLogger::new(capture.clone(), "", Flags::DATE | Flags::MICROSECONDS | Flags::UTC);

        logger.print(format_args!("tick")).unwrap();

        // "2009/01/23 01:23:23.123123 tick\n"
        let line = capture.contents();
        let (date, rest) = line.split_once(' ').unwrap();
        let (time, message) = rest.split_once(' ').unwrap();
        assert_eq!(date.len(), 10);
        assert_eq!(date.matches('/').count(), 2);
        assert_eq!(time.len(), 15);
        assert_eq!(&time[8..9], ".");
        assert_eq!(message, "tick\n");
    }

    #[test]
    fn test_long_file_reports_caller() {
        let capture = Capture::default();
        let logger = LineLogger::new(capture.clone(), "", Flags::LONG_FILE);

        let line_no = line!() + 1;
        logger.print(format_args!("here")).unwrap();

        let expected = format!("{}:{}: here\n", file!(), line_no);
        assert_eq!(capture.contents(), expected);
    }

    #[test]
    fn test_setters() {
        let first = Capture::default();
        let second = Capture::default();
        let logger = LineLogger::new(first.clone(), "a ", Flags::NONE);

        logger.set_prefix("b ");
        logger.set_flags(Flags::UTC);
        assert_eq!(logger.prefix(), "b ");
        assert_eq!(logger.flags(), Flags::UTC);

        logger.print(format_args!("one")).unwrap();
        logger.set_output(second.clone());
        logger.print(format_args!("two")).unwrap();

        assert_eq!(first.contents(), "b one\n");
        assert_eq!(second.contents(), "b two\n");
    }

    #[test]
    #[should_panic(expected = "boom 7")]
    fn test_panic_writes_then_panics() {
        let logger = LineLogger::new(io::sink(), "", Flags::NONE);
        logger.panic(format_args!("boom {}", 7));
    }
}
