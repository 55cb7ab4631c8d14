//! Synchronous handlers and the access-logging wrapper around them.

use axum::http::Request;
use bytes::Bytes;

use crate::{
    format::AccessRecord,
    logger::AccessLogger,
    multipart::{self, MultipartForm},
    writer::{ResponseRecorder, ResponseWriter},
};

/// Application logic answering one request through a [`ResponseWriter`].
///
/// Any `Fn(&mut dyn ResponseWriter, &Request<Bytes>)` closure is a handler;
/// [`handler_fn`] helps the compiler infer closure signatures.
pub trait Handler: Send + Sync {
    fn serve(&self, writer: &mut dyn ResponseWriter, request: &Request<Bytes>);
}

impl<F> Handler for F
where
    F: Fn(&mut dyn ResponseWriter, &Request<Bytes>) + Send + Sync,
{
    fn serve(&self, writer: &mut dyn ResponseWriter, request: &Request<Bytes>) {
        self(writer, request)
    }
}

/// Turn a closure into a [`Handler`].
///
/// # Examples
///
/// ```rust
/// use combined_log::{handler_fn, Handler, ResponseWriter};
/// use axum::http::StatusCode;
///
/// let not_found = handler_fn(|w, _req| {
///     w.write_status(StatusCode::NOT_FOUND);
/// });
/// ```
pub fn handler_fn<F>(f: F) -> F
where
    F: Fn(&mut dyn ResponseWriter, &Request<Bytes>) + Send + Sync,
{
    f
}

/// A handler wrapped by [`AccessLogger::handler`].
///
/// Every call gets its own [`ResponseRecorder`]; the only thing shared
/// between concurrent calls is the logger's sink.
#[derive(Debug, Clone)]
pub struct LoggedHandler<H> {
    logger: AccessLogger,
    next: H,
}

impl<H> LoggedHandler<H> {
    pub(crate) fn new(logger: AccessLogger, next: H) -> Self {
        Self { logger, next }
    }

    pub fn get_ref(&self) -> &H {
        &self.next
    }
}

impl<H: Handler> Handler for LoggedHandler<H> {
    fn serve(&self, writer: &mut dyn ResponseWriter, request: &Request<Bytes>) {
        let started = self.logger.now();
        let mut record = AccessRecord::from_request(request, started);

        let mut recorder = ResponseRecorder::new(writer);
        self.next.serve(&mut recorder, request);

        if let Some(form) = request.extensions().get::<MultipartForm>() {
            multipart::release(form);
        }

        record.finish(recorder.status(), recorder.size(), self.logger.now());
        self.logger.emit(&record);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{writer::BufferedResponse, Flags, RemoteAddr};
    use axum::{
        extract::ConnectInfo,
        http::{header, StatusCode},
    };
    use chrono::{DateTime, TimeZone, Utc};
    use std::{
        io,
        net::SocketAddr,
        sync::{Arc, Mutex},
    };

    #[derive(Clone, Default)]
    struct SharedBuf(Arc<Mutex<Vec<u8>>>);

    impl SharedBuf {
        fn lines(&self) -> Vec<String> {
            String::from_utf8(self.0.lock().unwrap().clone())
                .unwrap()
                .lines()
                .map(str::to_string)
                .collect()
        }
    }

    impl io::Write for SharedBuf {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn fixed_clock() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2006, 1, 2, 15, 4, 5).unwrap()
    }

    fn request_from(addr: SocketAddr, uri: &str) -> Request<Bytes> {
        let mut request = Request::builder().uri(uri).body(Bytes::new()).unwrap();
        request.extensions_mut().insert(ConnectInfo(addr));
        request
    }

    #[test]
    fn test_not_found_scenario() {
        let buf = SharedBuf::default();
        let logger = AccessLogger::new(buf.clone(), "", Flags::NONE).with_clock(fixed_clock);

        let handler = logger.handler(handler_fn(|w, _req| {
            w.write_status(StatusCode::NOT_FOUND);
            w.write_all(b"no such page").unwrap();
        }));

        let mut response = BufferedResponse::new();
        let request = request_from(SocketAddr::from(([10, 0, 0, 5], 4444)), "/a?x=1");
        handler.serve(&mut response, &request);

        assert_eq!(
            buf.lines(),
            vec![
                "10.0.0.5 - - [02/Jan/2006:15:04:05 +0000] \"GET /a?x=1 HTTP/1.1\" 404 12 \"-\" \"-\" 0.0000"
            ]
        );
        let response = response.into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(response.body().as_ref(), b"no such page");
    }

    #[test]
    fn test_defaults_when_handler_does_nothing() {
        let buf = SharedBuf::default();
        let logger = AccessLogger::new(buf.clone(), "", Flags::NONE);
        let handler = logger.handler(handler_fn(|_w, _req| {}));

        let mut request = Request::builder()
            .method("POST")
            .uri("/submit")
            .header(header::REFERER, "https://example.com/form")
            .header(header::USER_AGENT, "test-agent/1.0")
            .body(Bytes::new())
            .unwrap();
        request
            .extensions_mut()
            .insert(RemoteAddr("@unix".to_string()));

        handler.serve(&mut BufferedResponse::new(), &request);

        let lines = buf.lines();
        assert_eq!(lines.len(), 1);
        let line = &lines[0];
        assert!(line.starts_with("@unix - - ["), "unexpected line: {line}");
        assert!(
            line.contains("\"POST /submit HTTP/1.1\" 200 0 \"https://example.com/form\" \"test-agent/1.0\" "),
            "unexpected line: {line}"
        );
        let duration: f64 = line.rsplit(' ').next().unwrap().parse().unwrap();
        assert!(duration >= 0.0);
    }

    #[test]
    fn test_one_line_per_request_with_prefix() {
        let buf = SharedBuf::default();
        let logger = AccessLogger::new(buf.clone(), "access: ", Flags::NONE).with_clock(fixed_clock);
        let handler = logger.handler(handler_fn(|w, req| {
            let _ = w.write(req.uri().path().as_bytes());
        }));

        for path in ["/one", "/two", "/three"] {
            let request = request_from(SocketAddr::from(([127, 0, 0, 1], 9000)), path);
            handler.serve(&mut BufferedResponse::new(), &request);
        }

        let lines = buf.lines();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("access: 127.0.0.1 - - "));
        assert!(lines[0].contains("\"GET /one HTTP/1.1\" 200 4 "));
        assert!(lines[1].contains("\"GET /two HTTP/1.1\" 200 4 "));
        assert!(lines[2].contains("\"GET /three HTTP/1.1\" 200 6 "));
    }

    #[test]
    fn test_no_line_when_handler_panics() {
        let buf = SharedBuf::default();
        let logger = AccessLogger::new(buf.clone(), "", Flags::NONE);
        let handler = logger.handler(handler_fn(|_w, _req| panic!("handler failed")));

        let request = request_from(SocketAddr::from(([127, 0, 0, 1], 9000)), "/boom");
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            handler.serve(&mut BufferedResponse::new(), &request);
        }));

        assert!(result.is_err());
        assert!(buf.lines().is_empty());
    }

    #[test]
    fn test_multipart_form_released_after_handler() {
        let dir = tempfile::tempdir().unwrap();
        let spilled = dir.path().join("upload-1");
        std::fs::write(&spilled, b"file contents").unwrap();

        let buf = SharedBuf::default();
        let logger = AccessLogger::new(buf.clone(), "", Flags::NONE);
        let seen_by_handler = Arc::new(Mutex::new(false));
        let seen = seen_by_handler.clone();
        let handler = logger.handler(move |_w: &mut dyn ResponseWriter, req: &Request<Bytes>| {
            let form = req.extensions().get::<MultipartForm>().unwrap();
            *seen.lock().unwrap() = form.files()[0].exists();
        });

        let mut form = MultipartForm::new();
        form.push(&spilled);
        let mut request = request_from(SocketAddr::from(([127, 0, 0, 1], 9000)), "/upload");
        request.extensions_mut().insert(form);

        handler.serve(&mut BufferedResponse::new(), &request);

        assert!(*seen_by_handler.lock().unwrap());
        assert!(!spilled.exists());
        assert_eq!(buf.lines().len(), 1);
    }
}
