//! Response-writing surface and the recording decorator around it.
//!
//! [`ResponseWriter`] is the surface synchronous [`Handler`](crate::Handler)s
//! write their response to. [`ResponseRecorder`] wraps any such surface,
//! forwards every call untouched and keeps the status and byte count the
//! access line needs.

use axum::http::{HeaderMap, Response, StatusCode};
use bytes::{Bytes, BytesMut};
use std::io;
use tracing::warn;

/// Optional capability of surfaces that can push buffered data to the client.
pub trait Flusher {
    fn flush(&mut self) -> io::Result<()>;
}

/// The surface a handler writes its response through.
pub trait ResponseWriter {
    /// Headers that will be sent with the response.
    fn headers(&self) -> &HeaderMap;

    fn headers_mut(&mut self) -> &mut HeaderMap;

    /// Write body bytes, returning how many were accepted.
    fn write(&mut self, buf: &[u8]) -> io::Result<usize>;

    /// Set the response status.
    fn write_status(&mut self, status: StatusCode);

    /// The flush capability, if this surface has one.
    fn flusher(&mut self) -> Option<&mut dyn Flusher> {
        None
    }

    /// Write all of `buf`, retrying short writes.
    fn write_all(&mut self, mut buf: &[u8]) -> io::Result<()> {
        while !buf.is_empty() {
            match self.write(buf) {
                Ok(0) => {
                    return Err(io::Error::new(
                        io::ErrorKind::WriteZero,
                        "failed to write whole response body",
                    ))
                }
                Ok(n) => buf = &buf[n..],
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }
}

impl<W: ResponseWriter + ?Sized> ResponseWriter for &mut W {
    fn headers(&self) -> &HeaderMap {
        (**self).headers()
    }

    fn headers_mut(&mut self) -> &mut HeaderMap {
        (**self).headers_mut()
    }

    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        (**self).write(buf)
    }

    fn write_status(&mut self, status: StatusCode) {
        (**self).write_status(status)
    }

    fn flusher(&mut self) -> Option<&mut dyn Flusher> {
        (**self).flusher()
    }
}

/// Decorator that observes status and size while delegating to the real
/// surface.
///
/// One recorder is created per request, so nothing it tracks is ever shared
/// between requests.
///
/// # Examples
///
/// ```rust
/// use combined_log::{BufferedResponse, ResponseRecorder, ResponseWriter};
/// use axum::http::StatusCode;
///
/// let mut inner = BufferedResponse::new();
/// let mut recorder = ResponseRecorder::new(&mut inner);
///
/// recorder.write_status(StatusCode::NOT_FOUND);
/// recorder.write(b"not found").unwrap();
///
/// assert_eq!(recorder.status(), StatusCode::NOT_FOUND);
/// assert_eq!(recorder.size(), 9);
/// ```
#[derive(Debug)]
pub struct ResponseRecorder<W> {
    inner: W,
    status: StatusCode,
    size: u64,
}

impl<W: ResponseWriter> ResponseRecorder<W> {
    pub fn new(inner: W) -> Self {
        Self {
            inner,
            status: StatusCode::OK,
            size: 0,
        }
    }

    /// Last status set through this recorder, 200 if none was.
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Bytes accepted by the underlying surface so far.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Flush the underlying surface if it can; a no-op otherwise.
    pub fn flush(&mut self) -> io::Result<()> {
        match self.inner.flusher() {
            Some(flusher) => flusher.flush(),
            None => Ok(()),
        }
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

impl<W: ResponseWriter> ResponseWriter for ResponseRecorder<W> {
    fn headers(&self) -> &HeaderMap {
        self.inner.headers()
    }

    fn headers_mut(&mut self) -> &mut HeaderMap {
        self.inner.headers_mut()
    }

    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let result = self.inner.write(buf);
        if let Ok(written) = result {
            self.size += written as u64;
        }
        result
    }

    fn write_status(&mut self, status: StatusCode) {
        self.inner.write_status(status);
        self.status = status;
    }

    fn flusher(&mut self) -> Option<&mut dyn Flusher> {
        self.inner.flusher()
    }
}

/// In-memory response surface.
///
/// The status can be set once; the first body write commits `200 OK` if it
/// was not set before.
#[derive(Debug, Default)]
pub struct BufferedResponse {
    status: Option<StatusCode>,
    headers: HeaderMap,
    body: BytesMut,
}

impl BufferedResponse {
    pub fn new() -> Self {
        Self::default()
    }

    /// Committed status, if any.
    pub fn status(&self) -> Option<StatusCode> {
        self.status
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Turn the buffered parts into a response.
    pub fn into_response(self) -> Response<Bytes> {
        let mut response = Response::new(self.body.freeze());
        *response.status_mut() = self.status.unwrap_or(StatusCode::OK);
        *response.headers_mut() = self.headers;
        response
    }
}

impl ResponseWriter for BufferedResponse {
    fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.status.get_or_insert(StatusCode::OK);
        self.body.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn write_status(&mut self, status: StatusCode) {
        match self.status {
            Some(current) => {
                warn!(current = %current, ignored = %status, "superfluous write_status call");
            }
            None => self.status = Some(status),
        }
    }
}
