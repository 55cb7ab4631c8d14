//! Response body wrapper that counts bytes and writes the access line.
//!
//! The tower service hands the response back to the server before its body is
//! produced, so status is known early but size and duration are not. The
//! wrapper counts data frames as they stream out and writes the line once the
//! body reaches its end, fails, or is dropped, whichever comes first.

use axum::{body::Bytes, http::StatusCode};
use http_body::{Body, Frame, SizeHint};
use pin_project_lite::pin_project;
use std::{
    pin::Pin,
    task::{ready, Context, Poll},
};
use tracing::debug;

use crate::{
    format::AccessRecord,
    logger::AccessLogger,
    multipart::{self, MultipartForm},
};

/// An access line waiting for its response body to finish.
pub(crate) struct PendingLine {
    logger: AccessLogger,
    record: AccessRecord,
    status: StatusCode,
    form: Option<MultipartForm>,
    size: u64,
    emitted: bool,
}

impl PendingLine {
    pub(crate) fn new(
        logger: AccessLogger,
        record: AccessRecord,
        status: StatusCode,
        form: Option<MultipartForm>,
    ) -> Self {
        Self {
            logger,
            record,
            status,
            form,
            size: 0,
            emitted: false,
        }
    }

    fn add(&mut self, bytes: usize) {
        self.size += bytes as u64;
    }

    fn complete(&mut self) {
        if self.emitted {
            return;
        }
        self.emitted = true;

        if let Some(form) = self.form.take() {
            multipart::release(&form);
        }
        self.record.finish(self.status, self.size, self.logger.now());
        debug!(status = %self.status, size = self.size, "Response body finished");
        self.logger.emit(&self.record);
    }
}

impl Drop for PendingLine {
    fn drop(&mut self) {
        self.complete();
    }
}

pin_project! {
    /// Body that passes every frame through untouched while counting data bytes.
    pub struct CountingBody<B> {
        #[pin]
        inner: B,
        pending: PendingLine,
    }
}

impl<B> CountingBody<B> {
    pub(crate) fn new(inner: B, pending: PendingLine) -> Self {
        Self { inner, pending }
    }
}

impl<B> Body for CountingBody<B>
where
    B: Body<Data = Bytes>,
{
    type Data = Bytes;
    type Error = B::Error;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        let this = self.project();
        let polled = ready!(this.inner.poll_frame(cx));
        match &polled {
            Some(Ok(frame)) => {
                if let Some(data) = frame.data_ref() {
                    this.pending.add(data.len());
                }
            }
            Some(Err(_)) | None => this.pending.complete(),
        }
        Poll::Ready(polled)
    }

    fn is_end_stream(&self) -> bool {
        self.inner.is_end_stream()
    }

    fn size_hint(&self) -> SizeHint {
        self.inner.size_hint()
    }
}
