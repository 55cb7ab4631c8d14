//! Adapter running a synchronous [`Handler`] as a tower service.
//!
//! This lets a handler wrapped by [`AccessLogger::handler`](crate::AccessLogger::handler)
//! be mounted on an axum router with `route_service`.

use axum::{
    body::Body,
    extract::Request,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use http_body_util::BodyExt;
use std::{
    convert::Infallible,
    future::Future,
    pin::Pin,
    sync::Arc,
    task::{Context, Poll},
};
use tower::Service;
use tracing::warn;

use crate::{handler::Handler, writer::BufferedResponse};

/// Error type for reading the request body before running the handler
#[derive(Debug, thiserror::Error)]
pub enum BodyError {
    #[error("failed to read request body: {0}")]
    Read(#[source] axum::Error),
}

/// Tower service that buffers the request body, runs a [`Handler`] against a
/// [`BufferedResponse`] and returns what it wrote.
///
/// # Examples
///
/// ```rust
/// use combined_log::{handler_fn, into_service, AccessLogger, Flags, ResponseWriter};
/// use axum::Router;
///
/// let logger = AccessLogger::new(std::io::stdout(), "", Flags::NONE);
/// let hello = logger.handler(handler_fn(|w, _req| {
///     let _ = w.write(b"hello");
/// }));
///
/// let app: Router = Router::new().route_service("/hello", into_service(hello));
/// ```
pub struct HandlerService<H> {
    handler: Arc<H>,
}

/// Wrap `handler` in a [`HandlerService`].
pub fn into_service<H: Handler + 'static>(handler: H) -> HandlerService<H> {
    HandlerService {
        handler: Arc::new(handler),
    }
}

impl<H> Clone for HandlerService<H> {
    fn clone(&self) -> Self {
        Self {
            handler: self.handler.clone(),
        }
    }
}

impl<H> HandlerService<H> {
    pub fn handler(&self) -> &H {
        &self.handler
    }
}

async fn read_body(body: Body) -> Result<bytes::Bytes, BodyError> {
    Ok(body.collect().await.map_err(BodyError::Read)?.to_bytes())
}

impl<H> Service<Request> for HandlerService<H>
where
    H: Handler + 'static,
{
    type Response = Response;
    type Error = Infallible;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, request: Request) -> Self::Future {
        let handler = self.handler.clone();

        Box::pin(async move {
            let (parts, body) = request.into_parts();
            let body = match read_body(body).await {
                Ok(body) => body,
                Err(e) => {
                    warn!(error = %e, "Rejecting request");
                    return Ok(StatusCode::BAD_REQUEST.into_response());
                }
            };

            let request = axum::http::Request::from_parts(parts, body);
            let mut response = BufferedResponse::new();
            handler.serve(&mut response, &request);

            Ok(response.into_response().map(Body::from))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{handler::handler_fn, writer::ResponseWriter};
    use axum::http::header;
    use tower::ServiceExt;

    #[tokio::test]
    async fn test_handler_sees_buffered_body() {
        let echo = handler_fn(|w, req| {
            w.headers_mut()
                .insert(header::CONTENT_TYPE, "text/plain".parse().unwrap());
            w.write_status(StatusCode::CREATED);
            let _ = w.write(b"echo: ");
            let _ = w.write(req.body());
        });

        let request = Request::builder()
            .method("POST")
            .uri("/echo")
            .body(Body::from("ping"))
            .unwrap();
        let response = into_service(echo).oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "text/plain");
        let body = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(body, "echo: ping");
    }

    #[tokio::test]
    async fn test_unreadable_body_is_bad_request() {
        let failing = futures::stream::iter(vec![Err::<bytes::Bytes, _>(std::io::Error::new(
            std::io::ErrorKind::ConnectionReset,
            "reset",
        ))]);
        let request = Request::builder()
            .uri("/")
            .body(Body::from_stream(failing))
            .unwrap();

        let service = into_service(handler_fn(|_w, _req| {}));
        let response = service.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
