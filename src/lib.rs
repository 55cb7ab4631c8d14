//! # Combined Log
//!
//! Access logging for axum and tower: one line per request in the "combined"
//! format understood by Apache/NGINX log tooling.
//!
//! ```text
//! 127.0.0.1 - - [02/Jan/2006:15:04:05 +0000] "GET /index.html HTTP/1.1" 200 1024 "-" "curl/7.64.1" 0.0023
//! ```
//!
//! ## Features
//!
//! - **Non-intrusive**: status, headers and body pass through untouched, including body size hints
//! - **Per-request state**: one shared logger, no cross-talk between concurrent requests
//! - **Two surfaces**: a tower [`Layer`] for axum routers, and a wrapper for synchronous
//!   [`Handler`]s writing through a [`ResponseWriter`]
//! - **Any sink**: lines go to anything implementing [`std::io::Write`]
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use axum::{routing::get, Router};
//! use combined_log::{AccessLogger, Flags};
//! use std::net::SocketAddr;
//!
//! async fn hello() -> &'static str {
//!     "Hello, World!"
//! }
//!
//! #[tokio::main]
//! async fn main() {
//!     let logger = AccessLogger::new(std::io::stdout(), "", Flags::NONE);
//!
//!     let app = Router::new()
//!         .route("/hello", get(hello))
//!         .layer(logger.layer());
//!
//!     let listener = tokio::net::TcpListener::bind("0.0.0.0:3000").await.unwrap();
//!     axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
//!         .await
//!         .unwrap();
//! }
//! ```
//!
//! ## Synchronous handlers
//!
//! ```rust
//! use combined_log::{handler_fn, AccessLogger, BufferedResponse, Flags, Handler, ResponseWriter};
//! use axum::http::{Request, StatusCode};
//! use bytes::Bytes;
//!
//! let logger = AccessLogger::new(std::io::stderr(), "", Flags::NONE);
//! let handler = logger.handler(handler_fn(|w, _req| {
//!     w.write_status(StatusCode::NOT_FOUND);
//!     let _ = w.write(b"nothing here");
//! }));
//!
//! let request = Request::builder().uri("/missing").body(Bytes::new()).unwrap();
//! let mut response = BufferedResponse::new();
//! handler.serve(&mut response, &request);
//! assert_eq!(response.status(), Some(StatusCode::NOT_FOUND));
//! ```

use axum::{extract::Request, response::Response};
use std::{
    future::Future,
    pin::Pin,
    task::{Context, Poll},
};
use tower::{Layer, Service};
use tracing::{debug, instrument};

pub mod body_wrapper;
use body_wrapper::{CountingBody, PendingLine};

pub mod config;
pub use config::{AccessLogConfig, Flags};

pub mod format;
pub use format::{AccessRecord, RemoteAddr};

pub mod handler;
pub use handler::{handler_fn, Handler, LoggedHandler};

pub mod logger;
pub use logger::AccessLogger;

pub mod multipart;
pub use multipart::MultipartForm;

pub mod service;
pub use service::{into_service, HandlerService};

pub mod sink;
pub use sink::LineLogger;

pub mod writer;
pub use writer::{BufferedResponse, Flusher, ResponseRecorder, ResponseWriter};

/// Tower layer writing an access line for every request.
///
/// # Examples
///
/// ```rust
/// use combined_log::{AccessLogLayer, AccessLogger, Flags};
/// use axum::{routing::get, Router};
/// use tower::ServiceBuilder;
///
/// # async fn hello() -> &'static str { "Hello" }
/// let logger = AccessLogger::new(std::io::stdout(), "", Flags::NONE);
///
/// let app: Router = Router::new()
///     .route("/hello", get(hello))
///     .layer(ServiceBuilder::new().layer(AccessLogLayer::new(logger)));
/// ```
#[derive(Clone, Debug)]
pub struct AccessLogLayer {
    logger: AccessLogger,
}

impl AccessLogLayer {
    pub fn new(logger: AccessLogger) -> Self {
        Self { logger }
    }
}

impl<S> Layer<S> for AccessLogLayer {
    type Service = AccessLogService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        AccessLogService {
            inner,
            logger: self.logger.clone(),
        }
    }
}

/// Tower service produced by [`AccessLogLayer`].
///
/// Status comes from the inner service's response; size is counted as the
/// body streams out, and the line is written when the body is finished or
/// dropped. If the inner service fails no line is written.
#[derive(Clone, Debug)]
pub struct AccessLogService<S> {
    inner: S,
    logger: AccessLogger,
}

impl<S> Service<Request> for AccessLogService<S>
where
    S: Service<Request, Response = Response> + Send + 'static,
    S::Future: Send + 'static,
    S::Error: Send + 'static,
{
    type Response = Response;
    type Error = S::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    #[instrument(skip_all)]
    fn call(&mut self, request: Request) -> Self::Future {
        let started = self.logger.now();
        let record = AccessRecord::from_request(&request, started);
        let form = request.extensions().get::<MultipartForm>().cloned();

        debug!(method = %record.method, uri = %record.uri, "Extracted request metadata");

        let logger = self.logger.clone();
        let future = self.inner.call(request);

        Box::pin(async move {
            let result = future.await;
            debug!("Inner service response received");

            match result {
                Ok(response) => {
                    let status = response.status();
                    let pending = PendingLine::new(logger, record, status, form);
                    Ok(response.map(|body| axum::body::Body::new(CountingBody::new(body, pending))))
                }
                Err(e) => {
                    debug!("Inner service failed, no access line written");
                    Err(e)
                }
            }
        })
    }
}
