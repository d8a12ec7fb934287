//! Request handlers.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use brisk_core::body::{self, Body};
use brisk_core::BoxFuture;
use http::{Request, Response, StatusCode};

use crate::instrumented::InstrumentedHandler;

/// Turns a request into a response.
///
/// The returned future must own everything it needs; connections run their
/// requests on spawned tasks.
pub trait Handler: Send + Sync + 'static {
    /// Handles one request.
    fn call(&self, req: Request<Body>) -> BoxFuture<'static, Response<Body>>;
}

struct HandlerFn<F>(F);

impl<F, Fut> Handler for HandlerFn<F>
where
    F: Fn(Request<Body>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Response<Body>> + Send + 'static,
{
    fn call(&self, req: Request<Body>) -> BoxFuture<'static, Response<Body>> {
        Box::pin((self.0)(req))
    }
}

/// Wraps an async closure as a [`ServerHandler`].
///
/// ```rust
/// use brisk_core::body;
/// use brisk_server::handler_fn;
/// use http::Response;
///
/// let hello = handler_fn(|_req| async { Response::new(body::full("hello")) });
/// # let _ = hello;
/// ```
pub fn handler_fn<F, Fut>(f: F) -> ServerHandler
where
    F: Fn(Request<Body>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Response<Body>> + Send + 'static,
{
    ServerHandler::new(HandlerFn(f))
}

/// Answers every request with `404 Not Found`.
#[derive(Debug, Clone, Copy, Default)]
pub struct NotFound;

impl Handler for NotFound {
    fn call(&self, _req: Request<Body>) -> BoxFuture<'static, Response<Body>> {
        Box::pin(async {
            let mut response = Response::new(body::empty());
            *response.status_mut() = StatusCode::NOT_FOUND;
            response
        })
    }
}

/// The handler a server runs, either as supplied or already instrumented.
#[derive(Clone)]
pub enum ServerHandler {
    /// A handler with no instrumentation of its own.
    Plain(Arc<dyn Handler>),
    /// An instrumented handler; never wrapped again.
    Instrumented(Arc<InstrumentedHandler>),
}

impl ServerHandler {
    /// Wraps a handler.
    pub fn new(handler: impl Handler) -> Self {
        Self::Plain(Arc::new(handler))
    }

    /// The instrumented handler, if this is one.
    pub fn as_instrumented(&self) -> Option<&Arc<InstrumentedHandler>> {
        match self {
            Self::Instrumented(handler) => Some(handler),
            Self::Plain(_) => None,
        }
    }
}

impl Default for ServerHandler {
    fn default() -> Self {
        Self::new(NotFound)
    }
}

impl Handler for ServerHandler {
    fn call(&self, req: Request<Body>) -> BoxFuture<'static, Response<Body>> {
        match self {
            Self::Plain(handler) => handler.call(req),
            Self::Instrumented(handler) => handler.call(req),
        }
    }
}

impl From<Arc<dyn Handler>> for ServerHandler {
    fn from(handler: Arc<dyn Handler>) -> Self {
        Self::Plain(handler)
    }
}

impl From<InstrumentedHandler> for ServerHandler {
    fn from(handler: InstrumentedHandler) -> Self {
        Self::Instrumented(Arc::new(handler))
    }
}

impl From<Arc<InstrumentedHandler>> for ServerHandler {
    fn from(handler: Arc<InstrumentedHandler>) -> Self {
        Self::Instrumented(handler)
    }
}

impl fmt::Debug for ServerHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Plain(_) => f.write_str("ServerHandler::Plain"),
            Self::Instrumented(handler) => f
                .debug_tuple("ServerHandler::Instrumented")
                .field(handler)
                .finish(),
        }
    }
}
