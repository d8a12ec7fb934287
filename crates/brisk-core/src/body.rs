//! Type-erased HTTP bodies and futures.
//!
//! Decorators wrap transports and handlers they know nothing about, so both
//! sides of the workspace speak in terms of one boxed body type.

use std::error::Error;
use std::future::Future;
use std::pin::Pin;

use bytes::Bytes;
use http_body_util::{combinators::UnsyncBoxBody, BodyExt, Empty, Full};

/// Boxed, thread-safe error used for runtime transport and body failures.
pub type BoxError = Box<dyn Error + Send + Sync>;

/// Boxed HTTP body carried by every request and response in the workspace.
pub type Body = UnsyncBoxBody<Bytes, BoxError>;

/// Boxed `Send` future.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Returns an empty body.
pub fn empty() -> Body {
    Empty::<Bytes>::new()
        .map_err(|never| match never {})
        .boxed_unsync()
}

/// Returns a body holding `data` in a single frame.
pub fn full(data: impl Into<Bytes>) -> Body {
    Full::new(data.into())
        .map_err(|never| match never {})
        .boxed_unsync()
}

/// Boxes any body whose error converts into [`BoxError`].
pub fn boxed<B>(body: B) -> Body
where
    B: http_body::Body<Data = Bytes> + Send + 'static,
    B::Error: Into<BoxError>,
{
    body.map_err(Into::into).boxed_unsync()
}
