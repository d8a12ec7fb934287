//! Connection tracking for the pooled transport.
//!
//! [`TrackingConnector`] wraps a connector and stamps every new connection
//! with a [`ConnectionInfo`]. The pool copies it into the extensions of each
//! response served over that connection, which lets the instrumentation tell
//! a fresh connection from a pooled one.

use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::{Duration, Instant};

use brisk_core::{BoxError, BoxFuture};
use http::Uri;
use hyper::rt::{Read, ReadBufCursor, Write};
use hyper_util::client::legacy::connect::{Connected, Connection};
use tower::Service;

/// When the connection carrying a response was established.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionInfo {
    established_at: Instant,
}

impl ConnectionInfo {
    /// Returns the instant the connection finished connecting.
    pub fn established_at(&self) -> Instant {
        self.established_at
    }

    /// Returns `true` when the connection existed before `started`.
    pub fn reused_since(&self, started: Instant) -> bool {
        self.established_at < started
    }

    /// Time a request that began at `started` spent waiting for this
    /// connection. Zero for pooled connections.
    pub fn acquire_duration(&self, started: Instant) -> Duration {
        self.established_at.saturating_duration_since(started)
    }
}

/// Connector wrapper that tags connections with a [`ConnectionInfo`].
#[derive(Debug, Clone)]
pub struct TrackingConnector<C> {
    inner: C,
}

impl<C> TrackingConnector<C> {
    /// Wraps `inner`.
    pub fn new(inner: C) -> Self {
        Self { inner }
    }
}

impl<C> Service<Uri> for TrackingConnector<C>
where
    C: Service<Uri>,
    C::Response: Send + 'static,
    C::Error: Into<BoxError>,
    C::Future: Send + 'static,
{
    type Response = Tracked<C::Response>;
    type Error = BoxError;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx).map_err(Into::into)
    }

    fn call(&mut self, dst: Uri) -> Self::Future {
        let connecting = self.inner.call(dst);
        Box::pin(async move {
            let io = connecting.await.map_err(Into::into)?;
            let info = ConnectionInfo {
                established_at: Instant::now(),
            };
            tracing::trace!("connection established");
            Ok(Tracked { io, info })
        })
    }
}

/// A connection produced by [`TrackingConnector`].
#[derive(Debug)]
pub struct Tracked<T> {
    io: T,
    info: ConnectionInfo,
}

impl<T> Tracked<T> {
    /// Returns the connection's tracking info.
    pub fn info(&self) -> ConnectionInfo {
        self.info
    }
}

impl<T: Connection> Connection for Tracked<T> {
    fn connected(&self) -> Connected {
        self.io.connected().extra(self.info)
    }
}

impl<T: Read + Unpin> Read for Tracked<T> {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: ReadBufCursor<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.io).poll_read(cx, buf)
    }
}

impl<T: Write + Unpin> Write for Tracked<T> {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.io).poll_write(cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.io).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.io).poll_shutdown(cx)
    }

    fn is_write_vectored(&self) -> bool {
        self.io.is_write_vectored()
    }

    fn poll_write_vectored(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        bufs: &[io::IoSlice<'_>],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.io).poll_write_vectored(cx, bufs)
    }
}
