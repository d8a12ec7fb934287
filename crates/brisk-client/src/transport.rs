//! Outbound transports.
//!
//! A transport is anything implementing [`RoundTrip`]: it takes a request and
//! eventually yields a response. The client holds one of three shapes, see
//! [`ClientTransport`]:
//!
//! - the built-in pooled [`HttpTransport`] for `http` and `https`, whose
//!   timeout, TLS and pool knobs the client options can tune
//! - a caller-supplied transport, used as-is
//! - an [`InstrumentedTransport`] decorating either of the above

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, OnceLock};
use std::task::{Context, Poll};
use std::time::Duration;

use brisk_core::body::{self, Body, BoxError, BoxFuture};
use bytes::Bytes;
use http::header::EXPECT;
use http::{Request, Response, StatusCode};
use http_body::{Body as HttpBody, Frame, SizeHint};
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client as PoolClient;
use hyper_util::rt::{TokioExecutor, TokioTimer};
use rustls::ClientConfig;
use tokio::sync::watch;

use crate::connector::TrackingConnector;
use crate::error::TransportError;
use crate::instrumented::InstrumentedTransport;
use crate::tls::{default_tls_config, HttpsConnector};

/// A capability that performs one HTTP exchange.
pub trait RoundTrip: Send + Sync + 'static {
    /// Sends `req` and resolves to the response headers; the body streams.
    fn round_trip(&self, req: Request<Body>) -> BoxFuture<'_, Result<Response<Body>, BoxError>>;
}

/// Adapts a closure into a [`RoundTrip`].
pub fn round_trip_fn<F>(f: F) -> Arc<dyn RoundTrip>
where
    F: Fn(Request<Body>) -> BoxFuture<'static, Result<Response<Body>, BoxError>>
        + Send
        + Sync
        + 'static,
{
    struct FnTransport<F>(F);

    impl<F> RoundTrip for FnTransport<F>
    where
        F: Fn(Request<Body>) -> BoxFuture<'static, Result<Response<Body>, BoxError>>
            + Send
            + Sync
            + 'static,
    {
        fn round_trip(
            &self,
            req: Request<Body>,
        ) -> BoxFuture<'_, Result<Response<Body>, BoxError>> {
            (self.0)(req)
        }
    }

    Arc::new(FnTransport(f))
}

/// Tunables of the built-in transport. `None` means unbounded.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransportConfig {
    /// Bound on establishing a TCP connection.
    pub connect_timeout: Option<Duration>,
    /// Bound on the TLS handshake of an `https` connection.
    pub tls_handshake_timeout: Option<Duration>,
    /// Bound on waiting for response headers once the request is sent.
    pub response_header_timeout: Option<Duration>,
    /// How long an idle pooled connection is kept.
    pub idle_conn_timeout: Option<Duration>,
    /// How long a request carrying `Expect: 100-continue` holds its body
    /// back waiting for `100 Continue`.
    pub expect_continue_timeout: Option<Duration>,
    /// Maximum idle pooled connections per host. `0` means no limit.
    pub max_idle_conns: Option<usize>,
}

impl TransportConfig {
    /// The pool's idle cap, or `None` when unlimited.
    fn idle_cap(&self) -> Option<usize> {
        self.max_idle_conns.filter(|&max| max > 0)
    }
}

type Pool = PoolClient<TrackingConnector<HttpsConnector>, Body>;

/// The built-in pooled HTTP/1.1 + HTTP/2 transport, over TCP or TLS.
///
/// The connection pool is created on first use from the current
/// [`TransportConfig`]; mutating the config discards a pool built earlier.
#[derive(Clone, Default)]
pub struct HttpTransport {
    config: TransportConfig,
    tls: Option<Arc<ClientConfig>>,
    pool: OnceLock<Pool>,
}

impl HttpTransport {
    /// Creates a transport with `config`.
    pub fn new(config: TransportConfig) -> Self {
        Self {
            config,
            tls: None,
            pool: OnceLock::new(),
        }
    }

    /// Returns the current configuration.
    pub fn config(&self) -> &TransportConfig {
        &self.config
    }

    /// Returns the configuration for editing.
    pub fn config_mut(&mut self) -> &mut TransportConfig {
        self.pool = OnceLock::new();
        &mut self.config
    }

    /// The TLS configuration set with
    /// [`set_tls_config`](Self::set_tls_config), if any.
    pub fn tls_config(&self) -> Option<&Arc<ClientConfig>> {
        self.tls.as_ref()
    }

    /// Replaces the TLS configuration. Without one,
    /// [`default_tls_config`] is used.
    pub fn set_tls_config(&mut self, config: Arc<ClientConfig>) {
        self.pool = OnceLock::new();
        self.tls = Some(config);
    }

    fn pool(&self) -> Result<&Pool, TransportError> {
        if let Some(pool) = self.pool.get() {
            return Ok(pool);
        }

        let tls = match &self.tls {
            Some(config) => Arc::clone(config),
            None => default_tls_config()?,
        };
        let mut http = HttpConnector::new();
        http.set_connect_timeout(self.config.connect_timeout);
        http.set_nodelay(true);
        let connector = HttpsConnector::new(http, tls, self.config.tls_handshake_timeout);

        let mut builder = PoolClient::builder(TokioExecutor::new());
        builder
            .pool_timer(TokioTimer::new())
            .pool_idle_timeout(self.config.idle_conn_timeout);
        if let Some(max) = self.config.idle_cap() {
            builder.pool_max_idle_per_host(max);
        }
        tracing::debug!(config = ?self.config, "building connection pool");
        let pool = builder.build(TrackingConnector::new(connector));
        Ok(self.pool.get_or_init(|| pool))
    }
}

impl RoundTrip for HttpTransport {
    fn round_trip(&self, req: Request<Body>) -> BoxFuture<'_, Result<Response<Body>, BoxError>> {
        let header_timeout = self.config.response_header_timeout;
        let expect_timeout = self.config.expect_continue_timeout;
        Box::pin(async move {
            let pool = self.pool()?;
            let req = match expect_timeout {
                Some(limit) if expects_continue(&req) => gate_on_continue(req, limit),
                _ => req,
            };
            let pending = pool.request(req);
            let response = match header_timeout {
                Some(limit) => tokio::time::timeout(limit, pending)
                    .await
                    .map_err(|_| TransportError::ResponseHeaderTimeout(limit))?,
                None => pending.await,
            }
            .map_err(TransportError::Request)?;
            Ok(response.map(body::boxed))
        })
    }
}

fn expects_continue<B: HttpBody>(req: &Request<B>) -> bool {
    !req.body().is_end_stream()
        && req
            .headers()
            .get(EXPECT)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.eq_ignore_ascii_case("100-continue"))
}

/// Holds the body back until the server answers `100 Continue` or `limit`
/// passes, whichever is first.
fn gate_on_continue(mut req: Request<Body>, limit: Duration) -> Request<Body> {
    let (open, opened) = watch::channel(false);
    hyper::ext::on_informational(&mut req, move |res| {
        if res.status() == StatusCode::CONTINUE {
            open.send_replace(true);
        }
    });
    req.map(|inner| body::boxed(ContinueGate::new(inner, opened, limit)))
}

struct ContinueGate {
    inner: Body,
    gate: Option<BoxFuture<'static, ()>>,
}

impl ContinueGate {
    fn new(inner: Body, mut opened: watch::Receiver<bool>, limit: Duration) -> Self {
        let gate = Box::pin(async move {
            if tokio::time::timeout(limit, opened.wait_for(|open| *open))
                .await
                .is_err()
            {
                tracing::trace!(?limit, "no 100 Continue, sending body");
            }
        });
        Self {
            inner,
            gate: Some(gate),
        }
    }
}

impl HttpBody for ContinueGate {
    type Data = Bytes;
    type Error = BoxError;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        let this = self.get_mut();
        if let Some(gate) = this.gate.as_mut() {
            if gate.as_mut().poll(cx).is_pending() {
                return Poll::Pending;
            }
            this.gate = None;
        }
        Pin::new(&mut this.inner).poll_frame(cx)
    }

    fn is_end_stream(&self) -> bool {
        self.inner.is_end_stream()
    }

    fn size_hint(&self) -> SizeHint {
        self.inner.size_hint()
    }
}

impl fmt::Debug for HttpTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpTransport")
            .field("config", &self.config)
            .field("custom_tls", &self.tls.is_some())
            .field("pooled", &self.pool.get().is_some())
            .finish()
    }
}

/// Process-wide transport used by decorators that have no base.
pub fn default_transport() -> &'static HttpTransport {
    static DEFAULT: OnceLock<HttpTransport> = OnceLock::new();
    DEFAULT.get_or_init(|| HttpTransport::new(crate::options::default_transport_config()))
}

/// The transport a [`Client`](crate::Client) sends through.
#[derive(Clone)]
pub enum ClientTransport {
    /// The built-in configurable transport.
    Http(HttpTransport),
    /// A caller-supplied transport.
    Custom(Arc<dyn RoundTrip>),
    /// The instrumentation decorator.
    Instrumented(Arc<InstrumentedTransport>),
}

impl ClientTransport {
    /// Returns the built-in transport at the base of this one, if any.
    ///
    /// Looks through an instrumented transport. A decorator shared with
    /// other owners is copied first, so edits never reach them; the copy
    /// keeps the same instruments and active-request gauge.
    pub fn http_mut(&mut self) -> Option<&mut HttpTransport> {
        match self {
            Self::Http(transport) => Some(transport),
            Self::Custom(_) => None,
            Self::Instrumented(decorator) => {
                if decorator.base()?.http().is_none() {
                    return None;
                }
                Arc::make_mut(decorator).base_mut()?.http_mut()
            }
        }
    }

    /// Read-only counterpart of [`http_mut`](Self::http_mut).
    pub fn http(&self) -> Option<&HttpTransport> {
        match self {
            Self::Http(transport) => Some(transport),
            Self::Custom(_) => None,
            Self::Instrumented(decorator) => decorator.base()?.http(),
        }
    }

    /// Returns the decorator when this transport is instrumented.
    pub fn as_instrumented(&self) -> Option<&Arc<InstrumentedTransport>> {
        match self {
            Self::Instrumented(decorator) => Some(decorator),
            _ => None,
        }
    }
}

impl Default for ClientTransport {
    fn default() -> Self {
        Self::Http(HttpTransport::default())
    }
}

impl RoundTrip for ClientTransport {
    fn round_trip(&self, req: Request<Body>) -> BoxFuture<'_, Result<Response<Body>, BoxError>> {
        match self {
            Self::Http(transport) => transport.round_trip(req),
            Self::Custom(transport) => transport.round_trip(req),
            Self::Instrumented(decorator) => decorator.round_trip(req),
        }
    }
}

impl fmt::Debug for ClientTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Http(transport) => f.debug_tuple("Http").field(transport).finish(),
            Self::Custom(_) => f.write_str("Custom(..)"),
            Self::Instrumented(decorator) => f.debug_tuple("Instrumented").field(decorator).finish(),
        }
    }
}

impl From<HttpTransport> for ClientTransport {
    fn from(transport: HttpTransport) -> Self {
        Self::Http(transport)
    }
}

impl From<Arc<dyn RoundTrip>> for ClientTransport {
    fn from(transport: Arc<dyn RoundTrip>) -> Self {
        Self::Custom(transport)
    }
}

impl From<InstrumentedTransport> for ClientTransport {
    fn from(decorator: InstrumentedTransport) -> Self {
        Self::Instrumented(Arc::new(decorator))
    }
}

impl From<Arc<InstrumentedTransport>> for ClientTransport {
    fn from(decorator: Arc<InstrumentedTransport>) -> Self {
        Self::Instrumented(decorator)
    }
}
