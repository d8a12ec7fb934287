//! The deadline-bounded HTTP client.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use brisk_core::body::{self, Body, BoxError};
use brisk_core::{build, ConfigResult, Deadline, DeadlineExceeded, Opt};
use brisk_telemetry::{trace, Propagation, SharedTracer};
use bytes::Bytes;
use http::{Request, Response, Uri};
use http_body::{Body as HttpBody, Frame};
use opentelemetry::global;
use opentelemetry::metrics::Meter;
use tokio::time::{Instant, Sleep};

use crate::error::ClientError;
use crate::instrumented::{ensure_instrumented, InstrumentedTransport};
use crate::options::default_client_options;
use crate::transport::{ClientTransport, HttpTransport, RoundTrip};

/// An HTTP client whose every exchange is bounded by a total timeout.
///
/// Build one with [`new_client`].
///
/// # Example
///
/// ```rust,no_run
/// use std::time::Duration;
/// use brisk_client::{new_client, with_timeout};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
/// let client = new_client([with_timeout(Duration::from_millis(300))])?;
/// let response = client.get("http://inventory.internal/items/42".parse()?).await?;
/// println!("status: {}", response.status());
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Client {
    pub(crate) timeout: Duration,
    pub(crate) transport: ClientTransport,
    pub(crate) tracer: Option<SharedTracer>,
    pub(crate) meter: Option<Meter>,
    pub(crate) propagation: Propagation,
}

impl Client {
    /// A client with no options applied and the built-in transport
    /// unconfigured. [`new_client`] starts from this.
    pub fn bare() -> Self {
        Self {
            timeout: Duration::ZERO,
            transport: ClientTransport::Http(HttpTransport::default()),
            tracer: None,
            meter: None,
            propagation: Propagation::Global,
        }
    }

    /// The total request timeout.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// The active transport.
    pub fn transport(&self) -> &ClientTransport {
        &self.transport
    }

    /// Sends `req`, bounding headers and body by the total timeout.
    ///
    /// The deadline travels in the request extensions, so an instrumented
    /// transport records an expired request on its span before returning.
    /// Reading the returned body after the deadline yields a
    /// [`ClientError::Timeout`].
    pub async fn send(&self, mut req: Request<Body>) -> Result<Response<Body>, ClientError> {
        let deadline = Deadline::after(self.timeout);
        req.extensions_mut().insert(deadline);

        let pending = self.transport.round_trip(req);
        let result = if self.transport.as_instrumented().is_some() {
            pending.await
        } else {
            deadline
                .run(pending)
                .await
                .unwrap_or_else(|exceeded| Err(exceeded.into()))
        };
        let response = result.map_err(|err| {
            if err.is::<DeadlineExceeded>() {
                ClientError::Timeout(self.timeout)
            } else {
                ClientError::Transport(err)
            }
        })?;

        let timeout = self.timeout;
        Ok(response.map(|inner| body::boxed(DeadlineBody::new(inner, deadline.at(), timeout))))
    }

    /// Sends a `GET` for `uri`.
    pub async fn get(&self, uri: Uri) -> Result<Response<Body>, ClientError> {
        let req = Request::get(uri).body(body::empty())?;
        self.send(req).await
    }

    fn finalize(mut self) -> ConfigResult<Self> {
        let tracer = self.tracer.clone().unwrap_or_else(trace::global_tracer);
        let meter = self
            .meter
            .clone()
            .unwrap_or_else(|| global::meter(brisk_telemetry::INSTRUMENTATION_NAME));
        let propagation = self.propagation.clone();

        self.transport = ensure_instrumented(self.transport, |base| {
            InstrumentedTransport::builder(Some(base))
                .tracer(tracer)
                .meter(meter)
                .propagation(propagation)
        })?;
        Ok(self)
    }
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("timeout", &self.timeout)
            .field("transport", &self.transport)
            .field("traced", &self.tracer.is_some())
            .field("metered", &self.meter.is_some())
            .field("propagation", &self.propagation)
            .finish()
    }
}

/// Builds a client: defaults first, then `opts`, then instrumentation.
///
/// When no tracer or meter provider was injected the global providers are
/// used. The transport is wrapped in an
/// [`InstrumentedTransport`] unless it already is one.
pub fn new_client<I>(opts: I) -> ConfigResult<Client>
where
    I: IntoIterator<Item = Opt<Client>>,
{
    build(Client::bare(), &default_client_options(), opts)?.finalize()
}

/// Fails body reads once the request deadline has passed.
struct DeadlineBody {
    inner: Body,
    sleep: Pin<Box<Sleep>>,
    timeout: Duration,
}

impl DeadlineBody {
    fn new(inner: Body, deadline: Instant, timeout: Duration) -> Self {
        Self {
            inner,
            sleep: Box::pin(tokio::time::sleep_until(deadline)),
            timeout,
        }
    }
}

impl HttpBody for DeadlineBody {
    type Data = Bytes;
    type Error = BoxError;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        let this = self.get_mut();
        if this.sleep.as_mut().poll(cx).is_ready() {
            return Poll::Ready(Some(Err(ClientError::Timeout(this.timeout).into())));
        }
        Pin::new(&mut this.inner).poll_frame(cx)
    }

    fn is_end_stream(&self) -> bool {
        self.inner.is_end_stream()
    }

    fn size_hint(&self) -> http_body::SizeHint {
        self.inner.size_hint()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::round_trip_fn;
    use http_body_util::BodyExt;

    struct Stalled;

    impl HttpBody for Stalled {
        type Data = Bytes;
        type Error = BoxError;

        fn poll_frame(
            self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
        ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
            Poll::Pending
        }
    }

    fn client_with(transport: ClientTransport, timeout: Duration) -> Client {
        Client {
            timeout,
            transport,
            ..Client::bare()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_headers_time_out() {
        let slow = round_trip_fn(|_req| {
            Box::pin(async {
                tokio::time::sleep(Duration::from_secs(10)).await;
                Ok(Response::new(body::empty()))
            })
        });
        let client = client_with(slow.into(), Duration::from_millis(50));

        let err = client.send(Request::new(body::empty())).await.unwrap_err();
        assert!(matches!(err, ClientError::Timeout(d) if d == Duration::from_millis(50)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stalled_body_times_out() {
        let stalled = round_trip_fn(|_req| {
            Box::pin(async { Ok(Response::new(body::boxed(Stalled))) })
        });
        let client = client_with(stalled.into(), Duration::from_millis(50));

        let response = client.send(Request::new(body::empty())).await.unwrap();
        let err = response.into_body().collect().await.unwrap_err();
        assert_eq!(err.to_string(), "request exceeded total timeout of 50ms");
    }

    #[tokio::test]
    async fn test_body_within_deadline_is_untouched() {
        let fast = round_trip_fn(|_req| {
            Box::pin(async { Ok(Response::new(body::full("pong"))) })
        });
        let client = client_with(fast.into(), Duration::from_secs(2));

        let response = client.send(Request::new(body::empty())).await.unwrap();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&bytes[..], b"pong");
    }
}
