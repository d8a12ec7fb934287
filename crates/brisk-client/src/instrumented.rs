//! Tracing and metrics decorator for outbound requests.
//!
//! # Behavior
//!
//! For every request [`InstrumentedTransport`]:
//!
//! 1. Resolves the parent context from the request extensions, falling back
//!    to the current context
//! 2. Adds request attributes to a recording parent span, or starts a client
//!    span when there is none and a tracer is configured
//! 3. Injects the propagation headers
//! 4. Tracks the request in the active-requests gauge
//! 5. Delegates to the base transport (the shared default when unset),
//!    bounded by the request's [`Deadline`] when one is attached
//! 6. Records the status or error on the span, plus connection-acquisition
//!    and duration histograms
//!
//! Errors from the base transport are returned unchanged. An expired
//! deadline is returned as a boxed [`DeadlineExceeded`](brisk_core::DeadlineExceeded).

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use brisk_core::{Body, BoxError, BoxFuture, ConfigError, Deadline};
use brisk_telemetry::metrics::{self, names};
use brisk_telemetry::{attributes, trace, ActiveRequests, Propagation, SharedTracer};
use http::{Request, Response};
use opentelemetry::metrics::{Histogram, Meter};
use opentelemetry::trace::{SpanKind, Status, TraceContextExt};
use opentelemetry::Context;

use crate::connector::ConnectionInfo;
use crate::transport::{default_transport, ClientTransport, RoundTrip};

/// Outbound decorator adding propagation, spans and metrics.
#[derive(Clone)]
pub struct InstrumentedTransport {
    base: Option<ClientTransport>,
    tracer: Option<SharedTracer>,
    propagation: Propagation,
    active: ActiveRequests,
    duration: Option<Histogram<f64>>,
    acquire: Option<Histogram<f64>>,
}

impl InstrumentedTransport {
    /// Starts building a decorator around `base`.
    pub fn builder(base: Option<ClientTransport>) -> InstrumentedTransportBuilder {
        InstrumentedTransportBuilder {
            base,
            tracer: None,
            meter: None,
            propagation: Propagation::Global,
        }
    }

    /// The wrapped transport, if one was configured.
    pub fn base(&self) -> Option<&ClientTransport> {
        self.base.as_ref()
    }

    /// Mutable access to the wrapped transport.
    pub fn base_mut(&mut self) -> Option<&mut ClientTransport> {
        self.base.as_mut()
    }

    /// Requests currently in flight through this decorator.
    pub fn active_requests(&self) -> i64 {
        self.active.current()
    }

    fn delegate(&self, req: Request<Body>) -> BoxFuture<'_, Result<Response<Body>, BoxError>> {
        match &self.base {
            Some(base) => base.round_trip(req),
            None => default_transport().round_trip(req),
        }
    }
}

impl RoundTrip for InstrumentedTransport {
    fn round_trip(
        &self,
        mut req: Request<Body>,
    ) -> BoxFuture<'_, Result<Response<Body>, BoxError>> {
        Box::pin(async move {
            let started = Instant::now();
            let request_attributes = attributes::client_request(&req);

            let parent = req
                .extensions()
                .get::<Context>()
                .cloned()
                .unwrap_or_else(Context::current);

            let (cx, owns_span) = match &self.tracer {
                Some(tracer) if !parent.span().is_recording() => {
                    let cx = trace::start_span(
                        tracer,
                        trace::span_name(req.method()),
                        SpanKind::Client,
                        &parent,
                        request_attributes.clone(),
                    );
                    (cx, true)
                }
                _ => {
                    {
                        let span = parent.span();
                        if span.is_recording() {
                            span.set_attributes(request_attributes.clone());
                        }
                    }
                    (parent, false)
                }
            };

            self.propagation.inject(&cx, req.headers_mut());

            let deadline = req.extensions().get::<Deadline>().copied();
            let guard = self.active.start(request_attributes.clone());
            let pending = self.delegate(req);
            let result = match deadline {
                Some(deadline) => deadline
                    .run(pending)
                    .await
                    .unwrap_or_else(|exceeded| Err(exceeded.into())),
                None => pending.await,
            };
            drop(guard);

            let span = cx.span();
            let mut metric_attributes = request_attributes;
            match &result {
                Ok(response) => {
                    let status = attributes::response_status(response.status());
                    if span.is_recording() {
                        span.set_attribute(status.clone());
                        if response.status().is_server_error() {
                            span.set_status(Status::error(response.status().to_string()));
                        }
                    }
                    metric_attributes.push(status);

                    if let (Some(acquire), Some(info)) =
                        (&self.acquire, response.extensions().get::<ConnectionInfo>())
                    {
                        metrics::record_duration(
                            acquire,
                            info.acquire_duration(started),
                            &[attributes::connection_reused(info.reused_since(started))],
                        );
                    }
                }
                Err(err) => {
                    if span.is_recording() {
                        span.record_error(&**err);
                        span.set_status(Status::error(err.to_string()));
                    }
                    tracing::debug!(error = %err, "outbound request failed");
                }
            }

            if let Some(duration) = &self.duration {
                metrics::record_duration(duration, started.elapsed(), &metric_attributes);
            }
            if owns_span {
                span.end();
            }
            result
        })
    }
}

impl fmt::Debug for InstrumentedTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InstrumentedTransport")
            .field("base", &self.base)
            .field("traced", &self.tracer.is_some())
            .field("propagation", &self.propagation)
            .field("active", &self.active)
            .finish_non_exhaustive()
    }
}

/// Builder for [`InstrumentedTransport`].
pub struct InstrumentedTransportBuilder {
    base: Option<ClientTransport>,
    tracer: Option<SharedTracer>,
    meter: Option<Meter>,
    propagation: Propagation,
}

impl InstrumentedTransportBuilder {
    /// Sets the tracer used for client spans.
    pub fn tracer(mut self, tracer: SharedTracer) -> Self {
        self.tracer = Some(tracer);
        self
    }

    /// Sets the meter the instruments are created from.
    pub fn meter(mut self, meter: Meter) -> Self {
        self.meter = Some(meter);
        self
    }

    /// Sets the propagator selection.
    pub fn propagation(mut self, propagation: Propagation) -> Self {
        self.propagation = propagation;
        self
    }

    /// Creates the instruments and returns the decorator.
    pub fn build(self) -> Result<InstrumentedTransport, ConfigError> {
        let (active, duration, acquire) = match &self.meter {
            Some(meter) => {
                let active = metrics::up_down_counter(
                    meter,
                    names::CLIENT_ACTIVE_REQUESTS,
                    "Number of active HTTP client requests",
                    "{request}",
                )?;
                let duration = metrics::duration_histogram(
                    meter,
                    names::CLIENT_REQUEST_DURATION,
                    "Duration of HTTP client requests",
                )?;
                let acquire = metrics::duration_histogram(
                    meter,
                    names::CLIENT_CONNECTION_ACQUIRE_DURATION,
                    "Time spent obtaining a connection for an HTTP client request",
                )?;
                (ActiveRequests::new(Some(active)), Some(duration), Some(acquire))
            }
            None => (ActiveRequests::default(), None, None),
        };

        Ok(InstrumentedTransport {
            base: self.base,
            tracer: self.tracer,
            propagation: self.propagation,
            active,
            duration,
            acquire,
        })
    }
}

/// Returns `transport` wrapped in an [`InstrumentedTransport`].
///
/// An already instrumented transport is returned as the same instance; it is
/// never wrapped a second time.
pub fn ensure_instrumented(
    transport: ClientTransport,
    builder: impl FnOnce(ClientTransport) -> InstrumentedTransportBuilder,
) -> Result<ClientTransport, ConfigError> {
    match transport {
        ClientTransport::Instrumented(existing) => Ok(ClientTransport::Instrumented(existing)),
        base => Ok(ClientTransport::from(builder(base).build()?)),
    }
}
