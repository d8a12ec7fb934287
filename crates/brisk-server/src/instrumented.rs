//! Tracing and metrics decorator for inbound requests.
//!
//! [`InstrumentedHandler`] extracts the caller's trace context, runs the
//! wrapped handler inside an `"HTTP <method>"` server span, tracks the
//! request in the active-requests gauge and records its duration. The
//! span's context is placed in the request extensions so handlers can
//! rename or enrich it.
//!
//! When the request carries a [`Deadline`], the decorator enforces it: a
//! handler still running at the deadline is dropped and answered with
//! `503 Service Unavailable`, which is recorded like any other response
//! but with an error status naming the deadline.
//!
//! A panicking handler is reported as a `500` with an error status on the
//! span; the panic then continues to unwind.

use std::any::Any;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use brisk_core::{body, Body, BoxFuture, ConfigError, Deadline, DeadlineExceeded};
use brisk_telemetry::metrics::{self, names};
use brisk_telemetry::{attributes, trace, ActiveRequests, Propagation, SharedTracer};
use futures_util::FutureExt;
use http::{Request, Response, StatusCode};
use opentelemetry::metrics::{Histogram, Meter};
use opentelemetry::trace::{SpanKind, Status, TraceContextExt};

use crate::handler::{Handler, ServerHandler};

enum Outcome {
    Responded(Response<Body>),
    TimedOut(DeadlineExceeded),
    Panicked(Box<dyn Any + Send>),
}

impl Outcome {
    fn status(&self) -> StatusCode {
        match self {
            Self::Responded(response) => response.status(),
            Self::TimedOut(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Panicked(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// The response sent when a handler runs past its write deadline.
pub(crate) fn write_timeout_response() -> Response<Body> {
    let mut response = Response::new(body::empty());
    *response.status_mut() = StatusCode::SERVICE_UNAVAILABLE;
    response
}

/// Inbound decorator adding propagation, spans and metrics.
pub struct InstrumentedHandler {
    inner: Arc<dyn Handler>,
    tracer: Option<SharedTracer>,
    propagation: Propagation,
    active: ActiveRequests,
    duration: Option<Histogram<f64>>,
}

impl InstrumentedHandler {
    /// Starts building a decorator around `inner`.
    pub fn builder(inner: Arc<dyn Handler>) -> InstrumentedHandlerBuilder {
        InstrumentedHandlerBuilder {
            inner,
            tracer: None,
            meter: None,
            propagation: Propagation::Global,
        }
    }

    /// Requests currently being handled.
    pub fn active_requests(&self) -> i64 {
        self.active.current()
    }
}

impl Handler for InstrumentedHandler {
    fn call(&self, mut req: Request<Body>) -> BoxFuture<'static, Response<Body>> {
        let started = Instant::now();
        let request_attributes = attributes::server_request(&req);

        let parent = self.propagation.extract(req.headers());
        let cx = match &self.tracer {
            Some(tracer) => trace::start_span(
                tracer,
                trace::span_name(req.method()),
                SpanKind::Server,
                &parent,
                request_attributes.clone(),
            ),
            None => parent,
        };
        req.extensions_mut().insert(cx.clone());

        let guard = self.active.start(request_attributes.clone());
        let inner = Arc::clone(&self.inner);
        let duration = self.duration.clone();
        let owns_span = self.tracer.is_some();
        let deadline = req.extensions().get::<Deadline>().copied();

        Box::pin(async move {
            let handled = AssertUnwindSafe(async move { inner.call(req).await }).catch_unwind();
            let finished = match deadline {
                Some(deadline) => deadline.run(handled).await,
                None => Ok(handled.await),
            };
            let outcome = match finished {
                Ok(Ok(response)) => Outcome::Responded(response),
                Ok(Err(panic)) => Outcome::Panicked(panic),
                Err(exceeded) => {
                    tracing::warn!(timeout = ?exceeded.0, "handler exceeded write timeout");
                    Outcome::TimedOut(exceeded)
                }
            };
            drop(guard);

            let status = outcome.status();
            let status_attribute = attributes::response_status(status);

            let span = cx.span();
            if owns_span {
                span.set_attribute(status_attribute.clone());
                match &outcome {
                    Outcome::Panicked(_) => span.set_status(Status::error("handler panicked")),
                    Outcome::TimedOut(exceeded) => {
                        span.set_status(Status::error(format!("write timeout: {exceeded}")));
                    }
                    Outcome::Responded(_) if status.is_server_error() => {
                        span.set_status(Status::error(status.to_string()));
                    }
                    Outcome::Responded(_) => {}
                }
                span.end();
            }

            if let Some(duration) = &duration {
                let mut metric_attributes = request_attributes;
                metric_attributes.push(status_attribute);
                metrics::record_duration(duration, started.elapsed(), &metric_attributes);
            }

            match outcome {
                Outcome::Responded(response) => response,
                Outcome::TimedOut(_) => write_timeout_response(),
                Outcome::Panicked(panic) => {
                    tracing::error!("request handler panicked");
                    std::panic::resume_unwind(panic)
                }
            }
        })
    }
}

impl fmt::Debug for InstrumentedHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InstrumentedHandler")
            .field("traced", &self.tracer.is_some())
            .field("propagation", &self.propagation)
            .field("active", &self.active)
            .finish_non_exhaustive()
    }
}

/// Builder for [`InstrumentedHandler`].
pub struct InstrumentedHandlerBuilder {
    inner: Arc<dyn Handler>,
    tracer: Option<SharedTracer>,
    meter: Option<Meter>,
    propagation: Propagation,
}

impl InstrumentedHandlerBuilder {
    /// Sets the tracer used for server spans.
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
    pub fn build(self) -> Result<InstrumentedHandler, ConfigError> {
        let (active, duration) = match &self.meter {
            Some(meter) => {
                let active = metrics::up_down_counter(
                    meter,
                    names::SERVER_ACTIVE_REQUESTS,
                    "Number of active HTTP server requests",
                    "{request}",
                )?;
                let duration = metrics::duration_histogram(
                    meter,
                    names::SERVER_REQUEST_DURATION,
                    "Duration of HTTP server requests",
                )?;
                (ActiveRequests::new(Some(active)), Some(duration))
            }
            None => (ActiveRequests::default(), None),
        };

        Ok(InstrumentedHandler {
            inner: self.inner,
            tracer: self.tracer,
            propagation: self.propagation,
            active,
            duration,
        })
    }
}

/// Returns `handler` wrapped in an [`InstrumentedHandler`], leaving an
/// already instrumented one untouched.
pub fn ensure_instrumented(
    handler: ServerHandler,
    builder: impl FnOnce(Arc<dyn Handler>) -> InstrumentedHandlerBuilder,
) -> Result<ServerHandler, ConfigError> {
    match handler {
        ServerHandler::Instrumented(existing) => Ok(ServerHandler::Instrumented(existing)),
        ServerHandler::Plain(inner) => Ok(ServerHandler::from(builder(inner).build()?)),
    }
}
