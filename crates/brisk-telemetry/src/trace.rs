//! Tracers and span helpers.
//!
//! Decorators hold a [`SharedTracer`]: a type-erased tracer built either from
//! an injected provider ([`from_provider`]) or, when nothing was injected,
//! from the process-wide provider ([`global_tracer`]).

use std::sync::Arc;

use opentelemetry::global::{self, BoxedTracer};
use opentelemetry::trace::{SpanKind, TraceContextExt, Tracer, TracerProvider};
use opentelemetry::{Context, KeyValue};

use crate::INSTRUMENTATION_NAME;

/// Type-erased tracer shared by every request through one decorator.
pub type SharedTracer = Arc<BoxedTracer>;

/// Obtains the brisk tracer from an injected provider.
pub fn from_provider<P>(provider: &P) -> SharedTracer
where
    P: TracerProvider,
    P::Tracer: Send + Sync + 'static,
    <P::Tracer as Tracer>::Span: Send + Sync + 'static,
{
    Arc::new(BoxedTracer::new(Box::new(
        provider.tracer(INSTRUMENTATION_NAME),
    )))
}

/// Obtains the brisk tracer from the global provider.
pub fn global_tracer() -> SharedTracer {
    Arc::new(global::tracer(INSTRUMENTATION_NAME))
}

/// Span name for an HTTP exchange, `"HTTP <method>"`.
pub fn span_name(method: &http::Method) -> String {
    format!("HTTP {method}")
}

/// Starts a span under `parent` and returns the context holding it.
pub fn start_span(
    tracer: &BoxedTracer,
    name: String,
    kind: SpanKind,
    parent: &Context,
    attributes: Vec<KeyValue>,
) -> Context {
    let span = tracer
        .span_builder(name)
        .with_kind(kind)
        .with_attributes(attributes)
        .start_with_context(tracer, parent);
    parent.with_span(span)
}
