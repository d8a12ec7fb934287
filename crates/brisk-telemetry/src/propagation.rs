//! Trace-context propagation over HTTP headers.
//!
//! Supports any [`TextMapPropagator`]. With the W3C trace-context propagator
//! the carried headers are:
//! - `traceparent` - trace ID, parent span ID and trace flags
//! - `tracestate` - vendor-specific trace information
//!
//! # Example
//!
//! ```rust
//! use brisk_telemetry::Propagation;
//! use opentelemetry::Context;
//!
//! let propagation = Propagation::Global;
//! let mut headers = http::HeaderMap::new();
//! propagation.inject(&Context::current(), &mut headers);
//! ```

use std::fmt;
use std::sync::Arc;

use opentelemetry::propagation::{Extractor, Injector, TextMapPropagator};
use opentelemetry::{global, Context};

/// Which propagator a decorator uses.
#[derive(Clone, Default)]
pub enum Propagation {
    /// The process-wide propagator registered with [`global::set_text_map_propagator`].
    #[default]
    Global,
    /// A propagator injected for one client or server.
    Instance(Arc<dyn TextMapPropagator + Send + Sync>),
}

impl Propagation {
    /// Wraps a propagator for instance use.
    pub fn instance<P>(propagator: P) -> Self
    where
        P: TextMapPropagator + Send + Sync + 'static,
    {
        Self::Instance(Arc::new(propagator))
    }

    /// Writes `cx` into `headers`.
    pub fn inject(&self, cx: &Context, headers: &mut http::HeaderMap) {
        let mut injector = HeaderInjector(headers);
        match self {
            Self::Global => global::get_text_map_propagator(|propagator| {
                propagator.inject_context(cx, &mut injector);
            }),
            Self::Instance(propagator) => propagator.inject_context(cx, &mut injector),
        }
    }

    /// Reads a remote parent from `headers` on top of the current context.
    pub fn extract(&self, headers: &http::HeaderMap) -> Context {
        let extractor = HeaderExtractor(headers);
        let base = Context::current();
        match self {
            Self::Global => global::get_text_map_propagator(|propagator| {
                propagator.extract_with_context(&base, &extractor)
            }),
            Self::Instance(propagator) => propagator.extract_with_context(&base, &extractor),
        }
    }
}

impl fmt::Debug for Propagation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Global => f.write_str("Global"),
            Self::Instance(_) => f.write_str("Instance(..)"),
        }
    }
}

/// HTTP header extractor for `http::HeaderMap`.
pub struct HeaderExtractor<'a>(pub &'a http::HeaderMap);

impl Extractor for HeaderExtractor<'_> {
    fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(|v| v.to_str().ok())
    }

    fn keys(&self) -> Vec<&str> {
        self.0.keys().map(http::HeaderName::as_str).collect()
    }
}

/// HTTP header injector for `http::HeaderMap`.
///
/// Existing values for a key are replaced, so injecting twice never yields
/// two `traceparent` headers.
pub struct HeaderInjector<'a>(pub &'a mut http::HeaderMap);

impl Injector for HeaderInjector<'_> {
    fn set(&mut self, key: &str, value: String) {
        if let (Ok(name), Ok(val)) = (
            http::header::HeaderName::try_from(key),
            http::header::HeaderValue::try_from(&value),
        ) {
            self.0.insert(name, val);
        }
    }
}
