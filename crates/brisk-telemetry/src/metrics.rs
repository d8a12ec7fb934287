//! OpenTelemetry metric instruments for brisk.
//!
//! Instruments are created from a [`Meter`] once, at construction time, and
//! shared by every request afterwards. Names are checked before creation so a
//! bad name fails construction instead of silently producing a no-op
//! instrument.
//!
//! # Standard Metrics
//!
//! See [`names`] for the instrument names emitted by the decorators.
//!
//! # Example
//!
//! ```rust
//! use brisk_telemetry::metrics::{self, names, ActiveRequests};
//! use opentelemetry::global;
//!
//! let meter = global::meter("example");
//! let counter = metrics::up_down_counter(
//!     &meter,
//!     names::CLIENT_ACTIVE_REQUESTS,
//!     "Number of active HTTP client requests",
//!     "{request}",
//! )?;
//! let active = ActiveRequests::new(Some(counter));
//!
//! let guard = active.start(Vec::new());
//! assert_eq!(active.current(), 1);
//! drop(guard);
//! assert_eq!(active.current(), 0);
//! # Ok::<(), brisk_telemetry::TelemetryError>(())
//! ```

use std::fmt;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use opentelemetry::metrics::{Histogram, Meter, UpDownCounter};
use opentelemetry::KeyValue;

use crate::error::TelemetryError;
use crate::TelemetryResult;

/// Instrument names.
pub mod names {
    /// Connections accepted by a server and not yet closed.
    pub const SERVER_OPEN_CONNECTIONS: &str = "http.server.open_connections";

    /// Server requests currently being handled.
    pub const SERVER_ACTIVE_REQUESTS: &str = "http.server.active_requests";

    /// Client requests currently in flight.
    pub const CLIENT_ACTIVE_REQUESTS: &str = "http.client.active_requests";

    /// Server request latency.
    pub const SERVER_REQUEST_DURATION: &str = "http.server.request.duration";

    /// Client request latency.
    pub const CLIENT_REQUEST_DURATION: &str = "http.client.request.duration";

    /// Time spent obtaining a connection for a client request.
    pub const CLIENT_CONNECTION_ACQUIRE_DURATION: &str = "http.client.connection.acquire.duration";
}

const MAX_NAME_LEN: usize = 255;

/// Checks `name` against the instrument naming rules.
///
/// A name is 1 to 255 characters long, starts with an ASCII letter and
/// continues with ASCII letters, digits, `_`, `.`, `-` or `/`.
pub fn validate_instrument_name(name: &str) -> TelemetryResult<()> {
    let invalid = |reason| TelemetryError::InvalidInstrumentName {
        name: name.to_string(),
        reason,
    };

    let mut chars = name.chars();
    match chars.next() {
        None => return Err(invalid("must not be empty")),
        Some(c) if !c.is_ascii_alphabetic() => return Err(invalid("must start with a letter")),
        Some(_) => {}
    }
    if name.len() > MAX_NAME_LEN {
        return Err(invalid("must be at most 255 characters"));
    }
    if !chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-' | '/')) {
        return Err(invalid("contains a character outside [A-Za-z0-9_.-/]"));
    }
    Ok(())
}

/// Creates an `i64` up/down counter.
pub fn up_down_counter(
    meter: &Meter,
    name: &'static str,
    description: &'static str,
    unit: &'static str,
) -> TelemetryResult<UpDownCounter<i64>> {
    validate_instrument_name(name)?;
    Ok(meter
        .i64_up_down_counter(name)
        .with_description(description)
        .with_unit(unit)
        .build())
}

/// Creates an `f64` histogram measured in seconds.
pub fn duration_histogram(
    meter: &Meter,
    name: &'static str,
    description: &'static str,
) -> TelemetryResult<Histogram<f64>> {
    validate_instrument_name(name)?;
    Ok(meter
        .f64_histogram(name)
        .with_description(description)
        .with_unit("s")
        .build())
}

/// Records `elapsed` in seconds on `histogram`.
pub fn record_duration(histogram: &Histogram<f64>, elapsed: Duration, attributes: &[KeyValue]) {
    histogram.record(elapsed.as_secs_f64(), attributes);
}

/// Gauge of work in progress.
///
/// Every [`start`](Self::start) hands out a guard that decrements on drop, so
/// the count goes back down on success, error, panic and cancellation alike.
/// The in-process count is always kept; the instrument is optional.
#[derive(Clone)]
pub struct ActiveRequests {
    count: Arc<AtomicI64>,
    counter: Option<UpDownCounter<i64>>,
}

impl ActiveRequests {
    /// Creates a gauge reporting to `counter` when present.
    pub fn new(counter: Option<UpDownCounter<i64>>) -> Self {
        Self {
            count: Arc::new(AtomicI64::new(0)),
            counter,
        }
    }

    /// Number of guards currently alive.
    pub fn current(&self) -> i64 {
        self.count.load(Ordering::SeqCst)
    }

    /// Returns `true` when an instrument is attached.
    pub fn is_instrumented(&self) -> bool {
        self.counter.is_some()
    }

    /// Increments the gauge until the returned guard is dropped.
    pub fn start(&self, attributes: Vec<KeyValue>) -> ActiveGuard {
        self.count.fetch_add(1, Ordering::SeqCst);
        if let Some(counter) = &self.counter {
            counter.add(1, &attributes);
        }
        ActiveGuard {
            count: Arc::clone(&self.count),
            counter: self.counter.clone(),
            attributes,
        }
    }
}

impl Default for ActiveRequests {
    fn default() -> Self {
        Self::new(None)
    }
}

impl fmt::Debug for ActiveRequests {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActiveRequests")
            .field("current", &self.current())
            .field("instrumented", &self.is_instrumented())
            .finish()
    }
}

/// Decrements its [`ActiveRequests`] exactly once, on drop.
#[must_use = "dropping the guard ends the tracked request immediately"]
pub struct ActiveGuard {
    count: Arc<AtomicI64>,
    counter: Option<UpDownCounter<i64>>,
    attributes: Vec<KeyValue>,
}

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.count.fetch_sub(1, Ordering::SeqCst);
        if let Some(counter) = &self.counter {
            counter.add(-1, &self.attributes);
        }
    }
}

impl fmt::Debug for ActiveGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActiveGuard")
            .field("attributes", &self.attributes)
            .finish_non_exhaustive()
    }
}
