//! OpenTelemetry plumbing for brisk clients and servers.
//!
//! This crate holds everything the transport and handler decorators share:
//!
//! - **Propagation**: header carriers and propagator selection ([`Propagation`])
//! - **Tracing**: tracer boxing and the global fallback ([`trace`])
//! - **Metrics**: validated instrument creation and the active-request gauge
//!   ([`ActiveRequests`])
//! - **Attributes**: semantic-convention attribute sets for requests and responses
//! - **Logging**: structured logging setup on `tracing-subscriber`
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────┐      ┌──────────────────────────┐
//! │   InstrumentedTransport  │      │   InstrumentedHandler    │
//! │      (brisk-client)      │      │      (brisk-server)      │
//! └────────────┬─────────────┘      └────────────┬─────────────┘
//!              │                                 │
//!              ▼                                 ▼
//! ┌──────────────────────────────────────────────────────────────┐
//! │                       brisk-telemetry                        │
//! │  Propagation │ SharedTracer │ ActiveRequests │ attributes    │
//! └──────────────────────────────┬───────────────────────────────┘
//!                                │
//!                                ▼
//!             opentelemetry API (providers injected or global)
//! ```
//!
//! # Standard Metrics
//!
//! | Metric | Type | Unit | Description |
//! |--------|------|------|-------------|
//! | `http.server.open_connections` | UpDownCounter | `{connection}` | Accepted, not yet closed connections |
//! | `http.server.active_requests` | UpDownCounter | `{request}` | Server requests in progress |
//! | `http.client.active_requests` | UpDownCounter | `{request}` | Client requests in progress |
//! | `http.server.request.duration` | Histogram | `s` | Server request latency |
//! | `http.client.request.duration` | Histogram | `s` | Client request latency |
//! | `http.client.connection.acquire.duration` | Histogram | `s` | Time to obtain a connection |

#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod attributes;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod propagation;
pub mod trace;

pub use error::TelemetryError;
pub use logging::{init_logging, LogConfig};
pub use metrics::{ActiveGuard, ActiveRequests};
pub use propagation::{HeaderExtractor, HeaderInjector, Propagation};
pub use trace::SharedTracer;

/// Result type for telemetry operations.
pub type TelemetryResult<T> = Result<T, TelemetryError>;

/// Instrumentation scope name used for every tracer and meter brisk creates.
pub const INSTRUMENTATION_NAME: &str = "brisk-http";
