//! # Brisk Client
//!
//! Deadline-bounded, instrumented HTTP clients.
//!
//! [`new_client`] applies aggressive timeout defaults, then the caller's
//! options, then wraps the transport in an [`InstrumentedTransport`] that
//! propagates trace context and records spans and metrics.
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use brisk_client::{new_client, with_connect_timeout, with_timeout};
//!
//! # fn main() -> Result<(), brisk_core::ConfigError> {
//! let client = new_client([
//!     with_timeout(Duration::from_secs(1)),
//!     with_connect_timeout(Duration::from_millis(200)),
//! ])?;
//! assert_eq!(client.timeout(), Duration::from_secs(1));
//! # Ok(())
//! # }
//! ```
//!
//! ## Transports
//!
//! | Shape | Tunable by options | Instrumented by `new_client` |
//! |-------|--------------------|------------------------------|
//! | [`HttpTransport`] | ✅ | ✅ |
//! | custom [`RoundTrip`] | ❌ | ✅ |
//! | [`InstrumentedTransport`] | through its base | already, kept as-is |
//!
//! [`HttpTransport`] speaks `http` and `https`. TLS uses rustls with the
//! Mozilla root set unless [`with_tls_config`] supplies a configuration.

#![doc(html_root_url = "https://docs.rs/brisk-client/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod client;
pub mod connector;
mod error;
mod instrumented;
pub mod options;
pub mod tls;
mod transport;

pub use client::{new_client, Client};
pub use connector::ConnectionInfo;
pub use error::{ClientError, TransportError};
pub use instrumented::{ensure_instrumented, InstrumentedTransport, InstrumentedTransportBuilder};
pub use options::{
    default_client_options, with_client_meter_provider, with_client_propagator,
    with_client_tracer_provider, with_connect_timeout, with_expect_continue_timeout,
    with_idle_conn_timeout, with_max_idle_conns, with_response_header_timeout,
    with_timeout, with_tls_config, with_tls_handshake_timeout, with_transport,
};
pub use tls::{default_tls_config, HttpsConnector, MaybeTls};
pub use transport::{
    default_transport, round_trip_fn, ClientTransport, HttpTransport, RoundTrip, TransportConfig,
};
