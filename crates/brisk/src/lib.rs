//! # Brisk
//!
//! **Deadline-bounded, instrumented HTTP for services on a trusted network**
//!
//! - ⏱️ **Aggressive defaults** – every client and server starts from tight,
//!   explicit timeouts that callers override option by option
//! - 📊 **Instrumented by construction** – transports and handlers are wrapped
//!   once with OpenTelemetry propagation, spans and metrics
//! - 🛑 **Bounded shutdown** – SIGINT/SIGTERM drain open connections for at
//!   most a grace period; listener failures stop at once
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use brisk::prelude::*;
//! use http::Response;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     brisk::telemetry::init_logging(&LogConfig::production())?;
//!
//!     let upstream = new_client([with_timeout(Duration::from_millis(800))])?;
//!     let handler = handler_fn(move |_req| {
//!         let upstream = upstream.clone();
//!         async move {
//!             match upstream.get("http://inventory.internal/stock".parse().unwrap()).await {
//!                 Ok(_) => Response::new(body::full("in stock")),
//!                 Err(_) => Response::new(body::full("unknown")),
//!             }
//!         }
//!     });
//!
//!     let server = new_server("0.0.0.0:8080".parse()?, Some(handler), Vec::new())?;
//!     server.run().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Crates
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`core`] | option lists, body types, exit codes |
//! | [`telemetry`] | propagation, tracers, instruments, logging |
//! | [`client`] | clients, transports, the transport decorator |
//! | [`server`] | servers, handlers, the handler decorator, shutdown |
//! | [`config`] | layered settings that produce option lists |

#![doc(html_root_url = "https://docs.rs/brisk/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub use brisk_client as client;
pub use brisk_config as config;
pub use brisk_core as core;
pub use brisk_server as server;
pub use brisk_telemetry as telemetry;

/// Prelude module for convenient imports.
///
/// ```rust
/// use brisk::prelude::*;
///
/// let client = new_client([with_timeout(Duration::from_secs(1))]).unwrap();
/// assert_eq!(client.timeout(), Duration::from_secs(1));
/// ```
pub mod prelude {
    pub use std::time::Duration;

    pub use brisk_core::{body, exit_code, Body, ConfigError, ExitCodeError, Opt};

    pub use brisk_telemetry::{init_logging, LogConfig, Propagation};

    pub use brisk_client::{
        new_client, with_client_meter_provider, with_client_propagator,
        with_client_tracer_provider, with_connect_timeout, with_expect_continue_timeout,
        with_idle_conn_timeout, with_max_idle_conns, with_response_header_timeout, with_timeout,
        with_tls_config, with_tls_handshake_timeout, with_transport, Client, ClientError,
        ClientTransport, RoundTrip,
    };

    pub use brisk_server::{
        handler_fn, new_server, with_idle_timeout, with_read_timeout, with_server_meter_provider,
        with_server_propagator, with_server_tracer_provider, with_shutdown_grace_period,
        with_write_timeout, Handler, Server, ServerError, ServerHandler, ShutdownState, Signal,
    };

    pub use brisk_config::{Settings, SettingsLoader};
}
