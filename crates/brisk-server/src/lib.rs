//! # Brisk Server
//!
//! Instrumented HTTP servers with enforced timeouts and a bounded graceful
//! shutdown.
//!
//! [`new_server`] applies the default timeouts, then the caller's options,
//! then wraps the handler in an [`InstrumentedHandler`]. [`Server::run`]
//! serves until SIGINT or SIGTERM and then drains open connections for at
//! most the grace period.
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use brisk_core::body;
//! use brisk_server::{handler_fn, new_server, with_shutdown_grace_period};
//! use http::Response;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let hello = handler_fn(|_req| async { Response::new(body::full("hello")) });
//!     let server = new_server(
//!         "0.0.0.0:8080".parse()?,
//!         Some(hello),
//!         [with_shutdown_grace_period(Duration::from_secs(10))],
//!     )?;
//!     server.run().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Shutdown outcomes
//!
//! | Trigger | Drain | Result |
//! |---------|-------|--------|
//! | signal, connections finish in time | yes | `Ok(())` |
//! | signal, grace period elapses | yes, cut short | [`ServerError::DrainTimeout`] |
//! | listener fails | no | [`ServerError::Listener`] |

#![doc(html_root_url = "https://docs.rs/brisk-server/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod error;
mod handler;
mod instrumented;
pub mod listener;
pub mod options;
mod server;
pub mod shutdown;

pub use error::{ServerError, ServerResult};
pub use handler::{handler_fn, Handler, NotFound, ServerHandler};
pub use instrumented::{ensure_instrumented, InstrumentedHandler, InstrumentedHandlerBuilder};
pub use listener::Listener;
pub use options::{
    default_server_options, with_idle_timeout, with_read_timeout, with_server_meter_provider,
    with_server_propagator, with_server_tracer_provider, with_shutdown_grace_period,
    with_write_timeout,
};
pub use server::{new_server, Server};
pub use shutdown::{os_signal, ShutdownState, Signal, StopReason};
