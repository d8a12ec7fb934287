//! Layered settings for brisk clients and servers.
//!
//! Settings come from defaults, then TOML or JSON files, then
//! `PREFIX__SECTION__KEY` environment variables. Loaded settings turn into
//! option lists for [`new_client`](brisk_client::new_client) and
//! [`new_server`](brisk_server::new_server). Only fields that were set
//! become options, so the factory defaults still fill everything else.
//!
//! # Example
//!
//! ```no_run
//! use brisk_config::SettingsLoader;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let settings = SettingsLoader::new()
//!     .with_optional_file("brisk.toml")?
//!     .with_env_prefix("BRISK")
//!     .load()?;
//!
//! let client = brisk_client::new_client(settings.client.options())?;
//! let server = brisk_server::new_server(settings.server.addr(), None, settings.server.options())?;
//! # let _ = (client, server);
//! # Ok(())
//! # }
//! ```
//!
//! # Settings File Format
//!
//! ```toml
//! [client]
//! timeout_ms = 2000
//! connect_timeout_ms = 500
//! max_idle_conns = 100
//!
//! [server]
//! addr = "0.0.0.0:8080"
//! read_timeout_ms = 2000
//! shutdown_grace_period_ms = 5000
//!
//! [logging]
//! level = "info"
//! json = true
//! ```
//!
//! # Environment Variable Overrides
//!
//! - `BRISK__CLIENT__TIMEOUT_MS=1000`
//! - `BRISK__SERVER__ADDR=0.0.0.0:9000`
//! - `BRISK__LOGGING__LEVEL=debug`

#![warn(missing_docs)]

mod error;
mod loader;
mod settings;

pub use error::{Layer, SettingsError};
pub use loader::SettingsLoader;
pub use settings::{
    ClientSettings, LoggingSettings, ServerSettings, Settings, DEFAULT_SERVER_ADDR,
};
