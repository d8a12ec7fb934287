//! # Brisk Core
//!
//! Core types shared by the brisk client and server crates.
//!
//! This crate provides the foundational pieces the rest of the workspace
//! builds on:
//!
//! - [`Opt`] and [`build`] - Named configuration mutators applied in order
//! - [`ConfigError`] - Construction-time failures
//! - [`Body`], [`BoxError`], [`BoxFuture`] - Type-erased HTTP plumbing
//! - [`Deadline`] - Per-request deadline enforced by the decorators
//! - [`exit_code`] - Exit-code lookup across an error's source chain

#![doc(html_root_url = "https://docs.rs/brisk-core/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod body;
mod deadline;
mod error;
mod exit;
pub mod options;

pub use body::{Body, BoxError, BoxFuture};
pub use deadline::{Deadline, DeadlineExceeded};
pub use error::{ConfigError, ConfigResult};
pub use exit::{exit_code, ExitCodeError};
pub use options::{build, Opt};
