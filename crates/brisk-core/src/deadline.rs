//! Request deadlines.
//!
//! The client stores a [`Deadline`] in the request extensions for its total
//! timeout; the server does the same for its write timeout. The transport
//! and handler decorators enforce it themselves so an expired request is
//! still recorded on its span and in the duration histogram.

use std::future::Future;
use std::time::Duration;

use thiserror::Error;
use tokio::time::Instant;

/// A point in time a request must finish by, and the budget it came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Deadline {
    at: Instant,
    budget: Duration,
}

impl Deadline {
    /// A deadline `budget` from now.
    pub fn after(budget: Duration) -> Self {
        Self {
            at: Instant::now() + budget,
            budget,
        }
    }

    /// The instant the deadline passes.
    pub fn at(&self) -> Instant {
        self.at
    }

    /// The budget the deadline was created with.
    pub fn budget(&self) -> Duration {
        self.budget
    }

    /// Returns `true` once the deadline has passed.
    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.at
    }

    /// Runs `fut` until the deadline.
    pub async fn run<F: Future>(self, fut: F) -> Result<F::Output, DeadlineExceeded> {
        tokio::time::timeout_at(self.at, fut)
            .await
            .map_err(|_| DeadlineExceeded(self.budget))
    }
}

/// A request ran past its [`Deadline`].
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("deadline of {0:?} exceeded")]
pub struct DeadlineExceeded(pub Duration);
