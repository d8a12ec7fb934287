//! Exit-code carriers.
//!
//! A process entry point maps errors to exit codes without knowing which
//! crate produced them: any layer may wrap an error in [`ExitCodeError`], and
//! [`exit_code`] finds the first one in the source chain.

use std::error::Error;

use thiserror::Error;

use crate::body::BoxError;

/// An error tagged with the process exit code it should produce.
#[derive(Error, Debug)]
#[error("{source} (exit code {code})")]
pub struct ExitCodeError {
    code: i32,
    #[source]
    source: BoxError,
}

impl ExitCodeError {
    /// Tags `source` with `code`.
    pub fn new(code: i32, source: impl Into<BoxError>) -> Self {
        Self {
            code,
            source: source.into(),
        }
    }

    /// Returns the exit code.
    pub fn code(&self) -> i32 {
        self.code
    }
}

/// Returns the exit code carried anywhere in `err`'s source chain.
pub fn exit_code(err: &(dyn Error + 'static)) -> Option<i32> {
    let mut current = Some(err);
    while let Some(e) = current {
        if let Some(carrier) = e.downcast_ref::<ExitCodeError>() {
            return Some(carrier.code());
        }
        current = e.source();
    }
    None
}
