//! Client error types.

use std::time::Duration;

use brisk_core::BoxError;
use thiserror::Error;

/// Errors raised by the built-in [`HttpTransport`](crate::HttpTransport).
#[derive(Error, Debug)]
pub enum TransportError {
    /// No response headers arrived within the response-header timeout.
    #[error("timed out after {0:?} waiting for response headers")]
    ResponseHeaderTimeout(Duration),

    /// The TLS handshake did not finish within the handshake timeout.
    #[error("TLS handshake timed out after {0:?}")]
    TlsHandshakeTimeout(Duration),

    /// The URI host is not a valid TLS server name.
    #[error("invalid TLS server name {0:?}")]
    InvalidServerName(String),

    /// The TLS configuration could not be built.
    #[error("TLS configuration error: {0}")]
    Tls(#[source] rustls::Error),

    /// The underlying connection pool or protocol failed.
    #[error("request failed: {0}")]
    Request(#[source] hyper_util::client::legacy::Error),
}

/// Errors returned by [`Client::send`](crate::Client::send).
#[derive(Error, Debug)]
pub enum ClientError {
    /// The total request timeout elapsed before the exchange finished.
    #[error("request exceeded total timeout of {0:?}")]
    Timeout(Duration),

    /// The transport failed. The transport's own error is the source.
    #[error("transport error: {0}")]
    Transport(#[source] BoxError),

    /// The request could not be built.
    #[error("invalid request: {0}")]
    InvalidRequest(#[from] http::Error),
}

impl ClientError {
    /// Returns `true` for [`ClientError::Timeout`].
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ClientError::Timeout(Duration::from_secs(2));
        assert_eq!(err.to_string(), "request exceeded total timeout of 2s");
        assert!(err.is_timeout());

        let err = TransportError::ResponseHeaderTimeout(Duration::from_millis(1500));
        assert_eq!(
            err.to_string(),
            "timed out after 1.5s waiting for response headers"
        );

        let err = TransportError::TlsHandshakeTimeout(Duration::from_millis(500));
        assert_eq!(err.to_string(), "TLS handshake timed out after 500ms");
    }

    #[test]
    fn test_transport_error_keeps_source() {
        use std::error::Error as _;

        let err = ClientError::Transport("connection refused".into());
        assert!(!err.is_timeout());
        assert_eq!(err.source().unwrap().to_string(), "connection refused");
    }
}
