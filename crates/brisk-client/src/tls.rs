//! HTTPS for the built-in transport.
//!
//! [`HttpsConnector`] opens TCP connections with hyper-util's
//! `HttpConnector`, which enforces the connect timeout, then runs the
//! rustls handshake for `https` URIs under the TLS handshake timeout.
//! Plain `http` URIs skip the handshake.

use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use brisk_core::{BoxError, BoxFuture};
use http::uri::Scheme;
use http::Uri;
use hyper::rt::{Read, ReadBufCursor, Write};
use hyper_util::client::legacy::connect::{Connected, Connection, HttpConnector};
use hyper_util::rt::TokioIo;
use rustls::pki_types::ServerName;
use rustls::{ClientConfig, RootCertStore};
use tokio::net::TcpStream;
use tokio_rustls::client::TlsStream;
use tokio_rustls::TlsConnector;
use tower::Service;

use crate::error::TransportError;

const ALPN_H2: &[u8] = b"h2";

/// Client TLS configuration trusting the Mozilla root set, offering HTTP/2
/// and HTTP/1.1 over ALPN.
pub fn default_tls_config() -> Result<Arc<ClientConfig>, TransportError> {
    let roots = RootCertStore {
        roots: webpki_roots::TLS_SERVER_ROOTS.to_vec(),
    };
    let mut config =
        ClientConfig::builder_with_provider(Arc::new(rustls::crypto::ring::default_provider()))
            .with_safe_default_protocol_versions()
            .map_err(TransportError::Tls)?
            .with_root_certificates(roots)
            .with_no_client_auth();
    config.alpn_protocols = vec![ALPN_H2.to_vec(), b"http/1.1".to_vec()];
    Ok(Arc::new(config))
}

/// Connector speaking plain TCP for `http` and TLS for `https`.
#[derive(Clone)]
pub struct HttpsConnector {
    http: HttpConnector,
    tls: TlsConnector,
    handshake_timeout: Option<Duration>,
}

impl HttpsConnector {
    /// Wraps `http`, which must not enforce the `http` scheme.
    pub fn new(
        mut http: HttpConnector,
        config: Arc<ClientConfig>,
        handshake_timeout: Option<Duration>,
    ) -> Self {
        http.enforce_http(false);
        Self {
            http,
            tls: TlsConnector::from(config),
            handshake_timeout,
        }
    }
}

impl Service<Uri> for HttpsConnector {
    type Response = MaybeTls;
    type Error = BoxError;
    type Future = BoxFuture<'static, Result<MaybeTls, BoxError>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.http.poll_ready(cx).map_err(Into::into)
    }

    fn call(&mut self, dst: Uri) -> Self::Future {
        let secure = dst.scheme() == Some(&Scheme::HTTPS);
        let host = dst
            .host()
            .map(|host| host.trim_start_matches('[').trim_end_matches(']').to_string());
        let connecting = self.http.call(dst);
        let tls = self.tls.clone();
        let limit = self.handshake_timeout;

        Box::pin(async move {
            let tcp = connecting.await?;
            if !secure {
                return Ok(MaybeTls::Plain(tcp));
            }

            let host = host.ok_or_else(|| TransportError::InvalidServerName(String::new()))?;
            let name = ServerName::try_from(host.clone())
                .map_err(|_| TransportError::InvalidServerName(host))?;
            let handshake = tls.connect(name, tcp.into_inner());
            let stream = match limit {
                Some(limit) => tokio::time::timeout(limit, handshake)
                    .await
                    .map_err(|_| TransportError::TlsHandshakeTimeout(limit))??,
                None => handshake.await?,
            };
            tracing::trace!("tls handshake complete");
            Ok(MaybeTls::Tls(TokioIo::new(stream)))
        })
    }
}

impl std::fmt::Debug for HttpsConnector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpsConnector")
            .field("handshake_timeout", &self.handshake_timeout)
            .finish_non_exhaustive()
    }
}

/// A connection that is either plain TCP or TLS over TCP.
#[derive(Debug)]
pub enum MaybeTls {
    /// Plain TCP.
    Plain(TokioIo<TcpStream>),
    /// TLS over TCP.
    Tls(TokioIo<TlsStream<TcpStream>>),
}

impl Connection for MaybeTls {
    fn connected(&self) -> Connected {
        match self {
            Self::Plain(io) => io.connected(),
            Self::Tls(io) => {
                let (tcp, session) = io.inner().get_ref();
                let connected = tcp.connected();
                if session.alpn_protocol() == Some(ALPN_H2) {
                    connected.negotiated_h2()
                } else {
                    connected
                }
            }
        }
    }
}

impl Read for MaybeTls {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: ReadBufCursor<'_>,
    ) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Self::Plain(io) => Pin::new(io).poll_read(cx, buf),
            Self::Tls(io) => Pin::new(io).poll_read(cx, buf),
        }
    }
}

impl Write for MaybeTls {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match self.get_mut() {
            Self::Plain(io) => Pin::new(io).poll_write(cx, buf),
            Self::Tls(io) => Pin::new(io).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Self::Plain(io) => Pin::new(io).poll_flush(cx),
            Self::Tls(io) => Pin::new(io).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Self::Plain(io) => Pin::new(io).poll_shutdown(cx),
            Self::Tls(io) => Pin::new(io).poll_shutdown(cx),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_offers_h2_first() {
        let config = default_tls_config().unwrap();
        assert_eq!(config.alpn_protocols[0], b"h2");
        assert_eq!(config.alpn_protocols[1], b"http/1.1");
    }

    #[tokio::test]
    async fn test_stalled_handshake_times_out() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            // Accept and never answer the ClientHello.
            let (socket, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(5)).await;
            drop(socket);
        });

        let mut connector = HttpsConnector::new(
            HttpConnector::new(),
            default_tls_config().unwrap(),
            Some(Duration::from_millis(100)),
        );
        let uri: Uri = format!("https://127.0.0.1:{}/", addr.port()).parse().unwrap();
        let err = connector.call(uri).await.unwrap_err();

        assert!(matches!(
            err.downcast_ref::<TransportError>(),
            Some(TransportError::TlsHandshakeTimeout(d)) if *d == Duration::from_millis(100)
        ));
        server.abort();
    }

    #[tokio::test]
    async fn test_plain_uri_skips_handshake() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move { listener.accept().await.map(|_| ()) });

        let mut connector =
            HttpsConnector::new(HttpConnector::new(), default_tls_config().unwrap(), None);
        let uri: Uri = format!("http://{addr}/").parse().unwrap();
        let conn = connector.call(uri).await.unwrap();

        assert!(matches!(conn, MaybeTls::Plain(_)));
        server.await.unwrap().unwrap();
    }
}
