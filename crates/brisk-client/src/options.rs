//! Client options and their defaults.
//!
//! The defaults are tuned for low-latency traffic between services on a
//! trusted internal network:
//!
//! | Option | Default |
//! |--------|---------|
//! | total request timeout | 2s |
//! | connect timeout | 500ms |
//! | TLS handshake timeout | 500ms |
//! | response header timeout | 1.5s |
//! | max idle connections per host | 100 |
//! | idle connection timeout | 90s |
//! | expect-continue timeout | 1s |
//!
//! Options tuning the base transport fail with
//! [`ConfigError::UnsupportedTransport`] once a caller-supplied transport has
//! replaced the built-in one.

use std::sync::Arc;
use std::time::Duration;

use brisk_core::{ConfigError, ConfigResult, Opt};
use brisk_telemetry::{trace, Propagation, INSTRUMENTATION_NAME};
use opentelemetry::metrics::MeterProvider;
use opentelemetry::propagation::TextMapPropagator;
use opentelemetry::trace::{Tracer, TracerProvider};
use rustls::ClientConfig;

use crate::client::Client;
use crate::transport::{ClientTransport, HttpTransport, TransportConfig};

/// Default total request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(2);
/// Default connect timeout.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_millis(500);
/// Default TLS handshake timeout.
pub const DEFAULT_TLS_HANDSHAKE_TIMEOUT: Duration = Duration::from_millis(500);
/// Default response header timeout.
pub const DEFAULT_RESPONSE_HEADER_TIMEOUT: Duration = Duration::from_millis(1500);
/// Default maximum idle connections.
pub const DEFAULT_MAX_IDLE_CONNS: usize = 100;
/// Default idle connection timeout.
pub const DEFAULT_IDLE_CONN_TIMEOUT: Duration = Duration::from_secs(90);
/// Default expect-continue timeout.
pub const DEFAULT_EXPECT_CONTINUE_TIMEOUT: Duration = Duration::from_secs(1);

/// The option list every client starts from, in application order.
pub fn default_client_options() -> Vec<Opt<Client>> {
    vec![
        with_timeout(DEFAULT_TIMEOUT),
        with_connect_timeout(DEFAULT_CONNECT_TIMEOUT),
        with_tls_handshake_timeout(DEFAULT_TLS_HANDSHAKE_TIMEOUT),
        with_response_header_timeout(DEFAULT_RESPONSE_HEADER_TIMEOUT),
        with_max_idle_conns(DEFAULT_MAX_IDLE_CONNS),
        with_idle_conn_timeout(DEFAULT_IDLE_CONN_TIMEOUT),
        with_expect_continue_timeout(DEFAULT_EXPECT_CONTINUE_TIMEOUT),
    ]
}

/// Transport configuration matching the client defaults.
pub fn default_transport_config() -> TransportConfig {
    TransportConfig {
        connect_timeout: Some(DEFAULT_CONNECT_TIMEOUT),
        tls_handshake_timeout: Some(DEFAULT_TLS_HANDSHAKE_TIMEOUT),
        response_header_timeout: Some(DEFAULT_RESPONSE_HEADER_TIMEOUT),
        idle_conn_timeout: Some(DEFAULT_IDLE_CONN_TIMEOUT),
        expect_continue_timeout: Some(DEFAULT_EXPECT_CONTINUE_TIMEOUT),
        max_idle_conns: Some(DEFAULT_MAX_IDLE_CONNS),
    }
}

fn positive(field: &'static str, value: Duration) -> ConfigResult<Duration> {
    if value.is_zero() {
        return Err(ConfigError::invalid_value(field, "must be greater than zero"));
    }
    Ok(value)
}

fn base_transport<'a>(
    client: &'a mut Client,
    option: &'static str,
) -> ConfigResult<&'a mut HttpTransport> {
    client
        .transport
        .http_mut()
        .ok_or(ConfigError::UnsupportedTransport { option })
}

fn transport_option<F>(option: &'static str, value: Duration, set: F) -> Opt<Client>
where
    F: Fn(&mut TransportConfig, Duration) + Send + Sync + 'static,
{
    Opt::new(option, move |client: &mut Client| {
        let value = positive(option, value)?;
        set(base_transport(client, option)?.config_mut(), value);
        Ok(())
    })
}

/// Bounds the whole exchange, response body included.
pub fn with_timeout(timeout: Duration) -> Opt<Client> {
    Opt::new("timeout", move |client: &mut Client| {
        client.timeout = positive("timeout", timeout)?;
        Ok(())
    })
}

/// Bounds establishing a connection.
pub fn with_connect_timeout(timeout: Duration) -> Opt<Client> {
    transport_option("connect_timeout", timeout, |config, d| {
        config.connect_timeout = Some(d);
    })
}

/// Bounds a TLS handshake.
pub fn with_tls_handshake_timeout(timeout: Duration) -> Opt<Client> {
    transport_option("tls_handshake_timeout", timeout, |config, d| {
        config.tls_handshake_timeout = Some(d);
    })
}

/// Bounds the wait for response headers.
pub fn with_response_header_timeout(timeout: Duration) -> Opt<Client> {
    transport_option("response_header_timeout", timeout, |config, d| {
        config.response_header_timeout = Some(d);
    })
}

/// Sets how long idle pooled connections are kept.
pub fn with_idle_conn_timeout(timeout: Duration) -> Opt<Client> {
    transport_option("idle_conn_timeout", timeout, |config, d| {
        config.idle_conn_timeout = Some(d);
    })
}

/// Sets how long a request carrying `Expect: 100-continue` holds its body
/// back waiting for `100 Continue`. The body is sent once the interim
/// response arrives or the timeout passes.
pub fn with_expect_continue_timeout(timeout: Duration) -> Opt<Client> {
    transport_option("expect_continue_timeout", timeout, |config, d| {
        config.expect_continue_timeout = Some(d);
    })
}

/// Caps the idle connections the pool keeps per host. `0` means no limit.
pub fn with_max_idle_conns(max: usize) -> Opt<Client> {
    Opt::new("max_idle_conns", move |client: &mut Client| {
        base_transport(client, "max_idle_conns")?
            .config_mut()
            .max_idle_conns = Some(max);
        Ok(())
    })
}

/// Uses `config` for `https` connections instead of the default rustls
/// configuration.
pub fn with_tls_config(config: Arc<ClientConfig>) -> Opt<Client> {
    Opt::new("tls_config", move |client: &mut Client| {
        base_transport(client, "tls_config")?.set_tls_config(config.clone());
        Ok(())
    })
}

/// Replaces the base transport.
pub fn with_transport(transport: impl Into<ClientTransport>) -> Opt<Client> {
    let transport = transport.into();
    Opt::new("transport", move |client: &mut Client| {
        client.transport = transport.clone();
        Ok(())
    })
}

/// Injects the tracer provider used for client spans.
pub fn with_client_tracer_provider<P>(provider: P) -> Opt<Client>
where
    P: TracerProvider,
    P::Tracer: Send + Sync + 'static,
    <P::Tracer as Tracer>::Span: Send + Sync + 'static,
{
    let tracer = trace::from_provider(&provider);
    Opt::new("tracer_provider", move |client: &mut Client| {
        client.tracer = Some(tracer.clone());
        Ok(())
    })
}

/// Injects the meter provider used for client instruments.
pub fn with_client_meter_provider<P: MeterProvider>(provider: P) -> Opt<Client> {
    let meter = provider.meter(INSTRUMENTATION_NAME);
    Opt::new("meter_provider", move |client: &mut Client| {
        client.meter = Some(meter.clone());
        Ok(())
    })
}

/// Uses `propagator` instead of the global one.
pub fn with_client_propagator<P>(propagator: P) -> Opt<Client>
where
    P: TextMapPropagator + Send + Sync + 'static,
{
    let propagation = Propagation::instance(propagator);
    Opt::new("propagator", move |client: &mut Client| {
        client.propagation = propagation.clone();
        Ok(())
    })
}
