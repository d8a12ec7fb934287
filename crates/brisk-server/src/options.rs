//! Server options and their defaults.
//!
//! | Option | Default |
//! |--------|---------|
//! | read timeout | 2s |
//! | write timeout | 2s |
//! | idle timeout | 2s |
//! | shutdown grace period | 5s |

use std::time::Duration;

use brisk_core::{ConfigError, ConfigResult, Opt};
use brisk_telemetry::{trace, Propagation, INSTRUMENTATION_NAME};
use opentelemetry::metrics::MeterProvider;
use opentelemetry::propagation::TextMapPropagator;
use opentelemetry::trace::{Tracer, TracerProvider};

use crate::server::Server;

/// Default time allowed to read request headers.
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(2);
/// Default time allowed to produce a response.
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(2);
/// Default keep-alive idle timeout.
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(2);
/// Default time allowed for open connections to finish after a signal.
pub const DEFAULT_SHUTDOWN_GRACE_PERIOD: Duration = Duration::from_secs(5);

/// The option list every server starts from, in application order.
pub fn default_server_options() -> Vec<Opt<Server>> {
    vec![
        with_read_timeout(DEFAULT_READ_TIMEOUT),
        with_write_timeout(DEFAULT_WRITE_TIMEOUT),
        with_idle_timeout(DEFAULT_IDLE_TIMEOUT),
        with_shutdown_grace_period(DEFAULT_SHUTDOWN_GRACE_PERIOD),
    ]
}

fn duration_option<F>(option: &'static str, value: Duration, set: F) -> Opt<Server>
where
    F: Fn(&mut Server, Duration) + Send + Sync + 'static,
{
    Opt::new(option, move |server: &mut Server| {
        if value.is_zero() {
            return Err(ConfigError::invalid_value(option, "must be greater than zero"));
        }
        set(server, value);
        Ok(())
    })
}

/// Bounds reading a request's headers.
pub fn with_read_timeout(timeout: Duration) -> Opt<Server> {
    duration_option("read_timeout", timeout, |server, d| server.read_timeout = d)
}

/// Bounds producing a response, from headers read to handler return.
pub fn with_write_timeout(timeout: Duration) -> Opt<Server> {
    duration_option("write_timeout", timeout, |server, d| server.write_timeout = d)
}

/// Closes keep-alive connections idle for this long.
pub fn with_idle_timeout(timeout: Duration) -> Opt<Server> {
    duration_option("idle_timeout", timeout, |server, d| server.idle_timeout = d)
}

/// Bounds how long open connections may run after a shutdown signal.
pub fn with_shutdown_grace_period(grace: Duration) -> Opt<Server> {
    duration_option("shutdown_grace_period", grace, |server, d| {
        server.grace_period = d;
    })
}

/// Injects the tracer provider used for server spans.
pub fn with_server_tracer_provider<P>(provider: P) -> Opt<Server>
where
    P: TracerProvider,
    P::Tracer: Send + Sync + 'static,
    <P::Tracer as Tracer>::Span: Send + Sync + 'static,
{
    let tracer = trace::from_provider(&provider);
    Opt::new("tracer_provider", move |server: &mut Server| {
        server.tracer = Some(tracer.clone());
        Ok(())
    })
}

/// Injects the meter provider used for server instruments.
pub fn with_server_meter_provider<P: MeterProvider>(provider: P) -> Opt<Server> {
    let meter = provider.meter(INSTRUMENTATION_NAME);
    Opt::new("meter_provider", move |server: &mut Server| {
        server.meter = Some(meter.clone());
        Ok(())
    })
}

/// Uses `propagator` instead of the global one.
pub fn with_server_propagator<P>(propagator: P) -> Opt<Server>
where
    P: TextMapPropagator + Send + Sync + 'static,
{
    let propagation = Propagation::instance(propagator);
    Opt::new("propagator", move |server: &mut Server| {
        server.propagation = propagation.clone();
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use brisk_core::build;

    fn bare() -> Server {
        Server::bare(([127, 0, 0, 1], 0).into(), None)
    }

    #[test]
    fn test_defaults_applied_in_order() {
        let names: Vec<_> = default_server_options().iter().map(Opt::name).collect();
        assert_eq!(
            names,
            vec![
                "read_timeout",
                "write_timeout",
                "idle_timeout",
                "shutdown_grace_period"
            ]
        );

        let server = build(bare(), &default_server_options(), Vec::new()).unwrap();
        assert_eq!(server.read_timeout(), DEFAULT_READ_TIMEOUT);
        assert_eq!(server.write_timeout(), DEFAULT_WRITE_TIMEOUT);
        assert_eq!(server.idle_timeout(), DEFAULT_IDLE_TIMEOUT);
        assert_eq!(server.shutdown_grace_period(), DEFAULT_SHUTDOWN_GRACE_PERIOD);
    }

    #[test]
    fn test_zero_grace_rejected() {
        let err = build(bare(), &[], [with_shutdown_grace_period(Duration::ZERO)]).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidValue {
                field: "shutdown_grace_period",
                ..
            }
        ));
    }
}
