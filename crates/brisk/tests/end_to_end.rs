//! Client and server together over loopback.

use std::error::Error;
use std::sync::{Arc, Mutex};

use brisk::prelude::*;
use http::{Request, Response};
use http_body_util::BodyExt;
use opentelemetry::trace::{SpanKind, TraceContextExt};
use opentelemetry::Context;
use opentelemetry_sdk::propagation::TraceContextPropagator;
use opentelemetry_sdk::testing::trace::InMemorySpanExporter;
use opentelemetry_sdk::trace::TracerProvider;
use tokio::net::TcpListener;
use tokio::sync::oneshot;

#[tokio::test]
async fn trace_context_crosses_the_wire() {
    let exporter = InMemorySpanExporter::default();
    let provider = TracerProvider::builder()
        .with_simple_exporter(exporter.clone())
        .build();

    let seen = Arc::new(Mutex::new(None));
    let captured = Arc::clone(&seen);
    let handler = handler_fn(move |req: Request<Body>| {
        let trace_id = req
            .extensions()
            .get::<Context>()
            .map(|cx| cx.span().span_context().trace_id());
        *captured.lock().unwrap() = trace_id;
        async { Response::new(body::full("pong")) }
    });

    let server = new_server(
        "127.0.0.1:0".parse().unwrap(),
        Some(handler),
        [
            with_server_tracer_provider(provider.clone()),
            with_server_propagator(TraceContextPropagator::new()),
        ],
    )
    .unwrap();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (stop, stopped) = oneshot::channel();
    let running = tokio::spawn(server.serve(listener, async move {
        stopped.await.unwrap_or(Signal::Terminate)
    }));

    let client = new_client([
        with_client_tracer_provider(provider.clone()),
        with_client_propagator(TraceContextPropagator::new()),
    ])
    .unwrap();
    let response = client
        .get(format!("http://{addr}/ping").parse().unwrap())
        .await
        .unwrap();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(&bytes[..], b"pong");

    stop.send(Signal::Interrupt).unwrap();
    running.await.unwrap().unwrap();

    let spans = exporter.get_finished_spans().unwrap();
    let client_span = spans
        .iter()
        .find(|s| s.span_kind == SpanKind::Client)
        .unwrap();
    let server_span = spans
        .iter()
        .find(|s| s.span_kind == SpanKind::Server)
        .unwrap();

    assert_eq!(server_span.parent_span_id, client_span.span_context.span_id());
    assert_eq!(
        server_span.span_context.trace_id(),
        client_span.span_context.trace_id()
    );
    assert_eq!(
        *seen.lock().unwrap(),
        Some(client_span.span_context.trace_id())
    );
}

#[test]
fn shutdown_errors_carry_exit_codes() {
    let drain = ServerError::DrainTimeout {
        grace: Duration::from_secs(5),
        signal: Signal::Terminate,
    };
    let wrapped: Box<dyn Error + Send + Sync> = Box::new(ExitCodeError::new(3, drain));
    assert_eq!(exit_code(wrapped.as_ref()), Some(3));

    let plain = ServerError::DrainTimeout {
        grace: Duration::from_secs(5),
        signal: Signal::Interrupt,
    };
    assert_eq!(exit_code(&plain), None);
}
