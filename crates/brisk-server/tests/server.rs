//! Integration tests for the handler decorator and the shutdown coordinator.

use std::collections::VecDeque;
use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use brisk_client::new_client;
use brisk_core::body::{self, Body};
use brisk_server::{
    handler_fn, new_server, options, with_idle_timeout, with_read_timeout,
    with_server_meter_provider, with_server_propagator, with_server_tracer_provider,
    with_shutdown_grace_period, with_write_timeout, Handler, Listener, Server, ServerError,
    ServerResult, ShutdownState, Signal, StopReason,
};
use http::{Request, Response, StatusCode};
use http_body_util::BodyExt;
use opentelemetry::trace::{SpanId, SpanKind, Status, TraceContextExt, TraceId};
use opentelemetry::{Context, KeyValue};
use opentelemetry_sdk::metrics::SdkMeterProvider;
use opentelemetry_sdk::propagation::TraceContextPropagator;
use opentelemetry_sdk::testing::trace::InMemorySpanExporter;
use opentelemetry_sdk::trace::TracerProvider;
use proptest::prelude::*;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{oneshot, watch, Notify};
use tokio::task::JoinHandle;

fn loopback() -> SocketAddr {
    ([127, 0, 0, 1], 0).into()
}

fn tracing_provider() -> (TracerProvider, InMemorySpanExporter) {
    let exporter = InMemorySpanExporter::default();
    let provider = TracerProvider::builder()
        .with_simple_exporter(exporter.clone())
        .build();
    (provider, exporter)
}

struct Running {
    addr: SocketAddr,
    signal: oneshot::Sender<Signal>,
    state: watch::Receiver<ShutdownState>,
    task: JoinHandle<ServerResult<()>>,
}

impl Running {
    async fn stop(self, signal: Signal) -> (ServerResult<()>, ShutdownState) {
        self.signal.send(signal).unwrap();
        let result = self.task.await.unwrap();
        let state = *self.state.borrow();
        (result, state)
    }
}

async fn start(server: Server) -> Running {
    let listener = TcpListener::bind(loopback()).await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (signal, received) = oneshot::channel();
    let state = server.state();
    let task = tokio::spawn(server.serve(listener, async move {
        received.await.unwrap_or(Signal::Terminate)
    }));
    Running {
        addr,
        signal,
        state,
        task,
    }
}

/// Fails every accept, first with the queued kinds and then fatally.
struct FailingListener {
    errors: VecDeque<io::ErrorKind>,
    attempts: Arc<AtomicUsize>,
}

impl FailingListener {
    fn new(errors: impl IntoIterator<Item = io::ErrorKind>) -> Self {
        Self {
            errors: errors.into_iter().collect(),
            attempts: Arc::new(AtomicUsize::new(0)),
        }
    }
}

impl Listener for FailingListener {
    type Io = TcpStream;
    type Addr = SocketAddr;

    fn accept(&mut self) -> impl Future<Output = io::Result<(Self::Io, Self::Addr)>> + Send {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let kind = self
            .errors
            .pop_front()
            .unwrap_or(io::ErrorKind::PermissionDenied);
        async move { Err(io::Error::new(kind, "accept failed")) }
    }

    fn local_addr(&self) -> io::Result<Self::Addr> {
        Err(io::ErrorKind::NotConnected.into())
    }
}

#[test]
fn defaults_without_overrides() {
    let server = new_server(loopback(), None, Vec::new()).unwrap();
    assert_eq!(server.read_timeout(), options::DEFAULT_READ_TIMEOUT);
    assert_eq!(server.write_timeout(), Duration::from_secs(2));
    assert_eq!(server.idle_timeout(), Duration::from_secs(2));
    assert_eq!(server.shutdown_grace_period(), Duration::from_secs(5));
}

proptest! {
    #[test]
    fn overrides_always_win(
        read in 1u64..60_000,
        write in 1u64..60_000,
        idle in 1u64..600_000,
        grace in 1u64..120_000,
    ) {
        let ms = Duration::from_millis;
        let server = new_server(
            loopback(),
            None,
            [
                with_read_timeout(ms(read)),
                with_write_timeout(ms(write)),
                with_idle_timeout(ms(idle)),
                with_shutdown_grace_period(ms(grace)),
            ],
        )
        .unwrap();

        prop_assert_eq!(server.read_timeout(), ms(read));
        prop_assert_eq!(server.write_timeout(), ms(write));
        prop_assert_eq!(server.idle_timeout(), ms(idle));
        prop_assert_eq!(server.shutdown_grace_period(), ms(grace));
    }
}

async fn explode(_req: Request<Body>) -> Response<Body> {
    panic!("inventory lookup failed")
}

#[tokio::test]
async fn signal_without_inflight_requests_stops_promptly() {
    let server = new_server(loopback(), None, Vec::new()).unwrap();
    let running = start(server).await;

    let started = Instant::now();
    let (result, state) = running.stop(Signal::Interrupt).await;

    assert!(result.is_ok());
    assert_eq!(state, ShutdownState::Stopped(StopReason::Graceful));
    assert!(started.elapsed() < Duration::from_secs(1));
}

#[tokio::test]
async fn default_handler_answers_not_found() {
    let server = new_server(loopback(), None, Vec::new()).unwrap();
    let running = start(server).await;

    let client = new_client(Vec::new()).unwrap();
    let uri = format!("http://{}/anything", running.addr).parse().unwrap();
    let response = client.get(uri).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let (result, _) = running.stop(Signal::Terminate).await;
    assert!(result.is_ok());
}

#[tokio::test]
async fn inflight_request_finishes_during_drain() {
    let entered = Arc::new(Notify::new());
    let notify = Arc::clone(&entered);
    let handler = handler_fn(move |_req| {
        let notify = Arc::clone(&notify);
        async move {
            notify.notify_one();
            tokio::time::sleep(Duration::from_millis(200)).await;
            Response::new(body::full("done"))
        }
    });
    let server = new_server(loopback(), Some(handler), Vec::new()).unwrap();
    let running = start(server).await;

    let client = new_client(Vec::new()).unwrap();
    let uri = format!("http://{}/slow", running.addr).parse().unwrap();
    let request = tokio::spawn(async move {
        let response = client.get(uri).await.unwrap();
        response.into_body().collect().await.unwrap().to_bytes()
    });

    entered.notified().await;
    let (result, state) = running.stop(Signal::Terminate).await;

    assert!(result.is_ok());
    assert_eq!(state, ShutdownState::Stopped(StopReason::Graceful));
    assert_eq!(&request.await.unwrap()[..], b"done");
}

#[tokio::test]
async fn request_held_past_grace_period_times_out() {
    let entered = Arc::new(Notify::new());
    let notify = Arc::clone(&entered);
    let handler = handler_fn(move |_req| {
        let notify = Arc::clone(&notify);
        async move {
            notify.notify_one();
            tokio::time::sleep(Duration::from_secs(30)).await;
            Response::new(body::empty())
        }
    });
    let grace = Duration::from_millis(200);
    let server = new_server(
        loopback(),
        Some(handler),
        [with_shutdown_grace_period(grace)],
    )
    .unwrap();
    let running = start(server).await;

    let client = new_client(Vec::new()).unwrap();
    let uri = format!("http://{}/stuck", running.addr).parse().unwrap();
    let _request = tokio::spawn(async move { client.get(uri).await });

    entered.notified().await;
    let started = Instant::now();
    let (result, state) = running.stop(Signal::Terminate).await;

    assert!(started.elapsed() >= grace);
    assert!(started.elapsed() < Duration::from_secs(2));
    assert_eq!(state, ShutdownState::Stopped(StopReason::Timeout));
    match result {
        Err(ServerError::DrainTimeout { grace: elapsed, signal }) => {
            assert_eq!(elapsed, grace);
            assert_eq!(signal, Signal::Terminate);
        }
        other => panic!("expected a drain timeout, got {other:?}"),
    }
}

#[tokio::test]
async fn listener_failure_returns_without_drain() {
    let server = new_server(loopback(), None, Vec::new()).unwrap();
    let state = server.state();

    let started = Instant::now();
    let result = server
        .serve(FailingListener::new([]), std::future::pending::<Signal>())
        .await;

    assert!(started.elapsed() < Duration::from_secs(1));
    assert_eq!(
        *state.borrow(),
        ShutdownState::Stopped(StopReason::ListenerError)
    );
    match result {
        Err(ServerError::Listener(err)) => assert_eq!(err.kind(), io::ErrorKind::PermissionDenied),
        other => panic!("expected a listener error, got {other:?}"),
    }
}

#[tokio::test]
async fn transient_accept_errors_are_retried() {
    let listener = FailingListener::new([
        io::ErrorKind::ConnectionAborted,
        io::ErrorKind::ConnectionReset,
    ]);
    let attempts = Arc::clone(&listener.attempts);
    let server = new_server(loopback(), None, Vec::new()).unwrap();

    let result = server
        .serve(listener, std::future::pending::<Signal>())
        .await;

    assert!(matches!(result, Err(ServerError::Listener(ref err)) if err.kind() == io::ErrorKind::PermissionDenied));
    assert_eq!(attempts.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn idle_connections_are_closed() {
    let server = new_server(
        loopback(),
        None,
        [with_idle_timeout(Duration::from_millis(100))],
    )
    .unwrap();
    let running = start(server).await;

    let mut stream = TcpStream::connect(running.addr).await.unwrap();
    let mut buf = Vec::new();
    let closed = tokio::time::timeout(Duration::from_secs(2), stream.read_to_end(&mut buf)).await;
    assert!(closed.is_ok(), "server kept an idle connection open");

    let (result, _) = running.stop(Signal::Interrupt).await;
    assert!(result.is_ok());
}

#[tokio::test]
async fn server_span_records_final_status() {
    let (provider, exporter) = tracing_provider();
    let handler = handler_fn(|req: Request<Body>| async move {
        if let Some(cx) = req.extensions().get::<Context>() {
            cx.span().update_name("orders.create");
            cx.span().set_attribute(KeyValue::new("order.items", 3_i64));
        }
        let mut response = Response::new(body::empty());
        *response.status_mut() = StatusCode::CREATED;
        response
    });
    let server = new_server(
        loopback(),
        Some(handler),
        [
            with_server_tracer_provider(provider.clone()),
            with_server_propagator(TraceContextPropagator::new()),
        ],
    )
    .unwrap();

    let req = Request::post("/orders")
        .header(
            "traceparent",
            "00-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-01",
        )
        .header("user-agent", "checkout/1.4")
        .body(body::empty())
        .unwrap();
    let response = server.handler().call(req).await;
    assert_eq!(response.status(), StatusCode::CREATED);

    let spans = exporter.get_finished_spans().unwrap();
    assert_eq!(spans.len(), 1);
    let span = &spans[0];
    assert_eq!(span.name, "orders.create");
    assert_eq!(span.span_kind, SpanKind::Server);
    assert_eq!(
        span.span_context.trace_id(),
        TraceId::from_hex("4bf92f3577b34da6a3ce929d0e0e4736").unwrap()
    );
    assert_eq!(
        span.parent_span_id,
        SpanId::from_hex("00f067aa0ba902b7").unwrap()
    );
    assert!(span
        .attributes
        .contains(&KeyValue::new("http.response.status_code", 201_i64)));
    assert!(span
        .attributes
        .contains(&KeyValue::new("user_agent.original", "checkout/1.4")));
    assert!(span.attributes.contains(&KeyValue::new("order.items", 3_i64)));
    assert_eq!(span.status, Status::Unset);
}

#[tokio::test]
async fn panicking_handler_is_recorded_as_server_error() {
    let (provider, exporter) = tracing_provider();
    let server = new_server(
        loopback(),
        Some(handler_fn(explode)),
        [with_server_tracer_provider(provider.clone())],
    )
    .unwrap();
    let handler = server.handler().clone();

    let outcome = tokio::spawn(async move { handler.call(Request::new(body::empty())).await }).await;
    assert!(outcome.unwrap_err().is_panic());

    let spans = exporter.get_finished_spans().unwrap();
    assert_eq!(spans.len(), 1);
    assert!(spans[0]
        .attributes
        .contains(&KeyValue::new("http.response.status_code", 500_i64)));
    assert!(matches!(spans[0].status, Status::Error { .. }));
    assert_eq!(
        server.handler().as_instrumented().unwrap().active_requests(),
        0
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn active_requests_return_to_baseline() {
    let handler = handler_fn(|req: Request<Body>| async move {
        let n: usize = req
            .uri()
            .path()
            .trim_start_matches("/items/")
            .parse()
            .unwrap_or(1);
        tokio::time::sleep(Duration::from_millis(5)).await;
        assert!(n % 5 != 0, "item {n} is poisoned");
        let mut response = Response::new(body::empty());
        if n % 3 == 0 {
            *response.status_mut() = StatusCode::BAD_GATEWAY;
        }
        response
    });
    let server = new_server(
        loopback(),
        Some(handler),
        [with_server_meter_provider(SdkMeterProvider::default())],
    )
    .unwrap();
    let decorator = Arc::clone(server.handler().as_instrumented().unwrap());
    let baseline = decorator.active_requests();

    let tasks: Vec<_> = (0..30)
        .map(|i| {
            let handler = server.handler().clone();
            tokio::spawn(async move {
                let req = Request::get(format!("/items/{i}"))
                    .body(body::empty())
                    .unwrap();
                handler.call(req).await.status()
            })
        })
        .collect();

    let mut panics = 0;
    let mut bad_gateways = 0;
    for task in tasks {
        match task.await {
            Ok(status) if status == StatusCode::BAD_GATEWAY => bad_gateways += 1,
            Ok(_) => {}
            Err(err) if err.is_panic() => panics += 1,
            Err(err) => panic!("task failed: {err}"),
        }
    }

    assert_eq!(panics, 6);
    assert_eq!(bad_gateways, 8);
    assert_eq!(decorator.active_requests(), baseline);
}

async fn eventually(what: &str, mut done: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(2);
    while !done() {
        assert!(Instant::now() < deadline, "timed out waiting for {what}");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

#[tokio::test]
async fn slow_handler_is_answered_unavailable() {
    let (provider, exporter) = tracing_provider();
    let handler = handler_fn(|_req| async {
        tokio::time::sleep(Duration::from_secs(5)).await;
        Response::new(body::full("too late"))
    });
    let server = new_server(
        loopback(),
        Some(handler),
        [
            with_write_timeout(Duration::from_millis(100)),
            with_server_tracer_provider(provider.clone()),
        ],
    )
    .unwrap();
    let running = start(server).await;

    let client = new_client(Vec::new()).unwrap();
    let uri = format!("http://{}/reports", running.addr).parse().unwrap();
    let started = Instant::now();
    let response = client.get(uri).await.unwrap();

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert!(started.elapsed() < Duration::from_secs(1));

    let spans = exporter.get_finished_spans().unwrap();
    assert_eq!(spans.len(), 1);
    assert!(spans[0]
        .attributes
        .contains(&KeyValue::new("http.response.status_code", 503_i64)));
    assert!(matches!(spans[0].status, Status::Error { .. }));

    let (result, _) = running.stop(Signal::Terminate).await;
    assert!(result.is_ok());
}

#[tokio::test]
async fn unfinished_headers_close_the_connection() {
    let server = new_server(
        loopback(),
        None,
        [
            with_read_timeout(Duration::from_millis(100)),
            with_idle_timeout(Duration::from_secs(30)),
        ],
    )
    .unwrap();
    let running = start(server).await;

    let mut stream = TcpStream::connect(running.addr).await.unwrap();
    stream
        .write_all(b"GET /reports HTTP/1.1\r\nHost: localhost\r\n")
        .await
        .unwrap();
    let mut buf = Vec::new();
    let closed = tokio::time::timeout(Duration::from_secs(2), stream.read_to_end(&mut buf)).await;
    assert!(closed.is_ok(), "server waited past the read timeout");

    let (result, _) = running.stop(Signal::Interrupt).await;
    assert!(result.is_ok());
}

#[tokio::test]
async fn open_connections_return_to_baseline() {
    let server = new_server(
        loopback(),
        None,
        [
            with_idle_timeout(Duration::from_secs(30)),
            with_server_meter_provider(SdkMeterProvider::default()),
        ],
    )
    .unwrap();
    let gauge = server.connection_gauge();
    let baseline = gauge.current();
    let running = start(server).await;

    let mut streams = Vec::new();
    for _ in 0..3 {
        streams.push(TcpStream::connect(running.addr).await.unwrap());
    }
    eventually("three open connections", || gauge.current() == baseline + 3).await;

    drop(streams);
    eventually("connections to close", || gauge.current() == baseline).await;

    let (result, _) = running.stop(Signal::Terminate).await;
    assert!(result.is_ok());
}

#[tokio::test(start_paused = true)]
async fn signal_interrupts_accept_backoff() {
    let listener = FailingListener::new([io::ErrorKind::ConnectionReset; 12]);
    let server = new_server(loopback(), None, Vec::new()).unwrap();
    let state = server.state();

    // Backoff sleeps end at 5, 15, 35, 75, 155, 315, 635, 1275 and 2275ms.
    let started = tokio::time::Instant::now();
    let result = server
        .serve(listener, async {
            tokio::time::sleep(Duration::from_millis(1700)).await;
            Signal::Terminate
        })
        .await;

    assert!(result.is_ok());
    assert_eq!(*state.borrow(), ShutdownState::Stopped(StopReason::Graceful));
    assert!(started.elapsed() < Duration::from_millis(1800));
}
