//! The server, its accept loop and the shutdown coordinator.
//!
//! [`Server::serve`] spawns the accept loop and then waits for whichever
//! comes first:
//!
//! - the accept loop failing, which ends the server at once with
//!   [`ServerError::Listener`] and no drain
//! - the shutdown signal, which stops accepting, asks every open connection
//!   to finish its in-flight request and close, and waits up to the grace
//!   period for them
//!
//! Each connection runs on its own task and is served over HTTP/1.1 or
//! HTTP/2, whichever the peer speaks.

use std::convert::Infallible;
use std::fmt;
use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use brisk_core::body::{self, Body};
use brisk_core::{build, ConfigResult, Deadline, Opt};
use brisk_telemetry::metrics::{self, names};
use brisk_telemetry::{trace, ActiveRequests, Propagation, SharedTracer, INSTRUMENTATION_NAME};
use http::{Request, Response};
use hyper::body::Incoming;
use hyper::service::service_fn;
use hyper_util::rt::{TokioExecutor, TokioIo, TokioTimer};
use hyper_util::server::conn::auto;
use opentelemetry::global;
use opentelemetry::metrics::Meter;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tokio::sync::{watch, Notify};
use tokio::task::{JoinError, JoinSet};
use tracing::{debug, error, info, warn};

use crate::error::{ServerError, ServerResult};
use crate::handler::{Handler, ServerHandler};
use crate::instrumented::{ensure_instrumented, write_timeout_response, InstrumentedHandler};
use crate::listener::{is_transient, next_backoff, Listener};
use crate::options::default_server_options;
use crate::shutdown::{self, ShutdownState, Signal, StopReason};

/// An HTTP server with enforced timeouts and bounded graceful shutdown.
///
/// Build one with [`new_server`], then call [`run`](Self::run) or
/// [`serve`](Self::serve). Both consume the server and return exactly once.
pub struct Server {
    addr: SocketAddr,
    handler: ServerHandler,
    pub(crate) read_timeout: Duration,
    pub(crate) write_timeout: Duration,
    pub(crate) idle_timeout: Duration,
    pub(crate) grace_period: Duration,
    pub(crate) tracer: Option<SharedTracer>,
    pub(crate) meter: Option<Meter>,
    pub(crate) propagation: Propagation,
    open_connections: ActiveRequests,
    state: watch::Sender<ShutdownState>,
}

impl Server {
    /// A server with no options applied. [`new_server`] starts from this.
    pub fn bare(addr: SocketAddr, handler: Option<ServerHandler>) -> Self {
        let (state, _) = watch::channel(ShutdownState::Running);
        Self {
            addr,
            handler: handler.unwrap_or_default(),
            read_timeout: Duration::ZERO,
            write_timeout: Duration::ZERO,
            idle_timeout: Duration::ZERO,
            grace_period: Duration::ZERO,
            tracer: None,
            meter: None,
            propagation: Propagation::Global,
            open_connections: ActiveRequests::default(),
            state,
        }
    }

    /// The address [`run`](Self::run) binds.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Time allowed to read request headers.
    pub fn read_timeout(&self) -> Duration {
        self.read_timeout
    }

    /// Time allowed to produce a response.
    pub fn write_timeout(&self) -> Duration {
        self.write_timeout
    }

    /// Keep-alive idle timeout.
    pub fn idle_timeout(&self) -> Duration {
        self.idle_timeout
    }

    /// Time allowed for open connections to finish after a signal.
    pub fn shutdown_grace_period(&self) -> Duration {
        self.grace_period
    }

    /// The active handler.
    pub fn handler(&self) -> &ServerHandler {
        &self.handler
    }

    /// Connections currently open.
    pub fn open_connections(&self) -> i64 {
        self.open_connections.current()
    }

    /// A handle on the open-connections gauge. It shares the count with the
    /// server, so it keeps reporting after the server is consumed.
    pub fn connection_gauge(&self) -> ActiveRequests {
        self.open_connections.clone()
    }

    /// Observes the lifecycle. Receivers stay valid after the server is
    /// consumed and see the final [`ShutdownState::Stopped`].
    pub fn state(&self) -> watch::Receiver<ShutdownState> {
        self.state.subscribe()
    }

    /// Binds [`addr`](Self::addr) and serves until SIGINT or SIGTERM.
    pub async fn run(self) -> ServerResult<()> {
        let signal = shutdown::os_signal().map_err(ServerError::Signal)?;
        let listener = match TcpListener::bind(self.addr).await {
            Ok(listener) => listener,
            Err(err) => {
                error!(addr = %self.addr, error = %err, "could not bind listener");
                self.state
                    .send_replace(ShutdownState::Stopped(StopReason::ListenerError));
                return Err(ServerError::Listener(err));
            }
        };
        self.serve(listener, signal).await
    }

    /// Serves connections from `listener` until `signal` resolves or the
    /// listener fails.
    pub async fn serve<L, S>(self, listener: L, signal: S) -> ServerResult<()>
    where
        L: Listener,
        S: Future<Output = Signal> + Send,
    {
        let Self {
            handler,
            read_timeout,
            write_timeout,
            idle_timeout,
            grace_period,
            open_connections,
            state,
            ..
        } = self;

        match listener.local_addr() {
            Ok(addr) => info!(addr = ?addr, "server listening"),
            Err(err) => debug!(error = %err, "listener address unavailable"),
        }

        let settings = Arc::new(ConnectionSettings {
            handler,
            read_timeout,
            write_timeout,
            idle_timeout,
            open_connections,
        });
        let (stop_tx, stop_rx) = watch::channel(false);
        let mut accept = tokio::spawn(accept_loop(listener, settings, stop_rx));
        tokio::pin!(signal);

        let signal = tokio::select! {
            biased;
            finished = &mut accept => {
                let err = match finished {
                    Ok(Err(err)) => err,
                    Ok(Ok(())) => io::Error::other("accept loop stopped unexpectedly"),
                    Err(join) => io::Error::other(join),
                };
                error!(error = %err, "listener failed, stopping without drain");
                state.send_replace(ShutdownState::Stopped(StopReason::ListenerError));
                return Err(ServerError::Listener(err));
            }
            received = &mut signal => received,
        };

        info!(%signal, grace = ?grace_period, "draining connections");
        state.send_replace(ShutdownState::Draining { signal });
        stop_tx.send_replace(true);

        let (reason, result) = match tokio::time::timeout(grace_period, &mut accept).await {
            Ok(Ok(Ok(()))) => (StopReason::Graceful, Ok(())),
            Ok(Ok(Err(err))) => {
                error!(error = %err, "listener failed while draining");
                (StopReason::ListenerError, Err(ServerError::Listener(err)))
            }
            Ok(Err(source)) => {
                error!(error = %source, "drain failed");
                (StopReason::Failed, Err(ServerError::DrainFailed { source, signal }))
            }
            Err(_) => {
                warn!(grace = ?grace_period, "grace period elapsed, closing remaining connections");
                accept.abort();
                (
                    StopReason::Timeout,
                    Err(ServerError::DrainTimeout {
                        grace: grace_period,
                        signal,
                    }),
                )
            }
        };

        state.send_replace(ShutdownState::Stopped(reason));
        if result.is_ok() {
            info!("server stopped");
        }
        result
    }

    fn finalize(mut self) -> ConfigResult<Self> {
        let tracer = self.tracer.clone().unwrap_or_else(trace::global_tracer);
        let meter = self
            .meter
            .clone()
            .unwrap_or_else(|| global::meter(INSTRUMENTATION_NAME));
        let propagation = self.propagation.clone();

        let open = metrics::up_down_counter(
            &meter,
            names::SERVER_OPEN_CONNECTIONS,
            "Number of open HTTP server connections",
            "{connection}",
        )?;
        self.open_connections = ActiveRequests::new(Some(open));

        self.handler = ensure_instrumented(std::mem::take(&mut self.handler), |inner| {
            InstrumentedHandler::builder(inner)
                .tracer(tracer)
                .meter(meter)
                .propagation(propagation)
        })?;
        Ok(self)
    }
}

impl fmt::Debug for Server {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Server")
            .field("addr", &self.addr)
            .field("handler", &self.handler)
            .field("read_timeout", &self.read_timeout)
            .field("write_timeout", &self.write_timeout)
            .field("idle_timeout", &self.idle_timeout)
            .field("grace_period", &self.grace_period)
            .field("propagation", &self.propagation)
            .field("state", &*self.state.borrow())
            .finish_non_exhaustive()
    }
}

/// Builds a server: defaults first, then `opts`, then instrumentation.
///
/// Without a handler every request is answered with `404 Not Found`. When
/// no tracer or meter provider was injected the global providers are used.
pub fn new_server<I>(
    addr: SocketAddr,
    handler: Option<ServerHandler>,
    opts: I,
) -> ConfigResult<Server>
where
    I: IntoIterator<Item = Opt<Server>>,
{
    build(Server::bare(addr, handler), &default_server_options(), opts)?.finalize()
}

struct ConnectionSettings {
    handler: ServerHandler,
    read_timeout: Duration,
    write_timeout: Duration,
    idle_timeout: Duration,
    open_connections: ActiveRequests,
}

impl ConnectionSettings {
    /// Runs the handler under the write deadline. An instrumented handler
    /// enforces the deadline itself so the timeout reaches its span.
    async fn respond(&self, mut req: Request<Body>) -> Response<Body> {
        let deadline = Deadline::after(self.write_timeout);
        req.extensions_mut().insert(deadline);
        if self.handler.as_instrumented().is_some() {
            return self.handler.call(req).await;
        }
        match deadline.run(self.handler.call(req)).await {
            Ok(response) => response,
            Err(exceeded) => {
                warn!(timeout = ?exceeded.0, "handler exceeded write timeout");
                write_timeout_response()
            }
        }
    }
}

/// Accepts until told to stop, then waits for every connection task.
///
/// Returning early with an error drops the task set, which aborts the
/// connections still running.
async fn accept_loop<L: Listener>(
    mut listener: L,
    settings: Arc<ConnectionSettings>,
    mut stop: watch::Receiver<bool>,
) -> io::Result<()> {
    let mut connections = JoinSet::new();
    let mut backoff = None;

    loop {
        tokio::select! {
            biased;
            _ = stop.changed() => break,
            Some(finished) = connections.join_next() => connection_finished(finished),
            accepted = listener.accept() => match accepted {
                Ok((io, peer)) => {
                    backoff = None;
                    debug!(peer = ?peer, "connection accepted");
                    connections.spawn(serve_connection(io, Arc::clone(&settings), stop.clone()));
                }
                Err(err) if is_transient(&err) => {
                    let delay = next_backoff(backoff);
                    backoff = Some(delay);
                    warn!(error = %err, retry_in = ?delay, "transient accept error");
                    tokio::select! {
                        _ = stop.changed() => break,
                        () = tokio::time::sleep(delay) => {}
                    }
                }
                Err(err) => return Err(err),
            },
        }
    }

    drop(listener);
    debug!(open = connections.len(), "stopped accepting");
    while let Some(finished) = connections.join_next().await {
        connection_finished(finished);
    }
    Ok(())
}

fn connection_finished(result: Result<(), JoinError>) {
    if let Err(err) = result {
        if err.is_panic() {
            warn!("connection task panicked");
        }
    }
}

async fn serve_connection<I>(
    io: I,
    settings: Arc<ConnectionSettings>,
    mut stop: watch::Receiver<bool>,
) where
    I: AsyncRead + AsyncWrite + Send + Unpin + 'static,
{
    let _open = settings.open_connections.start(Vec::new());
    let activity = Activity::new();

    let service = {
        let settings = Arc::clone(&settings);
        let activity = Arc::clone(&activity);
        service_fn(move |req: Request<Incoming>| {
            let settings = Arc::clone(&settings);
            let busy = activity.begin();
            async move {
                let response = settings.respond(req.map(body::boxed)).await;
                drop(busy);
                Ok::<_, Infallible>(response)
            }
        })
    };

    // The header read timeout covers HTTP/1 only. HTTP/2 streams are bounded
    // by the write deadline, and a silent peer by keep-alive pings.
    let mut builder = auto::Builder::new(TokioExecutor::new());
    builder
        .http1()
        .timer(TokioTimer::new())
        .header_read_timeout(settings.read_timeout);
    builder
        .http2()
        .timer(TokioTimer::new())
        .keep_alive_interval(Some(settings.idle_timeout))
        .keep_alive_timeout(settings.read_timeout);
    let conn = builder.serve_connection(TokioIo::new(io), service);
    tokio::pin!(conn);

    let idle = Arc::clone(&activity).idle(settings.idle_timeout);
    tokio::pin!(idle);

    let mut closing = false;
    loop {
        tokio::select! {
            result = conn.as_mut() => {
                if let Err(err) = result {
                    debug!(error = %err, "connection closed with error");
                }
                break;
            }
            _ = stop.changed(), if !closing => {
                conn.as_mut().graceful_shutdown();
                closing = true;
            }
            () = &mut idle, if !closing => {
                debug!(idle = ?settings.idle_timeout, "closing idle connection");
                conn.as_mut().graceful_shutdown();
                closing = true;
            }
        }
    }
}

/// In-flight requests on one connection.
struct Activity {
    in_flight: AtomicUsize,
    changed: Notify,
}

impl Activity {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            in_flight: AtomicUsize::new(0),
            changed: Notify::new(),
        })
    }

    fn begin(self: &Arc<Self>) -> Busy {
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        self.changed.notify_one();
        Busy(Arc::clone(self))
    }

    /// Resolves once no request has been in flight for `timeout`.
    async fn idle(self: Arc<Self>, timeout: Duration) {
        loop {
            if self.in_flight.load(Ordering::SeqCst) == 0 {
                if tokio::time::timeout(timeout, self.changed.notified())
                    .await
                    .is_err()
                {
                    return;
                }
            } else {
                self.changed.notified().await;
            }
        }
    }
}

struct Busy(Arc<Activity>);

impl Drop for Busy {
    fn drop(&mut self) {
        self.0.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.0.changed.notify_one();
    }
}
