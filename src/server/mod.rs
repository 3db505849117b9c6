//! Async TCP transport using Tokio.
//!
//! Accepts connections, parses HTTP/1.1 requests and feeds them to a
//! [`Dispatcher`] as [`RequestTask`]s. Admission is bounded by a permit pool:
//! a request arriving when every permit is taken is rejected through
//! [`Dispatcher::handle_rejected_work`]. On shutdown, in-flight requests get
//! the configured drain timeout before the rest are answered through
//! [`Dispatcher::handle_unfinished_works`].

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use bytes::BytesMut;
use parking_lot::Mutex;
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{Notify, OwnedSemaphorePermit, Semaphore};
use tracing::{debug, error, info, warn};

use crate::config::ServerConfig;
use crate::dispatcher::{Completion, Dispatcher, Outcome, RequestTask};
use crate::error::WebError;
use crate::http::{
    StatusCode,
    request::{Request, RequestError},
    response::Response,
};

/// Errors produced by the server.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to bind to {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },
}

/// The restline HTTP/1.1 server.
///
/// # Examples
///
/// ```rust,no_run
/// use std::sync::Arc;
///
/// use restline::config::Config;
/// use restline::dispatcher::Dispatcher;
/// use restline::route::{Mapping, Route};
/// use restline::server::Server;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let config = Config::default();
///     let dispatcher = Arc::new(Dispatcher::new(&config.dispatcher));
///     dispatcher.route(Route::new(Mapping::get("/ping")).handle(|_, response| {
///         response.set_body("pong");
///         Ok(())
///     }));
///
///     let server = Server::bind("127.0.0.1:8080", config.server).await?;
///     server
///         .run_until(dispatcher, async {
///             let _ = tokio::signal::ctrl_c().await;
///         })
///         .await?;
///     Ok(())
/// }
/// ```
pub struct Server {
    listener: TcpListener,
    local_addr: SocketAddr,
    config: ServerConfig,
}

impl Server {
    /// Binds the server to the given TCP address.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Bind`] if the address cannot be bound
    /// (e.g. port already in use, insufficient permissions).
    pub async fn bind(addr: impl AsRef<str>, config: ServerConfig) -> Result<Self, ServerError> {
        let addr = addr.as_ref();
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| ServerError::Bind {
                addr: addr.to_owned(),
                source: e,
            })?;
        let local_addr = listener.local_addr()?;
        Ok(Self {
            listener,
            local_addr,
            config,
        })
    }

    /// Returns the local address the server is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Serves until the process ends or the listener fails.
    pub async fn run(self, dispatcher: Arc<Dispatcher>) -> Result<(), ServerError> {
        self.run_until(dispatcher, std::future::pending()).await
    }

    /// Serves until `shutdown` resolves, then drains in-flight requests.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Io`] if the TCP listener itself fails.
    pub async fn run_until<S>(
        self,
        dispatcher: Arc<Dispatcher>,
        shutdown: S,
    ) -> Result<(), ServerError>
    where
        S: Future<Output = ()>,
    {
        let shared = Arc::new(Shared::new(dispatcher, self.config));
        info!(address = %self.local_addr, "restline listening");

        tokio::pin!(shutdown);
        loop {
            let (stream, peer_addr) = tokio::select! {
                () = &mut shutdown => break,
                accepted = self.listener.accept() => match accepted {
                    Ok(pair) => pair,
                    Err(e) => {
                        error!(error = %e, "failed to accept connection");
                        continue;
                    }
                },
            };

            debug!(peer = %peer_addr, "connection accepted");
            let shared = Arc::clone(&shared);
            tokio::spawn(async move {
                if let Err(e) = handle_connection(stream, peer_addr, shared).await {
                    warn!(peer = %peer_addr, error = %e, "connection closed with error");
                }
            });
        }

        shared.drain().await;
        Ok(())
    }
}

/// State shared by every connection of one server.
struct Shared {
    dispatcher: Arc<Dispatcher>,
    config: ServerConfig,
    permits: Arc<Semaphore>,
    in_flight: Mutex<HashMap<u64, RequestTask>>,
    next_id: AtomicU64,
    idle: Notify,
    closing: AtomicBool,
}

impl Shared {
    fn new(dispatcher: Arc<Dispatcher>, config: ServerConfig) -> Self {
        Self {
            dispatcher,
            permits: Arc::new(Semaphore::new(config.max_concurrent_requests)),
            config,
            in_flight: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(0),
            idle: Notify::new(),
            closing: AtomicBool::new(false),
        }
    }

    fn is_closing(&self) -> bool {
        self.closing.load(Ordering::Acquire)
    }

    fn track(&self, task: &RequestTask) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.in_flight.lock().insert(id, task.clone());
        id
    }

    fn untrack(&self, id: u64) {
        let mut in_flight = self.in_flight.lock();
        in_flight.remove(&id);
        if in_flight.is_empty() {
            self.idle.notify_waiters();
        }
    }

    /// Admits `task` or rejects it, then waits for it to complete.
    async fn submit(&self, task: RequestTask, completion: Completion<Outcome>) -> Option<Outcome> {
        if self.is_closing() {
            self.dispatcher.handle_unfinished_works([task]);
            return completion.await;
        }
        let Ok(permit) = Arc::clone(&self.permits).try_acquire_owned() else {
            self.dispatcher
                .handle_rejected_work(&task, "too many concurrent requests");
            return completion.await;
        };

        let id = self.track(&task);
        self.spawn_worker(task, permit);
        let outcome = completion.await;
        self.untrack(id);
        outcome
    }

    /// Runs the dispatcher on its own task; a panic there still answers and
    /// completes the request.
    fn spawn_worker(&self, task: RequestTask, permit: OwnedSemaphorePermit) {
        let dispatcher = Arc::clone(&self.dispatcher);
        let worker_task = task.clone();
        let worker = tokio::spawn(async move { dispatcher.service(worker_task).await });
        tokio::spawn(async move {
            let _permit = permit;
            if let Err(e) = worker.await {
                error!(error = %e, path = task.request().path(), "dispatch task failed");
                let error = WebError::Internal("request processing failed".to_owned());
                task.response()
                    .send(StatusCode::InternalServerError, None, error.to_string());
                task.finish(Some(error));
            }
        });
    }

    async fn drain(&self) {
        self.closing.store(true, Ordering::Release);
        let pending = self.in_flight.lock().len();
        info!(in_flight = pending, "shutting down; draining in-flight requests");

        let wait_idle = async {
            loop {
                let notified = self.idle.notified();
                if self.in_flight.lock().is_empty() {
                    return;
                }
                notified.await;
            }
        };
        if tokio::time::timeout(self.config.drain_timeout(), wait_idle)
            .await
            .is_err()
        {
            let leftover: Vec<RequestTask> =
                self.in_flight.lock().drain().map(|(_, task)| task).collect();
            self.dispatcher.handle_unfinished_works(leftover);
        }
    }
}

/// Handles a single TCP connection over its lifetime.
///
/// HTTP/1.1 connections are persistent by default: we loop, serving one
/// request per iteration, until the peer closes the connection, signals
/// `Connection: close`, or the server starts shutting down. Bytes left over
/// from a pipelined peer are parsed before reading again.
async fn handle_connection(
    mut stream: TcpStream,
    peer_addr: SocketAddr,
    shared: Arc<Shared>,
) -> Result<(), std::io::Error> {
    let max_request_size = shared.config.max_request_size;
    let mut buf = BytesMut::with_capacity(shared.config.initial_buffer_size);

    loop {
        let parsed = if buf.is_empty() {
            Err(RequestError::Incomplete)
        } else {
            Request::parse(&buf)
        };

        let (request, body_offset) = match parsed {
            Ok(pair) => pair,
            Err(RequestError::Incomplete) => {
                if buf.len() > max_request_size {
                    warn!(peer = %peer_addr, "request too large; sending 413");
                    write_plain(&mut stream, StatusCode::PayloadTooLarge, "Request entity too large").await?;
                    break;
                }
                if !read_more(&mut stream, &mut buf, peer_addr).await? {
                    break;
                }
                continue;
            }
            Err(e) => {
                warn!(peer = %peer_addr, error = %e, "bad request; sending 400");
                write_plain(&mut stream, StatusCode::BadRequest, &format!("Bad Request: {e}")).await?;
                break;
            }
        };

        let total_needed = body_offset + request.content_length().unwrap_or(0);
        if total_needed > max_request_size {
            warn!(peer = %peer_addr, declared = total_needed, "declared body too large; sending 413");
            write_plain(&mut stream, StatusCode::PayloadTooLarge, "Request entity too large").await?;
            break;
        }
        if buf.len() < total_needed {
            if !read_more(&mut stream, &mut buf, peer_addr).await? {
                break;
            }
            continue;
        }

        let keep_alive = request.is_keep_alive();
        let (task, completion) = RequestTask::new(request);
        let response = task.response().clone();
        if let Some(outcome) = shared.submit(task, completion).await {
            debug!(peer = %peer_addr, status = %outcome.status, "request completed");
        }

        let keep_alive = keep_alive && !shared.is_closing();
        response.set_keep_alive(keep_alive);
        stream.write_all(&response.encode()).await?;
        stream.flush().await?;

        let _ = buf.split_to(total_needed);

        if !keep_alive {
            debug!(peer = %peer_addr, "closing connection");
            break;
        }
    }

    Ok(())
}

/// Reads once into `buf`; `false` when the peer has closed the connection.
async fn read_more(
    stream: &mut TcpStream,
    buf: &mut BytesMut,
    peer_addr: SocketAddr,
) -> Result<bool, std::io::Error> {
    if stream.read_buf(buf).await? == 0 {
        debug!(peer = %peer_addr, "connection closed by peer");
        return Ok(false);
    }
    Ok(true)
}

async fn write_plain(
    stream: &mut TcpStream,
    status: StatusCode,
    message: &str,
) -> Result<(), std::io::Error> {
    let response = Response::new();
    response.send(status, Some("text/plain; charset=utf-8"), message);
    response.set_keep_alive(false);
    stream.write_all(&response.encode()).await?;
    stream.flush().await
}
