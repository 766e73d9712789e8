//! HTTP listener and worker threads.
//!
//! The listener is shared by a small pool of worker threads. Each worker
//! polls for requests with a short timeout so it notices shutdown, and hands
//! every request to a thread of its own, up to `max_in_flight` at once. The
//! request thread reads the body, dispatches through the [`Router`] and
//! writes exactly one response.
//!
//! A body read cannot be interrupted. A client that stalls mid-body pins its
//! request thread until it sends the rest or drops the connection, so:
//! - a body completing later than `body_timeout` gets `408`
//! - requests beyond `max_in_flight` get `503`
//! - [`ServiceHandle::stop`] waits at most [`STOP_GRACE`] for request threads
//!   and abandons the rest

use super::router::{Request, Response, RouteHandler, Router};
use super::{HttpConfig, Method};
use log::{debug, error, info, warn};
use std::fmt;
use std::io::Read;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tiny_http::{Header, Server};

/// How long a worker blocks waiting for a request before checking shutdown.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// How long `stop` waits for requests already being handled.
pub const STOP_GRACE: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy)]
struct Limits {
    max_in_flight: usize,
    max_body_len: usize,
    body_timeout: Duration,
}

/// Lifecycle of the service. No transition leads back to `Running`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceState {
    NotStarted,
    Running,
    Stopped,
}

/// HTTP service that has not been started yet.
pub struct ProvisioningHttpService {
    config: HttpConfig,
}

impl ProvisioningHttpService {
    pub fn new(config: HttpConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &HttpConfig {
        &self.config
    }

    /// Always [`ServiceState::NotStarted`]: `start` consumes the service and
    /// the returned [`ServiceHandle`] reports the later states.
    pub fn state(&self) -> ServiceState {
        ServiceState::NotStarted
    }

    /// Bind the listener, register `routes` in order and start serving.
    ///
    /// A duplicate (path, method) aborts startup with
    /// [`ServiceError::DuplicateRoute`]; the listener is closed again.
    pub fn start(self, routes: Vec<RouteHandler>) -> Result<ServiceHandle, ServiceError> {
        let addr = self.config.listen_addr();
        let server = Server::http(&addr).map_err(|e| ServiceError::BindFailed {
            addr: addr.clone(),
            reason: e.to_string(),
        })?;
        let local_addr = server.server_addr().to_ip();

        let mut router = Router::new();
        for route in routes {
            debug!("Registering {} {}", route.method, route.path);
            if let Err(e) = router.register(route) {
                error!("Route registration failed: {}", e);
                return Err(e);
            }
        }

        let server = Arc::new(server);
        let router = Arc::new(router);
        let shutdown = Arc::new(AtomicBool::new(false));
        let in_flight = Arc::new(AtomicUsize::new(0));
        let limits = Limits {
            max_in_flight: self.config.max_in_flight.max(1),
            max_body_len: self.config.max_body_len,
            body_timeout: self.config.body_timeout,
        };

        let workers = (0..self.config.workers.max(1))
            .map(|i| {
                let server = server.clone();
                let router = router.clone();
                let shutdown = shutdown.clone();
                let in_flight = in_flight.clone();
                thread::Builder::new()
                    .name(format!("http-worker-{}", i))
                    .spawn(move || run_worker(&server, &router, &shutdown, &in_flight, limits))
            })
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| {
                shutdown.store(true, Ordering::Release);
                ServiceError::BindFailed {
                    addr: addr.clone(),
                    reason: format!("failed to spawn worker: {}", e),
                }
            })?;

        info!(
            "HTTP server listening on http://{} with {} route(s)",
            local_addr.map(|a| a.to_string()).unwrap_or(addr),
            router.len()
        );

        Ok(ServiceHandle {
            local_addr,
            workers,
            shutdown,
            in_flight,
            state: ServiceState::Running,
        })
    }

    /// Stop a running service. Same as [`ServiceHandle::stop`].
    pub fn stop(mut handle: ServiceHandle) {
        handle.stop();
    }
}

/// A running HTTP service. Dropping it stops the service.
pub struct ServiceHandle {
    local_addr: Option<SocketAddr>,
    workers: Vec<thread::JoinHandle<()>>,
    shutdown: Arc<AtomicBool>,
    in_flight: Arc<AtomicUsize>,
    state: ServiceState,
}

impl ServiceHandle {
    /// Address actually bound (useful with port 0).
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    pub fn state(&self) -> ServiceState {
        self.state
    }

    /// Stop accepting requests and wait for the workers to finish.
    ///
    /// Returns within one poll interval plus [`STOP_GRACE`]. Request threads
    /// still running after that are left to finish on their own. Calling it
    /// again does nothing.
    pub fn stop(&mut self) {
        if self.state != ServiceState::Running {
            return;
        }
        // Release pairs with the workers' Acquire load.
        self.shutdown.store(true, Ordering::Release);
        for worker in self.workers.drain(..) {
            if worker.join().is_err() {
                warn!("HTTP worker exited abnormally");
            }
        }

        let deadline = Instant::now() + STOP_GRACE;
        while self.in_flight.load(Ordering::Acquire) > 0 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(10));
        }
        let abandoned = self.in_flight.load(Ordering::Acquire);
        if abandoned > 0 {
            warn!("Abandoning {} request(s) still in progress", abandoned);
        }

        self.state = ServiceState::Stopped;
        info!("HTTP server stopped");
    }
}

impl Drop for ServiceHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Counts a request as in progress until dropped.
struct InFlightSlot(Arc<AtomicUsize>);

impl InFlightSlot {
    fn acquire(counter: &Arc<AtomicUsize>, max: usize) -> Option<Self> {
        counter
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                (n < max).then_some(n + 1)
            })
            .ok()?;
        Some(Self(counter.clone()))
    }
}

impl Drop for InFlightSlot {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

fn run_worker(
    server: &Server,
    router: &Arc<Router>,
    shutdown: &AtomicBool,
    in_flight: &Arc<AtomicUsize>,
    limits: Limits,
) {
    loop {
        if shutdown.load(Ordering::Acquire) {
            break;
        }

        match server.recv_timeout(POLL_INTERVAL) {
            Ok(Some(request)) => spawn_request(request, router, in_flight, limits),
            Ok(None) => {}
            Err(e) => {
                error!("HTTP server error: {}", e);
                break;
            }
        }
    }
}

fn spawn_request(
    request: tiny_http::Request,
    router: &Arc<Router>,
    in_flight: &Arc<AtomicUsize>,
    limits: Limits,
) {
    let Some(slot) = InFlightSlot::acquire(in_flight, limits.max_in_flight) else {
        warn!(
            "{} requests in flight, rejecting {} {}",
            limits.max_in_flight,
            request.method(),
            request.url()
        );
        respond(request, Response::text(503, "Service Unavailable"));
        return;
    };

    let router = router.clone();
    let received = Instant::now();
    let spawned = thread::Builder::new()
        .name("http-request".into())
        .spawn(move || {
            let _slot = slot;
            handle_request(request, &router, limits, received);
        });
    // On failure the request is dropped unanswered and tiny_http closes it.
    if let Err(e) = spawned {
        error!("Failed to spawn request thread: {}", e);
    }
}

fn handle_request(
    mut request: tiny_http::Request,
    router: &Router,
    limits: Limits,
    received: Instant,
) {
    let max_body_len = limits.max_body_len;

    let Some(method) = Method::from_tiny(request.method()) else {
        respond(request, Response::text(501, "Not Implemented"));
        return;
    };

    if request.body_length().is_some_and(|len| len > max_body_len) {
        respond(request, Response::text(413, "Payload Too Large"));
        return;
    }

    let mut body = Vec::new();
    let limit = max_body_len as u64 + 1;
    if let Err(e) = request.as_reader().take(limit).read_to_end(&mut body) {
        warn!("Failed to read request body: {}", e);
        respond(request, Response::text(400, "Bad Request"));
        return;
    }
    if body.len() > max_body_len {
        respond(request, Response::text(413, "Payload Too Large"));
        return;
    }
    if received.elapsed() > limits.body_timeout {
        warn!(
            "{} {}: body took longer than {:?}",
            method,
            request.url(),
            limits.body_timeout
        );
        respond(request, Response::text(408, "Request Timeout"));
        return;
    }

    let headers = request
        .headers()
        .iter()
        .map(|h| (h.field.as_str().as_str().to_owned(), h.value.as_str().to_owned()))
        .collect();

    let mut req = Request::new(method, request.url()).with_body(body);
    req.headers = headers;

    let response = router.dispatch(&req);
    debug!("{} {} -> {}", req.method, req.path, response.status);
    respond(request, response);
}

fn respond(request: tiny_http::Request, response: Response) {
    let mut out = tiny_http::Response::from_data(response.body).with_status_code(response.status);
    for (name, value) in &response.headers {
        match Header::from_bytes(name.as_bytes(), value.as_bytes()) {
            Ok(header) => out.add_header(header),
            Err(()) => warn!("Dropping invalid response header {:?}", name),
        }
    }
    if let Err(e) = request.respond(out) {
        warn!("Failed to send response: {}", e);
    }
}

/// Errors from [`ProvisioningHttpService::start`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServiceError {
    /// Listener could not be created.
    BindFailed { addr: String, reason: String },
    /// A (path, method) pair was registered twice.
    DuplicateRoute { method: Method, path: String },
}

impl fmt::Display for ServiceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BindFailed { addr, reason } => {
                write!(f, "failed to bind {}: {}", addr, reason)
            }
            Self::DuplicateRoute { method, path } => {
                write!(f, "duplicate route {} {}", method, path)
            }
        }
    }
}

impl std::error::Error for ServiceError {}
