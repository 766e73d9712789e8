//! Route table and request dispatch.
//!
//! Lookup is exact on (path, method). Handlers are isolated: an error becomes
//! a response with the error's status, a panic becomes `500`. Either way the
//! caller gets exactly one [`Response`] per [`Request`].

use super::server::ServiceError;
use super::Method;
use log::{error, warn};
use std::collections::HashMap;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

/// A route handler function.
pub type Handler = Arc<dyn Fn(&Request) -> Result<Response, HandlerError> + Send + Sync>;

/// An incoming request, fully read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub method: Method,
    /// Path without the query string.
    pub path: String,
    pub query: Option<String>,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl Request {
    /// Build a request from a method and a raw URL (path plus optional query).
    pub fn new(method: Method, url: &str) -> Self {
        let (path, query) = match url.split_once('?') {
            Some((path, query)) => (path.to_string(), Some(query.to_string())),
            None => (url.to_string(), None),
        };
        Self {
            method,
            path,
            query,
            headers: Vec::new(),
            body: Vec::new(),
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    /// First header with this name (case-insensitive).
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// A complete response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl Response {
    pub fn new(status: u16) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: Vec::new(),
        }
    }

    /// `200` with an HTML body.
    pub fn html(body: impl Into<String>) -> Self {
        Self::new(200)
            .with_header("Content-Type", "text/html")
            .with_body(body.into())
    }

    /// Plain-text response with the given status.
    pub fn text(status: u16, body: impl Into<String>) -> Self {
        Self::new(status)
            .with_header("Content-Type", "text/plain; charset=utf-8")
            .with_body(body.into())
    }

    /// `200` with a JSON body.
    pub fn json<T: serde::Serialize>(value: &T) -> Result<Self, HandlerError> {
        let body = serde_json::to_vec(value)?;
        Ok(Self::new(200)
            .with_header("Content-Type", "application/json")
            .with_body(body))
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// A handler declined to produce a normal response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandlerError {
    pub status: u16,
    pub message: String,
}

impl HandlerError {
    pub fn new(status: u16, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    fn into_response(self) -> Response {
        // Anything outside the status-code space is the handler's bug.
        let status = if (100..=599).contains(&self.status) {
            self.status
        } else {
            500
        };
        Response::text(status, self.message)
    }
}

impl fmt::Display for HandlerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.status, self.message)
    }
}

impl std::error::Error for HandlerError {}

impl From<serde_json::Error> for HandlerError {
    fn from(e: serde_json::Error) -> Self {
        Self::new(500, format!("serialization failed: {}", e))
    }
}

/// One (path, method) → handler mapping.
#[derive(Clone)]
pub struct RouteHandler {
    pub path: String,
    pub method: Method,
    pub handler: Handler,
}

impl RouteHandler {
    pub fn new<F>(method: Method, path: impl Into<String>, handler: F) -> Self
    where
        F: Fn(&Request) -> Result<Response, HandlerError> + Send + Sync + 'static,
    {
        Self {
            path: path.into(),
            method,
            handler: Arc::new(handler),
        }
    }

    pub fn get<F>(path: impl Into<String>, handler: F) -> Self
    where
        F: Fn(&Request) -> Result<Response, HandlerError> + Send + Sync + 'static,
    {
        Self::new(Method::Get, path, handler)
    }

    pub fn post<F>(path: impl Into<String>, handler: F) -> Self
    where
        F: Fn(&Request) -> Result<Response, HandlerError> + Send + Sync + 'static,
    {
        Self::new(Method::Post, path, handler)
    }
}

impl fmt::Debug for RouteHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouteHandler")
            .field("path", &self.path)
            .field("method", &self.method)
            .finish_non_exhaustive()
    }
}

/// Exact-match route table.
#[derive(Default)]
pub struct Router {
    /// Path → handlers in registration order.
    routes: HashMap<String, Vec<(Method, Handler)>>,
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a route. The first registration of a (path, method) pair wins;
    /// a second one is rejected and leaves the first in place.
    pub fn register(&mut self, route: RouteHandler) -> Result<(), ServiceError> {
        let handlers = self.routes.entry(route.path.clone()).or_default();
        if handlers.iter().any(|(m, _)| *m == route.method) {
            return Err(ServiceError::DuplicateRoute {
                method: route.method,
                path: route.path,
            });
        }
        handlers.push((route.method, route.handler));
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.routes.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Produce the response for `request`.
    pub fn dispatch(&self, request: &Request) -> Response {
        let Some(handlers) = self.routes.get(&request.path) else {
            return Response::text(404, "Not Found");
        };

        // Lookup is exact: HEAD is not served from a GET route and gets 405
        // unless registered itself.
        let Some((_, handler)) = handlers.iter().find(|(m, _)| *m == request.method) else {
            let allow = handlers
                .iter()
                .map(|(m, _)| m.as_str())
                .collect::<Vec<_>>()
                .join(", ");
            return Response::text(405, "Method Not Allowed").with_header("Allow", allow);
        };

        match catch_unwind(AssertUnwindSafe(|| handler(request))) {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => {
                warn!("{} {} failed: {}", request.method, request.path, e);
                e.into_response()
            }
            Err(_) => {
                error!("{} {} handler panicked", request.method, request.path);
                Response::text(500, "Internal Server Error")
            }
        }
    }
}
