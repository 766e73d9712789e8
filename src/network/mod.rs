//! HTTP provisioning service.
//!
//! A static-route HTTP server bound to the access point's address. Uses
//! `tiny_http`, which works on both host and ESP32 (via `std::net`).
//!
//! # Example
//!
//! ```no_run
//! use softap_provisioner::network::{HttpConfig, ProvisioningHttpService, Response, RouteHandler};
//!
//! let service = ProvisioningHttpService::new(HttpConfig::default());
//! let handle = service
//!     .start(vec![RouteHandler::get("/", |_req| Ok(Response::html("<h1>Hello World</h1>")))])
//!     .unwrap();
//! println!("listening on {:?}", handle.local_addr());
//! ```

use std::fmt;
use std::net::IpAddr;
use std::time::Duration;

mod router;
pub mod routes;
mod server;

pub use router::{Handler, HandlerError, Request, Response, RouteHandler, Router};
pub use server::{ProvisioningHttpService, ServiceError, ServiceHandle, ServiceState, STOP_GRACE};

#[cfg(test)]
pub(crate) use server::tests as test_support;

/// Default HTTP port.
pub const DEFAULT_HTTP_PORT: u16 = 80;

/// Default number of threads taking requests off the listener.
pub const DEFAULT_WORKERS: usize = 2;

/// Default limit on requests being handled at once.
///
/// Each one runs on its own thread stack; keep this small on ESP32.
pub const DEFAULT_MAX_IN_FLIGHT: usize = 4;

/// Largest request body accepted, in bytes.
pub const DEFAULT_MAX_BODY_LEN: usize = 4096;

/// Time a client gets to deliver the whole request body.
pub const DEFAULT_BODY_TIMEOUT: Duration = Duration::from_secs(5);

/// Environment variable overriding the HTTP port.
pub const ENV_HTTP_PORT: &str = "SOFTAP_HTTP_PORT";

/// HTTP methods the router knows about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Head,
    Post,
    Put,
    Delete,
    Patch,
    Options,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Head => "HEAD",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Delete => "DELETE",
            Self::Patch => "PATCH",
            Self::Options => "OPTIONS",
        }
    }

    /// Map a `tiny_http` method. `None` for methods the router cannot route.
    pub(crate) fn from_tiny(method: &tiny_http::Method) -> Option<Self> {
        use tiny_http::Method as M;
        match method {
            M::Get => Some(Self::Get),
            M::Head => Some(Self::Head),
            M::Post => Some(Self::Post),
            M::Put => Some(Self::Put),
            M::Delete => Some(Self::Delete),
            M::Patch => Some(Self::Patch),
            M::Options => Some(Self::Options),
            _ => None,
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Listener settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpConfig {
    /// Address to bind (`None` for 0.0.0.0).
    pub bind_addr: Option<IpAddr>,
    /// Port to listen on (0 picks a free port).
    pub port: u16,
    /// Number of threads taking requests off the listener.
    pub workers: usize,
    /// Requests beyond this many in progress get `503`.
    pub max_in_flight: usize,
    /// Requests with a larger body get `413`.
    pub max_body_len: usize,
    /// Bodies completing later than this after the request arrived get `408`.
    pub body_timeout: Duration,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            bind_addr: None,
            port: DEFAULT_HTTP_PORT,
            workers: DEFAULT_WORKERS,
            max_in_flight: DEFAULT_MAX_IN_FLIGHT,
            max_body_len: DEFAULT_MAX_BODY_LEN,
            body_timeout: DEFAULT_BODY_TIMEOUT,
        }
    }
}

impl HttpConfig {
    /// Defaults, with the port taken from `SOFTAP_HTTP_PORT` when set and
    /// `default_port` otherwise.
    pub fn from_env(default_port: u16) -> Result<Self, crate::config::ConfigError> {
        let mut config = Self::default().with_port(default_port);
        if let Ok(raw) = std::env::var(ENV_HTTP_PORT) {
            config.port = raw
                .trim()
                .parse()
                .map_err(|_| crate::config::ConfigError::InvalidValue {
                    key: ENV_HTTP_PORT,
                    value: raw.clone(),
                })?;
        }
        Ok(config)
    }

    pub fn with_bind_addr(mut self, addr: IpAddr) -> Self {
        self.bind_addr = Some(addr);
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    pub fn with_max_in_flight(mut self, max_in_flight: usize) -> Self {
        self.max_in_flight = max_in_flight;
        self
    }

    pub fn with_body_timeout(mut self, timeout: Duration) -> Self {
        self.body_timeout = timeout;
        self
    }

    /// `host:port` string to bind.
    pub(crate) fn listen_addr(&self) -> String {
        match self.bind_addr {
            Some(ip) => format!("{}:{}", ip, self.port),
            None => format!("0.0.0.0:{}", self.port),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    #[test]
    fn test_listen_addr() {
        assert_eq!(HttpConfig::default().listen_addr(), "0.0.0.0:80");
        let config = HttpConfig::default()
            .with_bind_addr(IpAddr::V4(Ipv4Addr::new(192, 168, 4, 1)))
            .with_port(8080);
        assert_eq!(config.listen_addr(), "192.168.4.1:8080");
    }

    #[test]
    fn test_method_mapping() {
        assert_eq!(Method::from_tiny(&tiny_http::Method::Get), Some(Method::Get));
        assert_eq!(Method::from_tiny(&tiny_http::Method::Post), Some(Method::Post));
        assert_eq!(Method::from_tiny(&tiny_http::Method::Trace), None);
        assert_eq!(Method::Delete.to_string(), "DELETE");
    }
}
