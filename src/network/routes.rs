//! Built-in provisioning routes.

use super::router::{Response, RouteHandler};
use crate::wifi::StationRegistry;
use serde::Serialize;
use std::sync::Arc;

/// Landing page body.
pub const HELLO_HTML: &str = "<h1>Hello World</h1>";

/// `GET /` - static landing page.
pub fn hello_world() -> RouteHandler {
    RouteHandler::get("/", |_req| Ok(Response::html(HELLO_HTML)))
}

/// `POST /echo` - returns the request body unchanged.
pub fn echo() -> RouteHandler {
    RouteHandler::post("/echo", |req| {
        let content_type = req
            .header("Content-Type")
            .unwrap_or("application/octet-stream")
            .to_string();
        Ok(Response::new(200)
            .with_header("Content-Type", content_type)
            .with_body(req.body.clone()))
    })
}

#[derive(Serialize)]
struct StationList<'a> {
    count: usize,
    stations: &'a [crate::wifi::StationInfo],
}

/// `GET /stations` - stations currently associated with the access point.
pub fn stations(registry: Arc<StationRegistry>) -> RouteHandler {
    RouteHandler::get("/stations", move |_req| {
        let stations = registry.snapshot();
        Response::json(&StationList {
            count: stations.len(),
            stations: &stations,
        })
    })
}

/// Every built-in route, in registration order.
pub fn default_routes(registry: Arc<StationRegistry>) -> Vec<RouteHandler> {
    vec![hello_world(), echo(), stations(registry)]
}
