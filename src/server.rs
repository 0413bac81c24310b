//! HTTP front for the gateway.
//!
//! Translates between wire-level HTTP and the gateway's message types,
//! dispatches every request through the pipeline, and exposes the admin
//! endpoints (`/healthz`, `/metrics`).

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::body::{to_bytes, Body as HttpBody};
use axum::extract::{ConnectInfo, Request, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use axum::Router as HttpRouter;
use tracing::{error, info};

use crate::error::Result;
use crate::gateway::Gateway;
use crate::http::{Body, GatewayRequest, Identity};
use crate::upstream::UpstreamHandler;

/// Request bodies past this size are rejected before dispatch.
const MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

/// Header the external auth layer uses to hand over the authenticated
/// identity. Trusted by construction: the gateway sits behind that layer.
const IDENTITY_HEADER: &str = "x-authenticated-id";

#[derive(Clone)]
struct AppState {
    gateway: Arc<Gateway>,
    upstream: Arc<dyn UpstreamHandler>,
}

/// HTTP server wrapping a gateway and its upstream forwarder.
pub struct GatewayServer {
    addr: SocketAddr,
    gateway: Arc<Gateway>,
    upstream: Arc<dyn UpstreamHandler>,
}

impl GatewayServer {
    /// Create a server for the given gateway and upstream.
    pub fn new(addr: SocketAddr, gateway: Arc<Gateway>, upstream: Arc<dyn UpstreamHandler>) -> Self {
        Self {
            addr,
            gateway,
            upstream,
        }
    }

    /// Start the server with graceful shutdown.
    ///
    /// The server stops accepting connections when the provided signal
    /// resolves; in-flight requests run to completion.
    pub async fn serve_with_shutdown<F>(self, signal: F) -> Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let state = AppState {
            gateway: self.gateway,
            upstream: self.upstream,
        };

        let app = HttpRouter::new()
            .route("/healthz", get(health))
            .route("/metrics", get(metrics))
            .fallback(dispatch)
            .with_state(state);

        info!(addr = %self.addr, "Starting gateway HTTP server");

        let listener = tokio::net::TcpListener::bind(self.addr).await?;
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(signal)
        .await?;
        Ok(())
    }
}

/// Liveness probe.
async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}

/// The single metrics document.
async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.gateway.metrics())
}

/// Catch-all: translate the wire request, run the pipeline, translate back.
async fn dispatch(
    State(state): State<AppState>,
    ConnectInfo(client_addr): ConnectInfo<SocketAddr>,
    request: Request,
) -> Response {
    let method = request.method().as_str().to_string();
    let path = request.uri().path().to_string();
    let query = parse_query(request.uri().query());

    let mut headers = crate::http::Headers::new();
    for (name, value) in request.headers() {
        if let Ok(value) = value.to_str() {
            headers.insert(name.as_str(), value);
        }
    }
    let identity = headers
        .get(IDENTITY_HEADER)
        .map(|id| Identity { id: id.to_string() });

    let body = match to_bytes(request.into_body(), MAX_BODY_BYTES).await {
        Ok(bytes) => Body::from_bytes(bytes.to_vec()),
        Err(e) => {
            error!(error = %e, "Failed to read request body");
            return StatusCode::PAYLOAD_TOO_LARGE.into_response();
        }
    };

    let gateway_request = GatewayRequest {
        method,
        path,
        headers,
        query,
        client_addr: client_addr.ip().to_string(),
        identity,
        body,
    };

    let response = state
        .gateway
        .handle(gateway_request, state.upstream.as_ref())
        .await;

    let status =
        StatusCode::from_u16(response.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let mut builder = Response::builder().status(status);
    for (name, value) in response.headers.iter() {
        builder = builder.header(name, value);
    }
    match builder.body(HttpBody::from(response.body.to_bytes())) {
        Ok(response) => response,
        Err(e) => {
            error!(error = %e, "Failed to build wire response");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// Parse a raw query string into a parameter map.
fn parse_query(raw: Option<&str>) -> HashMap<String, String> {
    let mut params = HashMap::new();
    let Some(raw) = raw else {
        return params;
    };
    for pair in raw.split('&') {
        if pair.is_empty() {
            continue;
        }
        match pair.split_once('=') {
            Some((name, value)) => params.insert(name.to_string(), value.to_string()),
            None => params.insert(pair.to_string(), String::new()),
        };
    }
    params
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_query() {
        let params = parse_query(Some("version=2&page=3&flag"));
        assert_eq!(params["version"], "2");
        assert_eq!(params["page"], "3");
        assert_eq!(params["flag"], "");

        assert!(parse_query(None).is_empty());
        assert!(parse_query(Some("")).is_empty());
    }
}
