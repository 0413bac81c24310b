//! Downstream handler seam.
//!
//! The gateway never talks to business services directly; it invokes an
//! [`UpstreamHandler`] once admission, circuit and transformation stages
//! have all passed. The bundled [`HttpUpstream`] forwards over HTTP to the
//! base URL configured for the route's service.

use std::collections::HashMap;

use async_trait::async_trait;
use tracing::debug;

use crate::error::{GatewayError, Result};
use crate::http::{Body, GatewayRequest, GatewayResponse, Headers};
use crate::routing::RouteEntry;

/// The downstream collaborator invoked for an admitted request.
#[async_trait]
pub trait UpstreamHandler: Send + Sync {
    /// Handle a fully transformed request for a resolved route.
    ///
    /// Any error is treated as an upstream failure: it is recorded against
    /// the path's circuit breaker and surfaced as a generic 500.
    async fn call(&self, request: &GatewayRequest, route: &RouteEntry) -> Result<GatewayResponse>;
}

/// Forwards requests over HTTP to configured service base URLs.
pub struct HttpUpstream {
    client: reqwest::Client,
    /// Service name -> base URL.
    services: HashMap<String, String>,
}

impl HttpUpstream {
    /// Create a forwarder for the given service table.
    pub fn new(services: HashMap<String, String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            services,
        }
    }
}

#[async_trait]
impl UpstreamHandler for HttpUpstream {
    async fn call(&self, request: &GatewayRequest, route: &RouteEntry) -> Result<GatewayResponse> {
        let base = self.services.get(&route.service).ok_or_else(|| {
            GatewayError::Upstream(format!("no base URL for service {}", route.service))
        })?;

        let url = format!("{}{}", base.trim_end_matches('/'), request.path);
        let method = reqwest::Method::from_bytes(request.method.as_bytes())
            .map_err(|e| GatewayError::Upstream(format!("invalid method: {e}")))?;

        debug!(method = %request.method, url = %url, service = %route.service, "Forwarding to upstream");

        let mut builder = self.client.request(method, &url).query(&request.query);
        for (name, value) in request.headers.iter() {
            builder = builder.header(name, value);
        }
        match &request.body {
            Body::Empty => {}
            body => builder = builder.body(body.to_bytes()),
        }

        let response = builder
            .send()
            .await
            .map_err(|e| GatewayError::Upstream(e.to_string()))?;

        let status = response.status().as_u16();
        let mut headers = Headers::new();
        for (name, value) in response.headers() {
            if let Ok(value) = value.to_str() {
                headers.insert(name.as_str(), value);
            }
        }
        let bytes = response
            .bytes()
            .await
            .map_err(|e| GatewayError::Upstream(e.to_string()))?;

        Ok(GatewayResponse {
            status,
            headers,
            body: Body::from_bytes(bytes.to_vec()),
        })
    }
}
