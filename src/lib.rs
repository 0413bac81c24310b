//! Tollgate - API Gateway Cross-Cutting Layer
//!
//! This crate implements the shared front for a multi-service business
//! platform: per-path rate limiting over a pluggable counter store,
//! per-path circuit breaking, route and API-version resolution, and an
//! ordered request/response transformation pipeline. Business endpoint
//! handlers stay external; the gateway invokes them through the
//! [`upstream::UpstreamHandler`] seam once a request clears every stage.

pub mod circuit;
pub mod config;
pub mod error;
pub mod gateway;
pub mod http;
pub mod ratelimit;
pub mod routing;
pub mod server;
pub mod store;
pub mod transform;
pub mod upstream;
pub mod version;
