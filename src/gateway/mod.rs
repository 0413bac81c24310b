//! The composing layer: one ordered pipeline per request.
//!
//! The gateway owns every leaf component and runs the request flow:
//! version extraction, route resolution, rate limiting, circuit check,
//! request transformation, downstream invocation, response transformation,
//! then the response headers every reply carries. Internal errors are
//! mapped to the standard envelope in exactly one place, at the boundary.

mod pipeline;

pub use pipeline::Gateway;

use serde_json::{json, Value};

use crate::circuit::CircuitBreaker;
use crate::ratelimit::RateLimiter;
use crate::routing::Router;
use crate::version::VersionManager;

/// Build the single metrics document from component snapshots.
pub(crate) fn metrics_document(
    rate_limiter: &RateLimiter,
    circuit_breaker: &CircuitBreaker,
    router: &Router,
    versions: &VersionManager,
) -> Value {
    json!({
        "rate_limits": rate_limiter.snapshot(),
        "circuit_breakers": circuit_breaker.snapshot(),
        "routes": router.snapshot(),
        "versions": versions.snapshot(),
    })
}
