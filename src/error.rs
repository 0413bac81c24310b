//! Error types for the Tollgate gateway.

use thiserror::Error;

use crate::ratelimit::RateLimitInfo;

/// Main error type for gateway operations.
///
/// Only `AdmissionRejected`, `CircuitOpen` and `Upstream` are ever visible to
/// a client; everything else is handled (and logged) inside the pipeline.
#[derive(Error, Debug)]
pub enum GatewayError {
    /// Invalid configuration, raised eagerly at configuration time.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Rate limit exceeded for this client and path.
    #[error("Rate limit exceeded ({} per window)", .0.limit)]
    AdmissionRejected(RateLimitInfo),

    /// The path's circuit breaker is open; the downstream is not invoked.
    #[error("Circuit breaker is open for path {0}")]
    CircuitOpen(String),

    /// The downstream handler failed; recorded as a circuit failure.
    #[error("Upstream failure: {0}")]
    Upstream(String),

    /// Shared counter store unavailable; triggers fail-open to local counting.
    #[error("Counter store unavailable: {0}")]
    Store(String),

    /// A registered transformation failed; the pipeline continues unmodified.
    #[error("Transformation failed for path {path}: {reason}")]
    Transform { path: String, reason: String },

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for gateway operations.
pub type Result<T> = std::result::Result<T, GatewayError>;
