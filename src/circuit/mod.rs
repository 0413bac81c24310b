//! Per-path circuit breaking.

mod breaker;

pub use breaker::{CircuitBreaker, CircuitConfig, CircuitSnapshot, CircuitState};
