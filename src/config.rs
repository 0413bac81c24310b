//! Configuration management for the gateway.
//!
//! Everything is declared in one YAML document and validated eagerly when
//! the gateway is built; a bad limit, threshold or default version is a
//! startup failure, never a request-time surprise.

use std::collections::HashMap;
use std::net::SocketAddr;

use serde::{Deserialize, Serialize};

use crate::routing::RouteDef;
use crate::transform::TransformationRule;
use crate::version::VersionStrategy;

/// Main configuration for the gateway.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TollgateConfig {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Rate limiting configuration
    #[serde(default)]
    pub rate_limiting: RateLimitingConfig,

    /// Circuit breaker configuration, keyed by path
    #[serde(default)]
    pub circuit_breakers: HashMap<String, CircuitBreakerEntry>,

    /// Versioning configuration
    #[serde(default)]
    pub versioning: VersioningConfig,

    /// Transformation rules
    #[serde(default)]
    pub transformations: TransformationsConfig,

    /// Business services fronted by the gateway
    #[serde(default)]
    pub services: Vec<ServiceConfig>,
}

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Listen address for the HTTP front
    #[serde(default = "default_listen_addr")]
    pub listen_addr: SocketAddr,

    /// Timeout for one shared counter store call, in milliseconds
    #[serde(default = "default_store_timeout_ms")]
    pub store_timeout_ms: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            store_timeout_ms: default_store_timeout_ms(),
        }
    }
}

fn default_listen_addr() -> SocketAddr {
    "127.0.0.1:8080".parse().unwrap()
}

fn default_store_timeout_ms() -> u64 {
    500
}

/// A rate limit declaration: `limit` requests per `period_secs`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RateLimitEntry {
    pub limit: u64,
    pub period_secs: u64,
}

/// Rate limiting configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitingConfig {
    /// Default limit for paths with no explicit rule
    #[serde(default = "default_rate_limit")]
    pub default: RateLimitEntry,

    /// Per-path limits
    #[serde(default)]
    pub paths: HashMap<String, RateLimitEntry>,
}

impl Default for RateLimitingConfig {
    fn default() -> Self {
        Self {
            default: default_rate_limit(),
            paths: HashMap::new(),
        }
    }
}

fn default_rate_limit() -> RateLimitEntry {
    RateLimitEntry {
        limit: 100,
        period_secs: 60,
    }
}

/// A circuit breaker declaration.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CircuitBreakerEntry {
    pub threshold: u32,
    pub recovery_secs: u64,
}

/// Versioning configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersioningConfig {
    /// Where requests declare the version they target
    #[serde(default)]
    pub strategy: VersionStrategy,

    /// Version assumed when extraction fails
    #[serde(default = "default_version")]
    pub default_version: String,

    /// Versions to register at startup
    #[serde(default)]
    pub versions: Vec<VersionEntry>,
}

impl Default for VersioningConfig {
    fn default() -> Self {
        Self {
            strategy: VersionStrategy::default(),
            default_version: default_version(),
            versions: Vec::new(),
        }
    }
}

fn default_version() -> String {
    "1".to_string()
}

/// A version declaration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionEntry {
    pub version: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub deprecated: bool,
}

/// Request and response transformation rules, keyed by path.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TransformationsConfig {
    #[serde(default)]
    pub request: HashMap<String, TransformationRule>,
    #[serde(default)]
    pub response: HashMap<String, TransformationRule>,
}

/// A business service fronted by the gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Service name, referenced by route entries
    pub name: String,
    /// Base URL requests are forwarded to
    pub base_url: String,
    /// Path prefix the service's routes live under
    pub prefix: String,
    /// API version the routes belong to
    #[serde(default = "default_version")]
    pub version: String,
    /// The service's route table
    #[serde(default)]
    pub routes: Vec<RouteDef>,
}

impl TollgateConfig {
    /// Load configuration from a file path.
    pub fn from_file(path: &str) -> crate::error::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Load configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> crate::error::Result<Self> {
        serde_yaml::from_str(yaml)
            .map_err(|e| crate::error::GatewayError::Config(e.to_string()))
    }

    /// The service name -> base URL table for the upstream forwarder.
    pub fn service_urls(&self) -> HashMap<String, String> {
        self.services
            .iter()
            .map(|service| (service.name.clone(), service.base_url.clone()))
            .collect()
    }
}
