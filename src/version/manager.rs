//! Version registry and multi-strategy version extraction.

use std::collections::{BTreeSet, HashMap};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::error::{GatewayError, Result};
use crate::http::Headers;

/// Where a request declares the API version it targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VersionStrategy {
    /// A leading `/v{N}` path segment.
    UrlPath,
    /// A query parameter (default `version`).
    QueryParam,
    /// A request header (default `X-API-Version`).
    Header,
    /// A `version=` or `vN+json` token in `Content-Type`/`Accept`.
    ContentType,
}

impl Default for VersionStrategy {
    fn default() -> Self {
        Self::UrlPath
    }
}

/// A registered API version.
#[derive(Debug, Clone)]
struct ApiVersion {
    description: String,
    deprecated: bool,
    endpoints: BTreeSet<String>,
}

/// One row of the version manager's metrics snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct VersionSnapshot {
    pub version: String,
    pub description: String,
    pub deprecated: bool,
    pub endpoints: Vec<String>,
}

#[derive(Debug)]
struct Inner {
    strategy: VersionStrategy,
    default_version: String,
    query_param_name: String,
    header_name: String,
    versions: HashMap<String, ApiVersion>,
}

/// Registry of API versions plus the extraction strategy in force.
#[derive(Debug)]
pub struct VersionManager {
    inner: RwLock<Inner>,
}

impl VersionManager {
    /// Create a manager with the UrlPath strategy and a registered, default
    /// version "1".
    pub fn new() -> Self {
        let manager = Self {
            inner: RwLock::new(Inner {
                strategy: VersionStrategy::default(),
                default_version: "1".to_string(),
                query_param_name: "version".to_string(),
                header_name: "X-API-Version".to_string(),
                versions: HashMap::new(),
            }),
        };
        manager.register_version("1", "Initial version", false);
        manager
    }

    /// Set the extraction strategy and the default version.
    ///
    /// The default must already be registered; an unregistered default is a
    /// configuration error, raised here rather than at request time.
    pub fn configure(&self, strategy: VersionStrategy, default_version: &str) -> Result<()> {
        let mut inner = self.inner.write();
        if !inner.versions.contains_key(default_version) {
            return Err(GatewayError::Config(format!(
                "default version {default_version} is not registered"
            )));
        }
        debug!(?strategy, default_version, "Configured versioning");
        inner.strategy = strategy;
        inner.default_version = default_version.to_string();
        Ok(())
    }

    /// Override the query parameter consulted under the QueryParam strategy.
    pub fn set_query_param_name(&self, name: &str) {
        self.inner.write().query_param_name = name.to_string();
    }

    /// Override the header consulted under the Header strategy.
    pub fn set_header_name(&self, name: &str) {
        self.inner.write().header_name = name.to_string();
    }

    /// Register a version, replacing its description and deprecation flag if
    /// already present (registered endpoints are kept).
    pub fn register_version(&self, version: &str, description: &str, deprecated: bool) {
        let mut inner = self.inner.write();
        inner
            .versions
            .entry(version.to_string())
            .and_modify(|v| {
                v.description = description.to_string();
                v.deprecated = deprecated;
            })
            .or_insert_with(|| ApiVersion {
                description: description.to_string(),
                deprecated,
                endpoints: BTreeSet::new(),
            });
    }

    /// Mark a version deprecated.
    pub fn deprecate_version(&self, version: &str) -> Result<()> {
        let mut inner = self.inner.write();
        let api_version = inner.versions.get_mut(version).ok_or_else(|| {
            GatewayError::Config(format!("version {version} is not registered"))
        })?;
        api_version.deprecated = true;
        Ok(())
    }

    /// Whether a version is registered and deprecated.
    pub fn is_deprecated(&self, version: &str) -> bool {
        self.inner
            .read()
            .versions
            .get(version)
            .map(|v| v.deprecated)
            .unwrap_or(false)
    }

    /// Attach an endpoint path to a version's endpoint set.
    ///
    /// Idempotent: re-registering an endpoint is a no-op.
    pub fn register_endpoint(&self, version: &str, path: &str) -> Result<()> {
        let mut inner = self.inner.write();
        let api_version = inner.versions.get_mut(version).ok_or_else(|| {
            GatewayError::Config(format!("version {version} is not registered"))
        })?;
        api_version.endpoints.insert(path.to_string());
        Ok(())
    }

    /// The configured default version.
    pub fn default_version(&self) -> String {
        self.inner.read().default_version.clone()
    }

    /// Determine the version a request targets, per the configured strategy.
    ///
    /// Falls back to the default version when the request carries no version
    /// signal or names a version that is not registered.
    pub fn extract_version(
        &self,
        path: &str,
        headers: &Headers,
        query: &HashMap<String, String>,
    ) -> String {
        let inner = self.inner.read();

        let extracted = match inner.strategy {
            VersionStrategy::UrlPath => extract_from_path(path),
            VersionStrategy::QueryParam => query.get(&inner.query_param_name).cloned(),
            VersionStrategy::Header => headers.get(&inner.header_name).map(|v| v.to_string()),
            VersionStrategy::ContentType => headers
                .get("Content-Type")
                .and_then(extract_from_media_type)
                .or_else(|| headers.get("Accept").and_then(extract_from_media_type)),
        };

        match extracted {
            Some(version) if inner.versions.contains_key(&version) => version,
            Some(version) => {
                trace!(version = %version, "Requested version not registered, using default");
                inner.default_version.clone()
            }
            None => inner.default_version.clone(),
        }
    }

    /// Rewrite a service prefix for a version.
    ///
    /// Only the UrlPath strategy puts the version in the path; under every
    /// other strategy the version travels out-of-path and the prefix is
    /// returned unchanged.
    pub fn versioned_prefix(&self, prefix: &str, version: &str) -> String {
        match self.inner.read().strategy {
            VersionStrategy::UrlPath => format!("/v{version}{prefix}"),
            _ => prefix.to_string(),
        }
    }

    /// Every registered version for the metrics document.
    pub fn snapshot(&self) -> Vec<VersionSnapshot> {
        let inner = self.inner.read();
        let mut snapshot: Vec<VersionSnapshot> = inner
            .versions
            .iter()
            .map(|(version, api_version)| VersionSnapshot {
                version: version.clone(),
                description: api_version.description.clone(),
                deprecated: api_version.deprecated,
                endpoints: api_version.endpoints.iter().cloned().collect(),
            })
            .collect();
        snapshot.sort_by(|a, b| a.version.cmp(&b.version));
        snapshot
    }
}

impl Default for VersionManager {
    fn default() -> Self {
        Self::new()
    }
}

/// Pull a version out of a leading `/v{N}` path segment.
fn extract_from_path(path: &str) -> Option<String> {
    let first_segment = path.strip_prefix('/')?.split('/').next()?;
    let version = first_segment.strip_prefix('v')?;
    if !version.is_empty() && version.chars().all(|c| c.is_ascii_digit() || c == '.') {
        Some(version.to_string())
    } else {
        None
    }
}

/// Pull a version out of a media type: `version=N` parameters and
/// `application/vnd.x.vN+json` style suffixes.
fn extract_from_media_type(value: &str) -> Option<String> {
    for part in value.split(';') {
        let part = part.trim();
        if let Some(version) = part.strip_prefix("version=") {
            if !version.is_empty() {
                return Some(version.trim_matches('"').to_string());
            }
        }
    }

    // vN+json embedded in the subtype, e.g. application/vnd.billing.v2+json
    let subtype = value.split(';').next()?;
    let token = subtype.rsplit('.').next()?;
    let version = token.strip_prefix('v')?.strip_suffix("+json")?;
    if !version.is_empty() && version.chars().all(|c| c.is_ascii_digit()) {
        Some(version.to_string())
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager_with_versions() -> VersionManager {
        let manager = VersionManager::new();
        manager.register_version("2", "Second version", false);
        manager
    }

    #[test]
    fn test_configure_rejects_unregistered_default() {
        let manager = VersionManager::new();
        assert!(matches!(
            manager.configure(VersionStrategy::UrlPath, "9"),
            Err(GatewayError::Config(_))
        ));
        assert!(manager.configure(VersionStrategy::UrlPath, "1").is_ok());
    }

    #[test]
    fn test_url_path_extraction() {
        let manager = manager_with_versions();
        manager.configure(VersionStrategy::UrlPath, "1").unwrap();

        let headers = Headers::new();
        let query = HashMap::new();
        assert_eq!(manager.extract_version("/v2/api/users", &headers, &query), "2");
        assert_eq!(manager.extract_version("/api/users", &headers, &query), "1");
        // Unregistered version falls back to the default.
        assert_eq!(manager.extract_version("/v7/api/users", &headers, &query), "1");
        // A non-numeric first segment is not a version.
        assert_eq!(manager.extract_version("/vip/api", &headers, &query), "1");
    }

    #[test]
    fn test_query_param_extraction() {
        let manager = manager_with_versions();
        manager.configure(VersionStrategy::QueryParam, "1").unwrap();

        let headers = Headers::new();
        let mut query = HashMap::new();
        query.insert("version".to_string(), "2".to_string());
        assert_eq!(manager.extract_version("/api/users", &headers, &query), "2");

        let query = HashMap::new();
        assert_eq!(manager.extract_version("/api/users", &headers, &query), "1");
    }

    #[test]
    fn test_header_extraction_case_insensitive() {
        let manager = manager_with_versions();
        manager.configure(VersionStrategy::Header, "1").unwrap();

        let mut headers = Headers::new();
        headers.insert("x-api-version", "2");
        let query = HashMap::new();
        assert_eq!(manager.extract_version("/api/users", &headers, &query), "2");
    }

    #[test]
    fn test_content_type_extraction() {
        let manager = manager_with_versions();
        manager.configure(VersionStrategy::ContentType, "1").unwrap();
        let query = HashMap::new();

        let mut headers = Headers::new();
        headers.insert("Content-Type", "application/json; version=2");
        assert_eq!(manager.extract_version("/api/users", &headers, &query), "2");

        let mut headers = Headers::new();
        headers.insert("Accept", "application/vnd.billing.v2+json");
        assert_eq!(manager.extract_version("/api/users", &headers, &query), "2");

        let mut headers = Headers::new();
        headers.insert("Content-Type", "application/json");
        assert_eq!(manager.extract_version("/api/users", &headers, &query), "1");
    }

    #[test]
    fn test_versioned_prefix_only_under_url_path() {
        let manager = manager_with_versions();

        manager.configure(VersionStrategy::UrlPath, "1").unwrap();
        assert_eq!(manager.versioned_prefix("/api/auth", "2"), "/v2/api/auth");

        manager.configure(VersionStrategy::Header, "1").unwrap();
        assert_eq!(manager.versioned_prefix("/api/auth", "2"), "/api/auth");
    }

    #[test]
    fn test_register_endpoint_idempotent() {
        let manager = manager_with_versions();
        manager.register_endpoint("2", "/api/users").unwrap();
        manager.register_endpoint("2", "/api/users").unwrap();
        manager.register_endpoint("2", "/api/orders").unwrap();

        let snapshot = manager.snapshot();
        let v2 = snapshot.iter().find(|v| v.version == "2").unwrap();
        assert_eq!(v2.endpoints, vec!["/api/orders", "/api/users"]);
    }

    #[test]
    fn test_register_endpoint_unknown_version() {
        let manager = VersionManager::new();
        assert!(matches!(
            manager.register_endpoint("9", "/api/users"),
            Err(GatewayError::Config(_))
        ));
    }

    #[test]
    fn test_deprecation() {
        let manager = manager_with_versions();
        assert!(!manager.is_deprecated("1"));
        manager.deprecate_version("1").unwrap();
        assert!(manager.is_deprecated("1"));
        assert!(manager.deprecate_version("9").is_err());
    }
}
