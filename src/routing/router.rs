//! Route registration and resolution.

use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

/// A route as supplied by a business service at registration time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteDef {
    /// Path relative to the service prefix, possibly with `{param}`
    /// template segments.
    pub path: String,
    /// HTTP methods served by this route.
    pub methods: Vec<String>,
    /// Route name, for metrics and logs.
    pub name: String,
}

/// A registered route.
///
/// Immutable once registered, except for the hit counter.
#[derive(Debug)]
pub struct RouteEntry {
    /// Prefix + route path.
    pub full_path: String,
    /// HTTP methods served by this route.
    pub methods: BTreeSet<String>,
    /// Route name.
    pub name: String,
    /// Owning service.
    pub service: String,
    /// API version the route was registered under.
    pub version: String,
    /// Times this route has been resolved.
    hit_count: AtomicU64,
}

impl RouteEntry {
    fn new(full_path: String, def: &RouteDef, service: &str, version: &str) -> Self {
        Self {
            full_path,
            methods: def.methods.iter().map(|m| m.to_ascii_uppercase()).collect(),
            name: def.name.clone(),
            service: service.to_string(),
            version: version.to_string(),
            hit_count: AtomicU64::new(0),
        }
    }

    /// Times this route has been resolved.
    pub fn hit_count(&self) -> u64 {
        self.hit_count.load(Ordering::Relaxed)
    }

    fn record_hit(&self) {
        self.hit_count.fetch_add(1, Ordering::Relaxed);
    }
}

/// One row of the router's metrics snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct RouteSnapshot {
    pub full_path: String,
    pub methods: Vec<String>,
    pub name: String,
    pub service: String,
    pub version: String,
    pub hit_count: u64,
}

/// The route registry.
///
/// Registration happens at startup and occasionally at runtime; resolution
/// happens on every request. Entries are shared out as `Arc` so resolution
/// holds no lock while the request is in flight.
#[derive(Debug, Default)]
pub struct Router {
    routes: RwLock<HashMap<String, Arc<RouteEntry>>>,
}

impl Router {
    /// Create an empty router.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a service's routes under a prefix.
    ///
    /// `full_path` is `prefix + route.path`. Registering a path that
    /// already exists overwrites the earlier entry; last write wins. That
    /// mirrors how service tables are re-announced on redeploy and is
    /// deliberate, not an error.
    pub fn register_routes(&self, routes: &[RouteDef], prefix: &str, service: &str, version: &str) {
        let mut table = self.routes.write();
        for def in routes {
            let full_path = format!("{prefix}{}", def.path);
            debug!(
                full_path = %full_path,
                service,
                version,
                name = %def.name,
                "Registered route"
            );
            let entry = Arc::new(RouteEntry::new(full_path.clone(), def, service, version));
            table.insert(full_path, entry);
        }
    }

    /// Resolve a request path to a route, recording a hit on success.
    ///
    /// Exact matches win; otherwise the path is matched against template
    /// routes, where a `{name}` segment matches exactly one non-separator
    /// token.
    pub fn get_route_by_path(&self, path: &str) -> Option<Arc<RouteEntry>> {
        let table = self.routes.read();

        if let Some(entry) = table.get(path) {
            entry.record_hit();
            return Some(Arc::clone(entry));
        }

        let entry = table
            .values()
            .find(|entry| template_matches(&entry.full_path, path))?;
        trace!(path, template = %entry.full_path, "Resolved via template");
        entry.record_hit();
        Some(Arc::clone(entry))
    }

    /// Number of registered routes.
    pub fn len(&self) -> usize {
        self.routes.read().len()
    }

    /// Whether no routes are registered.
    pub fn is_empty(&self) -> bool {
        self.routes.read().is_empty()
    }

    /// Every route with its current hit count, for the metrics document.
    pub fn snapshot(&self) -> Vec<RouteSnapshot> {
        let mut snapshot: Vec<RouteSnapshot> = self
            .routes
            .read()
            .values()
            .map(|entry| RouteSnapshot {
                full_path: entry.full_path.clone(),
                methods: entry.methods.iter().cloned().collect(),
                name: entry.name.clone(),
                service: entry.service.clone(),
                version: entry.version.clone(),
                hit_count: entry.hit_count(),
            })
            .collect();
        snapshot.sort_by(|a, b| a.full_path.cmp(&b.full_path));
        snapshot
    }
}

/// Whether a template path matches a concrete path segment-for-segment.
fn template_matches(template: &str, path: &str) -> bool {
    let template_segments: Vec<&str> = template.split('/').collect();
    let path_segments: Vec<&str> = path.split('/').collect();

    if template_segments.len() != path_segments.len() {
        return false;
    }

    template_segments
        .iter()
        .zip(&path_segments)
        .all(|(template_segment, path_segment)| {
            is_param(template_segment) && !path_segment.is_empty()
                || template_segment == path_segment
        })
}

fn is_param(segment: &str) -> bool {
    segment.len() > 2 && segment.starts_with('{') && segment.ends_with('}')
}
