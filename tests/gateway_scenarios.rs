//! End-to-end scenarios through the public gateway API.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;

use tollgate::error::{GatewayError, Result};
use tollgate::gateway::Gateway;
use tollgate::http::{GatewayRequest, GatewayResponse};
use tollgate::ratelimit::now_epoch;
use tollgate::routing::{RouteDef, RouteEntry, Router};
use tollgate::store::CounterStore;
use tollgate::upstream::UpstreamHandler;
use tollgate::version::VersionStrategy;

struct OkUpstream;

#[async_trait]
impl UpstreamHandler for OkUpstream {
    async fn call(&self, _request: &GatewayRequest, _route: &RouteEntry) -> Result<GatewayResponse> {
        Ok(GatewayResponse::json(200, json!({"ok": true})))
    }
}

fn route(path: &str, name: &str) -> RouteDef {
    RouteDef {
        path: path.to_string(),
        methods: vec!["GET".to_string()],
        name: name.to_string(),
    }
}

fn request(path: &str) -> GatewayRequest {
    let mut request = GatewayRequest::new("GET", path);
    request.client_addr = "203.0.113.7".to_string();
    request
}

/// Scenario A: a 10-per-60s limit admits exactly ten requests in a window
/// with remaining counting down 9..0, then rejects with 429.
#[tokio::test]
async fn scenario_rate_limit_window() {
    let gateway = Gateway::new();
    // Header strategy keeps registered prefixes unversioned.
    gateway
        .configure_versioning(VersionStrategy::Header, "1")
        .unwrap();
    gateway
        .register_service("test", &[route("/test", "test")], "/api", "1")
        .unwrap();
    gateway.set_rate_limit("/api/test", 10, 60).unwrap();

    for expected_remaining in (0..10).rev() {
        let response = gateway.handle(request("/api/test"), &OkUpstream).await;
        assert_eq!(response.status, 200);
        assert_eq!(
            response.headers.get("X-RateLimit-Remaining"),
            Some(expected_remaining.to_string().as_str())
        );
        assert_eq!(response.headers.get("X-RateLimit-Limit"), Some("10"));
    }

    let response = gateway.handle(request("/api/test"), &OkUpstream).await;
    assert_eq!(response.status, 429);
    assert_eq!(response.headers.get("X-RateLimit-Remaining"), Some("0"));
    let body = response.body.as_json().unwrap();
    assert_eq!(body["error"], true);
    assert_eq!(body["code"], 429);
    assert_eq!(body["detail"]["limit"], 10);
}

/// Scenario B: three failures open the breaker; after the recovery window a
/// single trial is admitted, and its success closes the circuit.
#[tokio::test]
async fn scenario_circuit_recovery_cycle() {
    let gateway = Gateway::new();
    gateway
        .configure_circuit_breaker("/api/x", 3, 30)
        .unwrap();
    let breaker = gateway.circuit_breaker();
    let t0 = now_epoch();

    for i in 0..3 {
        breaker.record_failure_at("/api/x", t0 + i);
    }
    assert!(!breaker.check_circuit_at("/api/x", t0 + 3));

    // Recovery elapsed: one trial goes through, a second check does not.
    let after_recovery = t0 + 2 + 30;
    assert!(breaker.check_circuit_at("/api/x", after_recovery));
    assert!(!breaker.check_circuit_at("/api/x", after_recovery));

    breaker.record_success("/api/x");
    assert!(breaker.check_circuit_at("/api/x", after_recovery + 1));
    assert!(breaker.check_circuit_at("/api/x", after_recovery + 500));
}

/// Scenario C: a `{id}` template resolves for a concrete id while the
/// collection path keeps its exact match.
#[test]
fn scenario_template_route_resolution() {
    let router = Router::new();
    router.register_routes(
        &[route("/users", "list_users"), route("/users/{id}", "get_user")],
        "/api/auth",
        "auth",
        "1",
    );

    let entry = router.get_route_by_path("/api/auth/users/42").unwrap();
    assert_eq!(entry.name, "get_user");
    assert_eq!(entry.full_path, "/api/auth/users/{id}");

    let entry = router.get_route_by_path("/api/auth/users").unwrap();
    assert_eq!(entry.name, "list_users");
}

/// Round-trip: `/v2/api/users` under UrlPath with default "1" extracts
/// version 2 and the response says so.
#[tokio::test]
async fn scenario_version_round_trip() {
    let gateway = Gateway::new();
    gateway.register_version("2", "Second version", false);
    gateway
        .configure_versioning(VersionStrategy::UrlPath, "1")
        .unwrap();
    gateway
        .register_service("users", &[route("/users", "list_users")], "/api", "2")
        .unwrap();

    let response = gateway.handle(request("/v2/api/users"), &OkUpstream).await;
    assert_eq!(response.status, 200);
    assert_eq!(response.headers.get("X-API-Version"), Some("2"));

    // An unversioned path falls back to the default and misses the v2 route.
    let response = gateway.handle(request("/api/users"), &OkUpstream).await;
    assert_eq!(response.status, 404);
    assert_eq!(response.headers.get("X-API-Version"), Some("1"));
}

/// A dead counter store never rejects traffic: counting falls back to the
/// local backend, which still enforces the limit.
#[tokio::test]
async fn scenario_store_outage_fails_open() {
    struct DeadStore;

    #[async_trait]
    impl CounterStore for DeadStore {
        async fn get(&self, _key: &str) -> Result<Option<u64>> {
            Err(GatewayError::Store("connection refused".to_string()))
        }

        async fn increment_with_ttl(&self, _key: &str, _ttl: Duration) -> Result<u64> {
            Err(GatewayError::Store("connection refused".to_string()))
        }

        async fn set_if_absent(&self, _key: &str, _value: u64, _ttl: Duration) -> Result<bool> {
            Err(GatewayError::Store("connection refused".to_string()))
        }
    }

    let gateway = Gateway::with_store(Arc::new(DeadStore));
    gateway
        .configure_versioning(VersionStrategy::Header, "1")
        .unwrap();
    gateway
        .register_service("test", &[route("/test", "test")], "/api", "1")
        .unwrap();
    gateway.set_rate_limit("/api/test", 2, 60).unwrap();

    let response = gateway.handle(request("/api/test"), &OkUpstream).await;
    assert_eq!(response.status, 200);

    gateway.handle(request("/api/test"), &OkUpstream).await;
    let response = gateway.handle(request("/api/test"), &OkUpstream).await;
    assert_eq!(response.status, 429);
}
