//! The per-request pipeline.

use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::circuit::CircuitBreaker;
use crate::error::{GatewayError, Result};
use crate::http::{GatewayRequest, GatewayResponse};
use crate::ratelimit::{RateLimitInfo, RateLimiter, SweepHandle};
use crate::routing::{RouteDef, RouteEntry, Router};
use crate::store::CounterStore;
use crate::transform::{ErrorEnvelope, RequestTransformer, ResponseTransformer, TransformationRule};
use crate::upstream::UpstreamHandler;
use crate::version::{VersionManager, VersionStrategy};

/// How often the local counter sweep runs.
const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Context accumulated while a request moves through the stages.
struct RequestContext {
    trace_id: String,
    version: String,
    rate_info: Option<RateLimitInfo>,
}

/// Explicit continue/short-circuit signal between pipeline stages.
enum StageOutcome {
    Continue,
    ShortCircuit(GatewayResponse),
}

/// The gateway orchestrator.
///
/// Owns every leaf component and their lifecycles (including the local
/// counter sweep task, which stops when the gateway is dropped). One
/// instance is shared across all request tasks.
pub struct Gateway {
    rate_limiter: RateLimiter,
    circuit_breaker: CircuitBreaker,
    router: Router,
    versions: VersionManager,
    request_transformer: RequestTransformer,
    response_transformer: ResponseTransformer,
    _sweeper: Option<SweepHandle>,
}

impl Gateway {
    /// Create a gateway counting rate limits in-process.
    pub fn new() -> Self {
        Self::build(RateLimiter::new())
    }

    /// Create a gateway counting rate limits against a shared store.
    pub fn with_store(store: Arc<dyn CounterStore>) -> Self {
        Self::build(RateLimiter::with_store(store))
    }

    fn build(rate_limiter: RateLimiter) -> Self {
        Self {
            rate_limiter,
            circuit_breaker: CircuitBreaker::new(),
            router: Router::new(),
            versions: VersionManager::new(),
            request_transformer: RequestTransformer::new(),
            response_transformer: ResponseTransformer::new(),
            _sweeper: None,
        }
    }

    /// Build a fully configured gateway from a validated config document.
    ///
    /// Components are wired in dependency order: versions must exist before
    /// the default version is set, and before services register endpoints
    /// against them. Any invalid entry aborts construction.
    pub fn from_config(
        config: &crate::config::TollgateConfig,
        store: Option<Arc<dyn CounterStore>>,
    ) -> Result<Self> {
        let rate_limiter = match store {
            Some(store) => RateLimiter::with_store(store)
                .with_store_timeout(Duration::from_millis(config.server.store_timeout_ms)),
            None => RateLimiter::new(),
        };
        let gateway = Self::build(rate_limiter);

        for version in &config.versioning.versions {
            gateway.register_version(&version.version, &version.description, version.deprecated);
        }
        gateway.configure_versioning(config.versioning.strategy, &config.versioning.default_version)?;

        gateway.set_default_rate_limit(
            config.rate_limiting.default.limit,
            config.rate_limiting.default.period_secs,
        )?;
        for (path, entry) in &config.rate_limiting.paths {
            gateway.set_rate_limit(path, entry.limit, entry.period_secs)?;
        }

        for (path, entry) in &config.circuit_breakers {
            gateway.configure_circuit_breaker(path, entry.threshold, entry.recovery_secs)?;
        }

        for (path, rule) in &config.transformations.request {
            gateway.register_request_transformation(path, rule.clone());
        }
        for (path, rule) in &config.transformations.response {
            gateway.register_response_transformation(path, rule.clone());
        }

        for service in &config.services {
            gateway.register_service(
                &service.name,
                &service.routes,
                &service.prefix,
                &service.version,
            )?;
        }

        Ok(gateway)
    }

    /// Start the periodic sweep of local rate limit counters.
    ///
    /// The sweep task is owned by the gateway and aborts when the gateway
    /// is dropped.
    pub fn start_sweeper(&mut self) {
        let counters = self.rate_limiter.local_counters();
        self._sweeper = Some(counters.start_sweeper(SWEEP_INTERVAL));
    }

    // Configuration entry points. All validation happens here, never at
    // request time.

    /// Configure the rate limit for a path.
    pub fn set_rate_limit(&self, path: &str, limit: u64, period_secs: u64) -> Result<()> {
        self.rate_limiter.set_rate_limit(path, limit, period_secs)
    }

    /// Replace the default rate limit rule.
    pub fn set_default_rate_limit(&self, limit: u64, period_secs: u64) -> Result<()> {
        self.rate_limiter.set_default_rule(limit, period_secs)
    }

    /// Configure the circuit breaker for a path.
    pub fn configure_circuit_breaker(
        &self,
        path: &str,
        threshold: u32,
        recovery_secs: u64,
    ) -> Result<()> {
        self.circuit_breaker.configure(path, threshold, recovery_secs)
    }

    /// Set the version extraction strategy and default version.
    pub fn configure_versioning(&self, strategy: VersionStrategy, default: &str) -> Result<()> {
        self.versions.configure(strategy, default)
    }

    /// Register an API version.
    pub fn register_version(&self, version: &str, description: &str, deprecated: bool) {
        self.versions.register_version(version, description, deprecated);
    }

    /// Register a request transformation rule for a path.
    pub fn register_request_transformation(&self, path: &str, rule: TransformationRule) {
        self.request_transformer.register(path, rule);
    }

    /// Register a response transformation rule for a path.
    pub fn register_response_transformation(&self, path: &str, rule: TransformationRule) {
        self.response_transformer.register(path, rule);
    }

    /// Register a business service's route table.
    ///
    /// Routes land under the version-rewritten prefix and each full path is
    /// recorded against the version's endpoint set.
    pub fn register_service(
        &self,
        service: &str,
        routes: &[RouteDef],
        prefix: &str,
        version: &str,
    ) -> Result<()> {
        let prefix = self.versions.versioned_prefix(prefix, version);
        // Endpoints first: an unregistered version fails here, before the
        // router is touched, so a rejected registration leaves no routes.
        for route in routes {
            self.versions
                .register_endpoint(version, &format!("{prefix}{}", route.path))?;
        }
        self.router.register_routes(routes, &prefix, service, version);
        info!(service, prefix = %prefix, version, count = routes.len(), "Registered service routes");
        Ok(())
    }

    /// The version manager, for direct version administration.
    pub fn versions(&self) -> &VersionManager {
        &self.versions
    }

    /// The circuit breaker registry, for recording out-of-band outcomes.
    pub fn circuit_breaker(&self) -> &CircuitBreaker {
        &self.circuit_breaker
    }

    /// The rate limiter.
    pub fn rate_limiter(&self) -> &RateLimiter {
        &self.rate_limiter
    }

    /// The single metrics document:
    /// `{rate_limits, circuit_breakers, routes, versions}`.
    pub fn metrics(&self) -> Value {
        super::metrics_document(
            &self.rate_limiter,
            &self.circuit_breaker,
            &self.router,
            &self.versions,
        )
    }

    /// Run one request through the full pipeline.
    ///
    /// This is the only place internal error kinds become client-visible
    /// responses; handlers never see gateway errors and the gateway never
    /// leaks handler internals.
    pub async fn handle(
        &self,
        mut request: GatewayRequest,
        upstream: &dyn UpstreamHandler,
    ) -> GatewayResponse {
        let mut ctx = RequestContext {
            trace_id: Uuid::new_v4().to_string(),
            version: String::new(),
            rate_info: None,
        };

        // Stage 1: version extraction.
        ctx.version = self
            .versions
            .extract_version(&request.path, &request.headers, &request.query);

        // Stage 2: route resolution.
        let route = match self.resolve_route(&request) {
            Ok(route) => route,
            Err(outcome) => return self.finish(&request, &ctx, outcome),
        };

        // Stage 3: admission control.
        let outcome = outcome_of(self.admit(&request, &mut ctx).await);
        if let StageOutcome::ShortCircuit(_) = outcome {
            return self.finish(&request, &ctx, outcome);
        }

        // Stage 4: circuit check.
        let outcome = outcome_of(self.check_circuit(&request));
        if let StageOutcome::ShortCircuit(_) = outcome {
            return self.finish(&request, &ctx, outcome);
        }

        // Stage 5: request transformation.
        let timestamp = chrono::Utc::now().to_rfc3339();
        self.request_transformer
            .apply(&mut request, &ctx.trace_id, &timestamp);

        // Stage 6: downstream invocation.
        let response = match upstream.call(&request, &route).await {
            Ok(response) => {
                self.circuit_breaker.record_success(&request.path);
                response
            }
            Err(e) => {
                warn!(
                    trace_id = %ctx.trace_id,
                    path = %request.path,
                    error = %e,
                    "Upstream failure"
                );
                self.circuit_breaker.record_failure(&request.path);
                error_response(&e)
            }
        };

        self.finish(&request, &ctx, StageOutcome::ShortCircuit(response))
    }

    /// Stage 2: resolve the route or short-circuit with a 404 envelope.
    fn resolve_route(&self, request: &GatewayRequest) -> std::result::Result<Arc<RouteEntry>, StageOutcome> {
        match self.router.get_route_by_path(&request.path) {
            Some(route) => Ok(route),
            None => {
                debug!(path = %request.path, "No route matched");
                let envelope = ErrorEnvelope::new(404, "Not found")
                    .with_detail(json!(format!("No route for path {}", request.path)));
                Err(StageOutcome::ShortCircuit(GatewayResponse::json(
                    404,
                    envelope.to_value(),
                )))
            }
        }
    }

    /// Stage 3: rate limit check. Rejection surfaces as
    /// [`GatewayError::AdmissionRejected`] carrying the window snapshot.
    async fn admit(&self, request: &GatewayRequest, ctx: &mut RequestContext) -> Result<()> {
        let client_key = format!("{}:{}", request.client_id(), request.path);
        let (allowed, info) = self
            .rate_limiter
            .check_rate_limit(&client_key, &request.path)
            .await;
        ctx.rate_info = Some(info);

        if allowed {
            Ok(())
        } else {
            debug!(
                trace_id = %ctx.trace_id,
                client_key = %client_key,
                path = %request.path,
                "Admission rejected"
            );
            Err(GatewayError::AdmissionRejected(info))
        }
    }

    /// Stage 4: circuit check. An open circuit surfaces as
    /// [`GatewayError::CircuitOpen`] and the downstream is never invoked.
    fn check_circuit(&self, request: &GatewayRequest) -> Result<()> {
        if self.circuit_breaker.check_circuit(&request.path) {
            Ok(())
        } else {
            debug!(path = %request.path, "Circuit open, rejecting");
            Err(GatewayError::CircuitOpen(request.path.clone()))
        }
    }

    /// Final stage: response transformation plus the headers every reply
    /// carries.
    fn finish(
        &self,
        request: &GatewayRequest,
        ctx: &RequestContext,
        outcome: StageOutcome,
    ) -> GatewayResponse {
        let mut response = match outcome {
            StageOutcome::ShortCircuit(response) => response,
            // Stages only hand `Continue` back inside `handle`; a pipeline
            // ending on `Continue` means no stage produced a response.
            StageOutcome::Continue => GatewayResponse::new(500),
        };

        self.response_transformer.apply(&request.path, &mut response);

        if let Some(info) = &ctx.rate_info {
            response
                .headers
                .insert("X-RateLimit-Limit", info.limit.to_string());
            response
                .headers
                .insert("X-RateLimit-Remaining", info.remaining.to_string());
            response
                .headers
                .insert("X-RateLimit-Reset", info.reset.to_string());
        }
        response.headers.insert("X-API-Version", ctx.version.clone());
        response
    }
}

impl Default for Gateway {
    fn default() -> Self {
        Self::new()
    }
}

/// Convert a stage result into the continue/short-circuit signal.
fn outcome_of(result: Result<()>) -> StageOutcome {
    match result {
        Ok(()) => StageOutcome::Continue,
        Err(e) => StageOutcome::ShortCircuit(error_response(&e)),
    }
}

/// Map an internal error kind to its client-visible response.
///
/// The only place error kinds become status codes. Everything outside the
/// client-visible taxonomy collapses to a generic 500; store, config and
/// upstream internals never cross the boundary.
fn error_response(error: &GatewayError) -> GatewayResponse {
    match error {
        GatewayError::AdmissionRejected(info) => {
            let envelope = ErrorEnvelope::new(429, "Too many requests").with_detail(json!(info));
            GatewayResponse::json(429, envelope.to_value())
        }
        GatewayError::CircuitOpen(_) => {
            let envelope = ErrorEnvelope::new(503, "Service unavailable")
                .with_detail(json!("Circuit breaker is open"));
            GatewayResponse::json(503, envelope.to_value())
        }
        _ => GatewayResponse::json(
            500,
            ErrorEnvelope::new(500, "Internal server error").to_value(),
        ),
    }
}
