//! Request transformation pipeline.

use std::collections::HashMap;

use parking_lot::RwLock;
use tracing::{trace, warn};

use crate::error::Result;
use crate::http::GatewayRequest;

use super::{validate_translation, TransformationRule};

/// Token substituted for redacted header values.
const REDACTED: &str = "[REDACTED]";
/// Headers never forwarded to a downstream in the clear.
const SENSITIVE_HEADERS: [&str; 2] = ["authorization", "cookie"];

/// Ordered request mutations: always-on defaults first, then any rule
/// registered for the path. Later stages win on key conflicts.
#[derive(Debug, Default)]
pub struct RequestTransformer {
    rules: RwLock<HashMap<String, TransformationRule>>,
}

impl RequestTransformer {
    /// Create a transformer with no path rules.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a rule for a path, replacing any earlier rule.
    pub fn register(&self, path: &str, rule: TransformationRule) {
        self.rules.write().insert(path.to_string(), rule);
    }

    /// Number of registered path rules.
    pub fn rule_count(&self) -> usize {
        self.rules.read().len()
    }

    /// Run the pipeline over a request in place.
    ///
    /// `trace_id` and `timestamp` are injected by the defaults stage; the
    /// caller owns their generation so the pipeline stays deterministic
    /// under test.
    pub fn apply(&self, request: &mut GatewayRequest, trace_id: &str, timestamp: &str) {
        self.apply_defaults(request, trace_id, timestamp);

        let rule = self.rules.read().get(&request.path).cloned();
        if let Some(rule) = rule {
            if let Err(e) = apply_rule(request, &rule) {
                // Fail open: cosmetic failures never block traffic.
                warn!(path = %request.path, error = %e, "Request transformation failed, continuing unmodified");
            }
        }
    }

    /// Stage one: gateway metadata plus redaction of sensitive headers.
    fn apply_defaults(&self, request: &mut GatewayRequest, trace_id: &str, timestamp: &str) {
        request.headers.insert("X-Gateway-Timestamp", timestamp);
        request.headers.insert("X-Gateway-Trace-Id", trace_id);

        for name in SENSITIVE_HEADERS {
            if request.headers.contains(name) {
                request.headers.insert(name, REDACTED);
                trace!(header = name, "Redacted sensitive header");
            }
        }
    }
}

/// Stage two: the path-specific rule.
fn apply_rule(request: &mut GatewayRequest, rule: &TransformationRule) -> Result<()> {
    validate_translation(&request.path, rule)?;

    for (name, value) in &rule.headers {
        request.headers.insert(name, value.clone());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transform::ProtocolTranslation;

    fn request_with_auth() -> GatewayRequest {
        let mut request = GatewayRequest::new("GET", "/api/users");
        request.headers.insert("Authorization", "Bearer secret");
        request.headers.insert("Cookie", "session=abc");
        request
    }

    #[test]
    fn test_defaults_injected() {
        let transformer = RequestTransformer::new();
        let mut request = GatewayRequest::new("GET", "/api/users");

        transformer.apply(&mut request, "trace-1", "2024-01-01T00:00:00Z");

        assert_eq!(request.headers.get("X-Gateway-Trace-Id"), Some("trace-1"));
        assert_eq!(
            request.headers.get("X-Gateway-Timestamp"),
            Some("2024-01-01T00:00:00Z")
        );
    }

    #[test]
    fn test_sensitive_headers_redacted() {
        let transformer = RequestTransformer::new();
        let mut request = request_with_auth();

        transformer.apply(&mut request, "t", "ts");

        assert_eq!(request.headers.get("Authorization"), Some(REDACTED));
        assert_eq!(request.headers.get("Cookie"), Some(REDACTED));
    }

    #[test]
    fn test_path_rule_headers_win() {
        let transformer = RequestTransformer::new();
        let mut rule = TransformationRule::default();
        rule.headers
            .insert("X-Gateway-Trace-Id".to_string(), "overridden".to_string());
        rule.headers
            .insert("X-Backend".to_string(), "billing".to_string());
        transformer.register("/api/users", rule);

        let mut request = GatewayRequest::new("GET", "/api/users");
        transformer.apply(&mut request, "trace-1", "ts");

        // The path rule runs after the defaults, so it wins.
        assert_eq!(request.headers.get("X-Gateway-Trace-Id"), Some("overridden"));
        assert_eq!(request.headers.get("X-Backend"), Some("billing"));
    }

    #[test]
    fn test_rule_only_applies_to_its_path() {
        let transformer = RequestTransformer::new();
        let mut rule = TransformationRule::default();
        rule.headers
            .insert("X-Backend".to_string(), "billing".to_string());
        transformer.register("/api/billing", rule);

        let mut request = GatewayRequest::new("GET", "/api/users");
        transformer.apply(&mut request, "t", "ts");
        assert!(request.headers.get("X-Backend").is_none());
    }

    #[test]
    fn test_failed_translation_fails_open() {
        let transformer = RequestTransformer::new();
        let rule = TransformationRule {
            headers: HashMap::from([("X-Backend".to_string(), "billing".to_string())]),
            protocol: Some(ProtocolTranslation {
                source: "http".to_string(),
                target: "grpc".to_string(),
            }),
        };
        transformer.register("/api/users", rule);

        let mut request = GatewayRequest::new("GET", "/api/users");
        transformer.apply(&mut request, "t", "ts");

        // The rule failed, so none of it applied, but the request went
        // through with the defaults intact.
        assert!(request.headers.get("X-Backend").is_none());
        assert_eq!(request.headers.get("X-Gateway-Trace-Id"), Some("t"));
    }

    #[test]
    fn test_last_registration_wins() {
        let transformer = RequestTransformer::new();
        let mut first = TransformationRule::default();
        first
            .headers
            .insert("X-Backend".to_string(), "old".to_string());
        let mut second = TransformationRule::default();
        second
            .headers
            .insert("X-Backend".to_string(), "new".to_string());

        transformer.register("/api/users", first);
        transformer.register("/api/users", second);

        let mut request = GatewayRequest::new("GET", "/api/users");
        transformer.apply(&mut request, "t", "ts");
        assert_eq!(request.headers.get("X-Backend"), Some("new"));
        assert_eq!(transformer.rule_count(), 1);
    }
}
