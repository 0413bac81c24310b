//! Response transformation pipeline.

use std::collections::HashMap;

use parking_lot::RwLock;
use serde_json::Value;
use tracing::warn;

use crate::http::{Body, GatewayResponse};

use super::{validate_translation, ErrorEnvelope, TransformationRule};

/// Security headers stamped onto every response.
const SECURITY_HEADERS: [(&str, &str); 3] = [
    ("X-Content-Type-Options", "nosniff"),
    ("X-Frame-Options", "DENY"),
    ("X-XSS-Protection", "1; mode=block"),
];

/// Ordered response mutations: security headers, path-specific rules, then
/// the error envelope for non-2xx statuses.
#[derive(Debug, Default)]
pub struct ResponseTransformer {
    rules: RwLock<HashMap<String, TransformationRule>>,
}

impl ResponseTransformer {
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

    /// Run the pipeline over a response in place.
    pub fn apply(&self, path: &str, response: &mut GatewayResponse) {
        for (name, value) in SECURITY_HEADERS {
            response.headers.insert(name, value);
        }

        let rule = self.rules.read().get(path).cloned();
        if let Some(rule) = rule {
            match validate_translation(path, &rule) {
                Ok(()) => {
                    for (name, value) in &rule.headers {
                        response.headers.insert(name, value.clone());
                    }
                }
                // Fail open, same as the request side.
                Err(e) => {
                    warn!(path = %path, error = %e, "Response transformation failed, continuing unmodified");
                }
            }
        }

        if !response.is_success() {
            normalize_error_body(response);
        }
    }
}

/// Rewrite a non-2xx body into the standard envelope.
///
/// When the original body carries a `detail` field its value becomes the
/// envelope's message (when textual) and detail; otherwise a generic message
/// for the status is used and any original body is preserved as detail.
fn normalize_error_body(response: &mut GatewayResponse) {
    let original_detail = match &response.body {
        Body::Json(value) => value.get("detail").cloned(),
        _ => None,
    };

    let message = match &original_detail {
        Some(Value::String(text)) => text.clone(),
        _ => default_message(response.status).to_string(),
    };

    let mut envelope = ErrorEnvelope::new(response.status, &message);
    match original_detail {
        Some(detail) => envelope.detail = Some(detail),
        None => {
            if let Body::Json(value) = &response.body {
                // Already the envelope shape? Leave the detail it carries.
                if value.get("error").and_then(Value::as_bool) == Some(true) {
                    envelope.detail = value.get("detail").cloned();
                } else {
                    envelope.detail = Some(value.clone());
                }
            }
        }
    }

    response.headers.insert("Content-Type", "application/json");
    match serde_json::to_value(&envelope) {
        Ok(body) => response.body = Body::Json(body),
        Err(e) => {
            // Envelope serialization failing is effectively unreachable,
            // but the pipeline still must not drop the response.
            warn!(error = %e, "Failed to serialize error envelope");
        }
    }
}

fn default_message(status: u16) -> &'static str {
    match status {
        400 => "Bad request",
        401 => "Unauthorized",
        403 => "Forbidden",
        404 => "Not found",
        429 => "Too many requests",
        503 => "Service unavailable",
        500..=599 => "Internal server error",
        _ => "Request failed",
    }
}
