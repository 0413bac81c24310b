//! Request and response transformation pipelines.
//!
//! Transformations are cosmetic by contract: a failing registered
//! transformation is logged and skipped, it never blocks traffic.

mod request;
mod response;

pub use request::RequestTransformer;
pub use response::ResponseTransformer;

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{GatewayError, Result};

/// Protocol pairs the gateway knows how to translate.
const SUPPORTED_TRANSLATIONS: [(&str, &str); 2] = [("http", "http"), ("rest", "rest")];

/// Check a rule's protocol translation, when it declares one.
///
/// Both pipelines call this before applying any part of a rule, so a rule
/// with an unsupported translation is skipped whole.
fn validate_translation(path: &str, rule: &TransformationRule) -> Result<()> {
    let Some(translation) = &rule.protocol else {
        return Ok(());
    };
    let supported = SUPPORTED_TRANSLATIONS
        .iter()
        .any(|(s, t)| *s == translation.source && *t == translation.target);
    if supported {
        Ok(())
    } else {
        Err(GatewayError::Transform {
            path: path.to_string(),
            reason: format!(
                "unsupported protocol translation {} -> {}",
                translation.source, translation.target
            ),
        })
    }
}

/// A header/protocol transformation registered for one path.
///
/// Re-registering a path replaces the earlier rule; last write wins.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TransformationRule {
    /// Headers to inject (overwriting existing values).
    #[serde(default)]
    pub headers: HashMap<String, String>,
    /// Protocol translation to apply, when any.
    #[serde(default)]
    pub protocol: Option<ProtocolTranslation>,
}

/// A source/target protocol pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtocolTranslation {
    pub source: String,
    pub target: String,
}

/// The standard error body attached to every non-2xx gateway response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorEnvelope {
    pub error: bool,
    pub code: u16,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<Value>,
}

impl ErrorEnvelope {
    /// Build an envelope for a status code and message.
    pub fn new(code: u16, message: &str) -> Self {
        Self {
            error: true,
            code,
            message: message.to_string(),
            detail: None,
        }
    }

    /// Attach a detail value.
    pub fn with_detail(mut self, detail: Value) -> Self {
        self.detail = Some(detail);
        self
    }

    /// Serialize to a JSON value.
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or_else(|_| Value::Null)
    }
}
