//! Rate limit rules and per-path rule lookup.

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{GatewayError, Result};

/// Limit applied to paths with no configured rule.
const DEFAULT_LIMIT: u64 = 100;
/// Window applied to paths with no configured rule.
const DEFAULT_PERIOD_SECS: u64 = 60;

/// A rate limit rule: at most `limit` requests per `period_secs` window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitRule {
    /// Maximum requests allowed in one window.
    pub limit: u64,
    /// Window length in seconds.
    pub period_secs: u64,
}

impl RateLimitRule {
    /// Create a rule, validating both fields eagerly.
    pub fn new(limit: u64, period_secs: u64) -> Result<Self> {
        if limit == 0 {
            return Err(GatewayError::Config(
                "rate limit must be greater than zero".to_string(),
            ));
        }
        if period_secs == 0 {
            return Err(GatewayError::Config(
                "rate limit period must be greater than zero".to_string(),
            ));
        }
        Ok(Self { limit, period_secs })
    }

    /// The TTL applied to counter entries: two full periods, so a read
    /// racing the next window still finds the entry.
    pub fn counter_ttl(&self) -> Duration {
        Duration::from_secs(self.period_secs * 2)
    }
}

impl Default for RateLimitRule {
    fn default() -> Self {
        Self {
            limit: DEFAULT_LIMIT,
            period_secs: DEFAULT_PERIOD_SECS,
        }
    }
}

/// Per-path rules with a default for everything unconfigured.
#[derive(Debug, Clone, Default)]
pub struct RuleSet {
    default: RateLimitRule,
    rules: HashMap<String, RateLimitRule>,
}

impl RuleSet {
    /// Create a rule set using the built-in default rule.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the default rule.
    pub fn set_default(&mut self, rule: RateLimitRule) {
        self.default = rule;
    }

    /// Set the rule for a path, replacing any prior rule.
    pub fn set(&mut self, path: &str, rule: RateLimitRule) {
        self.rules.insert(path.to_string(), rule);
    }

    /// The rule for a path, falling back to the default.
    pub fn get(&self, path: &str) -> RateLimitRule {
        self.rules.get(path).copied().unwrap_or(self.default)
    }

    /// Iterate over explicitly configured `(path, rule)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &RateLimitRule)> {
        self.rules.iter().map(|(path, rule)| (path.as_str(), rule))
    }

    /// The default rule.
    pub fn default_rule(&self) -> RateLimitRule {
        self.default
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rule_validation() {
        assert!(RateLimitRule::new(10, 60).is_ok());
        assert!(matches!(
            RateLimitRule::new(0, 60),
            Err(GatewayError::Config(_))
        ));
        assert!(matches!(
            RateLimitRule::new(10, 0),
            Err(GatewayError::Config(_))
        ));
    }

    #[test]
    fn test_counter_ttl_covers_two_windows() {
        let rule = RateLimitRule::new(10, 60).unwrap();
        assert_eq!(rule.counter_ttl(), Duration::from_secs(120));
    }

    #[test]
    fn test_unconfigured_path_gets_default() {
        let rules = RuleSet::new();
        let rule = rules.get("/api/anything");
        assert_eq!(rule.limit, 100);
        assert_eq!(rule.period_secs, 60);
    }

    #[test]
    fn test_configured_path_overrides_default() {
        let mut rules = RuleSet::new();
        rules.set("/api/test", RateLimitRule::new(10, 30).unwrap());

        assert_eq!(rules.get("/api/test").limit, 10);
        assert_eq!(rules.get("/api/other").limit, 100);
    }
}
