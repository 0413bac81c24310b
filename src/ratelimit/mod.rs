//! Fixed-window admission control.

mod limiter;
mod local;
mod rules;
mod window;

pub use limiter::{RateLimitRuleSnapshot, RateLimiter};
pub use local::{LocalCounters, SweepHandle};
pub use rules::{RateLimitRule, RuleSet};
pub use window::{now_epoch, window_start, RateLimitInfo};
