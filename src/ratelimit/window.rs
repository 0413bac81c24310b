//! Fixed-window math shared by the local and distributed backends.

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

/// Current time as whole seconds since the Unix epoch.
pub fn now_epoch() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// The start of the fixed window containing `now` for the given period.
pub fn window_start(now: u64, period_secs: u64) -> u64 {
    now - (now % period_secs)
}

/// The outcome of a rate limit check, attached to every response as
/// `X-RateLimit-*` headers and to 429 rejections as the error detail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitInfo {
    /// The configured limit for the window.
    pub limit: u64,
    /// Requests left in the current window (never negative).
    pub remaining: u64,
    /// Epoch second at which the current window resets.
    pub reset: u64,
}

impl RateLimitInfo {
    /// Build the info for a post-increment count within a window.
    pub fn for_count(limit: u64, count: u64, window_start: u64, period_secs: u64) -> Self {
        Self {
            limit,
            remaining: limit.saturating_sub(count),
            reset: window_start + period_secs,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_window_start_floors_to_period() {
        assert_eq!(window_start(125, 60), 120);
        assert_eq!(window_start(120, 60), 120);
        assert_eq!(window_start(179, 60), 120);
        assert_eq!(window_start(180, 60), 180);
    }

    #[test]
    fn test_info_remaining_saturates() {
        let info = RateLimitInfo::for_count(10, 12, 120, 60);
        assert_eq!(info.remaining, 0);
        assert_eq!(info.reset, 180);

        let info = RateLimitInfo::for_count(10, 3, 120, 60);
        assert_eq!(info.remaining, 7);
    }
}
