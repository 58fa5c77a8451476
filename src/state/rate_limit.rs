//! Fixed-window rate limiting, keyed by caller token and operation category.
//!
//! Windows live in coordinator memory only and reset on restart; that loss
//! is an accepted weak guarantee, not a bug.

use std::collections::HashMap;

/// Operation categories with independent windows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RateCategory {
    /// Admin or identity PIN attempts.
    Pin,
    /// External search calls.
    Search,
    /// Queue join attempts.
    Join,
    /// Vote submissions.
    Vote,
}

/// Window length for every category.
pub const WINDOW_MS: i64 = 60_000;

#[derive(Debug, Clone, Copy)]
struct Window {
    count: u32,
    started_at_ms: i64,
}

/// Per-caller, per-category fixed windows tracking only a count and a start.
#[derive(Debug, Default)]
pub struct RateLimiter {
    windows: HashMap<(String, RateCategory), Window>,
}

impl RateLimiter {
    /// Construct an empty limiter (fresh on every coordinator start).
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an attempt. Returns `true` when the attempt is allowed,
    /// `false` when the category's window is exhausted for this caller.
    pub fn try_acquire(&mut self, caller: &str, category: RateCategory, limit: u32, now_ms: i64) -> bool {
        let window = self
            .windows
            .entry((caller.to_string(), category))
            .or_insert(Window { count: 0, started_at_ms: now_ms });

        if now_ms - window.started_at_ms >= WINDOW_MS {
            window.count = 0;
            window.started_at_ms = now_ms;
        }

        if window.count >= limit {
            return false;
        }
        window.count += 1;
        true
    }

    /// Drop the caller's window for one category (used after a successful
    /// PIN verification).
    pub fn clear(&mut self, caller: &str, category: RateCategory) {
        self.windows.remove(&(caller.to_string(), category));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blocks_past_limit_within_window() {
        let mut limiter = RateLimiter::new();
        assert!(limiter.try_acquire("1.2.3.4", RateCategory::Pin, 2, 0));
        assert!(limiter.try_acquire("1.2.3.4", RateCategory::Pin, 2, 100));
        assert!(!limiter.try_acquire("1.2.3.4", RateCategory::Pin, 2, 200));
        assert!(!limiter.try_acquire("1.2.3.4", RateCategory::Pin, 2, WINDOW_MS - 1));
    }

    #[test]
    fn window_rolls_over() {
        let mut limiter = RateLimiter::new();
        assert!(limiter.try_acquire("c", RateCategory::Join, 1, 0));
        assert!(!limiter.try_acquire("c", RateCategory::Join, 1, 1));
        assert!(limiter.try_acquire("c", RateCategory::Join, 1, WINDOW_MS));
    }

    #[test]
    fn categories_and_callers_are_independent() {
        let mut limiter = RateLimiter::new();
        assert!(limiter.try_acquire("a", RateCategory::Vote, 1, 0));
        assert!(!limiter.try_acquire("a", RateCategory::Vote, 1, 1));
        assert!(limiter.try_acquire("a", RateCategory::Search, 1, 1));
        assert!(limiter.try_acquire("b", RateCategory::Vote, 1, 1));
    }

    #[test]
    fn clear_resets_one_category() {
        let mut limiter = RateLimiter::new();
        assert!(limiter.try_acquire("a", RateCategory::Pin, 1, 0));
        assert!(!limiter.try_acquire("a", RateCategory::Pin, 1, 1));
        limiter.clear("a", RateCategory::Pin);
        assert!(limiter.try_acquire("a", RateCategory::Pin, 1, 2));
    }
}
