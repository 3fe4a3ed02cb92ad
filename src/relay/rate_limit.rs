use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::{SystemTime, UNIX_EPOCH};

pub const DEFAULT_WINDOW_MS: u64 = 60_000;
pub const DEFAULT_MAX_PER_WINDOW: u32 = 20;

/// Millisecond time source for the limiter.
pub trait Clock: Send + Sync {
    fn now_ms(&self) -> u64;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct RateLimitEntry {
    window_start_ms: u64,
    count: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateDecision {
    pub allowed: bool,
    /// Requests counted in the current window, this one included.
    pub count: u32,
}

/// Fixed-window request counter keyed by caller identity.
pub struct RateLimiter {
    window_ms: u64,
    max_per_window: u32,
    clock: Box<dyn Clock>,
    entries: Mutex<HashMap<String, RateLimitEntry>>,
}

impl RateLimiter {
    pub fn new(window_ms: u64, max_per_window: u32) -> Self {
        Self::with_clock(window_ms, max_per_window, Box::new(SystemClock))
    }

    pub fn with_clock(window_ms: u64, max_per_window: u32, clock: Box<dyn Clock>) -> Self {
        Self {
            window_ms,
            max_per_window,
            clock,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn window_ms(&self) -> u64 {
        self.window_ms
    }

    /// Counts the request against `identity`, rejected requests included.
    pub fn check(&self, identity: &str) -> RateDecision {
        let now = self.clock.now_ms();
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);

        let entry = entries
            .entry(identity.to_string())
            .or_insert(RateLimitEntry {
                window_start_ms: now,
                count: 0,
            });

        if now.saturating_sub(entry.window_start_ms) > self.window_ms {
            entry.window_start_ms = now;
            entry.count = 1;
        } else {
            entry.count = entry.count.saturating_add(1);
        }

        RateDecision {
            allowed: entry.count <= self.max_per_window,
            count: entry.count,
        }
    }

    /// Drops identities whose window has elapsed; returns how many were removed.
    pub fn evict_expired(&self) -> usize {
        let now = self.clock.now_ms();
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);

        let before = entries.len();
        entries.retain(|_, entry| now.saturating_sub(entry.window_start_ms) <= self.window_ms);
        before - entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Arc;

    #[derive(Default, Clone)]
    pub(crate) struct ManualClock(Arc<AtomicU64>);

    impl ManualClock {
        pub(crate) fn advance(&self, ms: u64) {
            self.0.fetch_add(ms, Ordering::SeqCst);
        }
    }

    impl Clock for ManualClock {
        fn now_ms(&self) -> u64 {
            self.0.load(Ordering::SeqCst)
        }
    }

    fn limiter(max: u32) -> (RateLimiter, ManualClock) {
        let clock = ManualClock::default();
        (
            RateLimiter::with_clock(60_000, max, Box::new(clock.clone())),
            clock,
        )
    }

    #[test]
    fn third_request_in_window_is_rejected() {
        let (limiter, clock) = limiter(2);

        assert!(limiter.check("1.2.3.4").allowed);
        clock.advance(1_000);
        assert!(limiter.check("1.2.3.4").allowed);
        clock.advance(1_000);

        let third = limiter.check("1.2.3.4");
        assert!(!third.allowed);
        assert_eq!(third.count, 3);
    }

    #[test]
    fn window_elapsing_restarts_the_count() {
        let (limiter, clock) = limiter(2);
        for _ in 0..3 {
            limiter.check("1.2.3.4");
        }

        // Exactly one window later is still the same window
        clock.advance(60_000);
        assert!(!limiter.check("1.2.3.4").allowed);

        clock.advance(1);
        let next = limiter.check("1.2.3.4");
        assert!(next.allowed);
        assert_eq!(next.count, 1);
    }

    #[test]
    fn rejected_requests_still_count() {
        let (limiter, _clock) = limiter(1);
        limiter.check("a");
        limiter.check("a");
        assert_eq!(limiter.check("a").count, 3);
    }

    #[test]
    fn identities_are_counted_separately() {
        let (limiter, _clock) = limiter(1);
        assert!(limiter.check("a").allowed);
        assert!(limiter.check("b").allowed);
        assert!(!limiter.check("a").allowed);
        assert_eq!(limiter.len(), 2);
    }

    #[test]
    fn eviction_removes_only_expired_windows() {
        let (limiter, clock) = limiter(5);
        limiter.check("old");
        clock.advance(30_000);
        limiter.check("fresh");
        clock.advance(30_001);

        assert_eq!(limiter.evict_expired(), 1);
        assert_eq!(limiter.len(), 1);
        // Evicted caller starts a fresh window
        assert_eq!(limiter.check("old").count, 1);
    }

    #[test]
    fn concurrent_checks_admit_exactly_the_limit() {
        let (limiter, _clock) = limiter(20);
        let limiter = Arc::new(limiter);

        let handles: Vec<_> = (0..50)
            .map(|_| {
                let limiter = limiter.clone();
                std::thread::spawn(move || limiter.check("shared").allowed)
            })
            .collect();

        let admitted = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|allowed| *allowed)
            .count();
        assert_eq!(admitted, 20);
    }
}
