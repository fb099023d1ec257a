//! Admission-control circuit breaker around store-backed operations.
//!
//! The breaker sees only binary outcomes; it knows nothing about transaction
//! semantics. Callers ask [`CircuitBreaker::allow`] before issuing work and
//! report the result afterwards. Its thresholds are safety guarantees, so all
//! counters live behind one mutex; there is no window where a transition can
//! observe half-updated state.

use std::sync::Mutex;
use std::time::{Duration, Instant};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Clone, Copy, Debug)]
pub struct BreakerConfig {
    /// Consecutive failures that trip CLOSED -> OPEN.
    pub failure_threshold: u32,
    /// Successes that close a HALF_OPEN breaker.
    pub success_threshold: u32,
    /// How long an OPEN breaker rejects before probing again.
    pub cooldown: Duration,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            success_threshold: 3,
            cooldown: Duration::from_secs(60),
        }
    }
}

pub struct CircuitBreaker {
    config: BreakerConfig,
    inner: Mutex<Inner>,
}

struct Inner {
    state: BreakerState,
    consecutive_failures: u32,
    half_open_successes: u32,
    last_failure_at: Option<Instant>,
}

impl CircuitBreaker {
    pub fn new(config: BreakerConfig) -> Self {
        Self {
            config,
            inner: Mutex::new(Inner {
                state: BreakerState::Closed,
                consecutive_failures: 0,
                half_open_successes: 0,
                last_failure_at: None,
            }),
        }
    }

    /// Whether a new call may proceed. The first `allow` after the cool-down
    /// elapses moves an OPEN breaker to HALF_OPEN and is granted.
    pub fn allow(&self) -> bool {
        let mut inner = self.inner.lock().unwrap();
        match inner.state {
            BreakerState::Closed | BreakerState::HalfOpen => true,
            BreakerState::Open => {
                let cooled_down = inner
                    .last_failure_at
                    .is_some_and(|at| at.elapsed() >= self.config.cooldown);
                if cooled_down {
                    inner.state = BreakerState::HalfOpen;
                    inner.half_open_successes = 0;
                    true
                } else {
                    false
                }
            }
        }
    }

    pub fn record_success(&self) {
        let mut inner = self.inner.lock().unwrap();
        if inner.state == BreakerState::HalfOpen {
            inner.half_open_successes += 1;
            if inner.half_open_successes >= self.config.success_threshold {
                inner.state = BreakerState::Closed;
                inner.consecutive_failures = 0;
            }
        } else {
            inner.consecutive_failures = 0;
        }
    }

    pub fn record_failure(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.last_failure_at = Some(Instant::now());
        if inner.state == BreakerState::HalfOpen {
            // One failure while probing reopens for a fresh cool-down window.
            inner.state = BreakerState::Open;
            inner.half_open_successes = 0;
            inner.consecutive_failures = 0;
        } else {
            inner.consecutive_failures += 1;
            if inner.consecutive_failures >= self.config.failure_threshold {
                inner.state = BreakerState::Open;
            }
        }
    }

    pub fn state(&self) -> BreakerState {
        self.inner.lock().unwrap().state
    }
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new(BreakerConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn breaker(cooldown: Duration) -> CircuitBreaker {
        CircuitBreaker::new(BreakerConfig {
            failure_threshold: 5,
            success_threshold: 3,
            cooldown,
        })
    }

    #[test]
    fn test_opens_after_exactly_threshold_failures() {
        let b = breaker(Duration::from_secs(60));
        for _ in 0..4 {
            b.record_failure();
            assert_eq!(b.state(), BreakerState::Closed);
        }
        b.record_failure();
        assert_eq!(b.state(), BreakerState::Open);
        assert!(!b.allow());
    }

    #[test]
    fn test_success_resets_failure_streak() {
        let b = breaker(Duration::from_secs(60));
        for _ in 0..4 {
            b.record_failure();
        }
        b.record_success();
        // The streak starts over; four more failures are not enough.
        for _ in 0..4 {
            b.record_failure();
        }
        assert_eq!(b.state(), BreakerState::Closed);
        b.record_failure();
        assert_eq!(b.state(), BreakerState::Open);
    }

    #[test]
    fn test_cooldown_grants_half_open_probe() {
        let b = breaker(Duration::from_millis(20));
        for _ in 0..5 {
            b.record_failure();
        }
        assert!(!b.allow());

        std::thread::sleep(Duration::from_millis(30));
        assert!(b.allow());
        assert_eq!(b.state(), BreakerState::HalfOpen);
    }

    #[test]
    fn test_half_open_failure_reopens_with_fresh_window() {
        let b = breaker(Duration::from_millis(20));
        for _ in 0..5 {
            b.record_failure();
        }
        std::thread::sleep(Duration::from_millis(30));
        assert!(b.allow());

        b.record_failure();
        assert_eq!(b.state(), BreakerState::Open);
        // The cool-down restarted at the half-open failure.
        assert!(!b.allow());
        std::thread::sleep(Duration::from_millis(30));
        assert!(b.allow());
    }

    #[test]
    fn test_half_open_closes_after_success_threshold() {
        let b = breaker(Duration::from_millis(20));
        for _ in 0..5 {
            b.record_failure();
        }
        std::thread::sleep(Duration::from_millis(30));
        assert!(b.allow());

        b.record_success();
        b.record_success();
        assert_eq!(b.state(), BreakerState::HalfOpen);
        b.record_success();
        assert_eq!(b.state(), BreakerState::Closed);
        assert!(b.allow());
    }

    #[test]
    fn test_half_open_successes_discarded_on_reopen() {
        let b = breaker(Duration::from_millis(20));
        for _ in 0..5 {
            b.record_failure();
        }
        std::thread::sleep(Duration::from_millis(30));
        assert!(b.allow());

        b.record_success();
        b.record_success();
        b.record_failure();
        assert_eq!(b.state(), BreakerState::Open);

        // After another cool-down the success count starts from zero.
        std::thread::sleep(Duration::from_millis(30));
        assert!(b.allow());
        b.record_success();
        b.record_success();
        assert_eq!(b.state(), BreakerState::HalfOpen);
    }
}
