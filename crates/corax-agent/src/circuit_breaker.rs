//! Circuit breaker guarding the Anthropic API
//!
//! After repeated non-retryable failures the breaker opens and rejects
//! requests immediately instead of burning through the rate limit. Once the
//! cooldown elapses a single probe request is allowed through.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Circuit breaker states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Normal operation
    Closed,
    /// Rejecting requests until the cooldown elapses
    Open,
    /// Cooldown elapsed, one probe request allowed
    HalfOpen,
}

pub struct CircuitBreaker {
    failures: AtomicU32,
    last_failure_ms: AtomicU64,
    threshold: u32,
    cooldown: Duration,
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

impl CircuitBreaker {
    pub fn new(threshold: u32, cooldown: Duration) -> Self {
        Self {
            failures: AtomicU32::new(0),
            last_failure_ms: AtomicU64::new(0),
            threshold,
            cooldown,
        }
    }

    pub fn state(&self) -> CircuitState {
        if self.failures.load(Ordering::Relaxed) < self.threshold {
            return CircuitState::Closed;
        }

        let elapsed = now_ms().saturating_sub(self.last_failure_ms.load(Ordering::Relaxed));
        if elapsed >= self.cooldown.as_millis() as u64 {
            CircuitState::HalfOpen
        } else {
            CircuitState::Open
        }
    }

    /// Whether a request may be attempted right now
    pub fn allow_request(&self) -> bool {
        self.state() != CircuitState::Open
    }

    pub fn record_success(&self) {
        self.failures.store(0, Ordering::Relaxed);
    }

    pub fn record_failure(&self) {
        self.failures.fetch_add(1, Ordering::Relaxed);
        self.last_failure_ms.store(now_ms(), Ordering::Relaxed);
    }

    pub fn failure_count(&self) -> u32 {
        self.failures.load(Ordering::Relaxed)
    }

    /// How long until the next probe is allowed; zero unless open
    pub fn retry_after(&self) -> Duration {
        match self.state() {
            CircuitState::Open => {
                let elapsed =
                    now_ms().saturating_sub(self.last_failure_ms.load(Ordering::Relaxed));
                Duration::from_millis(
                    (self.cooldown.as_millis() as u64).saturating_sub(elapsed),
                )
            }
            _ => Duration::ZERO,
        }
    }
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        // 3 failures, one minute cooldown
        Self::new(3, Duration::from_secs(60))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread::sleep;

    #[test]
    fn test_starts_closed() {
        let breaker = CircuitBreaker::default();
        assert_eq!(breaker.state(), CircuitState::Closed);
        assert!(breaker.allow_request());
    }

    #[test]
    fn test_opens_at_threshold() {
        let breaker = CircuitBreaker::new(2, Duration::from_secs(60));
        breaker.record_failure();
        assert!(breaker.allow_request());
        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Open);
        assert!(!breaker.allow_request());
        assert!(breaker.retry_after() > Duration::ZERO);
    }

    #[test]
    fn test_success_resets_count() {
        let breaker = CircuitBreaker::new(3, Duration::from_secs(60));
        breaker.record_failure();
        breaker.record_failure();
        breaker.record_success();
        assert_eq!(breaker.failure_count(), 0);
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[test]
    fn test_half_open_after_cooldown_then_recovers() {
        let breaker = CircuitBreaker::new(1, Duration::from_millis(50));
        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Open);

        sleep(Duration::from_millis(80));
        assert_eq!(breaker.state(), CircuitState::HalfOpen);
        assert!(breaker.allow_request());

        breaker.record_success();
        assert_eq!(breaker.state(), CircuitState::Closed);
    }
}
