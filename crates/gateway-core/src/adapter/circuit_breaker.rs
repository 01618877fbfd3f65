//! Three-state circuit breaker guarding a backend adapter's outgoing
//! requests, with a volume threshold: the breaker never opens on a
//! handful of failures alone.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    pub failure_threshold: usize,
    pub success_threshold: usize,
    pub recovery_timeout: Duration,
    pub volume_threshold: u64,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            success_threshold: 2,
            recovery_timeout: Duration::from_secs(30),
            volume_threshold: 10,
        }
    }
}

pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    state: RwLock<CircuitState>,
    consecutive_failures: AtomicUsize,
    consecutive_successes: AtomicUsize,
    total_requests: AtomicU64,
    last_state_change: RwLock<Instant>,
}

impl CircuitBreaker {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            state: RwLock::new(CircuitState::Closed),
            consecutive_failures: AtomicUsize::new(0),
            consecutive_successes: AtomicUsize::new(0),
            total_requests: AtomicU64::new(0),
            last_state_change: RwLock::new(Instant::now()),
        }
    }

    pub async fn state(&self) -> CircuitState {
        *self.state.read().await
    }

    /// Whether a new request may proceed right now. Flips *open* to
    /// *half-open* as a side effect once the recovery timeout has elapsed,
    /// matching the "first request after the window" transition rule.
    pub async fn allow_request(&self) -> bool {
        let current = self.state().await;
        match current {
            CircuitState::Closed | CircuitState::HalfOpen => true,
            CircuitState::Open => {
                let elapsed = self.last_state_change.read().await.elapsed();
                if elapsed >= self.config.recovery_timeout {
                    self.transition_to(CircuitState::HalfOpen).await;
                    self.consecutive_successes.store(0, Ordering::SeqCst);
                    true
                } else {
                    false
                }
            }
        }
    }

    pub async fn record_success(&self) {
        self.total_requests.fetch_add(1, Ordering::SeqCst);
        self.consecutive_failures.store(0, Ordering::SeqCst);

        if self.state().await == CircuitState::HalfOpen {
            let successes = self.consecutive_successes.fetch_add(1, Ordering::SeqCst) + 1;
            if successes >= self.config.success_threshold {
                self.transition_to(CircuitState::Closed).await;
                self.consecutive_successes.store(0, Ordering::SeqCst);
            }
        }
    }

    pub async fn record_failure(&self) {
        self.total_requests.fetch_add(1, Ordering::SeqCst);
        self.consecutive_successes.store(0, Ordering::SeqCst);
        let failures = self.consecutive_failures.fetch_add(1, Ordering::SeqCst) + 1;

        match self.state().await {
            CircuitState::HalfOpen => {
                self.transition_to(CircuitState::Open).await;
            }
            CircuitState::Closed => {
                let total = self.total_requests.load(Ordering::SeqCst);
                if failures >= self.config.failure_threshold && total >= self.config.volume_threshold
                {
                    self.transition_to(CircuitState::Open).await;
                }
            }
            CircuitState::Open => {}
        }
    }

    async fn transition_to(&self, new_state: CircuitState) {
        let mut state = self.state.write().await;
        if *state != new_state {
            *state = new_state;
            *self.last_state_change.write().await = Instant::now();
        }
    }

    pub fn stats(&self) -> CircuitBreakerStats {
        CircuitBreakerStats {
            consecutive_failures: self.consecutive_failures.load(Ordering::SeqCst),
            consecutive_successes: self.consecutive_successes.load(Ordering::SeqCst),
            total_requests: self.total_requests.load(Ordering::SeqCst),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CircuitBreakerStats {
    pub consecutive_failures: usize,
    pub consecutive_successes: usize,
    pub total_requests: u64,
}

pub type SharedCircuitBreaker = Arc<CircuitBreaker>;

#[cfg(test)]
mod tests {
    use super::*;

    fn breaker(cfg: CircuitBreakerConfig) -> CircuitBreaker {
        CircuitBreaker::new(cfg)
    }

    #[tokio::test]
    async fn stays_closed_below_volume_threshold() {
        let cb = breaker(CircuitBreakerConfig {
            failure_threshold: 2,
            volume_threshold: 10,
            ..Default::default()
        });
        cb.record_failure().await;
        cb.record_failure().await;
        assert_eq!(cb.state().await, CircuitState::Closed);
    }

    #[tokio::test]
    async fn opens_after_failures_and_volume() {
        let cb = breaker(CircuitBreakerConfig {
            failure_threshold: 3,
            volume_threshold: 3,
            ..Default::default()
        });
        for _ in 0..3 {
            cb.record_failure().await;
        }
        assert_eq!(cb.state().await, CircuitState::Open);
        assert!(!cb.allow_request().await);
    }

    #[tokio::test]
    async fn success_resets_failure_counter_in_closed_state() {
        let cb = breaker(CircuitBreakerConfig {
            failure_threshold: 3,
            volume_threshold: 1,
            ..Default::default()
        });
        cb.record_failure().await;
        cb.record_failure().await;
        cb.record_success().await;
        assert_eq!(cb.stats().consecutive_failures, 0);
        assert_eq!(cb.state().await, CircuitState::Closed);
    }

    #[tokio::test]
    async fn half_open_closes_after_success_threshold() {
        let cb = breaker(CircuitBreakerConfig {
            failure_threshold: 1,
            volume_threshold: 1,
            success_threshold: 2,
            recovery_timeout: Duration::from_millis(10),
        });
        cb.record_failure().await;
        assert_eq!(cb.state().await, CircuitState::Open);

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(cb.allow_request().await);
        assert_eq!(cb.state().await, CircuitState::HalfOpen);

        cb.record_success().await;
        assert_eq!(cb.state().await, CircuitState::HalfOpen);
        cb.record_success().await;
        assert_eq!(cb.state().await, CircuitState::Closed);
    }

    #[tokio::test]
    async fn half_open_failure_reopens() {
        let cb = breaker(CircuitBreakerConfig {
            failure_threshold: 1,
            volume_threshold: 1,
            recovery_timeout: Duration::from_millis(10),
            ..Default::default()
        });
        cb.record_failure().await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(cb.allow_request().await);
        cb.record_failure().await;
        assert_eq!(cb.state().await, CircuitState::Open);
    }
}
