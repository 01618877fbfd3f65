//! Retry supervisor driving an adapter's recovery cycle after an
//! unexpected transport loss: exponential backoff with jitter, bounded
//! by a maximum retry count. Every cycle here is a reconnect attempt —
//! there is no generic retryable-error classifier.

use rand::Rng;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub jitter_fraction: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            jitter_fraction: 0.1,
        }
    }
}

impl RetryConfig {
    pub fn from_max_retries(max_retries: u32) -> Self {
        Self {
            max_retries,
            ..Default::default()
        }
    }
}

/// Tracks the attempt counter for one adapter's recovery cycle. A fresh
/// supervisor starts at attempt 0; a successful restart resets it.
pub struct RetrySupervisor {
    config: RetryConfig,
    attempt: AtomicU32,
}

impl RetrySupervisor {
    pub fn new(config: RetryConfig) -> Self {
        Self {
            config,
            attempt: AtomicU32::new(0),
        }
    }

    /// Delay before the next reconnect attempt, using the current attempt
    /// count, then advances the counter.
    pub fn next_delay(&self) -> Duration {
        let attempt = self.attempt.fetch_add(1, Ordering::SeqCst);
        self.delay_for_attempt(attempt)
    }

    fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let base_millis = self.config.base_delay.as_millis() as f64;
        let exp = base_millis * 2f64.powi(attempt as i32);
        let capped = exp.min(self.config.max_delay.as_millis() as f64);
        let jitter = rand::thread_rng().gen::<f64>() * base_millis * self.config.jitter_fraction;
        Duration::from_millis((capped + jitter) as u64)
    }

    /// Whether the supervisor has exhausted its retry budget and the
    /// adapter should be marked terminally unhealthy.
    pub fn exhausted(&self) -> bool {
        self.attempt.load(Ordering::SeqCst) >= self.config.max_retries
    }

    pub fn reset(&self) {
        self.attempt.store(0, Ordering::SeqCst);
    }

    pub fn attempt_count(&self) -> u32 {
        self.attempt.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delay_grows_exponentially_and_caps() {
        let cfg = RetryConfig {
            max_retries: 10,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(1),
            jitter_fraction: 0.0,
        };
        let supervisor = RetrySupervisor::new(cfg);
        assert_eq!(supervisor.delay_for_attempt(0).as_millis(), 100);
        assert_eq!(supervisor.delay_for_attempt(1).as_millis(), 200);
        assert_eq!(supervisor.delay_for_attempt(2).as_millis(), 400);
        assert!(supervisor.delay_for_attempt(10) <= Duration::from_secs(1));
    }

    #[test]
    fn exhausts_after_max_retries() {
        let supervisor = RetrySupervisor::new(RetryConfig::from_max_retries(3));
        assert!(!supervisor.exhausted());
        for _ in 0..3 {
            supervisor.next_delay();
        }
        assert!(supervisor.exhausted());
    }

    #[test]
    fn jitter_window_stays_proportional_to_base_delay_not_current_attempt() {
        let cfg = RetryConfig {
            max_retries: 10,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(60),
            jitter_fraction: 0.1,
        };
        let supervisor = RetrySupervisor::new(cfg);
        // Attempt 5's delay (3200ms) plus jitter must stay under 3200 + 10,
        // not grow into a window scaled off the 3200ms delay itself.
        let delay = supervisor.delay_for_attempt(5);
        assert!(delay >= Duration::from_millis(3200));
        assert!(delay <= Duration::from_millis(3210));
    }

    #[test]
    fn reset_clears_attempt_counter() {
        let supervisor = RetrySupervisor::new(RetryConfig::from_max_retries(3));
        supervisor.next_delay();
        supervisor.next_delay();
        supervisor.reset();
        assert_eq!(supervisor.attempt_count(), 0);
        assert!(!supervisor.exhausted());
    }
}
