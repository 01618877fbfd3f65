//! Rolling per-adapter statistics: moving-average latency, call counters,
//! last-activity timestamps, and a capped health-transition ring buffer.

use crate::registry::Health;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant, SystemTime};

const HEALTH_HISTORY_CAPACITY: usize = 100;

#[derive(Debug, Clone)]
pub struct HealthTransition {
    pub from: Health,
    pub to: Health,
    pub at: SystemTime,
}

/// Per-adapter counters and moving averages. All counters are atomics so
/// the base adapter can update them from the reader task without a lock;
/// the health history needs one because it's a bounded deque.
pub struct AdapterStats {
    total_requests: AtomicU64,
    total_errors: AtomicU64,
    latency_sum_micros: AtomicU64,
    latency_count: AtomicU64,
    last_request_at: Mutex<Option<Instant>>,
    last_error_at: Mutex<Option<Instant>>,
    started_at: Instant,
    health_history: Mutex<VecDeque<HealthTransition>>,
}

impl Default for AdapterStats {
    fn default() -> Self {
        Self::new()
    }
}

impl AdapterStats {
    pub fn new() -> Self {
        Self {
            total_requests: AtomicU64::new(0),
            total_errors: AtomicU64::new(0),
            latency_sum_micros: AtomicU64::new(0),
            latency_count: AtomicU64::new(0),
            last_request_at: Mutex::new(None),
            last_error_at: Mutex::new(None),
            started_at: Instant::now(),
            health_history: Mutex::new(VecDeque::with_capacity(HEALTH_HISTORY_CAPACITY)),
        }
    }

    pub fn record_success(&self, latency: Duration) {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
        self.latency_sum_micros
            .fetch_add(latency.as_micros() as u64, Ordering::Relaxed);
        self.latency_count.fetch_add(1, Ordering::Relaxed);
        *self.last_request_at.lock().unwrap() = Some(Instant::now());
    }

    pub fn record_failure(&self, latency: Duration) {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
        self.total_errors.fetch_add(1, Ordering::Relaxed);
        self.latency_sum_micros
            .fetch_add(latency.as_micros() as u64, Ordering::Relaxed);
        self.latency_count.fetch_add(1, Ordering::Relaxed);
        let now = Instant::now();
        *self.last_request_at.lock().unwrap() = Some(now);
        *self.last_error_at.lock().unwrap() = Some(now);
    }

    pub fn record_health_transition(&self, from: Health, to: Health) {
        let mut history = self.health_history.lock().unwrap();
        if history.len() == HEALTH_HISTORY_CAPACITY {
            history.pop_front();
        }
        history.push_back(HealthTransition {
            from,
            to,
            at: SystemTime::now(),
        });
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        let total_requests = self.total_requests.load(Ordering::Relaxed);
        let total_errors = self.total_errors.load(Ordering::Relaxed);
        let latency_count = self.latency_count.load(Ordering::Relaxed);
        let avg_latency_micros = if latency_count == 0 {
            0
        } else {
            self.latency_sum_micros.load(Ordering::Relaxed) / latency_count
        };

        StatsSnapshot {
            total_requests,
            total_errors,
            avg_latency_micros,
            last_request_at: *self.last_request_at.lock().unwrap(),
            last_error_at: *self.last_error_at.lock().unwrap(),
            uptime: self.started_at.elapsed(),
            health_history: self.health_history.lock().unwrap().iter().cloned().collect(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct StatsSnapshot {
    pub total_requests: u64,
    pub total_errors: u64,
    pub avg_latency_micros: u64,
    pub last_request_at: Option<Instant>,
    pub last_error_at: Option<Instant>,
    pub uptime: Duration,
    pub health_history: Vec<HealthTransition>,
}
