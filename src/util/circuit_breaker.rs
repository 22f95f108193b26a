/// Per-endpoint circuit breakers
///
/// Each breaker owns an atomically-updated counter triple (successes,
/// failures, state). Transitions: closed -> open after N consecutive
/// failures; open -> half-open after the cooldown; half-open -> closed
/// on one probe success, back to open on a probe failure.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, Mutex, OnceLock};
use std::time::{Duration, Instant};

use dashmap::DashMap;
use tracing::{debug, warn};

const STATE_CLOSED: u8 = 0;
const STATE_OPEN: u8 = 1;
const STATE_HALF_OPEN: u8 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl CircuitState {
    fn from_raw(raw: u8) -> Self {
        match raw {
            STATE_OPEN => CircuitState::Open,
            STATE_HALF_OPEN => CircuitState::HalfOpen,
            _ => CircuitState::Closed,
        }
    }
}

pub struct CircuitBreaker {
    name: String,
    failure_threshold: u32,
    cooldown: Duration,

    state: AtomicU8,
    consecutive_failures: AtomicU32,
    successes: AtomicU64,
    failures: AtomicU64,
    /// Set while a half-open probe is in flight so only one gets through
    probe_in_flight: AtomicBool,
    opened_at: Mutex<Option<Instant>>,
}

impl CircuitBreaker {
    pub fn new(name: &str, failure_threshold: u32, cooldown: Duration) -> Self {
        Self {
            name: name.to_string(),
            failure_threshold,
            cooldown,
            state: AtomicU8::new(STATE_CLOSED),
            consecutive_failures: AtomicU32::new(0),
            successes: AtomicU64::new(0),
            failures: AtomicU64::new(0),
            probe_in_flight: AtomicBool::new(false),
            opened_at: Mutex::new(None),
        }
    }

    pub fn with_defaults(name: &str) -> Self {
        Self::new(name, 5, Duration::from_secs(30))
    }

    pub fn state(&self) -> CircuitState {
        CircuitState::from_raw(self.state.load(Ordering::Acquire))
    }

    /// Whether a call may proceed right now. An open breaker that has
    /// cooled down moves to half-open and admits exactly one probe.
    pub fn allow(&self) -> bool {
        match self.state() {
            CircuitState::Closed => true,
            CircuitState::Open => {
                let cooled = {
                    let opened_at = self.opened_at.lock().unwrap();
                    matches!(*opened_at, Some(at) if at.elapsed() >= self.cooldown)
                };
                if !cooled {
                    return false;
                }
                self.state.store(STATE_HALF_OPEN, Ordering::Release);
                debug!(breaker = %self.name, "circuit half-open after cooldown");
                self.try_claim_probe()
            }
            CircuitState::HalfOpen => self.try_claim_probe(),
        }
    }

    fn try_claim_probe(&self) -> bool {
        self.probe_in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub fn record_success(&self) {
        self.successes.fetch_add(1, Ordering::Relaxed);
        self.consecutive_failures.store(0, Ordering::Release);
        self.probe_in_flight.store(false, Ordering::Release);
        if self.state() != CircuitState::Closed {
            self.state.store(STATE_CLOSED, Ordering::Release);
            *self.opened_at.lock().unwrap() = None;
            debug!(breaker = %self.name, "circuit closed");
        }
    }

    pub fn record_failure(&self) {
        self.failures.fetch_add(1, Ordering::Relaxed);
        self.probe_in_flight.store(false, Ordering::Release);
        match self.state() {
            CircuitState::HalfOpen => self.trip(),
            CircuitState::Closed => {
                let consecutive = self.consecutive_failures.fetch_add(1, Ordering::AcqRel) + 1;
                if consecutive >= self.failure_threshold {
                    self.trip();
                }
            }
            CircuitState::Open => {}
        }
    }

    fn trip(&self) {
        self.state.store(STATE_OPEN, Ordering::Release);
        *self.opened_at.lock().unwrap() = Some(Instant::now());
        self.consecutive_failures.store(0, Ordering::Release);
        warn!(
            breaker = %self.name,
            cooldown_secs = self.cooldown.as_secs(),
            "circuit opened"
        );
    }

    pub fn totals(&self) -> (u64, u64) {
        (
            self.successes.load(Ordering::Relaxed),
            self.failures.load(Ordering::Relaxed),
        )
    }
}

/// Named breaker registry; one breaker per external endpoint
pub struct BreakerRegistry {
    breakers: DashMap<String, Arc<CircuitBreaker>>,
}

impl BreakerRegistry {
    fn new() -> Self {
        Self {
            breakers: DashMap::new(),
        }
    }

    /// Process-wide registry. Breakers genuinely need one instance per
    /// endpoint name regardless of how many clients reference them.
    pub fn global() -> &'static BreakerRegistry {
        static REGISTRY: OnceLock<BreakerRegistry> = OnceLock::new();
        REGISTRY.get_or_init(BreakerRegistry::new)
    }

    pub fn get(&self, name: &str) -> Arc<CircuitBreaker> {
        self.breakers
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(CircuitBreaker::with_defaults(name)))
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_opens_after_consecutive_failures() {
        let breaker = CircuitBreaker::new("test", 5, Duration::from_secs(30));
        for _ in 0..4 {
            breaker.record_failure();
            assert_eq!(breaker.state(), CircuitState::Closed);
        }
        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Open);
        assert!(!breaker.allow());
    }

    #[test]
    fn test_success_resets_failure_streak() {
        let breaker = CircuitBreaker::new("test", 3, Duration::from_secs(30));
        breaker.record_failure();
        breaker.record_failure();
        breaker.record_success();
        breaker.record_failure();
        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[test]
    fn test_half_open_probe_after_cooldown() {
        let breaker = CircuitBreaker::new("test", 1, Duration::from_millis(20));
        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Open);
        assert!(!breaker.allow());

        std::thread::sleep(Duration::from_millis(40));
        assert!(breaker.allow()); // single probe admitted
        assert_eq!(breaker.state(), CircuitState::HalfOpen);
        assert!(!breaker.allow()); // second caller rejected while probing

        breaker.record_success();
        assert_eq!(breaker.state(), CircuitState::Closed);
        assert!(breaker.allow());
    }

    #[test]
    fn test_half_open_probe_failure_reopens() {
        let breaker = CircuitBreaker::new("test", 1, Duration::from_millis(20));
        breaker.record_failure();
        std::thread::sleep(Duration::from_millis(40));
        assert!(breaker.allow());
        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Open);
        assert!(!breaker.allow());
    }

    #[test]
    fn test_registry_returns_same_instance() {
        let registry = BreakerRegistry::global();
        let a = registry.get("platform");
        let b = registry.get("platform");
        assert!(Arc::ptr_eq(&a, &b));
    }
}
