//! A sliding-window circuit breaker for a single sink writer (§4.2).
//!
//! Counts failures only within `circuit_breaker_interval` rather than over a lifetime total.
//! Transitions are guarded by a single mutex — acceptable because the spec itself describes
//! circuit-breaker transitions as serialized per sink writer, not a hot per-message path.

use crate::clock::{Clock, MonotonicClock};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

struct Inner {
    failures: VecDeque<u64>,
    state: CircuitState,
    opened_until_millis: u64,
    half_open_probe_in_flight: bool,
}

/// A windowed failure counter that opens the circuit once `threshold` failures land inside
/// `interval`, and half-opens for a single probe after `cool_down` elapses.
pub struct WindowedCircuitBreaker {
    clock: Arc<dyn Clock>,
    threshold: usize,
    interval_millis: u64,
    cool_down_millis: u64,
    inner: Mutex<Inner>,
}

impl WindowedCircuitBreaker {
    pub fn new(threshold: usize, interval_millis: u64, cool_down_millis: u64) -> Self {
        Self::with_clock(threshold, interval_millis, cool_down_millis, Arc::new(MonotonicClock::default()))
    }

    pub fn with_clock(threshold: usize, interval_millis: u64, cool_down_millis: u64, clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            threshold,
            interval_millis,
            cool_down_millis,
            inner: Mutex::new(Inner {
                failures: VecDeque::new(),
                state: CircuitState::Closed,
                opened_until_millis: 0,
                half_open_probe_in_flight: false,
            }),
        }
    }

    fn prune(&self, inner: &mut Inner, now: u64) {
        let cutoff = now.saturating_sub(self.interval_millis);
        while let Some(&front) = inner.failures.front() {
            if front < cutoff {
                inner.failures.pop_front();
            } else {
                break;
            }
        }
    }

    /// Whether a write may currently be attempted; for `HalfOpen` this grants exactly one
    /// probe until it resolves via [`Self::record_success`]/[`Self::record_failure`].
    pub fn allow_attempt(&self) -> bool {
        let now = self.clock.now_millis();
        let mut inner = self.inner.lock().unwrap_or_else(|p| p.into_inner());
        match inner.state {
            CircuitState::Closed => true,
            CircuitState::Open => {
                if now >= inner.opened_until_millis {
                    inner.state = CircuitState::HalfOpen;
                    inner.half_open_probe_in_flight = true;
                    true
                } else {
                    false
                }
            }
            CircuitState::HalfOpen => {
                if inner.half_open_probe_in_flight {
                    false
                } else {
                    inner.half_open_probe_in_flight = true;
                    true
                }
            }
        }
    }

    pub fn record_success(&self) {
        let mut inner = self.inner.lock().unwrap_or_else(|p| p.into_inner());
        inner.failures.clear();
        inner.state = CircuitState::Closed;
        inner.half_open_probe_in_flight = false;
    }

    pub fn record_failure(&self) {
        let now = self.clock.now_millis();
        let mut inner = self.inner.lock().unwrap_or_else(|p| p.into_inner());
        inner.half_open_probe_in_flight = false;
        match inner.state {
            CircuitState::HalfOpen => {
                inner.failures.clear();
                inner.state = CircuitState::Open;
                inner.opened_until_millis = now + self.cool_down_millis;
            }
            CircuitState::Closed | CircuitState::Open => {
                inner.failures.push_back(now);
                self.prune(&mut inner, now);
                if inner.failures.len() >= self.threshold {
                    inner.state = CircuitState::Open;
                    inner.opened_until_millis = now + self.cool_down_millis;
                }
            }
        }
    }

    pub fn state(&self) -> CircuitState {
        self.inner.lock().unwrap_or_else(|p| p.into_inner()).state
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};

    #[derive(Debug)]
    struct FakeClock(AtomicU64);
    impl Clock for FakeClock {
        fn now_millis(&self) -> u64 {
            self.0.load(Ordering::SeqCst)
        }
    }
    impl FakeClock {
        fn advance(&self, millis: u64) {
            self.0.fetch_add(millis, Ordering::SeqCst);
        }
    }

    #[test]
    fn opens_after_threshold_failures_within_window() {
        let breaker = WindowedCircuitBreaker::new(3, 60_000, 30_000);
        assert!(breaker.allow_attempt());
        breaker.record_failure();
        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Closed);
        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Open);
        assert!(!breaker.allow_attempt());
    }

    #[test]
    fn failures_outside_window_do_not_count() {
        let clock = Arc::new(FakeClock(AtomicU64::new(0)));
        let breaker = WindowedCircuitBreaker::with_clock(3, 1_000, 500, clock.clone());
        breaker.record_failure();
        clock.advance(2_000);
        breaker.record_failure();
        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[test]
    fn half_opens_after_cool_down_and_closes_on_success() {
        let clock = Arc::new(FakeClock(AtomicU64::new(0)));
        let breaker = WindowedCircuitBreaker::with_clock(1, 60_000, 1_000, clock.clone());
        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Open);
        assert!(!breaker.allow_attempt());

        clock.advance(1_001);
        assert!(breaker.allow_attempt());
        assert_eq!(breaker.state(), CircuitState::HalfOpen);
        assert!(!breaker.allow_attempt(), "only one probe allowed while half-open");

        breaker.record_success();
        assert_eq!(breaker.state(), CircuitState::Closed);
        assert!(breaker.allow_attempt());
    }

    #[test]
    fn failed_probe_reopens_circuit() {
        let clock = Arc::new(FakeClock(AtomicU64::new(0)));
        let breaker = WindowedCircuitBreaker::with_clock(1, 60_000, 1_000, clock.clone());
        breaker.record_failure();
        clock.advance(1_001);
        assert!(breaker.allow_attempt());
        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Open);
    }
}
