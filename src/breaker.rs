//! Three-state circuit breaker protecting the executor.
//!
//! States: `closed` (pass-through), `open` (fail-fast until a deadline),
//! `half_open` (exactly one probe call admitted). Consecutive failures in
//! `closed` trip the breaker; a failed probe doubles the backoff up to a
//! cap; a successful probe resets everything.
//!
//! All transitions happen under one mutex so counters stay accurate under
//! concurrent calls.

use crate::errors::ExecutionError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Backoff multiplier cap: open duration never exceeds 8x the base.
const MAX_BACKOFF_MULTIPLIER: u32 = 8;

/// Observable breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

/// Serializable view of the breaker, mirrored into checkpoints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BreakerSnapshot {
    pub state: BreakerState,
    pub consecutive_failures: u32,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub open_until: Option<DateTime<Utc>>,
    pub backoff_multiplier: u32,
}

struct BreakerInner {
    state: BreakerState,
    consecutive_failures: u32,
    open_until: Option<Instant>,
    open_until_utc: Option<DateTime<Utc>>,
    backoff_multiplier: u32,
    probe_in_flight: bool,
}

/// Circuit breaker with exponential reset backoff.
pub struct CircuitBreaker {
    threshold: u32,
    base_backoff: Duration,
    inner: Mutex<BreakerInner>,
}

impl CircuitBreaker {
    /// Create a closed breaker.
    ///
    /// `threshold` consecutive failures open it; the first open period is
    /// `base_backoff`, doubling per failed probe up to the cap.
    pub fn new(threshold: u32, base_backoff: Duration) -> Self {
        Self {
            threshold,
            base_backoff,
            inner: Mutex::new(BreakerInner {
                state: BreakerState::Closed,
                consecutive_failures: 0,
                open_until: None,
                open_until_utc: None,
                backoff_multiplier: 1,
                probe_in_flight: false,
            }),
        }
    }

    /// Restore a breaker from a checkpointed snapshot.
    ///
    /// An `open_until` in the past lands the breaker directly in the
    /// half-open admission path on the next call.
    pub fn from_snapshot(threshold: u32, base_backoff: Duration, snap: &BreakerSnapshot) -> Self {
        let breaker = Self::new(threshold, base_backoff);
        {
            let mut inner = breaker.inner.lock().expect("breaker mutex poisoned");
            inner.state = snap.state;
            inner.consecutive_failures = snap.consecutive_failures;
            inner.backoff_multiplier = snap.backoff_multiplier.clamp(1, MAX_BACKOFF_MULTIPLIER);
            inner.open_until_utc = snap.open_until;
            inner.open_until = snap.open_until.map(|deadline| {
                let now = Utc::now();
                let remaining = (deadline - now).to_std().unwrap_or(Duration::ZERO);
                Instant::now() + remaining
            });
        }
        breaker
    }

    /// Ask to make a call through the breaker.
    ///
    /// Returns `Ok(())` when the call is admitted. In `open`, fails fast
    /// with the outstanding deadline until it expires, then admits a single
    /// probe; in `half_open`, a second caller is rejected while the probe
    /// is in flight.
    pub fn try_acquire(&self) -> Result<(), ExecutionError> {
        let mut inner = self.inner.lock().expect("breaker mutex poisoned");
        match inner.state {
            BreakerState::Closed => Ok(()),
            BreakerState::Open => {
                let expired = inner
                    .open_until
                    .map(|deadline| Instant::now() >= deadline)
                    .unwrap_or(true);
                if expired {
                    inner.state = BreakerState::HalfOpen;
                    inner.probe_in_flight = true;
                    Ok(())
                } else {
                    Err(ExecutionError::CircuitOpen {
                        open_until: inner.open_until_utc.unwrap_or_else(Utc::now),
                    })
                }
            }
            BreakerState::HalfOpen => {
                if inner.probe_in_flight {
                    Err(ExecutionError::CircuitOpen {
                        open_until: inner.open_until_utc.unwrap_or_else(Utc::now),
                    })
                } else {
                    inner.probe_in_flight = true;
                    Ok(())
                }
            }
        }
    }

    /// Record a successful call.
    pub fn record_success(&self) {
        let mut inner = self.inner.lock().expect("breaker mutex poisoned");
        inner.consecutive_failures = 0;
        inner.probe_in_flight = false;
        if inner.state != BreakerState::Closed {
            tracing::info!("circuit breaker reset to closed");
        }
        inner.state = BreakerState::Closed;
        inner.backoff_multiplier = 1;
        inner.open_until = None;
        inner.open_until_utc = None;
    }

    /// Record a failed call.
    pub fn record_failure(&self) {
        let mut inner = self.inner.lock().expect("breaker mutex poisoned");
        match inner.state {
            BreakerState::Closed => {
                inner.consecutive_failures += 1;
                if inner.consecutive_failures >= self.threshold {
                    Self::trip(&mut inner, self.base_backoff);
                }
            }
            BreakerState::HalfOpen => {
                inner.probe_in_flight = false;
                inner.backoff_multiplier =
                    (inner.backoff_multiplier * 2).min(MAX_BACKOFF_MULTIPLIER);
                Self::trip(&mut inner, self.base_backoff);
            }
            BreakerState::Open => {
                // Failures reported while already open change nothing.
            }
        }
    }

    fn trip(inner: &mut BreakerInner, base: Duration) {
        let backoff = base * inner.backoff_multiplier;
        inner.state = BreakerState::Open;
        inner.open_until = Some(Instant::now() + backoff);
        inner.open_until_utc = Some(
            Utc::now()
                + chrono::Duration::from_std(backoff).unwrap_or_else(|_| chrono::Duration::zero()),
        );
        tracing::warn!(
            failures = inner.consecutive_failures,
            backoff_secs = backoff.as_secs_f64(),
            "circuit breaker opened"
        );
    }

    /// Current state.
    pub fn state(&self) -> BreakerState {
        self.inner.lock().expect("breaker mutex poisoned").state
    }

    /// Serializable view of the breaker.
    pub fn snapshot(&self) -> BreakerSnapshot {
        let inner = self.inner.lock().expect("breaker mutex poisoned");
        BreakerSnapshot {
            state: inner.state,
            consecutive_failures: inner.consecutive_failures,
            open_until: inner.open_until_utc,
            backoff_multiplier: inner.backoff_multiplier,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn breaker(threshold: u32, backoff_ms: u64) -> CircuitBreaker {
        CircuitBreaker::new(threshold, Duration::from_millis(backoff_ms))
    }

    #[test]
    fn test_trips_on_exactly_nth_failure() {
        let b = breaker(3, 50);
        b.record_failure();
        b.record_failure();
        assert_eq!(b.state(), BreakerState::Closed);
        b.record_failure();
        assert_eq!(b.state(), BreakerState::Open);
    }

    #[test]
    fn test_success_resets_failure_count() {
        let b = breaker(3, 50);
        b.record_failure();
        b.record_failure();
        b.record_success();
        b.record_failure();
        b.record_failure();
        assert_eq!(b.state(), BreakerState::Closed);
    }

    #[test]
    fn test_open_fails_fast_with_deadline() {
        let b = breaker(1, 10_000);
        b.record_failure();
        let err = b.try_acquire().unwrap_err();
        match err {
            ExecutionError::CircuitOpen { open_until } => {
                assert!(open_until > Utc::now());
            }
            other => panic!("Expected CircuitOpen, got {other:?}"),
        }
    }

    #[test]
    fn test_half_open_admits_single_probe() {
        let b = breaker(1, 10);
        b.record_failure();
        std::thread::sleep(Duration::from_millis(20));

        assert!(b.try_acquire().is_ok());
        assert_eq!(b.state(), BreakerState::HalfOpen);
        // Second caller is rejected while the probe is in flight
        assert!(b.try_acquire().is_err());
    }

    #[test]
    fn test_successful_probe_closes_and_resets_backoff() {
        let b = breaker(1, 10);
        b.record_failure();
        std::thread::sleep(Duration::from_millis(20));
        b.try_acquire().unwrap();
        b.record_success();

        assert_eq!(b.state(), BreakerState::Closed);
        assert_eq!(b.snapshot().backoff_multiplier, 1);
        assert_eq!(b.snapshot().consecutive_failures, 0);
    }

    #[test]
    fn test_failed_probe_doubles_backoff_up_to_cap() {
        let b = breaker(1, 10);
        b.record_failure();
        assert_eq!(b.snapshot().backoff_multiplier, 1);

        for expected in [2, 4, 8, 8] {
            std::thread::sleep(Duration::from_millis(
                12 * u64::from(b.snapshot().backoff_multiplier),
            ));
            b.try_acquire().unwrap();
            b.record_failure();
            assert_eq!(b.state(), BreakerState::Open);
            assert_eq!(b.snapshot().backoff_multiplier, expected);
        }
    }

    #[test]
    fn test_snapshot_round_trip() {
        let b = breaker(2, 10_000);
        b.record_failure();
        b.record_failure();
        let snap = b.snapshot();
        assert_eq!(snap.state, BreakerState::Open);

        let restored = CircuitBreaker::from_snapshot(2, Duration::from_secs(10), &snap);
        assert_eq!(restored.state(), BreakerState::Open);
        assert!(restored.try_acquire().is_err());
    }

    #[test]
    fn test_counters_accurate_under_concurrent_failures() {
        use std::sync::Arc;
        let b = Arc::new(breaker(100, 50));
        let mut handles = Vec::new();
        for _ in 0..10 {
            let b = Arc::clone(&b);
            handles.push(std::thread::spawn(move || {
                for _ in 0..5 {
                    b.record_failure();
                }
            }));
        }
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(b.snapshot().consecutive_failures, 50);
        assert_eq!(b.state(), BreakerState::Closed);
    }
}
