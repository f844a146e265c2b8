// packages/runtime/src/runtime/circuit_breaker.rs
//! Per-key three-state failure gate
//!
//! ```text
//!            failures >= threshold
//!  Closed ──────────────────────────► Open
//!    ▲                                 │ now >= next_attempt
//!    │ success                         ▼ (checked in can_execute)
//!    └──────────────────────────── HalfOpen ──► Open on failure
//! ```
//!
//! One breaker is shared by the whole runtime and keyed by agent id, so one
//! agent's failures never gate another agent.

use crate::utils::timeout::deadline_after;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BreakerState {
    #[default]
    Closed,
    Open,
    HalfOpen,
}

/// Circuit breaker configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures that open the circuit
    pub failure_threshold: u32,

    /// Time the circuit stays open before a probe is allowed (milliseconds)
    pub recovery_timeout_ms: u64,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            recovery_timeout_ms: 60_000,
        }
    }
}

#[derive(Debug, Default)]
struct BreakerEntry {
    state: BreakerState,
    failure_count: u32,
    last_failure: Option<DateTime<Utc>>,
    next_attempt: Option<Instant>,
    next_attempt_at: Option<DateTime<Utc>>,
    probe_in_flight: bool,
}

/// Point-in-time view of one key
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BreakerSnapshot {
    pub state: BreakerState,
    pub failure_count: u32,
    pub last_failure: Option<DateTime<Utc>>,

    /// Only set while open
    pub next_attempt: Option<DateTime<Utc>>,
}

/// Keyed circuit breaker
pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    entries: DashMap<String, BreakerEntry>,
}

impl CircuitBreaker {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            entries: DashMap::new(),
        }
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    fn recovery_timeout(&self) -> Duration {
        Duration::from_millis(self.config.recovery_timeout_ms)
    }

    /// Admission check. An open circuit whose recovery timeout has elapsed
    /// flips to half-open and admits exactly one probe.
    pub fn can_execute(&self, key: &str) -> bool {
        let mut entry = self.entries.entry(key.to_string()).or_default();

        match entry.state {
            BreakerState::Closed => true,
            BreakerState::Open => {
                let ready = entry
                    .next_attempt
                    .map(|at| Instant::now() >= at)
                    .unwrap_or(true);
                if ready {
                    info!(key, "Circuit half-open, admitting probe");
                    entry.state = BreakerState::HalfOpen;
                    entry.next_attempt = None;
                    entry.next_attempt_at = None;
                    entry.probe_in_flight = true;
                }
                ready
            }
            BreakerState::HalfOpen => {
                if entry.probe_in_flight {
                    false
                } else {
                    entry.probe_in_flight = true;
                    true
                }
            }
        }
    }

    pub fn record_success(&self, key: &str) {
        let mut entry = self.entries.entry(key.to_string()).or_default();

        if entry.state != BreakerState::Closed {
            info!(key, "Circuit closed");
        }
        entry.state = BreakerState::Closed;
        entry.failure_count = 0;
        entry.next_attempt = None;
        entry.next_attempt_at = None;
        entry.probe_in_flight = false;
    }

    pub fn record_failure(&self, key: &str) {
        let recovery = self.recovery_timeout();
        let mut entry = self.entries.entry(key.to_string()).or_default();

        entry.failure_count = entry.failure_count.saturating_add(1);
        entry.last_failure = Some(Utc::now());
        entry.probe_in_flight = false;

        let reopen = entry.state == BreakerState::HalfOpen
            || entry.failure_count >= self.config.failure_threshold;

        if reopen {
            if entry.state != BreakerState::Open {
                warn!(
                    key,
                    failures = entry.failure_count,
                    "Circuit opened for {}ms",
                    self.config.recovery_timeout_ms
                );
                metrics::counter!("agent_runtime_circuit_opened_total").increment(1);
            }
            entry.state = BreakerState::Open;
            entry.next_attempt = Some(deadline_after(recovery));
            entry.next_attempt_at = chrono::Duration::from_std(recovery)
                .ok()
                .and_then(|d| Utc::now().checked_add_signed(d));
        }
    }

    /// Return an admitted half-open probe without an outcome (e.g. the task
    /// was cancelled), so the next caller may probe instead.
    pub fn release_probe(&self, key: &str) {
        if let Some(mut entry) = self.entries.get_mut(key) {
            if entry.state == BreakerState::HalfOpen {
                entry.probe_in_flight = false;
            }
        }
    }

    pub fn get_state(&self, key: &str) -> BreakerSnapshot {
        match self.entries.get(key) {
            Some(entry) => BreakerSnapshot {
                state: entry.state,
                failure_count: entry.failure_count,
                last_failure: entry.last_failure,
                next_attempt: entry.next_attempt_at,
            },
            None => BreakerSnapshot::default(),
        }
    }

    /// Forget everything about `key`
    pub fn reset(&self, key: &str) {
        if self.entries.remove(key).is_some() {
            info!(key, "Circuit reset");
        }
    }
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new(CircuitBreakerConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn breaker(threshold: u32, recovery_ms: u64) -> CircuitBreaker {
        CircuitBreaker::new(CircuitBreakerConfig {
            failure_threshold: threshold,
            recovery_timeout_ms: recovery_ms,
        })
    }

    #[test]
    fn test_unknown_key_is_closed() {
        let cb = CircuitBreaker::default();
        assert!(cb.can_execute("a"));
        assert_eq!(cb.get_state("nobody").state, BreakerState::Closed);
    }

    #[test]
    fn test_huge_recovery_timeout_stays_open() {
        let cb = breaker(1, u64::MAX);
        cb.record_failure("a");

        let snap = cb.get_state("a");
        assert_eq!(snap.state, BreakerState::Open);
        assert!(snap.next_attempt.is_none());
        assert!(!cb.can_execute("a"));
    }

    #[test]
    fn test_opens_at_threshold() {
        let cb = breaker(3, 60_000);

        cb.record_failure("a");
        cb.record_failure("a");
        assert!(cb.can_execute("a"));

        cb.record_failure("a");
        let snap = cb.get_state("a");
        assert_eq!(snap.state, BreakerState::Open);
        assert_eq!(snap.failure_count, 3);
        assert!(snap.next_attempt.is_some());
        assert!(!cb.can_execute("a"));
    }

    #[test]
    fn test_success_resets_consecutive_count() {
        let cb = breaker(3, 60_000);

        cb.record_failure("a");
        cb.record_failure("a");
        cb.record_success("a");
        cb.record_failure("a");
        cb.record_failure("a");

        assert_eq!(cb.get_state("a").state, BreakerState::Closed);
        assert_eq!(cb.get_state("a").failure_count, 2);
    }

    #[test]
    fn test_keys_are_isolated() {
        let cb = breaker(1, 60_000);
        cb.record_failure("a");

        assert!(!cb.can_execute("a"));
        assert!(cb.can_execute("b"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_half_open_admits_one_probe() {
        let cb = breaker(2, 1_000);
        cb.record_failure("a");
        cb.record_failure("a");
        assert!(!cb.can_execute("a"));

        tokio::time::advance(Duration::from_millis(999)).await;
        assert!(!cb.can_execute("a"));

        tokio::time::advance(Duration::from_millis(1)).await;
        assert!(cb.can_execute("a"));
        assert_eq!(cb.get_state("a").state, BreakerState::HalfOpen);
        assert!(cb.get_state("a").next_attempt.is_none());
        assert!(!cb.can_execute("a"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_half_open_success_closes() {
        let cb = breaker(1, 100);
        cb.record_failure("a");
        tokio::time::advance(Duration::from_millis(100)).await;

        assert!(cb.can_execute("a"));
        cb.record_success("a");

        let snap = cb.get_state("a");
        assert_eq!(snap.state, BreakerState::Closed);
        assert_eq!(snap.failure_count, 0);
        assert!(cb.can_execute("a"));
        assert!(cb.can_execute("a"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_half_open_failure_reopens() {
        let cb = breaker(2, 100);
        cb.record_failure("a");
        cb.record_failure("a");
        tokio::time::advance(Duration::from_millis(100)).await;

        assert!(cb.can_execute("a"));
        cb.record_failure("a");

        assert_eq!(cb.get_state("a").state, BreakerState::Open);
        assert_eq!(cb.get_state("a").failure_count, 3);
        assert!(!cb.can_execute("a"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_released_probe_can_be_retaken() {
        let cb = breaker(1, 100);
        cb.record_failure("a");
        tokio::time::advance(Duration::from_millis(100)).await;

        assert!(cb.can_execute("a"));
        assert!(!cb.can_execute("a"));
        cb.release_probe("a");
        assert!(cb.can_execute("a"));
        assert_eq!(cb.get_state("a").state, BreakerState::HalfOpen);
    }

    #[test]
    fn test_reset() {
        let cb = breaker(1, 60_000);
        cb.record_failure("a");
        cb.reset("a");

        assert!(cb.can_execute("a"));
        assert_eq!(cb.get_state("a").failure_count, 0);
    }

    #[test]
    fn test_state_serializes_kebab_case() {
        let value = serde_json::to_value(BreakerState::HalfOpen).unwrap();
        assert_eq!(value, "half-open");
    }

    proptest! {
        #[test]
        fn prop_open_iff_threshold_consecutive_failures(
            threshold in 1u32..10,
            outcomes in proptest::collection::vec(any::<bool>(), 0..40),
        ) {
            let cb = breaker(threshold, 60_000);
            let mut consecutive = 0u32;
            let mut opened = false;

            for success in outcomes {
                if opened {
                    break;
                }
                if success {
                    cb.record_success("k");
                    consecutive = 0;
                } else {
                    cb.record_failure("k");
                    consecutive += 1;
                }
                opened = consecutive >= threshold;
                prop_assert_eq!(cb.get_state("k").state == BreakerState::Open, opened);
                prop_assert_eq!(cb.can_execute("k"), !opened);
            }
        }
    }
}
