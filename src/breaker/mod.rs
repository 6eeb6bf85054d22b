//! Circuit breaker — fault isolation for downstream dependencies
//!
//! Wraps arbitrary fallible async operations. After enough consecutive
//! failures the circuit opens and calls fail fast without touching the
//! dependency; once the backoff window elapses, probes trickle through
//! until the circuit closes again. Reopening grows the backoff
//! exponentially with jitter so a fleet of processes does not hammer a
//! recovering dependency in lockstep.

use crate::config::CircuitBreakerConfig;
use crate::error::{LedgerError, Result};
use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

pub mod registry;

pub use registry::BreakerRegistry;

/// Consecutive half-open successes required to close the circuit
const SUCCESSES_TO_CLOSE: u32 = 3;

/// Backoff multiplier cap: `min(2^opens, 16)`
const MAX_BACKOFF_MULTIPLIER: u64 = 16;

/// Hard ceiling on the computed backoff
const BACKOFF_CAP: Duration = Duration::from_secs(300);

/// Jitter applied to the backoff, as a fraction of its value
const JITTER_FRACTION: f64 = 0.25;

/// Breaker lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

/// Cumulative counters, never reset by state transitions
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BreakerMetrics {
    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
    pub timeouts: u64,
    pub opens: u64,
    pub last_failure_at: Option<DateTime<Utc>>,
    pub last_success_at: Option<DateTime<Utc>>,
}

/// Point-in-time snapshot for dashboards and bulk status queries
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CircuitBreakerStatus {
    pub name: String,
    pub state: CircuitState,
    pub failure_count: u32,
    pub success_count: u32,
    pub next_attempt_at: Option<DateTime<Utc>>,
    pub metrics: BreakerMetrics,
}

struct BreakerState {
    state: CircuitState,
    failure_count: u32,
    success_count: u32,
    next_attempt_at: Option<Instant>,
    metrics: BreakerMetrics,
}

/// Stateful guard around one protected dependency
///
/// One instance per dependency, shared via [`BreakerRegistry`]. State is
/// mutated only by the `execute` path and the explicit `reset`.
pub struct CircuitBreaker {
    name: String,
    config: CircuitBreakerConfig,
    inner: Mutex<BreakerState>,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        Self {
            name: name.into(),
            config,
            inner: Mutex::new(BreakerState {
                state: CircuitState::Closed,
                failure_count: 0,
                success_count: 0,
                next_attempt_at: None,
                metrics: BreakerMetrics::default(),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current state, reporting `HalfOpen` once an open circuit's backoff
    /// has elapsed (the transition itself happens on the next `execute`)
    pub async fn state(&self) -> CircuitState {
        let inner = self.inner.lock().await;
        effective_state(&inner)
    }

    /// Execute `op` through the breaker, racing it against the configured
    /// timeout
    ///
    /// Fails fast with [`LedgerError::CircuitOpen`] while the circuit is
    /// open; the operation is not invoked. A timeout counts as a failure
    /// and is tracked separately in the metrics.
    pub async fn execute<T, F, Fut>(&self, op: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        {
            let mut inner = self.inner.lock().await;
            inner.metrics.total_requests += 1;

            if inner.state == CircuitState::Open {
                match inner.next_attempt_at {
                    Some(at) if Instant::now() < at => {
                        return Err(LedgerError::CircuitOpen {
                            breaker: self.name.clone(),
                        });
                    }
                    _ => {
                        inner.state = CircuitState::HalfOpen;
                        inner.success_count = 0;
                        tracing::info!(breaker = %self.name, "Circuit half-open, probing");
                    }
                }
            }
        }

        let outcome =
            tokio::time::timeout(Duration::from_millis(self.config.timeout_ms), op()).await;

        let mut inner = self.inner.lock().await;
        match outcome {
            Ok(Ok(value)) => {
                self.record_success(&mut inner);
                Ok(value)
            }
            Ok(Err(e)) => {
                self.record_failure(&mut inner, false);
                Err(e)
            }
            Err(_) => {
                self.record_failure(&mut inner, true);
                Err(LedgerError::Timeout(format!(
                    "'{}' exceeded {}ms",
                    self.name, self.config.timeout_ms
                )))
            }
        }
    }

    /// Force the circuit closed and clear counters — administrative
    /// escape hatch
    pub async fn reset(&self) {
        let mut inner = self.inner.lock().await;
        inner.state = CircuitState::Closed;
        inner.failure_count = 0;
        inner.success_count = 0;
        inner.next_attempt_at = None;
        tracing::info!(breaker = %self.name, "Circuit manually reset");
    }

    /// Snapshot of state, counters, and metrics
    pub async fn status(&self) -> CircuitBreakerStatus {
        let inner = self.inner.lock().await;
        CircuitBreakerStatus {
            name: self.name.clone(),
            state: effective_state(&inner),
            failure_count: inner.failure_count,
            success_count: inner.success_count,
            next_attempt_at: inner.next_attempt_at.map(instant_to_utc),
            metrics: inner.metrics.clone(),
        }
    }

    fn record_success(&self, inner: &mut BreakerState) {
        inner.metrics.successful_requests += 1;
        inner.metrics.last_success_at = Some(Utc::now());

        match inner.state {
            CircuitState::HalfOpen => {
                inner.success_count += 1;
                if inner.success_count >= SUCCESSES_TO_CLOSE {
                    inner.state = CircuitState::Closed;
                    inner.failure_count = 0;
                    inner.success_count = 0;
                    inner.next_attempt_at = None;
                    tracing::info!(breaker = %self.name, "Circuit closed");
                }
            }
            CircuitState::Closed => {
                inner.failure_count = 0;
            }
            // A concurrent failure reopened the circuit while this probe
            // was in flight; its result no longer drives the state.
            CircuitState::Open => {}
        }
    }

    fn record_failure(&self, inner: &mut BreakerState, timed_out: bool) {
        inner.metrics.failed_requests += 1;
        if timed_out {
            inner.metrics.timeouts += 1;
        }
        inner.metrics.last_failure_at = Some(Utc::now());

        match inner.state {
            CircuitState::HalfOpen => self.open(inner),
            CircuitState::Closed => {
                inner.failure_count += 1;
                if inner.failure_count >= self.config.failure_threshold {
                    self.open(inner);
                }
            }
            CircuitState::Open => {}
        }
    }

    fn open(&self, inner: &mut BreakerState) {
        inner.state = CircuitState::Open;
        inner.success_count = 0;
        inner.metrics.opens += 1;

        let backoff = compute_backoff(self.config.reset_timeout_ms, inner.metrics.opens);
        inner.next_attempt_at = Some(Instant::now() + backoff);

        tracing::warn!(
            breaker = %self.name,
            failures = inner.failure_count,
            opens = inner.metrics.opens,
            backoff_ms = backoff.as_millis() as u64,
            "Circuit opened"
        );
    }
}

fn effective_state(inner: &BreakerState) -> CircuitState {
    if inner.state == CircuitState::Open {
        if let Some(at) = inner.next_attempt_at {
            if Instant::now() >= at {
                return CircuitState::HalfOpen;
            }
        }
    }
    inner.state
}

/// `reset_timeout × min(2^opens, 16)`, ±25% jitter, capped at 5 minutes
fn compute_backoff(reset_timeout_ms: u64, opens: u64) -> Duration {
    let multiplier = (1u64 << opens.min(6)).min(MAX_BACKOFF_MULTIPLIER);
    let base_ms = reset_timeout_ms.saturating_mul(multiplier);

    let jitter = rand::thread_rng().gen_range(1.0 - JITTER_FRACTION..=1.0 + JITTER_FRACTION);
    let jittered = Duration::from_millis((base_ms as f64 * jitter) as u64);

    jittered.min(BACKOFF_CAP)
}

fn instant_to_utc(at: Instant) -> DateTime<Utc> {
    let now = Instant::now();
    if at >= now {
        Utc::now()
            + chrono::Duration::from_std(at - now).unwrap_or_else(|_| chrono::Duration::zero())
    } else {
        Utc::now()
            - chrono::Duration::from_std(now - at).unwrap_or_else(|_| chrono::Duration::zero())
    }
}
