//! Per-source circuit breaker for adaptive source selection.
//!
//! Tracks consecutive failures per source adapter and temporarily skips
//! sources that fail repeatedly. After a cooldown period, a tripped source
//! enters a half-open state where a single probe request determines whether
//! to restore or re-trip the circuit.
//!
//! # State Machine
//!
//! ```text
//! ┌────────┐  N failures   ┌────────┐  cooldown   ┌──────────┐
//! │ Closed ├──────────────►│  Open  ├────────────►│ HalfOpen │
//! └───▲────┘               └────────┘             └────┬─────┘
//!     │                         ▲                      │
//!     │  success                │  failure              │
//!     └─────────────────────────┴──────────────────────┘
//! ```
//!
//! The breaker is opt-in: with the default configuration every source is
//! attempted on every search. When enabled, it is owned by a
//! [`crate::RecipeSearch`] instance, consulted before the fan-out and
//! updated after the join, never from inside a source task.

use std::collections::HashMap;
use std::time::Instant;

use serde::{Deserialize, Serialize};

/// Circuit breaker state for a single source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Source is healthy; all requests are allowed through.
    Closed,
    /// Source has failed too many times; requests are blocked until cooldown expires.
    Open,
    /// Cooldown has elapsed; one probe request is allowed to test recovery.
    HalfOpen,
}

/// Health tracking data for a single source.
#[derive(Debug, Clone)]
pub struct SourceHealth {
    /// Current circuit state.
    pub state: CircuitState,
    /// Number of consecutive failures since the last success.
    pub consecutive_failures: u32,
    /// When the last failure occurred (if any).
    pub last_failure_at: Option<Instant>,
}

impl Default for SourceHealth {
    fn default() -> Self {
        Self {
            state: CircuitState::Closed,
            consecutive_failures: 0,
            last_failure_at: None,
        }
    }
}

/// Configuration for circuit breaker behaviour.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    /// When `false`, every source is attempted on every search.
    pub enabled: bool,
    /// Number of consecutive failures before tripping the circuit to Open.
    pub failure_threshold: u32,
    /// Seconds to wait in Open state before transitioning to HalfOpen.
    pub cooldown_secs: u64,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            failure_threshold: 3,
            cooldown_secs: 60,
        }
    }
}

/// Per-source circuit breaker that tracks health and controls request flow.
#[derive(Debug)]
pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    sources: HashMap<String, SourceHealth>,
}

impl CircuitBreaker {
    /// Create a new circuit breaker with the given configuration.
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            sources: HashMap::new(),
        }
    }

    /// Record a successful request for the given source.
    ///
    /// Resets the consecutive failure count and transitions the source
    /// to [`CircuitState::Closed`] regardless of previous state.
    pub fn record_success(&mut self, source: &str) {
        let health = self.sources.entry(source.to_string()).or_default();
        health.state = CircuitState::Closed;
        health.consecutive_failures = 0;
    }

    /// Record a failed or timed-out request for the given source.
    ///
    /// Increments the consecutive failure count. If the count reaches
    /// the configured threshold, transitions to [`CircuitState::Open`].
    pub fn record_failure(&mut self, source: &str) {
        let health = self.sources.entry(source.to_string()).or_default();
        health.consecutive_failures += 1;
        health.last_failure_at = Some(Instant::now());

        if health.consecutive_failures >= self.config.failure_threshold {
            health.state = CircuitState::Open;
        }
    }

    /// Check whether a request to the given source should be attempted.
    ///
    /// - disabled breaker: always `true`
    /// - [`CircuitState::Closed`]: always `true`
    /// - [`CircuitState::Open`]: `true` only once the cooldown has elapsed
    ///   (transitions to [`CircuitState::HalfOpen`])
    /// - [`CircuitState::HalfOpen`]: `true` (one probe allowed)
    pub fn should_attempt(&mut self, source: &str) -> bool {
        if !self.config.enabled {
            return true;
        }
        let Some(health) = self.sources.get_mut(source) else {
            return true;
        };

        match health.state {
            CircuitState::Closed | CircuitState::HalfOpen => true,
            CircuitState::Open => {
                let cooldown_elapsed = health
                    .last_failure_at
                    .is_none_or(|t| t.elapsed().as_secs() >= self.config.cooldown_secs);

                if cooldown_elapsed {
                    health.state = CircuitState::HalfOpen;
                    true
                } else {
                    false
                }
            }
        }
    }

    /// Health report for every source seen so far, sorted by name.
    ///
    /// Returns `(source, state, consecutive_failures)` tuples.
    pub fn health_report(&self) -> Vec<(String, CircuitState, u32)> {
        let mut report: Vec<_> = self
            .sources
            .iter()
            .map(|(name, health)| (name.clone(), health.state, health.consecutive_failures))
            .collect();
        report.sort_by(|a, b| a.0.cmp(&b.0));
        report
    }
}
