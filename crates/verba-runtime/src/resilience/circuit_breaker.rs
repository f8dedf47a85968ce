//! Circuit breaker for the external services.
//!
//! When the intent service or the reasoning service fails repeatedly, its
//! circuit opens and subsequent calls fall back to the deterministic path
//! without touching the network.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::time::{Duration, Instant};

/// An external service with its own circuit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceKind {
    IntentParsing,
    Reasoning,
}

impl fmt::Display for ServiceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServiceKind::IntentParsing => f.write_str("intent_parsing"),
            ServiceKind::Reasoning => f.write_str("reasoning"),
        }
    }
}

/// Circuit breaker configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures before opening
    pub failure_threshold: u32,

    /// Time before a trial call is let through, e.g. "30s"
    #[serde(with = "crate::config::humantime_duration")]
    pub recovery_timeout: Duration,

    /// Trial successes needed to close again
    pub success_threshold: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 3,
            recovery_timeout: Duration::from_secs(30),
            success_threshold: 2,
        }
    }
}

/// State of a circuit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CircuitState {
    Closed { failures: u32 },

    /// All calls bypass the service.
    Open { opened_at: Instant },

    /// Trial calls are allowed.
    HalfOpen { successes: u32 },
}

/// Per-service circuit breaker.
pub struct CircuitBreaker {
    states: RwLock<HashMap<ServiceKind, CircuitState>>,
    config: CircuitBreakerConfig,
}

impl CircuitBreaker {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            states: RwLock::new(HashMap::new()),
            config,
        }
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// True when calls to `service` should skip straight to the fallback.
    ///
    /// An open circuit whose recovery timeout has elapsed moves to half-open
    /// here and lets the call through.
    pub fn is_open(&self, service: ServiceKind) -> bool {
        let states = self.states.read();
        match states.get(&service) {
            Some(CircuitState::Open { opened_at }) => {
                if opened_at.elapsed() >= self.config.recovery_timeout {
                    drop(states);
                    self.transition_to_half_open(service);
                    false
                } else {
                    true
                }
            }
            _ => false,
        }
    }

    pub fn record_success(&self, service: ServiceKind) {
        let mut states = self.states.write();
        match states.get(&service).cloned() {
            Some(CircuitState::HalfOpen { successes }) => {
                if successes + 1 >= self.config.success_threshold {
                    states.insert(service, CircuitState::Closed { failures: 0 });
                    tracing::info!(%service, "Circuit closed after successful recovery");
                } else {
                    states.insert(
                        service,
                        CircuitState::HalfOpen {
                            successes: successes + 1,
                        },
                    );
                }
            }
            Some(CircuitState::Closed { .. }) => {
                states.insert(service, CircuitState::Closed { failures: 0 });
            }
            _ => {}
        }
    }

    pub fn record_failure(&self, service: ServiceKind) {
        let mut states = self.states.write();
        let failures = match states.get(&service).cloned() {
            Some(CircuitState::Closed { failures }) => failures + 1,
            None => 1,
            Some(CircuitState::HalfOpen { .. }) => {
                states.insert(
                    service,
                    CircuitState::Open {
                        opened_at: Instant::now(),
                    },
                );
                tracing::info!(%service, "Circuit reopened after failed recovery attempt");
                return;
            }
            Some(CircuitState::Open { .. }) => return,
        };

        if failures >= self.config.failure_threshold {
            states.insert(
                service,
                CircuitState::Open {
                    opened_at: Instant::now(),
                },
            );
            tracing::info!(%service, failures, "Circuit opened after repeated failures");
        } else {
            states.insert(service, CircuitState::Closed { failures });
        }
    }

    fn transition_to_half_open(&self, service: ServiceKind) {
        let mut states = self.states.write();
        if matches!(states.get(&service), Some(CircuitState::Open { .. })) {
            states.insert(service, CircuitState::HalfOpen { successes: 0 });
            tracing::info!(%service, "Circuit half-open, allowing trial call");
        }
    }

    pub fn state(&self, service: ServiceKind) -> CircuitState {
        self.states
            .read()
            .get(&service)
            .cloned()
            .unwrap_or(CircuitState::Closed { failures: 0 })
    }

    /// Close every circuit.
    pub fn reset(&self) {
        self.states.write().clear();
    }
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new(CircuitBreakerConfig::default())
    }
}

impl fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("config", &self.config)
            .field("states", &*self.states.read())
            .finish()
    }
}
