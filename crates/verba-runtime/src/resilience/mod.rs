//! Resilience patterns for verba-runtime.
//!
//! Both external services sit behind a circuit breaker. When a service keeps
//! failing, calls skip it and go straight to the deterministic path.

mod circuit_breaker;

pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState, ServiceKind};
