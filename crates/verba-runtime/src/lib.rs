//! # verba-runtime
//!
//! Async runtime for Verba cases.
//!
//! `verba-core` is fully deterministic and never touches the network. This
//! crate adds the two optional external services around it:
//!
//! - a live intent-parsing service, with the core fallback parser behind it
//! - an external reasoning service for adjudication, with the core rules
//!   engine behind it
//!
//! Neither service can fail a case. Timeouts, transport errors and invalid
//! output all resolve to the deterministic result, and a circuit breaker
//! stops calling a service that keeps failing.
//!
//! ## Example
//!
//! ```rust,ignore
//! use verba_runtime::{CaseSession, ProviderRegistry, RuntimeConfig};
//!
//! let config = RuntimeConfig::from_yaml_file("verba.yaml")?.with_env();
//! let session = CaseSession::from_config(&config, &ProviderRegistry::with_defaults());
//! let case = session.run(testimony, evidence).await?;
//! println!("{:?}", case.verdict());
//! ```

use thiserror::Error;
use verba_core::PipelineError;

pub mod adjudicator;
pub mod cache;
pub mod config;
pub mod evidence;
pub mod intent;
pub mod prompts;
pub mod providers;
pub mod resilience;
pub mod session;

pub use adjudicator::Adjudicator;
pub use cache::{ParseCache, ParseKey};
pub use config::{CacheConfig, ConfigError, IntentServiceConfig, ReasoningConfig, RuntimeConfig};
pub use intent::{IntentParser, IntentService, IntentServiceError, LiveIntentResponse};
pub use providers::{ProviderError, ProviderRegistry, ReasoningProvider};
pub use resilience::{CircuitBreaker, CircuitBreakerConfig, ServiceKind};
pub use session::CaseSession;

#[cfg(feature = "http")]
pub use intent::HttpIntentService;

/// Errors from the runtime.
#[derive(Error, Debug)]
pub enum RuntimeError {
    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error(transparent)]
    IntentService(#[from] IntentServiceError),

    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}
