//! Resilience patterns for model calls
//!
//! - Circuit breaker per model, stored in a shared registry
//! - Retry with exponential backoff and jitter

mod breaker;
mod registry;
mod retry;

pub use breaker::{
    Admission, BreakerConfig, BreakerState, BreakerStatus, DEFAULT_COOLDOWN,
    DEFAULT_FAILURE_THRESHOLD,
};
pub use registry::{shared_registry, BreakerRegistry, InMemoryBreakerRegistry};
pub use retry::{backoff_delay, RetryPolicy};
