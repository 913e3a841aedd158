//! Process-wide store of breaker states, keyed by model id

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use log::{debug, info, warn};
use once_cell::sync::Lazy;
use tokio::time::Instant;

use super::breaker::{Admission, BreakerConfig, BreakerState, BreakerStatus};

/// Shared breaker bookkeeping.
///
/// Implementations must make each call atomic per model, so a failure
/// recorded by one request is visible to the next `is_usable` of another.
pub trait BreakerRegistry: Send + Sync {
    /// Configuration applied to every breaker in the registry
    fn config(&self) -> &BreakerConfig;

    /// Whether a call to the model could be admitted now
    fn is_usable(&self, model_id: &str) -> bool;

    /// Admit or reject a call, claiming the probe slot if one is due
    fn try_acquire(&self, model_id: &str) -> Admission;

    /// Record a successful call
    fn record_success(&self, model_id: &str);

    /// Record a failed call
    fn record_failure(&self, model_id: &str);

    /// Copy of the model's current state, if it has been used
    fn snapshot(&self, model_id: &str) -> Option<BreakerState>;

    /// Forget one model's history
    fn reset(&self, model_id: &str);

    /// Forget every model's history
    fn reset_all(&self);
}

/// In-memory registry with one lock per model
#[derive(Debug, Default)]
pub struct InMemoryBreakerRegistry {
    config: BreakerConfig,
    states: RwLock<HashMap<String, Arc<Mutex<BreakerState>>>>,
}

impl InMemoryBreakerRegistry {
    /// Create an empty registry
    pub fn new(config: BreakerConfig) -> Self {
        Self {
            config,
            states: RwLock::new(HashMap::new()),
        }
    }

    /// Get the model's state cell, creating it on first use
    fn entry(&self, model_id: &str) -> Arc<Mutex<BreakerState>> {
        if let Some(cell) = self
            .states
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(model_id)
        {
            return Arc::clone(cell);
        }

        let mut states = self.states.write().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(
            states
                .entry(model_id.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(BreakerState::new(model_id)))),
        )
    }

    fn with_state<T>(&self, model_id: &str, f: impl FnOnce(&mut BreakerState) -> T) -> T {
        let cell = self.entry(model_id);
        let mut state = cell.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut state)
    }
}

fn report_transition(model_id: &str, status: BreakerStatus, failures: u32) {
    match status {
        BreakerStatus::Open => {
            warn!(
                "Circuit breaker for model {} transitioning to OPEN after {} consecutive failures",
                model_id, failures
            );
            metrics::increment_counter!(
                "event_pipeline_breaker_opened_total",
                "model" => model_id.to_string()
            );
        }
        BreakerStatus::HalfOpen => {
            info!("Circuit breaker for model {} transitioning to HALF_OPEN", model_id);
            metrics::increment_counter!(
                "event_pipeline_breaker_half_open_total",
                "model" => model_id.to_string()
            );
        }
        BreakerStatus::Closed => {
            info!("Circuit breaker for model {} transitioning to CLOSED", model_id);
            metrics::increment_counter!(
                "event_pipeline_breaker_closed_total",
                "model" => model_id.to_string()
            );
        }
    }
}

impl BreakerRegistry for InMemoryBreakerRegistry {
    fn config(&self) -> &BreakerConfig {
        &self.config
    }

    fn is_usable(&self, model_id: &str) -> bool {
        let now = Instant::now();
        self.with_state(model_id, |state| state.is_usable(now, &self.config))
    }

    fn try_acquire(&self, model_id: &str) -> Admission {
        let now = Instant::now();
        self.with_state(model_id, |state| {
            let before = state.status;
            let admission = state.try_acquire(now, &self.config);
            if before == BreakerStatus::Open && state.status == BreakerStatus::HalfOpen {
                report_transition(model_id, BreakerStatus::HalfOpen, state.consecutive_failures);
            } else if admission == Admission::Probe {
                debug!("Re-issuing abandoned probe for model {}", model_id);
            }
            admission
        })
    }

    fn record_success(&self, model_id: &str) {
        self.with_state(model_id, |state| {
            if let Some(status) = state.on_success() {
                report_transition(model_id, status, state.consecutive_failures);
            }
        })
    }

    fn record_failure(&self, model_id: &str) {
        let now = Instant::now();
        self.with_state(model_id, |state| {
            match state.on_failure(now, &self.config) {
                Some(status) => report_transition(model_id, status, state.consecutive_failures),
                None => debug!(
                    "Model {} failure recorded ({} consecutive, breaker {})",
                    model_id, state.consecutive_failures, state.status
                ),
            }
        })
    }

    fn snapshot(&self, model_id: &str) -> Option<BreakerState> {
        self.states
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(model_id)
            .map(|cell| cell.lock().unwrap_or_else(PoisonError::into_inner).clone())
    }

    fn reset(&self, model_id: &str) {
        self.states
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(model_id);
    }

    fn reset_all(&self) {
        self.states
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

static SHARED_REGISTRY: Lazy<Arc<InMemoryBreakerRegistry>> =
    Lazy::new(|| Arc::new(InMemoryBreakerRegistry::new(BreakerConfig::default())));

/// Process-wide registry with default configuration
pub fn shared_registry() -> Arc<InMemoryBreakerRegistry> {
    Arc::clone(&SHARED_REGISTRY)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn registry() -> InMemoryBreakerRegistry {
        InMemoryBreakerRegistry::new(BreakerConfig {
            failure_threshold: 2,
            cooldown: Duration::from_secs(30),
        })
    }

    #[test]
    fn test_states_are_created_lazily() {
        let registry = registry();
        assert!(registry.snapshot("primary").is_none());
        assert!(registry.is_usable("primary"));
        assert!(registry.snapshot("primary").is_some());
    }

    #[test]
    fn test_models_are_independent() {
        let registry = registry();
        registry.record_failure("primary");
        registry.record_failure("primary");

        assert!(!registry.is_usable("primary"));
        assert!(registry.is_usable("secondary"));
    }

    #[test]
    fn test_reset_closes_breaker() {
        let registry = registry();
        registry.record_failure("primary");
        registry.record_failure("primary");
        registry.record_failure("secondary");
        registry.record_failure("secondary");

        registry.reset("primary");
        assert!(registry.is_usable("primary"));
        assert!(!registry.is_usable("secondary"));

        registry.reset_all();
        assert!(registry.is_usable("secondary"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_probe_handed_out_once_across_callers() {
        let registry = Arc::new(registry());
        registry.record_failure("primary");
        registry.record_failure("primary");
        tokio::time::advance(Duration::from_secs(30)).await;

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let registry = Arc::clone(&registry);
                tokio::spawn(async move { registry.try_acquire("primary") })
            })
            .collect();

        let mut probes = 0;
        for handle in handles {
            if handle.await.unwrap() == Admission::Probe {
                probes += 1;
            }
        }
        assert_eq!(probes, 1);
    }

    #[test]
    fn test_shared_registry_is_singleton() {
        let a = shared_registry();
        let b = shared_registry();
        assert!(Arc::ptr_eq(&a, &b));
    }
}
