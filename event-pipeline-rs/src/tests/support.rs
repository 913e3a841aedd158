//! Test doubles shared by the scenario tests

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::client::{ModelTransport, RawResponse, ResilientModelClient};
use crate::error::{PipelineError, Result};
use crate::prompt::Prompt;
use crate::resilience::{
    Admission, BreakerConfig, BreakerRegistry, BreakerState, InMemoryBreakerRegistry, RetryPolicy,
};
use crate::types::ModelIdentity;

/// One scripted reaction of a model
#[derive(Debug, Clone)]
pub enum Step {
    /// Reply with this payload
    Reply(Value),
    /// Connection failure
    Network,
    /// Service asks us to back off
    RateLimit,
    /// Reply that is JSON but the wrong shape
    BadShape,
    /// Never answer
    Hang,
}

/// Transport that replays a per-model script and counts calls.
/// A model with an exhausted script fails with a network error.
#[derive(Default)]
pub struct ScriptedTransport {
    scripts: Mutex<HashMap<String, VecDeque<Step>>>,
    calls: Mutex<HashMap<String, usize>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script(self, model: &str, steps: Vec<Step>) -> Self {
        self.scripts
            .lock()
            .unwrap()
            .insert(model.to_string(), steps.into_iter().collect());
        self
    }

    pub fn calls(&self, model: &str) -> usize {
        self.calls.lock().unwrap().get(model).copied().unwrap_or(0)
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().values().sum()
    }
}

#[async_trait]
impl ModelTransport for ScriptedTransport {
    async fn call(&self, model: &ModelIdentity, _prompt: &Prompt) -> Result<RawResponse> {
        *self.calls.lock().unwrap().entry(model.id.clone()).or_insert(0) += 1;
        let step = self
            .scripts
            .lock()
            .unwrap()
            .get_mut(&model.id)
            .and_then(VecDeque::pop_front);

        match step {
            Some(Step::Reply(payload)) => Ok(RawResponse::new(payload)),
            Some(Step::Network) | None => Err(PipelineError::network("connection reset")),
            Some(Step::RateLimit) => Err(PipelineError::rate_limit("slow down")),
            Some(Step::BadShape) => Ok(RawResponse::new(json!({"items": "nothing"}))),
            Some(Step::Hang) => {
                std::future::pending::<()>().await;
                Err(PipelineError::network("unreachable"))
            }
        }
    }
}

/// Registry that reports one model as usable but rejects every call to it,
/// as happens when another request trips the breaker in between.
pub struct RejectingRegistry {
    inner: InMemoryBreakerRegistry,
    rejected: String,
}

impl RejectingRegistry {
    pub fn new(rejected: &str) -> Self {
        Self {
            inner: InMemoryBreakerRegistry::new(BreakerConfig::default()),
            rejected: rejected.to_string(),
        }
    }
}

impl BreakerRegistry for RejectingRegistry {
    fn config(&self) -> &BreakerConfig {
        self.inner.config()
    }

    fn is_usable(&self, model_id: &str) -> bool {
        model_id == self.rejected || self.inner.is_usable(model_id)
    }

    fn try_acquire(&self, model_id: &str) -> Admission {
        if model_id == self.rejected {
            return Admission::Rejected {
                retry_in: Duration::from_secs(30),
            };
        }
        self.inner.try_acquire(model_id)
    }

    fn record_success(&self, model_id: &str) {
        self.inner.record_success(model_id)
    }

    fn record_failure(&self, model_id: &str) {
        self.inner.record_failure(model_id)
    }

    fn snapshot(&self, model_id: &str) -> Option<BreakerState> {
        self.inner.snapshot(model_id)
    }

    fn reset(&self, model_id: &str) {
        self.inner.reset(model_id)
    }

    fn reset_all(&self) {
        self.inner.reset_all()
    }
}

/// `{"events": [...]}` payload from (text, domain) pairs
pub fn events_payload(events: &[(&str, &str)]) -> Value {
    json!({
        "events": events
            .iter()
            .map(|(text, domain)| json!({"text": text, "domain": domain}))
            .collect::<Vec<_>>()
    })
}

/// Six valid hints for 1969, no domain above three
pub fn six_valid_events() -> Value {
    events_payload(&[
        ("Apollo astronauts land on the Moon with Armstrong and Aldrin", "science"),
        ("Woodstock festival draws huge crowds to Bethel", "culture"),
        ("Richard Nixon is inaugurated as President", "politics"),
        ("The Concorde makes its first test flight in France", "technology"),
        ("Yasser Arafat becomes chairman of the PLO", "politics"),
        ("The Miracle Mets win the World Series", "sports"),
    ])
}

/// Four politics hints and two others
pub fn politics_heavy_events() -> Vec<(&'static str, &'static str)> {
    vec![
        ("Richard Nixon is inaugurated as President", "politics"),
        ("Yasser Arafat becomes chairman of the PLO", "politics"),
        ("Golda Meir becomes Prime Minister of Israel", "politics"),
        ("Charles de Gaulle resigns as President of France", "politics"),
        ("Apollo astronauts land on the Moon with Armstrong and Aldrin", "science"),
        ("Woodstock festival draws huge crowds to Bethel", "culture"),
    ]
}

pub fn model_a() -> ModelIdentity {
    ModelIdentity::new("model-a", 0)
}

pub fn model_b() -> ModelIdentity {
    ModelIdentity::new("model-b", 1)
}

pub fn registry(failure_threshold: u32) -> Arc<InMemoryBreakerRegistry> {
    Arc::new(InMemoryBreakerRegistry::new(BreakerConfig {
        failure_threshold,
        cooldown: Duration::from_secs(60),
    }))
}

pub fn client(
    transport: Arc<ScriptedTransport>,
    registry: Arc<InMemoryBreakerRegistry>,
    retry: RetryPolicy,
) -> ResilientModelClient {
    ResilientModelClient::new(transport, registry)
        .with_retry_policy(retry)
        .with_call_timeout(Duration::from_secs(5))
}

/// Retry policy with short, deterministic delays
pub fn fast_retry(max_attempts: u32) -> RetryPolicy {
    RetryPolicy {
        max_attempts,
        base_delay: Duration::from_millis(100),
        max_delay: Duration::from_secs(1),
        jitter: 0.0,
    }
}
