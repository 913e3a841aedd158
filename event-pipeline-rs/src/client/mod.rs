//! Fault-tolerant wrapper around a generative model
//!
//! [`ResilientModelClient`] makes one structured-generation call against one
//! model. It consults the model's circuit breaker, applies a hard timeout,
//! validates the response shape, and retries transient failures with
//! jittered exponential backoff. Choosing between models is the
//! orchestrator's job.

mod schema;

pub use schema::{EventBatch, GeneratedEvent, ResponseSchema};

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use log::{debug, warn};
use serde_json::Value;

use crate::error::{ErrorContext, PipelineError, Result};
use crate::prompt::Prompt;
use crate::resilience::{Admission, BreakerRegistry, RetryPolicy};
use crate::types::ModelIdentity;
use crate::util::sanitize_for_logging;

/// Default hard timeout around one model call
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(45);

/// Decoded output of one model call, before schema validation
#[derive(Debug, Clone, PartialEq)]
pub struct RawResponse {
    /// Structured payload produced by the model
    pub payload: Value,

    /// Usage block from the service envelope, if any
    pub usage: Option<Value>,
}

impl RawResponse {
    /// Wrap a payload with no usage information
    pub fn new(payload: Value) -> Self {
        Self {
            payload,
            usage: None,
        }
    }
}

/// Lower-level collaborator that performs the actual service call.
///
/// Implementations classify their own failures into [`PipelineError`].
#[async_trait]
pub trait ModelTransport: Send + Sync {
    /// Send the prompt to the model and return its decoded output
    async fn call(&self, model: &ModelIdentity, prompt: &Prompt) -> Result<RawResponse>;
}

/// Model client with circuit breaking, timeout and retry
pub struct ResilientModelClient {
    transport: Arc<dyn ModelTransport>,
    registry: Arc<dyn BreakerRegistry>,
    retry: RetryPolicy,
    call_timeout: Duration,
}

impl ResilientModelClient {
    /// Create a client with the default retry policy and timeout
    pub fn new(transport: Arc<dyn ModelTransport>, registry: Arc<dyn BreakerRegistry>) -> Self {
        Self {
            transport,
            registry,
            retry: RetryPolicy::default(),
            call_timeout: DEFAULT_CALL_TIMEOUT,
        }
    }

    /// Replace the retry policy
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Replace the per-call timeout
    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    /// Breaker registry shared with other clients
    pub fn registry(&self) -> &Arc<dyn BreakerRegistry> {
        &self.registry
    }

    /// Retry policy in effect
    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Whether the model's breaker would admit a call right now
    pub fn is_usable(&self, model: &ModelIdentity) -> bool {
        self.registry.is_usable(&model.id)
    }

    /// Generate one batch from `model`.
    ///
    /// Returns `CircuitOpen` without any network call when the breaker rejects
    /// the first try. Network errors and timeouts are retried up to the retry
    /// policy's budget; every other failure is returned at once.
    pub async fn generate(
        &self,
        model: &ModelIdentity,
        prompt: &Prompt,
        schema: &ResponseSchema,
    ) -> Result<EventBatch> {
        let tries = self.retry.attempts();
        let mut last_error: Option<PipelineError> = None;

        for attempt in 0..tries {
            if let Admission::Rejected { retry_in } = self.registry.try_acquire(&model.id) {
                debug!(
                    "Breaker for model {} rejected call, next probe in {:?}",
                    model.id, retry_in
                );
                return Err(last_error.unwrap_or_else(|| {
                    PipelineError::circuit_open(format!(
                        "model {} is unavailable for another {}ms",
                        model.id,
                        retry_in.as_millis()
                    ))
                    .with_context(ErrorContext::for_model(&model.id))
                }));
            }

            match self.call_once(model, prompt, schema).await {
                Ok(batch) => {
                    self.registry.record_success(&model.id);
                    debug!(
                        "Model {} returned {} events on try {}",
                        model.id,
                        batch.events.len(),
                        attempt + 1
                    );
                    return Ok(batch);
                }
                Err(err) => {
                    self.registry.record_failure(&model.id);
                    let err = err.with_context(ErrorContext::for_model(&model.id).with("try", attempt + 1));

                    if !err.is_retryable() || attempt + 1 >= tries {
                        return Err(err);
                    }

                    let delay = self.retry.delay_for(attempt);
                    warn!(
                        "Model {} failed with retryable error, retrying in {:?} (try {}/{}): {}",
                        model.id,
                        delay,
                        attempt + 1,
                        tries,
                        sanitize_for_logging(&err.to_string())
                    );
                    tokio::time::sleep(delay).await;
                    last_error = Some(err);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| {
            PipelineError::network(format!("model {} made no attempt", model.id))
        }))
    }

    async fn call_once(
        &self,
        model: &ModelIdentity,
        prompt: &Prompt,
        schema: &ResponseSchema,
    ) -> Result<EventBatch> {
        let raw = match tokio::time::timeout(self.call_timeout, self.transport.call(model, prompt)).await {
            Ok(result) => result?,
            Err(_) => {
                return Err(PipelineError::timeout(format!(
                    "no response within {}ms",
                    self.call_timeout.as_millis()
                )))
            }
        };
        schema.parse(&raw.payload, raw.usage.as_ref())
    }
}
