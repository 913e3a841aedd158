//! # Event Pipeline
//!
//! Resilient generation of historical event hints for the daily puzzle pool.
//!
//! This crate provides:
//!
//! - A model client with per-model circuit breakers, call timeouts and
//!   jittered exponential backoff
//! - An orchestrator that falls back across models in priority order and
//!   accumulates validated, de-duplicated, domain-diverse events for a year
//! - A work selector that picks the years most in need of content
//! - Year pool collaborators (in memory and a `puzzles.json` file)
//! - An OpenAI-compatible HTTP transport
//!
//! ## Architecture
//!
//! - `ModelTransport`: performs one service call and classifies its failures
//! - `ResilientModelClient`: breaker, timeout and retry around a transport
//! - `BreakerRegistry`: process-wide breaker state, injectable for tests
//! - `GenerationOrchestrator`: one year from first attempt to terminal status
//! - `YearPool` / `WorkSelector`: where content goes and which year is next
//! - `PipelineError`: classified errors, each mapping to one attempt outcome

pub mod client;
pub use client::{EventBatch, GeneratedEvent, ModelTransport, RawResponse, ResilientModelClient, ResponseSchema};

pub mod error;
pub use error::{ErrorContext, PipelineError, Result};

pub mod resilience;
pub use resilience::{
    shared_registry, BreakerConfig, BreakerRegistry, BreakerState, BreakerStatus,
    InMemoryBreakerRegistry, RetryPolicy,
};

pub mod config;
pub use config::{ConfigProvider, PipelineConfig, TransportConfig, Validate};

pub mod orchestrator;
pub use orchestrator::{GenerateOptions, GenerationOrchestrator};

pub mod pool;
pub use pool::{JsonYearPool, MemoryYearPool, PoolStats, YearInventory, YearPool};

pub mod prompt;
pub use prompt::{build_prompt, Prompt, PromptOptions};

pub mod selector;
pub use selector::{Selection, SelectedYear, WorkSelector};

pub mod services;
pub use services::openai;

pub mod types;
pub use types::{
    AttemptOutcome, EventCandidate, GenerationAttempt, GenerationRequest, GenerationResult,
    GenerationStatus, ModelIdentity, ReasonCode, ValidationVerdict,
};

mod util;

#[cfg(test)]
mod tests;

use std::sync::Arc;

use content_validator::ContentValidator;

/// Assemble an orchestrator from configuration, a transport and a registry
pub fn build_orchestrator(
    config: &PipelineConfig,
    transport: Arc<dyn ModelTransport>,
    registry: Arc<dyn BreakerRegistry>,
) -> GenerationOrchestrator {
    let client = ResilientModelClient::new(transport, registry)
        .with_retry_policy(config.retry_policy())
        .with_call_timeout(config.call_timeout);

    GenerationOrchestrator::new(client, config.models.clone())
        .with_validator(ContentValidator::new(config.validator_config()))
        .with_prompt_options(PromptOptions {
            max_words: config.max_words,
            over_request: config.over_request,
            ..PromptOptions::default()
        })
        .with_defaults(config.target_event_count, config.max_attempts)
}
