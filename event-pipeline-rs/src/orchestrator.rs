//! Drives one year's generation from first attempt to terminal status
//!
//! Attempts are strictly sequential within a request. Models are tried in
//! priority order; a model leaves the rotation for the rest of the request
//! after two schema failures in a row, and rate-limited or circuit-open
//! models are passed over while any other model is still available. When
//! only those remain, the request backs off before calling them again.

use std::collections::{HashMap, HashSet};

use chrono::Utc;
use log::{debug, info, warn};

use content_validator::{
    check_domain_diversity, domain_cap, normalize_domain, normalize_text, ContentValidator,
};

use crate::client::{ResilientModelClient, ResponseSchema};
use crate::prompt::{build_prompt, PromptOptions};
use crate::types::{
    AttemptOutcome, EventCandidate, GenerationAttempt, GenerationRequest, GenerationResult,
    GenerationStatus, ModelIdentity,
};
use crate::util::{generate_run_id, measure_time_async, sanitize_for_logging, truncate_string};

/// Consecutive schema failures after which a model is skipped for the request
const SCHEMA_FAILURE_LIMIT: u32 = 2;

/// Longest error text kept in an attempt record
const MAX_DETAIL_LEN: usize = 240;

/// Per-call overrides for [`GenerationOrchestrator::generate_for_year`]
#[derive(Debug, Clone, Default)]
pub struct GenerateOptions {
    /// Events the year needs
    pub target_event_count: Option<usize>,

    /// Attempt budget
    pub max_attempts: Option<usize>,

    /// Model list to use instead of the configured one
    pub models: Option<Vec<ModelIdentity>>,

    /// Domain share limit
    pub max_domain_share: Option<f64>,
}

/// Orchestrates generation attempts for a year
pub struct GenerationOrchestrator {
    client: ResilientModelClient,
    models: Vec<ModelIdentity>,
    validator: ContentValidator,
    schema: ResponseSchema,
    prompt_options: PromptOptions,
    defaults: GenerationRequest,
}

/// Mutable bookkeeping for one request
#[derive(Default)]
struct RequestState {
    accepted: Vec<EventCandidate>,
    seen: HashSet<String>,
    attempts: Vec<GenerationAttempt>,
    terminal: HashSet<String>,
    benched: HashSet<String>,
    schema_streak: HashMap<String, u32>,
    bench_waits: u32,
}

/// Result of choosing the next model
enum Pick<'m> {
    Model(&'m ModelIdentity),
    /// Only models passed over for rate limiting or an open circuit remain
    BenchedOnly,
    Nothing,
}

impl GenerationOrchestrator {
    /// Create an orchestrator over a fixed model list
    pub fn new(client: ResilientModelClient, models: Vec<ModelIdentity>) -> Self {
        Self {
            client,
            models: ModelIdentity::in_priority_order(&models),
            validator: ContentValidator::default(),
            schema: ResponseSchema::default(),
            prompt_options: PromptOptions::default(),
            defaults: GenerationRequest::new(0),
        }
    }

    /// Use a validator with custom limits
    pub fn with_validator(mut self, validator: ContentValidator) -> Self {
        self.prompt_options.max_words = validator.config().max_words;
        self.defaults.max_domain_share = validator.config().max_domain_share;
        self.validator = validator;
        self
    }

    /// Use a custom response schema
    pub fn with_schema(mut self, schema: ResponseSchema) -> Self {
        self.schema = schema;
        self
    }

    /// Use custom prompt options
    pub fn with_prompt_options(mut self, options: PromptOptions) -> Self {
        self.prompt_options = options;
        self
    }

    /// Default target and attempt budget for `generate_for_year`
    pub fn with_defaults(mut self, target_event_count: usize, max_attempts: usize) -> Self {
        self.defaults.target_event_count = target_event_count;
        self.defaults.max_attempts = max_attempts;
        self
    }

    /// Models in fallback order
    pub fn models(&self) -> &[ModelIdentity] {
        &self.models
    }

    /// Underlying model client
    pub fn client(&self) -> &ResilientModelClient {
        &self.client
    }

    /// Generate events for `year`, applying any overrides
    pub async fn generate_for_year(&self, year: i32, options: Option<GenerateOptions>) -> GenerationResult {
        let options = options.unwrap_or_default();
        let request = GenerationRequest {
            year,
            target_event_count: options
                .target_event_count
                .unwrap_or(self.defaults.target_event_count),
            max_domain_share: options
                .max_domain_share
                .unwrap_or(self.defaults.max_domain_share),
            max_attempts: options.max_attempts.unwrap_or(self.defaults.max_attempts),
        };

        match options.models {
            Some(models) => {
                let models = ModelIdentity::in_priority_order(&models);
                self.run(&request, &models).await
            }
            None => self.run(&request, &self.models).await,
        }
    }

    /// Run a request against models already in priority order
    pub async fn run(&self, request: &GenerationRequest, models: &[ModelIdentity]) -> GenerationResult {
        let run_id = generate_run_id();
        let year = request.year;
        let target = request.target_event_count;
        info!(
            "[{}] Generating {} events for year {} ({} models, {} attempts max)",
            run_id,
            target,
            year,
            models.len(),
            request.max_attempts
        );

        if target == 0 {
            return GenerationResult {
                year,
                events: Vec::new(),
                attempts: Vec::new(),
                status: GenerationStatus::Success,
            };
        }

        let mut state = RequestState::default();
        let mut no_healthy_model = models.is_empty();

        while state.accepted.len() < target && state.attempts.len() < request.max_attempts {
            let model = match self.pick_model(models, &state) {
                Pick::Model(model) => model,
                Pick::BenchedOnly => {
                    let delay = self.client.retry_policy().delay_for(state.bench_waits);
                    info!(
                        "[{}] Only rate-limited or circuit-open models remain for year {}, waiting {:?}",
                        run_id, year, delay
                    );
                    tokio::time::sleep(delay).await;
                    state.bench_waits += 1;
                    state.benched.clear();
                    continue;
                }
                Pick::Nothing => {
                    if state.attempts.is_empty() {
                        no_healthy_model = true;
                    }
                    debug!("[{}] No usable model left for year {}", run_id, year);
                    break;
                }
            };

            self.attempt(&run_id, year, target, model, &mut state).await;
        }

        if no_healthy_model {
            warn!(
                "[{}] Year {}: no healthy model, every breaker is open",
                run_id, year
            );
            return GenerationResult {
                year,
                events: Vec::new(),
                attempts: state.attempts,
                status: GenerationStatus::NoHealthyModel,
            };
        }

        let events = select_diverse(&state.accepted, target, request.max_domain_share);
        let status = if events.len() >= target
            && check_domain_diversity(&events, request.max_domain_share)
        {
            GenerationStatus::Success
        } else {
            GenerationStatus::Exhausted
        };

        if status == GenerationStatus::Success {
            info!(
                "[{}] Year {}: {} with {} events after {} attempts",
                run_id,
                year,
                status,
                events.len(),
                state.attempts.len()
            );
        } else {
            warn!(
                "[{}] Year {}: {} with {} of {} events after {} attempts ({} accepted before diversity cap)",
                run_id,
                year,
                status,
                events.len(),
                target,
                state.attempts.len(),
                state.accepted.len()
            );
        }

        GenerationResult {
            year,
            events,
            attempts: state.attempts,
            status,
        }
    }

    /// First model in priority order that is still in rotation and usable.
    ///
    /// Benched models are only reconsidered after a backoff, once nothing
    /// else is usable.
    fn pick_model<'m>(&self, models: &'m [ModelIdentity], state: &RequestState) -> Pick<'m> {
        let usable = |allow_benched: bool| {
            models.iter().find(|model| {
                !state.terminal.contains(&model.id)
                    && (allow_benched || !state.benched.contains(&model.id))
                    && self.client.is_usable(model)
            })
        };

        match usable(false) {
            Some(model) => Pick::Model(model),
            None if !state.benched.is_empty() && usable(true).is_some() => Pick::BenchedOnly,
            None => Pick::Nothing,
        }
    }

    async fn attempt(
        &self,
        run_id: &str,
        year: i32,
        target: usize,
        model: &ModelIdentity,
        state: &mut RequestState,
    ) {
        let started_at = Utc::now();
        let needed = target.saturating_sub(state.accepted.len());
        let prompt = build_prompt(year, needed, &state.accepted, &self.prompt_options);

        let (result, elapsed) =
            measure_time_async(|| self.client.generate(model, &prompt, &self.schema)).await;
        let elapsed_ms = elapsed.as_millis() as u64;

        match result {
            Ok(batch) => {
                state.schema_streak.remove(&model.id);
                let raw_event_count = batch.events.len();
                let mut valid_event_count = 0;

                for generated in batch.events {
                    let candidate = EventCandidate::new(generated.text, generated.domain, year);
                    let verdict = self.validator.validate_candidate(&candidate);
                    if !verdict.passed {
                        debug!(
                            "[{}] Rejected '{}' ({:?})",
                            run_id,
                            truncate_string(&candidate.text, 80),
                            verdict.reasons
                        );
                        continue;
                    }
                    if state.seen.insert(normalize_text(&candidate.text)) {
                        state.accepted.push(candidate);
                        valid_event_count += 1;
                    }
                }

                info!(
                    "[{}] Attempt {} on {}: {} ({} raw, {} valid, {} total)",
                    run_id,
                    state.attempts.len() + 1,
                    model.id,
                    AttemptOutcome::Success,
                    raw_event_count,
                    valid_event_count,
                    state.accepted.len()
                );

                state.attempts.push(GenerationAttempt {
                    model_id: model.id.clone(),
                    started_at,
                    outcome: AttemptOutcome::Success,
                    raw_event_count,
                    valid_event_count,
                    elapsed_ms,
                    detail: None,
                });
            }
            Err(err) => {
                let outcome = err.outcome();
                let detail = truncate_string(&sanitize_for_logging(&err.to_string()), MAX_DETAIL_LEN);

                warn!(
                    "[{}] Attempt {} on {}: {} ({})",
                    run_id,
                    state.attempts.len() + 1,
                    model.id,
                    outcome,
                    detail
                );

                match outcome {
                    AttemptOutcome::SchemaInvalid => {
                        let streak = state.schema_streak.entry(model.id.clone()).or_insert(0);
                        *streak += 1;
                        if *streak >= SCHEMA_FAILURE_LIMIT {
                            info!(
                                "[{}] Dropping model {} for year {} after repeated schema failures",
                                run_id, model.id, year
                            );
                            state.terminal.insert(model.id.clone());
                        }
                    }
                    outcome if outcome.falls_through() => {
                        state.schema_streak.remove(&model.id);
                        state.benched.insert(model.id.clone());
                    }
                    _ => {
                        state.schema_streak.remove(&model.id);
                    }
                }

                state.attempts.push(GenerationAttempt {
                    model_id: model.id.clone(),
                    started_at,
                    outcome,
                    raw_event_count: 0,
                    valid_event_count: 0,
                    elapsed_ms,
                    detail: Some(detail),
                });
            }
        }
    }
}

/// Pick up to `target` events in acceptance order, skipping any event whose
/// domain already holds `ceil(max_share * target)` of the selection.
pub fn select_diverse(accepted: &[EventCandidate], target: usize, max_share: f64) -> Vec<EventCandidate> {
    let cap = domain_cap(max_share, target);
    let mut counts: HashMap<String, usize> = HashMap::new();
    let mut selected = Vec::with_capacity(target);

    for event in accepted {
        if selected.len() >= target {
            break;
        }
        let count = counts.entry(normalize_domain(&event.domain)).or_insert(0);
        if *count >= cap {
            continue;
        }
        *count += 1;
        selected.push(event.clone());
    }

    selected
}
