//! Request, attempt and result types for one year's generation run

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use content_validator::{EventCandidate, ReasonCode, ValidationVerdict};

/// Default number of events a year needs
pub const DEFAULT_TARGET_EVENT_COUNT: usize = 6;

/// Default maximum share of a year's events for one domain
pub const DEFAULT_MAX_DOMAIN_SHARE: f64 = content_validator::DEFAULT_MAX_DOMAIN_SHARE;

/// Default orchestrator attempt budget per request
pub const DEFAULT_MAX_ATTEMPTS: usize = 6;

/// An upstream generative model and its place in the fallback order
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ModelIdentity {
    /// Model identifier sent to the service
    pub id: String,

    /// Fallback order, ascending is tried first
    pub priority: u32,
}

impl ModelIdentity {
    /// Create a model identity
    pub fn new(id: impl Into<String>, priority: u32) -> Self {
        Self {
            id: id.into(),
            priority,
        }
    }

    /// Sort a model list into fallback order. Ties keep their input order.
    pub fn in_priority_order(models: &[ModelIdentity]) -> Vec<ModelIdentity> {
        let mut sorted = models.to_vec();
        sorted.sort_by_key(|model| model.priority);
        sorted
    }
}

impl fmt::Display for ModelIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.id, self.priority)
    }
}

/// Classified outcome of one generation attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AttemptOutcome {
    /// The model returned a well-formed batch
    Success,
    /// Connection or server failure
    NetworkError,
    /// No response within the call timeout
    Timeout,
    /// The service asked us to back off
    RateLimit,
    /// The model answered but the payload has the wrong shape
    SchemaInvalid,
    /// Rejected locally by the model's circuit breaker
    CircuitOpen,
}

impl AttemptOutcome {
    /// Outcomes that send the orchestrator straight to the next model
    pub fn falls_through(&self) -> bool {
        matches!(self, Self::RateLimit | Self::CircuitOpen)
    }
}

impl fmt::Display for AttemptOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Success => "SUCCESS",
            Self::NetworkError => "NETWORK_ERROR",
            Self::Timeout => "TIMEOUT",
            Self::RateLimit => "RATE_LIMIT",
            Self::SchemaInvalid => "SCHEMA_INVALID",
            Self::CircuitOpen => "CIRCUIT_OPEN",
        };
        write!(f, "{}", label)
    }
}

/// One entry of a request's append-only attempt log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationAttempt {
    /// Model the attempt was made against
    pub model_id: String,

    /// Wall-clock start of the attempt
    pub started_at: DateTime<Utc>,

    /// Classified result
    pub outcome: AttemptOutcome,

    /// Events the model returned
    pub raw_event_count: usize,

    /// Events that passed validation and were new to the request
    pub valid_event_count: usize,

    /// Time spent in the client call, including retries
    pub elapsed_ms: u64,

    /// Sanitised error text for failed attempts
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// Parameters for one year's generation run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationRequest {
    /// Year to generate for (negative for BC)
    pub year: i32,

    /// Number of events the year needs
    pub target_event_count: usize,

    /// Maximum share of the final set for one domain
    pub max_domain_share: f64,

    /// Orchestrator attempt budget
    pub max_attempts: usize,
}

impl GenerationRequest {
    /// Create a request with default counts
    pub fn new(year: i32) -> Self {
        Self {
            year,
            target_event_count: DEFAULT_TARGET_EVENT_COUNT,
            max_domain_share: DEFAULT_MAX_DOMAIN_SHARE,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }
}

/// Terminal status of a generation run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GenerationStatus {
    /// Enough valid, diverse events were collected
    Success,
    /// Attempt or model budget ran out first
    Exhausted,
    /// Every model's breaker was open before any call could be made
    NoHealthyModel,
}

impl fmt::Display for GenerationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success => write!(f, "SUCCESS"),
            Self::Exhausted => write!(f, "EXHAUSTED"),
            Self::NoHealthyModel => write!(f, "NO_HEALTHY_MODEL"),
        }
    }
}

/// Final output of a generation run, handed to the persistence collaborator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationResult {
    /// Year the run was for
    pub year: i32,

    /// Accepted events after diversity truncation
    pub events: Vec<EventCandidate>,

    /// Every attempt in order
    pub attempts: Vec<GenerationAttempt>,

    /// Terminal status
    pub status: GenerationStatus,
}

impl GenerationResult {
    /// Whether the run produced a complete set
    pub fn is_success(&self) -> bool {
        self.status == GenerationStatus::Success
    }

    /// Number of attempts made against a model
    pub fn attempts_for(&self, model_id: &str) -> usize {
        self.attempts
            .iter()
            .filter(|attempt| attempt.model_id == model_id)
            .count()
    }

    /// Operator-facing summary of why the run failed, `None` on success
    pub fn failure_reason(&self) -> Option<String> {
        match self.status {
            GenerationStatus::Success => None,
            GenerationStatus::NoHealthyModel => {
                Some("no model was available: every circuit breaker was open".to_string())
            }
            GenerationStatus::Exhausted => {
                let trail = self
                    .attempts
                    .iter()
                    .map(|attempt| format!("{}={}", attempt.model_id, attempt.outcome))
                    .collect::<Vec<_>>()
                    .join(", ");
                Some(format!(
                    "collected {} usable events after {} attempts [{}]",
                    self.events.len(),
                    self.attempts.len(),
                    trail
                ))
            }
        }
    }
}
