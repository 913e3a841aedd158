//! Error handling for the generation pipeline
//!
//! Every failure of a model call is classified into exactly one
//! [`AttemptOutcome`] so the orchestrator can decide what to do next:
//! - Network and timeout failures are retried within a model's budget
//! - Rate limits fall through to the next model
//! - Schema failures mean the model answered with the wrong shape
//! - Circuit-open errors are raised locally without any network call

use std::collections::HashMap;
use std::fmt;
use thiserror::Error;

use crate::types::AttemptOutcome;

pub mod mapping;

/// Result type for pipeline operations
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Main error type for the pipeline
#[derive(Error, Debug)]
pub enum PipelineError {
    /// Network or connection errors
    #[error("Network error: {0}")]
    Network(String),

    /// The call did not complete within its timeout
    #[error("Timeout error: {0}")]
    Timeout(String),

    /// Rate limiting errors
    #[error("Rate limit exceeded: {0}")]
    RateLimit(String),

    /// The response did not match the expected structure
    #[error("Schema invalid: {0}")]
    SchemaInvalid(String),

    /// The model's circuit breaker rejected the call
    #[error("Circuit open: {0}")]
    CircuitOpen(String),

    /// Credentials were missing or refused
    #[error("Authentication error: {0}")]
    Authentication(String),

    /// The service refused the request as malformed
    #[error("Request rejected: {0}")]
    Rejected(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Year pool persistence errors
    #[error("Storage error: {0}")]
    Storage(String),

    /// Errors with additional context
    #[error("{inner}")]
    WithContext {
        inner: Box<PipelineError>,
        context: ErrorContext,
    },
}

impl PipelineError {
    /// Create a network error
    pub fn network(message: impl Into<String>) -> Self {
        PipelineError::Network(message.into())
    }

    /// Create a timeout error
    pub fn timeout(message: impl Into<String>) -> Self {
        PipelineError::Timeout(message.into())
    }

    /// Create a rate limit error
    pub fn rate_limit(message: impl Into<String>) -> Self {
        PipelineError::RateLimit(message.into())
    }

    /// Create a schema error
    pub fn schema_invalid(message: impl Into<String>) -> Self {
        PipelineError::SchemaInvalid(message.into())
    }

    /// Create a circuit-open error
    pub fn circuit_open(message: impl Into<String>) -> Self {
        PipelineError::CircuitOpen(message.into())
    }

    /// Create an authentication error
    pub fn authentication(message: impl Into<String>) -> Self {
        PipelineError::Authentication(message.into())
    }

    /// Create a rejected-request error
    pub fn rejected(message: impl Into<String>) -> Self {
        PipelineError::Rejected(message.into())
    }

    /// Create a configuration error
    pub fn configuration(message: impl Into<String>) -> Self {
        PipelineError::Configuration(message.into())
    }

    /// Create a storage error
    pub fn storage(message: impl Into<String>) -> Self {
        PipelineError::Storage(message.into())
    }

    /// Add context to an existing error
    pub fn with_context(self, context: ErrorContext) -> Self {
        PipelineError::WithContext {
            inner: Box::new(self),
            context,
        }
    }

    /// Add a single context key/value to an existing error
    pub fn with_context_value(self, key: impl Into<String>, value: impl fmt::Display) -> Self {
        let mut context = ErrorContext::new();
        context.add(key, value);
        self.with_context(context)
    }

    /// The error with all context layers removed
    pub fn root(&self) -> &PipelineError {
        match self {
            PipelineError::WithContext { inner, .. } => inner.root(),
            other => other,
        }
    }

    /// Get the model id if available
    pub fn model_id(&self) -> Option<&str> {
        match self {
            PipelineError::WithContext { context, inner } => {
                context.model_id.as_deref().or_else(|| inner.model_id())
            }
            _ => None,
        }
    }

    /// Get the HTTP status code if available
    pub fn status_code(&self) -> Option<u16> {
        match self {
            PipelineError::WithContext { context, inner } => {
                context.status_code.or_else(|| inner.status_code())
            }
            _ => None,
        }
    }

    /// Check if the same model may be called again for this request
    pub fn is_retryable(&self) -> bool {
        matches!(self.root(), PipelineError::Network(_) | PipelineError::Timeout(_))
    }

    /// Classify this error as an attempt outcome.
    ///
    /// Failures outside the call taxonomy (credentials, malformed requests,
    /// local configuration or storage) count as network errors.
    pub fn outcome(&self) -> AttemptOutcome {
        match self.root() {
            PipelineError::Timeout(_) => AttemptOutcome::Timeout,
            PipelineError::RateLimit(_) => AttemptOutcome::RateLimit,
            PipelineError::SchemaInvalid(_) => AttemptOutcome::SchemaInvalid,
            PipelineError::CircuitOpen(_) => AttemptOutcome::CircuitOpen,
            _ => AttemptOutcome::NetworkError,
        }
    }
}

/// Error context information
#[derive(Debug, Clone)]
pub struct ErrorContext {
    /// Model the call was made against
    pub model_id: Option<String>,

    /// When the error was observed
    pub timestamp: Option<chrono::DateTime<chrono::Utc>>,

    /// HTTP status code if applicable
    pub status_code: Option<u16>,

    /// Endpoint that was called
    pub endpoint: Option<String>,

    /// Additional context data
    pub data: HashMap<String, String>,
}

impl Default for ErrorContext {
    fn default() -> Self {
        Self {
            model_id: None,
            timestamp: Some(chrono::Utc::now()),
            status_code: None,
            endpoint: None,
            data: HashMap::new(),
        }
    }
}

impl ErrorContext {
    /// Create a new error context
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a new error context for a specific model
    pub fn for_model(model_id: impl Into<String>) -> Self {
        Self {
            model_id: Some(model_id.into()),
            ..Self::default()
        }
    }

    /// Add an HTTP status code
    pub fn status_code(mut self, code: u16) -> Self {
        self.status_code = Some(code);
        self
    }

    /// Add an endpoint
    pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    /// Add a context value
    pub fn add<K, V>(&mut self, key: K, value: V)
    where
        K: Into<String>,
        V: fmt::Display,
    {
        self.data.insert(key.into(), value.to_string());
    }

    /// Add a context value and return self (builder pattern)
    pub fn with<K, V>(mut self, key: K, value: V) -> Self
    where
        K: Into<String>,
        V: fmt::Display,
    {
        self.add(key, value);
        self
    }
}

/// Convert reqwest errors to PipelineError
impl From<reqwest::Error> for PipelineError {
    fn from(err: reqwest::Error) -> Self {
        let error = if err.is_timeout() {
            PipelineError::timeout(format!("Request timed out: {}", err))
        } else if err.is_connect() {
            PipelineError::network(format!("Connection error: {}", err))
        } else if err.is_decode() {
            PipelineError::schema_invalid(format!("Response decode error: {}", err))
        } else if err.is_builder() {
            PipelineError::configuration(format!("Invalid request: {}", err))
        } else {
            PipelineError::network(format!("HTTP client error: {}", err))
        };

        match err.status() {
            Some(status) => error.with_context(ErrorContext::new().status_code(status.as_u16())),
            None => error,
        }
    }
}

/// Convert serde_json errors to PipelineError
impl From<serde_json::Error> for PipelineError {
    fn from(err: serde_json::Error) -> Self {
        PipelineError::schema_invalid(format!("JSON error: {}", err))
    }
}

/// Convert filesystem errors to PipelineError
impl From<std::io::Error> for PipelineError {
    fn from(err: std::io::Error) -> Self {
        PipelineError::storage(format!("I/O error: {}", err))
    }
}
