//! Configuration management for the pipeline
//!
//! Values come from a [`ConfigProvider`], normally the environment with the
//! `EVENTS` prefix (`EVENTS_OPENAI_API_KEY`, `EVENTS_MODELS`, ...).

use std::collections::HashMap;
use std::env;
use std::fmt::Debug;
use std::ops::RangeInclusive;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

use content_validator::{ValidatorConfig, DEFAULT_MAX_WORDS};

use crate::error::{PipelineError, Result};
use crate::resilience::{BreakerConfig, RetryPolicy, DEFAULT_COOLDOWN, DEFAULT_FAILURE_THRESHOLD};
use crate::types::{
    ModelIdentity, DEFAULT_MAX_ATTEMPTS, DEFAULT_MAX_DOMAIN_SHARE, DEFAULT_TARGET_EVENT_COUNT,
};
use crate::util::parse_duration;

/// Default OpenAI-compatible endpoint
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Default model priority list
pub const DEFAULT_MODELS: &str = "gpt-4o-mini,gpt-4o";

/// Base trait for configuration providers
pub trait ConfigProvider: Send + Sync {
    /// Get a string configuration value
    fn get_string(&self, key: &str) -> Result<String>;
}

/// Extension methods for configuration providers
pub trait ConfigProviderExt: ConfigProvider {
    /// Get an integer configuration value
    fn get_int(&self, key: &str) -> Result<i64> {
        let value = self.get_string(key)?;
        value.trim().parse::<i64>().map_err(|e| {
            PipelineError::configuration(format!("Invalid integer for key {}: {}", key, e))
        })
    }

    /// Get a float configuration value
    fn get_float(&self, key: &str) -> Result<f64> {
        let value = self.get_string(key)?;
        value.trim().parse::<f64>().map_err(|e| {
            PipelineError::configuration(format!("Invalid float for key {}: {}", key, e))
        })
    }

    /// Get a boolean configuration value
    fn get_bool(&self, key: &str) -> Result<bool> {
        let value = self.get_string(key)?;
        match value.trim().to_lowercase().as_str() {
            "true" | "yes" | "1" | "on" => Ok(true),
            "false" | "no" | "0" | "off" => Ok(false),
            _ => Err(PipelineError::configuration(format!(
                "Invalid boolean value for key {}: {}",
                key, value
            ))),
        }
    }

    /// Get a duration configuration value ("500ms", "30s", "5m", bare seconds)
    fn get_duration(&self, key: &str) -> Result<Duration> {
        let value = self.get_string(key)?;
        parse_duration(&value).ok_or_else(|| {
            PipelineError::configuration(format!("Invalid duration for key {}: {}", key, value))
        })
    }

    /// Get a string configuration value with a default
    fn get_string_or(&self, key: &str, default: &str) -> String {
        self.get_string(key).unwrap_or_else(|_| default.to_string())
    }

    /// Get an integer configuration value with a default
    fn get_int_or(&self, key: &str, default: i64) -> i64 {
        self.get_int(key).unwrap_or(default)
    }

    /// Get a float configuration value with a default
    fn get_float_or(&self, key: &str, default: f64) -> f64 {
        self.get_float(key).unwrap_or(default)
    }

    /// Get a boolean configuration value with a default
    fn get_bool_or(&self, key: &str, default: bool) -> bool {
        self.get_bool(key).unwrap_or(default)
    }

    /// Get a duration configuration value with a default
    fn get_duration_or(&self, key: &str, default: Duration) -> Duration {
        self.get_duration(key).unwrap_or(default)
    }
}

impl<T: ConfigProvider + ?Sized> ConfigProviderExt for T {}

/// Environment variable based configuration provider
#[derive(Debug, Clone, Default)]
pub struct EnvConfigProvider {
    /// Optional prefix for environment variables
    prefix: Option<String>,

    /// Optional namespace for variables
    namespace: Option<String>,
}

impl EnvConfigProvider {
    /// Create a new environment variable config provider
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a prefix for environment variables
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    /// Set a namespace for environment variables
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    /// Format a configuration key as an environment variable
    fn format_key(&self, key: &str) -> String {
        let mut env_key = String::new();

        if let Some(ref prefix) = self.prefix {
            env_key.push_str(prefix);
            env_key.push('_');
        }

        if let Some(ref namespace) = self.namespace {
            env_key.push_str(namespace);
            env_key.push('_');
        }

        env_key.push_str(&key.to_uppercase().replace(|c: char| !c.is_ascii_alphanumeric(), "_"));
        env_key
    }
}

impl ConfigProvider for EnvConfigProvider {
    fn get_string(&self, key: &str) -> Result<String> {
        let env_key = self.format_key(key);

        env::var(&env_key).map_err(|e| match e {
            env::VarError::NotPresent => {
                PipelineError::configuration(format!("Environment variable not set: {}", env_key))
            }
            env::VarError::NotUnicode(_) => PipelineError::configuration(format!(
                "Environment variable is not valid unicode: {}",
                env_key
            )),
        })
    }
}

/// In-memory config provider for testing or static configuration
#[derive(Debug, Clone, Default)]
pub struct MemoryConfigProvider {
    values: HashMap<String, String>,
}

impl MemoryConfigProvider {
    /// Create a new empty memory config provider
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a memory config provider with initial values
    pub fn with_values(values: HashMap<String, String>) -> Self {
        Self { values }
    }

    /// Set a configuration value
    pub fn set<K, V>(&mut self, key: K, value: V)
    where
        K: Into<String>,
        V: ToString,
    {
        self.values.insert(key.into(), value.to_string());
    }
}

impl ConfigProvider for MemoryConfigProvider {
    fn get_string(&self, key: &str) -> Result<String> {
        self.values
            .get(key)
            .cloned()
            .ok_or_else(|| PipelineError::configuration(format!("Configuration key not found: {}", key)))
    }
}

/// Global default configuration provider
pub static DEFAULT_PROVIDER: Lazy<Arc<EnvConfigProvider>> =
    Lazy::new(|| Arc::new(EnvConfigProvider::new().with_prefix("EVENTS")));

/// Configuration sections that can check themselves
pub trait Validate: Debug + Send + Sync {
    /// Validate this configuration
    fn validate(&self) -> Result<()>;

    /// Section name used in error messages
    fn section(&self) -> &str;

    /// Validate, naming the section in any configuration error
    fn check(&self) -> Result<()> {
        self.validate().map_err(|err| match err {
            PipelineError::Configuration(message) => {
                PipelineError::configuration(format!("{}: {}", self.section(), message))
            }
            other => other,
        })
    }
}

/// Settings for the HTTP transport to the generative service
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportConfig {
    /// API key
    pub api_key: String,

    /// Organization ID (optional)
    pub org_id: Option<String>,

    /// Base URL (can be changed for proxies and compatible services)
    pub base_url: String,

    /// HTTP-level request timeout
    pub request_timeout: Duration,

    /// Sampling temperature
    pub temperature: f32,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            org_id: None,
            base_url: DEFAULT_BASE_URL.to_string(),
            request_timeout: Duration::from_secs(60),
            temperature: 0.8,
        }
    }
}

impl TransportConfig {
    /// Load configuration from a config provider
    pub fn from_provider<P: ConfigProvider + ?Sized>(provider: &P) -> Result<Self> {
        let defaults = Self::default();
        let config = Self {
            api_key: provider.get_string("openai_api_key")?,
            org_id: provider.get_string("openai_org_id").ok(),
            base_url: provider.get_string_or("openai_base_url", DEFAULT_BASE_URL),
            request_timeout: provider.get_duration_or("request_timeout", defaults.request_timeout),
            temperature: provider.get_float_or("temperature", defaults.temperature as f64) as f32,
        };

        config.check()?;
        Ok(config)
    }
}

impl Validate for TransportConfig {
    fn validate(&self) -> Result<()> {
        if self.api_key.trim().is_empty() {
            return Err(PipelineError::configuration("API key is required"));
        }
        if url::Url::parse(&self.base_url).is_err() {
            return Err(PipelineError::configuration(format!(
                "Invalid base URL: {}",
                self.base_url
            )));
        }
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(PipelineError::configuration("Temperature must be within 0.0-2.0"));
        }
        Ok(())
    }

    fn section(&self) -> &str {
        "transport"
    }
}

/// Settings for the generation pipeline and runner
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Models in fallback order
    pub models: Vec<ModelIdentity>,

    /// Consecutive failures that open a model's breaker
    pub failure_threshold: u32,

    /// Time an open breaker waits before a probe
    pub cooldown: Duration,

    /// Tries per model call, including the first
    pub retry_attempts: u32,

    /// Backoff base delay
    pub retry_base_delay: Duration,

    /// Backoff ceiling
    pub retry_max_delay: Duration,

    /// Hard timeout around each model call
    pub call_timeout: Duration,

    /// Events a year needs
    pub target_event_count: usize,

    /// Maximum share of a year's events for one domain
    pub max_domain_share: f64,

    /// Orchestrator attempt budget per year
    pub max_attempts: usize,

    /// Maximum words per hint
    pub max_words: usize,

    /// Extra events requested beyond the remaining need
    pub over_request: usize,

    /// Path of the puzzle pool file
    pub pool_path: PathBuf,

    /// Candidate years seeded into the pool
    pub year_range: RangeInclusive<i32>,

    /// Years generated concurrently per run
    pub batch_size: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        let retry = RetryPolicy::default();
        Self {
            models: parse_model_list(DEFAULT_MODELS).unwrap_or_default(),
            failure_threshold: DEFAULT_FAILURE_THRESHOLD,
            cooldown: DEFAULT_COOLDOWN,
            retry_attempts: retry.max_attempts,
            retry_base_delay: retry.base_delay,
            retry_max_delay: retry.max_delay,
            call_timeout: Duration::from_secs(45),
            target_event_count: DEFAULT_TARGET_EVENT_COUNT,
            max_domain_share: DEFAULT_MAX_DOMAIN_SHARE,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            max_words: DEFAULT_MAX_WORDS,
            over_request: 2,
            pool_path: PathBuf::from("puzzles.json"),
            year_range: 1900..=2000,
            batch_size: 4,
        }
    }
}

impl PipelineConfig {
    /// Load configuration from a config provider
    pub fn from_provider<P: ConfigProvider + ?Sized>(provider: &P) -> Result<Self> {
        let d = Self::default();

        let models = match provider.get_string("models") {
            Ok(list) => parse_model_list(&list)?,
            Err(_) => d.models,
        };

        let start = provider.get_int_or("start_year", *d.year_range.start() as i64);
        let end = provider.get_int_or("end_year", *d.year_range.end() as i64);

        let config = Self {
            models,
            failure_threshold: provider.get_int_or("failure_threshold", d.failure_threshold as i64) as u32,
            cooldown: provider.get_duration_or("cooldown", d.cooldown),
            retry_attempts: provider.get_int_or("retry_attempts", d.retry_attempts as i64) as u32,
            retry_base_delay: provider.get_duration_or("retry_base_delay", d.retry_base_delay),
            retry_max_delay: provider.get_duration_or("retry_max_delay", d.retry_max_delay),
            call_timeout: provider.get_duration_or("call_timeout", d.call_timeout),
            target_event_count: provider.get_int_or("target_event_count", d.target_event_count as i64)
                .max(0) as usize,
            max_domain_share: provider.get_float_or("max_domain_share", d.max_domain_share),
            max_attempts: provider.get_int_or("max_attempts", d.max_attempts as i64).max(0) as usize,
            max_words: provider.get_int_or("max_words", d.max_words as i64).max(0) as usize,
            over_request: provider.get_int_or("over_request", d.over_request as i64).max(0) as usize,
            pool_path: PathBuf::from(provider.get_string_or("pool_path", "puzzles.json")),
            year_range: (start as i32)..=(end as i32),
            batch_size: provider.get_int_or("batch_size", d.batch_size as i64).max(0) as usize,
        };

        config.check()?;
        Ok(config)
    }

    /// Breaker settings for the shared registry
    pub fn breaker_config(&self) -> BreakerConfig {
        BreakerConfig {
            failure_threshold: self.failure_threshold,
            cooldown: self.cooldown,
        }
    }

    /// Per-model retry policy
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.retry_attempts,
            base_delay: self.retry_base_delay,
            max_delay: self.retry_max_delay,
            ..RetryPolicy::default()
        }
    }

    /// Content rules
    pub fn validator_config(&self) -> ValidatorConfig {
        ValidatorConfig {
            max_words: self.max_words,
            max_domain_share: self.max_domain_share,
        }
    }
}

impl Validate for PipelineConfig {
    fn validate(&self) -> Result<()> {
        if self.models.is_empty() {
            return Err(PipelineError::configuration("At least one model is required"));
        }
        if self.failure_threshold == 0 {
            return Err(PipelineError::configuration("Failure threshold must be at least 1"));
        }
        if self.retry_attempts == 0 {
            return Err(PipelineError::configuration("Retry attempts must be at least 1"));
        }
        if !(self.max_domain_share > 0.0 && self.max_domain_share <= 1.0) {
            return Err(PipelineError::configuration(
                "Max domain share must be within (0, 1]",
            ));
        }
        if self.max_words == 0 {
            return Err(PipelineError::configuration("Max words must be at least 1"));
        }
        if self.call_timeout.is_zero() {
            return Err(PipelineError::configuration("Call timeout must be positive"));
        }
        if self.year_range.start() > self.year_range.end() {
            return Err(PipelineError::configuration(format!(
                "Empty year range {}..={}",
                self.year_range.start(),
                self.year_range.end()
            )));
        }
        Ok(())
    }

    fn section(&self) -> &str {
        "pipeline"
    }
}

/// Parse a comma-separated model list.
///
/// Each entry is `id` or `id:priority`; without an explicit priority the
/// position in the list is used. The result is in fallback order.
pub fn parse_model_list(list: &str) -> Result<Vec<ModelIdentity>> {
    let mut models = Vec::new();
    for (position, entry) in list.split(',').map(str::trim).enumerate() {
        if entry.is_empty() {
            continue;
        }
        let model = match entry.rsplit_once(':') {
            Some((id, priority)) if !id.trim().is_empty() => {
                let priority = priority.trim().parse::<u32>().map_err(|e| {
                    PipelineError::configuration(format!("Invalid priority in '{}': {}", entry, e))
                })?;
                ModelIdentity::new(id.trim(), priority)
            }
            Some(_) => {
                return Err(PipelineError::configuration(format!(
                    "Missing model id in '{}'",
                    entry
                )))
            }
            None => ModelIdentity::new(entry, position as u32),
        };
        if models.iter().any(|m: &ModelIdentity| m.id == model.id) {
            return Err(PipelineError::configuration(format!(
                "Duplicate model id '{}'",
                model.id
            )));
        }
        models.push(model);
    }
    Ok(ModelIdentity::in_priority_order(&models))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_config_provider() {
        let mut provider = MemoryConfigProvider::new();
        provider.set("key1", "value1");
        provider.set("key2", "123");
        provider.set("key3", "250ms");

        assert_eq!(provider.get_string("key1").unwrap(), "value1");
        assert_eq!(provider.get_int("key2").unwrap(), 123);
        assert_eq!(provider.get_duration("key3").unwrap(), Duration::from_millis(250));
        assert!(provider.get_string("missing").is_err());
    }

    #[test]
    fn test_env_key_format() {
        let provider = EnvConfigProvider::new()
            .with_prefix("EVENTS")
            .with_namespace("TEST");

        assert_eq!(provider.format_key("openai_api_key"), "EVENTS_TEST_OPENAI_API_KEY");
        assert_eq!(provider.format_key("base-url"), "EVENTS_TEST_BASE_URL");
    }

    #[test]
    fn test_model_list_uses_position_as_priority() {
        let models = parse_model_list("fast, strong ,backup").unwrap();
        assert_eq!(
            models,
            vec![
                ModelIdentity::new("fast", 0),
                ModelIdentity::new("strong", 1),
                ModelIdentity::new("backup", 2),
            ]
        );
    }

    #[test]
    fn test_model_list_explicit_priorities() {
        let models = parse_model_list("strong:5,fast:1").unwrap();
        assert_eq!(models[0], ModelIdentity::new("fast", 1));
        assert_eq!(models[1], ModelIdentity::new("strong", 5));

        assert!(parse_model_list("a:x").is_err());
        assert!(parse_model_list(":3").is_err());
        assert!(parse_model_list("a,a").is_err());
    }

    #[test]
    fn test_memory_provider_from_map() {
        let values = HashMap::from([
            ("openai_api_key".to_string(), "sk-test".to_string()),
            ("temperature".to_string(), "0.2".to_string()),
        ]);
        let provider = MemoryConfigProvider::with_values(values);

        let config = TransportConfig::from_provider(&provider).unwrap();
        assert_eq!(config.api_key, "sk-test");
        assert!((config.temperature - 0.2).abs() < f32::EPSILON);
    }

    #[test]
    fn test_validation_errors_name_the_section() {
        let provider = MemoryConfigProvider::with_values(HashMap::from([
            ("openai_api_key".to_string(), "sk-test".to_string()),
            ("temperature".to_string(), "3.5".to_string()),
        ]));
        let err = TransportConfig::from_provider(&provider).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Configuration error: transport: Temperature must be within 0.0-2.0"
        );

        let mut provider = MemoryConfigProvider::new();
        provider.set("failure_threshold", "0");
        let err = PipelineConfig::from_provider(&provider).unwrap_err();
        assert!(matches!(&err, PipelineError::Configuration(m) if m.starts_with("pipeline: ")));
    }

    #[test]
    fn test_transport_config_requires_key() {
        let mut provider = MemoryConfigProvider::new();
        assert!(TransportConfig::from_provider(&provider).is_err());

        provider.set("openai_api_key", "sk-test");
        provider.set("openai_base_url", "http://localhost:9999/v1");
        provider.set("request_timeout", "5s");
        let config = TransportConfig::from_provider(&provider).unwrap();
        assert_eq!(config.base_url, "http://localhost:9999/v1");
        assert_eq!(config.request_timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_pipeline_config_defaults() {
        let config = PipelineConfig::from_provider(&MemoryConfigProvider::new()).unwrap();
        assert_eq!(config.target_event_count, 6);
        assert_eq!(config.max_domain_share, 0.5);
        assert_eq!(config.failure_threshold, 2);
        assert_eq!(config.models.len(), 2);
        assert_eq!(config.retry_policy().max_attempts, 2);
    }

    #[test]
    fn test_pipeline_config_overrides_and_validation() {
        let mut provider = MemoryConfigProvider::new();
        provider.set("models", "a,b,c");
        provider.set("cooldown", "2m");
        provider.set("start_year", "-500");
        provider.set("end_year", "-400");
        let config = PipelineConfig::from_provider(&provider).unwrap();
        assert_eq!(config.models.len(), 3);
        assert_eq!(config.breaker_config().cooldown, Duration::from_secs(120));
        assert_eq!(config.year_range, -500..=-400);

        provider.set("max_domain_share", "1.5");
        assert!(PipelineConfig::from_provider(&provider).is_err());

        let mut provider = MemoryConfigProvider::new();
        provider.set("models", " , ");
        assert!(PipelineConfig::from_provider(&provider).is_err());
    }
}
