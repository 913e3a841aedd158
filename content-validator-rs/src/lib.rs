//! # Content Validator
//!
//! Deterministic content-quality contract for generated historical event
//! hints. Every hint accepted into the puzzle pool must pass these rules.
//!
//! ## Rules
//!
//! - Leakage: no multi-digit numerals and no era vocabulary
//! - Specificity: at least one capitalised word after the first
//! - Length: at most [`DEFAULT_MAX_WORDS`] whitespace-delimited tokens
//! - Diversity (batch only): no domain above its share of the set
//!
//! The rule functions are independently callable so audit tooling can
//! re-check stored content without pulling in the generation pipeline.

mod diversity;
mod normalize;
mod rules;
mod types;

use std::collections::BTreeSet;

pub use diversity::{check_domain_diversity, domain_cap, domain_counts, normalize_domain};
pub use normalize::normalize_text;
pub use rules::{has_leakage, has_proper_noun, is_valid_word_count, word_count};
pub use types::{EventCandidate, ReasonCode, ValidationVerdict};

/// Version of the validator library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default maximum number of words in a hint
pub const DEFAULT_MAX_WORDS: usize = 20;

/// Default maximum share of a batch any one domain may hold
pub const DEFAULT_MAX_DOMAIN_SHARE: f64 = 0.5;

/// Configuration for the validator
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatorConfig {
    /// Maximum allowed words per hint
    pub max_words: usize,
    /// Maximum share of a batch for a single domain
    pub max_domain_share: f64,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            max_words: DEFAULT_MAX_WORDS,
            max_domain_share: DEFAULT_MAX_DOMAIN_SHARE,
        }
    }
}

/// Stateless rule engine bound to a configuration
#[derive(Debug, Clone, Default)]
pub struct ContentValidator {
    config: ValidatorConfig,
}

impl ContentValidator {
    /// Create a validator with the given configuration
    pub fn new(config: ValidatorConfig) -> Self {
        Self { config }
    }

    /// Current configuration
    pub fn config(&self) -> &ValidatorConfig {
        &self.config
    }

    /// Run the textual rules over one candidate.
    ///
    /// A candidate passes only with no leakage, a proper noun and an
    /// acceptable word count.
    pub fn validate_candidate(&self, candidate: &EventCandidate) -> ValidationVerdict {
        let mut reasons = BTreeSet::new();
        if has_leakage(&candidate.text) {
            reasons.insert(ReasonCode::Leakage);
        }
        if !has_proper_noun(&candidate.text) {
            reasons.insert(ReasonCode::NoProperNoun);
        }
        if !is_valid_word_count(&candidate.text, self.config.max_words) {
            reasons.insert(ReasonCode::WordCountExceeded);
        }
        ValidationVerdict::from_reasons(candidate.clone(), reasons)
    }

    /// Check the domain quota over a batch
    pub fn check_batch(&self, events: &[EventCandidate]) -> bool {
        check_domain_diversity(events, self.config.max_domain_share)
    }
}

/// Validate one candidate with default settings
pub fn validate_candidate(candidate: &EventCandidate) -> ValidationVerdict {
    ContentValidator::default().validate_candidate(candidate)
}
