//! Data carried through validation
//!
//! Candidates are produced by a model call and never mutated afterwards;
//! verdicts are recomputed on demand and never persisted.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

/// A single generated event hint for a given year
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EventCandidate {
    /// Hint text shown to players
    pub text: String,

    /// Topical category (politics, science, ...)
    pub domain: String,

    /// Target year the hint describes (negative for BC)
    pub year: i32,
}

impl EventCandidate {
    /// Create a new candidate
    pub fn new(text: impl Into<String>, domain: impl Into<String>, year: i32) -> Self {
        Self {
            text: text.into(),
            domain: domain.into(),
            year,
        }
    }
}

/// Why a candidate was rejected
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReasonCode {
    /// Text reveals or strongly hints at the year
    Leakage,

    /// No capitalised word after the first one
    NoProperNoun,

    /// Too many whitespace-delimited tokens
    WordCountExceeded,
}

impl fmt::Display for ReasonCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Leakage => write!(f, "LEAKAGE"),
            Self::NoProperNoun => write!(f, "NO_PROPER_NOUN"),
            Self::WordCountExceeded => write!(f, "WORD_COUNT_EXCEEDED"),
        }
    }
}

/// Outcome of running the textual rules over one candidate
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationVerdict {
    /// The candidate that was checked
    pub candidate: EventCandidate,

    /// Whether every rule passed
    pub passed: bool,

    /// Every rule that failed; empty iff `passed`
    pub reasons: BTreeSet<ReasonCode>,
}

impl ValidationVerdict {
    /// Build a verdict from the set of failed rules
    pub fn from_reasons(candidate: EventCandidate, reasons: BTreeSet<ReasonCode>) -> Self {
        Self {
            candidate,
            passed: reasons.is_empty(),
            reasons,
        }
    }

    /// Check whether a specific rule failed
    pub fn has_reason(&self, reason: ReasonCode) -> bool {
        self.reasons.contains(&reason)
    }
}
