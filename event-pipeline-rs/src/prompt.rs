//! Prompt construction for event generation

use serde::{Deserialize, Serialize};

use content_validator::DEFAULT_MAX_WORDS;

use crate::types::EventCandidate;
use crate::util::display_year;

/// Domains requested when the caller supplies none
pub const DEFAULT_DOMAINS: &[&str] = &[
    "politics",
    "science",
    "culture",
    "sports",
    "technology",
    "economy",
    "disaster",
    "exploration",
];

/// Structured request sent to a generative model
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Prompt {
    /// Instructions and output contract
    pub system: String,

    /// The concrete ask
    pub user: String,
}

impl Prompt {
    /// Create a prompt from raw text
    pub fn new(system: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            system: system.into(),
            user: user.into(),
        }
    }
}

/// Options that shape a generation prompt
#[derive(Debug, Clone)]
pub struct PromptOptions {
    /// Maximum words per hint
    pub max_words: usize,

    /// Extra events to ask for on top of the remaining need
    pub over_request: usize,

    /// Domains to spread events across
    pub domains: Vec<String>,
}

impl Default for PromptOptions {
    fn default() -> Self {
        Self {
            max_words: DEFAULT_MAX_WORDS,
            over_request: 2,
            domains: DEFAULT_DOMAINS.iter().map(|d| d.to_string()).collect(),
        }
    }
}

/// Number of events to request when `needed` more are required
pub fn request_size(needed: usize, options: &PromptOptions) -> usize {
    if needed == 0 {
        0
    } else {
        needed + options.over_request
    }
}

/// Build the prompt for one generation attempt.
///
/// `avoid` lists events already accepted for the year so the model does not
/// repeat them.
pub fn build_prompt(year: i32, needed: usize, avoid: &[EventCandidate], options: &PromptOptions) -> Prompt {
    let count = request_size(needed, options);
    let domains = if options.domains.is_empty() {
        DEFAULT_DOMAINS.join(", ")
    } else {
        options.domains.join(", ")
    };

    let system = format!(
        "You write hints for a daily history guessing game. Players read the hints and guess the year.\n\
         Rules for every hint:\n\
         - Never write any number with two or more digits.\n\
         - Never mention eras, centuries, decades, millennia, BC, BCE, AD or CE.\n\
         - Name at least one specific person, place or organisation.\n\
         - Use at most {max_words} words.\n\
         - Spread the hints across these domains: {domains}. No domain may supply more than half of them.\n\
         Respond with a JSON object of the form {{\"events\": [{{\"text\": \"...\", \"domain\": \"...\"}}]}} and nothing else.",
        max_words = options.max_words,
        domains = domains,
    );

    let mut user = format!(
        "Write {} distinct hints about events that happened in the year {}.",
        count,
        display_year(year)
    );
    if !avoid.is_empty() {
        user.push_str("\nDo not repeat or paraphrase these hints:");
        for event in avoid {
            user.push_str("\n- ");
            user.push_str(&event.text);
        }
    }

    Prompt { system, user }
}
