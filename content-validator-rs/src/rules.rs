//! Textual rules applied to a single hint
//!
//! All functions here are pure and deterministic. They are deliberately
//! cheap heuristics rather than language analysis.

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    /// A digit run of two or more digits whose first digit is 1-9.
    ///
    /// The run must not be preceded by another digit, so "1960s", "30th"
    /// and "A1969" are all caught while "3 ships" and "05" are not.
    static ref MULTI_DIGIT_NUMERAL: Regex = Regex::new(r"(?:^|\D)[1-9]\d+")
        .expect("numeral pattern is valid");

    /// Era vocabulary, whole words only.
    static ref ERA_TERM: Regex = Regex::new(
        r"(?i)\b(?:eras?|century|centuries|decades?|millennium|millennia|bce|ce|bc|ad)\b"
    )
    .expect("era pattern is valid");

    /// Dotted abbreviations such as "B.C." or "A.D.", which end on a
    /// non-word character and so cannot use a trailing word boundary.
    static ref DOTTED_ERA_TERM: Regex = Regex::new(r"(?i)\b(?:b\.\s?c\.(?:\s?e\.)?|a\.\s?d\.|c\.\s?e\.)")
        .expect("dotted era pattern is valid");

    /// Whitespace immediately followed by an uppercase letter.
    static ref CAPITALISED_AFTER_SPACE: Regex = Regex::new(r"\s\p{Lu}")
        .expect("proper noun pattern is valid");
}

/// True if the text gives the year away: a numeral of two or more digits
/// with a non-zero leading digit, or an era/century/decade/millennium term.
pub fn has_leakage(text: &str) -> bool {
    MULTI_DIGIT_NUMERAL.is_match(text) || ERA_TERM.is_match(text) || DOTTED_ERA_TERM.is_match(text)
}

/// True if some word after the first one starts with an uppercase letter.
pub fn has_proper_noun(text: &str) -> bool {
    CAPITALISED_AFTER_SPACE.is_match(text.trim_start())
}

/// Number of whitespace-delimited tokens
pub fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

/// True if the trimmed text has at most `max_words` tokens.
///
/// Hyphenated and punctuation-adjacent words count as one token.
pub fn is_valid_word_count(text: &str, max_words: usize) -> bool {
    word_count(text.trim()) <= max_words
}
