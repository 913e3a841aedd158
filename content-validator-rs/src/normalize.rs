//! Text normalisation for duplicate detection

use unicode_normalization::UnicodeNormalization;

/// Canonical form of a hint used to detect duplicates.
///
/// Applies NFKC, lowercases, collapses whitespace and drops trailing
/// punctuation, so "The Berlin Wall falls." and "the  berlin wall falls"
/// compare equal.
pub fn normalize_text(text: &str) -> String {
    let folded: String = text.nfkc().collect::<String>().to_lowercase();
    let collapsed = folded.split_whitespace().collect::<Vec<_>>().join(" ");
    collapsed
        .trim_end_matches(|c: char| c.is_ascii_punctuation())
        .to_string()
}
