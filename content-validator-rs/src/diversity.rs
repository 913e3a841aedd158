//! Batch-level domain quota
//!
//! Diversity is a property of a set of events, so it is never part of a
//! single candidate's verdict.

use std::collections::HashMap;

use crate::types::EventCandidate;

/// Tolerance for float products such as `0.1 * 30` landing just above an integer
const SHARE_EPSILON: f64 = 1e-9;

/// Canonical form of a domain label used for grouping
pub fn normalize_domain(domain: &str) -> String {
    domain.trim().to_lowercase()
}

/// Maximum events any one domain may contribute to a set of `total` events:
/// `ceil(max_share * total)`.
pub fn domain_cap(max_share: f64, total: usize) -> usize {
    if total == 0 || max_share <= 0.0 {
        return 0;
    }
    if max_share >= 1.0 {
        return total;
    }
    let raw = max_share * total as f64;
    (raw - SHARE_EPSILON).ceil().max(0.0) as usize
}

/// Count events per normalised domain
pub fn domain_counts(events: &[EventCandidate]) -> HashMap<String, usize> {
    let mut counts = HashMap::new();
    for event in events {
        *counts.entry(normalize_domain(&event.domain)).or_insert(0) += 1;
    }
    counts
}

/// True iff no domain contributes more than `ceil(max_share * events.len())`
/// events. An empty batch is trivially diverse.
pub fn check_domain_diversity(events: &[EventCandidate], max_share: f64) -> bool {
    if events.is_empty() {
        return true;
    }
    let cap = domain_cap(max_share, events.len());
    domain_counts(events).values().all(|&count| count <= cap)
}
