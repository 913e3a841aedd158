//! Year pool collaborators
//!
//! The pool records which years exist, the hints on file for each, and which
//! years have already been used for a daily puzzle.

mod json;

pub use json::JsonYearPool;

use std::collections::{BTreeMap, HashSet};
use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use content_validator::normalize_text;

use crate::error::{PipelineError, Result};
use crate::types::{EventCandidate, DEFAULT_TARGET_EVENT_COUNT};

/// A year and how many events it already has
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct YearInventory {
    /// Year (negative for BC)
    pub year: i32,

    /// Events on file
    pub event_count: usize,
}

/// Pool summary
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolStats {
    /// Years in the pool
    pub total: usize,

    /// Years already used for a puzzle
    pub used: usize,

    /// Years not yet used
    pub available: usize,

    /// Unused years with fewer events than the target
    pub insufficient_events: usize,
}

/// Persistence collaborator for generated content
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait YearPool: Send + Sync {
    /// Unused years with their event counts
    async fn query_unused_years(&self) -> Result<Vec<YearInventory>>;

    /// Add events to a year, skipping duplicates. Returns the number added.
    async fn import_events(&self, year: i32, events: &[EventCandidate]) -> Result<usize>;

    /// Record that a year was used for the puzzle of `date`
    async fn mark_used(&self, year: i32, date: NaiveDate) -> Result<()>;

    /// Summary counts
    async fn pool_stats(&self) -> Result<PoolStats>;
}

/// Append the texts of `events` not already present (by normalised text).
pub(crate) fn merge_hints(hints: &mut Vec<String>, events: &[EventCandidate]) -> usize {
    let mut seen: HashSet<String> = hints.iter().map(|hint| normalize_text(hint)).collect();
    let mut added = 0;
    for event in events {
        let text = event.text.trim();
        if text.is_empty() {
            continue;
        }
        if seen.insert(normalize_text(text)) {
            hints.push(text.to_string());
            added += 1;
        }
    }
    added
}

pub(crate) fn unused_years(
    puzzles: &BTreeMap<i32, Vec<String>>,
    used: &BTreeMap<i32, NaiveDate>,
) -> Vec<YearInventory> {
    puzzles
        .iter()
        .filter(|(year, _)| !used.contains_key(year))
        .map(|(&year, hints)| YearInventory {
            year,
            event_count: hints.len(),
        })
        .collect()
}

pub(crate) fn compute_stats(
    puzzles: &BTreeMap<i32, Vec<String>>,
    used: &BTreeMap<i32, NaiveDate>,
    target_event_count: usize,
) -> PoolStats {
    let unused = unused_years(puzzles, used);
    let used_count = puzzles.keys().filter(|year| used.contains_key(year)).count();
    PoolStats {
        total: puzzles.len(),
        used: used_count,
        available: unused.len(),
        insufficient_events: unused
            .iter()
            .filter(|inventory| inventory.event_count < target_event_count)
            .count(),
    }
}

pub(crate) fn record_use(
    puzzles: &BTreeMap<i32, Vec<String>>,
    used: &mut BTreeMap<i32, NaiveDate>,
    year: i32,
    date: NaiveDate,
) -> Result<()> {
    if !puzzles.contains_key(&year) {
        return Err(PipelineError::storage(format!("year {} is not in the pool", year)));
    }
    if let Some(previous) = used.get(&year) {
        return Err(PipelineError::storage(format!(
            "year {} was already used on {}",
            year, previous
        )));
    }
    used.insert(year, date);
    Ok(())
}

#[derive(Debug, Default)]
struct MemoryState {
    puzzles: BTreeMap<i32, Vec<String>>,
    used: BTreeMap<i32, NaiveDate>,
}

/// In-process pool for tests and embedding
#[derive(Debug)]
pub struct MemoryYearPool {
    state: RwLock<MemoryState>,
    target_event_count: usize,
}

impl Default for MemoryYearPool {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryYearPool {
    /// Create an empty pool
    pub fn new() -> Self {
        Self {
            state: RwLock::new(MemoryState::default()),
            target_event_count: DEFAULT_TARGET_EVENT_COUNT,
        }
    }

    /// Create a pool seeded with years and their hints
    pub fn with_years<I, S>(years: I) -> Self
    where
        I: IntoIterator<Item = (i32, Vec<S>)>,
        S: Into<String>,
    {
        let pool = Self::new();
        {
            let mut state = pool.state.write().unwrap_or_else(PoisonError::into_inner);
            for (year, hints) in years {
                state
                    .puzzles
                    .insert(year, hints.into_iter().map(Into::into).collect());
            }
        }
        pool
    }

    /// Set the event count below which a year counts as insufficient
    pub fn with_target(mut self, target_event_count: usize) -> Self {
        self.target_event_count = target_event_count;
        self
    }

    /// Hints on file for a year
    pub fn hints(&self, year: i32) -> Option<Vec<String>> {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .puzzles
            .get(&year)
            .cloned()
    }

    /// Date a year was used, if any
    pub fn used_on(&self, year: i32) -> Option<NaiveDate> {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .used
            .get(&year)
            .copied()
    }
}

#[async_trait]
impl YearPool for MemoryYearPool {
    async fn query_unused_years(&self) -> Result<Vec<YearInventory>> {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        Ok(unused_years(&state.puzzles, &state.used))
    }

    async fn import_events(&self, year: i32, events: &[EventCandidate]) -> Result<usize> {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        let hints = state.puzzles.entry(year).or_default();
        Ok(merge_hints(hints, events))
    }

    async fn mark_used(&self, year: i32, date: NaiveDate) -> Result<()> {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        let MemoryState { puzzles, used } = &mut *state;
        record_use(puzzles, used, year, date)
    }

    async fn pool_stats(&self) -> Result<PoolStats> {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        Ok(compute_stats(&state.puzzles, &state.used, self.target_event_count))
    }
}
