//! Chooses which years need content next

use std::fmt;

use log::debug;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::pool::{YearInventory, YearPool};

/// A year picked for generation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectedYear {
    /// Year to generate for
    pub year: i32,

    /// Events already on file
    pub existing: usize,

    /// Events still missing
    pub needed: usize,
}

/// Outcome of a selection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Selection {
    /// A year that needs topping up
    Year(SelectedYear),

    /// Every unused year is fully stocked
    NoWorkAvailable,
}

impl fmt::Display for Selection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Selection::Year(selected) => write!(
                f,
                "year {} ({} on file, {} needed)",
                selected.year, selected.existing, selected.needed
            ),
            Selection::NoWorkAvailable => write!(f, "no work available"),
        }
    }
}

/// Picks the unused years with the fewest events first
#[derive(Debug, Clone, Copy)]
pub struct WorkSelector {
    target_event_count: usize,
}

impl WorkSelector {
    /// Create a selector for years needing `target_event_count` events
    pub fn new(target_event_count: usize) -> Self {
        Self { target_event_count }
    }

    /// Target the selector fills towards
    pub fn target_event_count(&self) -> usize {
        self.target_event_count
    }

    /// Choose the next year from the pool
    pub async fn next_year(&self, pool: &dyn YearPool) -> Result<Selection> {
        let candidates = pool.query_unused_years().await?;
        let selection = select_from(&candidates, self.target_event_count);
        debug!("Selected {} from {} unused years", selection, candidates.len());
        Ok(selection)
    }

    /// Choose up to `limit` distinct years, best first
    pub async fn next_batch(&self, pool: &dyn YearPool, limit: usize) -> Result<Vec<SelectedYear>> {
        let candidates = pool.query_unused_years().await?;
        Ok(rank_candidates(&candidates, self.target_event_count)
            .into_iter()
            .take(limit)
            .collect())
    }
}

/// Eligible years (fewer than `target` events), fewest events first, ties by year ascending
pub fn rank_candidates(candidates: &[YearInventory], target: usize) -> Vec<SelectedYear> {
    let mut eligible: Vec<SelectedYear> = candidates
        .iter()
        .filter(|inventory| inventory.event_count < target)
        .map(|inventory| SelectedYear {
            year: inventory.year,
            existing: inventory.event_count,
            needed: target - inventory.event_count,
        })
        .collect();
    eligible.sort_by_key(|selected| (selected.existing, selected.year));
    eligible
}

/// Best eligible year, or `NoWorkAvailable`
pub fn select_from(candidates: &[YearInventory], target: usize) -> Selection {
    rank_candidates(candidates, target)
        .into_iter()
        .next()
        .map(Selection::Year)
        .unwrap_or(Selection::NoWorkAvailable)
}
