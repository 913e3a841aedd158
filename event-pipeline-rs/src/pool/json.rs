//! `puzzles.json` backed year pool
//!
//! File layout:
//!
//! ```json
//! {
//!   "meta": { "total_puzzles": 2, "date_range": "-44-1969" },
//!   "puzzles": { "-44": ["..."], "1969": ["..."] },
//!   "used": { "1969": "2026-10-18" }
//! }
//! ```
//!
//! Years are kept in numeric order and `meta.total_puzzles` and
//! `meta.date_range` are recomputed on every write. Other keys, at the top
//! level or inside `meta`, are written back untouched.

use std::collections::BTreeMap;
use std::ops::RangeInclusive;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::NaiveDate;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::sync::Mutex;

use super::{compute_stats, merge_hints, record_use, unused_years, PoolStats, YearInventory, YearPool};
use crate::error::{PipelineError, Result};
use crate::types::{EventCandidate, DEFAULT_TARGET_EVENT_COUNT};

#[derive(Debug, Clone, Default, Deserialize)]
struct PuzzleFile {
    #[serde(default)]
    puzzles: BTreeMap<i32, Vec<String>>,
    #[serde(default)]
    used: BTreeMap<i32, NaiveDate>,
    /// `meta` object as found on disk, including keys we do not manage
    #[serde(skip)]
    meta: Map<String, Value>,
    /// Top-level keys other than `meta`, `puzzles` and `used`
    #[serde(skip)]
    extra: Map<String, Value>,
}

/// Borrowed view written back to disk
#[derive(Serialize)]
struct PuzzleDocument<'a> {
    meta: &'a Map<String, Value>,
    puzzles: &'a BTreeMap<i32, Vec<String>>,
    used: &'a BTreeMap<i32, NaiveDate>,
    #[serde(flatten)]
    extra: &'a Map<String, Value>,
}

impl PuzzleFile {
    /// Decode a file, keeping unknown keys so a rewrite does not drop them
    fn from_slice(bytes: &[u8]) -> serde_json::Result<Self> {
        let mut file: PuzzleFile = serde_json::from_slice(bytes)?;
        let mut extra: Map<String, Value> = serde_json::from_slice(bytes)?;
        extra.remove("puzzles");
        extra.remove("used");
        if let Some(Value::Object(meta)) = extra.remove("meta") {
            file.meta = meta;
        }
        file.extra = extra;
        Ok(file)
    }

    fn refresh_meta(&mut self) {
        let range = match (self.puzzles.keys().next(), self.puzzles.keys().next_back()) {
            (Some(min), Some(max)) => format!("{}-{}", min, max),
            _ => String::new(),
        };
        self.meta
            .insert("total_puzzles".to_string(), Value::from(self.puzzles.len()));
        self.meta.insert("date_range".to_string(), Value::String(range));
    }

    fn to_vec_pretty(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec_pretty(&PuzzleDocument {
            meta: &self.meta,
            puzzles: &self.puzzles,
            used: &self.used,
            extra: &self.extra,
        })
    }
}

/// Year pool stored in a single JSON file
#[derive(Debug)]
pub struct JsonYearPool {
    path: PathBuf,
    lock: Mutex<()>,
    target_event_count: usize,
}

impl JsonYearPool {
    /// Open a pool file, creating an empty one if it does not exist
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let pool = Self {
            path: path.into(),
            lock: Mutex::new(()),
            target_event_count: DEFAULT_TARGET_EVENT_COUNT,
        };
        let file = pool.load().await?;
        if !tokio::fs::try_exists(&pool.path).await? {
            pool.save(file).await?;
            info!("Created empty puzzle pool at {}", pool.path.display());
        }
        Ok(pool)
    }

    /// Set the event count below which a year counts as insufficient
    pub fn with_target(mut self, target_event_count: usize) -> Self {
        self.target_event_count = target_event_count;
        self
    }

    /// Location of the pool file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Hints on file for a year
    pub async fn hints(&self, year: i32) -> Result<Option<Vec<String>>> {
        let _guard = self.lock.lock().await;
        Ok(self.load().await?.puzzles.get(&year).cloned())
    }

    /// Add a new year. Fails if the year is already present.
    pub async fn add_year(&self, year: i32, hints: Vec<String>) -> Result<()> {
        let _guard = self.lock.lock().await;
        let mut file = self.load().await?;
        if file.puzzles.contains_key(&year) {
            return Err(PipelineError::storage(format!(
                "year {} already exists, use update instead",
                year
            )));
        }
        file.puzzles.insert(year, hints);
        self.save(file).await
    }

    /// Replace a year's hints. Fails if the year is not present.
    pub async fn update_year(&self, year: i32, hints: Vec<String>) -> Result<()> {
        let _guard = self.lock.lock().await;
        let mut file = self.load().await?;
        match file.puzzles.get_mut(&year) {
            Some(existing) => *existing = hints,
            None => {
                return Err(PipelineError::storage(format!(
                    "year {} does not exist, use add instead",
                    year
                )))
            }
        }
        self.save(file).await
    }

    /// Seed every missing year in `range` with an empty hint list. Year 0
    /// does not exist and is skipped. Returns the number of years added.
    pub async fn ensure_years(&self, range: RangeInclusive<i32>) -> Result<usize> {
        let _guard = self.lock.lock().await;
        let mut file = self.load().await?;
        let mut added = 0;
        for year in range.filter(|&year| year != 0) {
            if !file.puzzles.contains_key(&year) {
                file.puzzles.insert(year, Vec::new());
                added += 1;
            }
        }
        if added > 0 {
            self.save(file).await?;
            debug!("Seeded {} candidate years into {}", added, self.path.display());
        }
        Ok(added)
    }

    async fn load(&self) -> Result<PuzzleFile> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) => PuzzleFile::from_slice(&bytes).map_err(|e| {
                PipelineError::storage(format!(
                    "Invalid puzzle file {}: {}",
                    self.path.display(),
                    e
                ))
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(PuzzleFile::default()),
            Err(e) => Err(e.into()),
        }
    }

    async fn save(&self, mut file: PuzzleFile) -> Result<()> {
        file.refresh_meta();
        let json = file.to_vec_pretty().map_err(|e| {
            PipelineError::storage(format!("Failed to encode puzzle file: {}", e))
        })?;

        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

#[async_trait]
impl YearPool for JsonYearPool {
    async fn query_unused_years(&self) -> Result<Vec<YearInventory>> {
        let _guard = self.lock.lock().await;
        let file = self.load().await?;
        Ok(unused_years(&file.puzzles, &file.used))
    }

    async fn import_events(&self, year: i32, events: &[EventCandidate]) -> Result<usize> {
        let _guard = self.lock.lock().await;
        let mut file = self.load().await?;
        let added = merge_hints(file.puzzles.entry(year).or_default(), events);
        if added > 0 {
            self.save(file).await?;
        }
        Ok(added)
    }

    async fn mark_used(&self, year: i32, date: NaiveDate) -> Result<()> {
        let _guard = self.lock.lock().await;
        let mut file = self.load().await?;
        record_use(&file.puzzles, &mut file.used, year, date)?;
        self.save(file).await
    }

    async fn pool_stats(&self) -> Result<PoolStats> {
        let _guard = self.lock.lock().await;
        let file = self.load().await?;
        Ok(compute_stats(&file.puzzles, &file.used, self.target_event_count))
    }
}
