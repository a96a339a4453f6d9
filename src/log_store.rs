//! Headache log
//!
//! Append-only log of self-reported headache scores. Records are stored in
//! chronological (append) order under one key and listed newest-first.

use chrono::{DateTime, SubsecRound, Utc};
use log::info;

use crate::error::TrackerError;
use crate::kv::KvStore;
use crate::types::{validate_score, ForecastSeries, HeadacheRecord, ScorePoint};

/// Key the log is persisted under
pub const HEADACHE_DATA_KEY: &str = "headacheData";

/// Number of records shown in the history panel
pub const DEFAULT_HISTORY_LIMIT: usize = 10;

/// Headache log over a key-value store
#[derive(Debug)]
pub struct HeadacheLog<S: KvStore> {
    store: S,
    key: String,
}

impl<S: KvStore> HeadacheLog<S> {
    /// Log stored under the default key
    pub fn new(store: S) -> Self {
        Self::with_key(store, HEADACHE_DATA_KEY)
    }

    /// Log stored under a custom key
    pub fn with_key(store: S, key: impl Into<String>) -> Self {
        Self {
            store,
            key: key.into(),
        }
    }

    /// Record a score at the current instant
    pub fn append(&mut self, score: u8) -> Result<HeadacheRecord, TrackerError> {
        self.append_at(Utc::now(), score)
    }

    /// Record a score at an explicit instant.
    ///
    /// The timestamp is truncated to milliseconds, the precision of the
    /// persisted form.
    pub fn append_at(
        &mut self,
        timestamp: DateTime<Utc>,
        score: u8,
    ) -> Result<HeadacheRecord, TrackerError> {
        let record = HeadacheRecord::new(timestamp.trunc_subsecs(3), score)?;

        let mut records = self.load()?;
        records.push(record);
        self.save(&records)?;

        info!("logged headache score {} at {}", record.score, record.timestamp);
        Ok(record)
    }

    /// All records, newest first
    pub fn list(&self) -> Result<Vec<HeadacheRecord>, TrackerError> {
        let mut records = self.load()?;
        records.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        Ok(records)
    }

    /// The `limit` most recent records, newest first
    pub fn recent(&self, limit: usize) -> Result<Vec<HeadacheRecord>, TrackerError> {
        let mut records = self.list()?;
        records.truncate(limit);
        Ok(records)
    }

    /// Delete every record
    pub fn clear(&mut self) -> Result<(), TrackerError> {
        self.store.remove(&self.key)?;
        info!("cleared headache log");
        Ok(())
    }

    /// Scores logged within `[start, end]`, oldest first
    pub fn points_within(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<ScorePoint>, TrackerError> {
        let mut points: Vec<ScorePoint> = self
            .load()?
            .into_iter()
            .filter(|r| r.timestamp >= start && r.timestamp <= end)
            .map(|r| ScorePoint {
                timestamp: r.timestamp,
                score: r.score,
            })
            .collect();
        points.sort_by_key(|p| p.timestamp);
        Ok(points)
    }

    /// Scores that fall inside a forecast's time span
    pub fn overlay_points(&self, series: &ForecastSeries) -> Result<Vec<ScorePoint>, TrackerError> {
        match series.span() {
            Some((start, end)) => self.points_within(start, end),
            None => Ok(Vec::new()),
        }
    }

    /// Serialize the persisted layout of the log
    pub fn to_json(&self) -> Result<String, TrackerError> {
        Ok(serde_json::to_string(&self.load()?)?)
    }

    fn load(&self) -> Result<Vec<HeadacheRecord>, TrackerError> {
        match self.store.get(&self.key)? {
            Some(json) => parse_records(&json),
            None => Ok(Vec::new()),
        }
    }

    fn save(&mut self, records: &[HeadacheRecord]) -> Result<(), TrackerError> {
        let json = serde_json::to_string(records)?;
        self.store.set(&self.key, json)
    }
}

/// Parse the persisted layout, rejecting out-of-range scores
pub fn parse_records(json: &str) -> Result<Vec<HeadacheRecord>, TrackerError> {
    let records: Vec<HeadacheRecord> = serde_json::from_str(json)
        .map_err(|e| TrackerError::StorageError(format!("corrupt headache log: {}", e)))?;

    for record in &records {
        validate_score(record.score)
            .map_err(|e| TrackerError::StorageError(format!("corrupt headache log: {}", e)))?;
    }

    Ok(records)
}
