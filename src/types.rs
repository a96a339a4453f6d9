//! Core types for the pressure-headache engine
//!
//! This module defines the data that flows between stages: the forecast
//! series, per-hour risk levels, detection thresholds, headache records and
//! the composed insight.

use chrono::{DateTime, FixedOffset, Offset, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::TrackerError;

/// Default drop (hPa) over the short window that marks an hour High
pub const DEFAULT_SHORT_WINDOW_DROP_HPA: f64 = -6.0;

/// Default short window length in hours
pub const DEFAULT_SHORT_WINDOW_HOURS: usize = 3;

/// Default pressure range (hPa) over the long window that marks an hour Medium
pub const DEFAULT_LONG_WINDOW_RANGE_HPA: f64 = 10.0;

/// Default long window length in hours
pub const DEFAULT_LONG_WINDOW_HOURS: usize = 24;

/// Number of hourly points kept from a forecast
pub const FORECAST_HORIZON_HOURS: usize = 72;

/// Lowest valid headache score
pub const MIN_SCORE: u8 = 0;

/// Highest valid headache score
pub const MAX_SCORE: u8 = 5;

/// Headache-trigger likelihood for one forecast hour
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum RiskLevel {
    #[default]
    Low,
    Medium,
    High,
}

impl RiskLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Low => "Low",
            RiskLevel::Medium => "Medium",
            RiskLevel::High => "High",
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One risk level per forecast hour, parallel to the pressure sequence
pub type RiskSeries = Vec<RiskLevel>;

/// A single hourly pressure reading
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PressurePoint {
    /// Start of the hour (UTC)
    pub timestamp: DateTime<Utc>,
    /// Mean sea-level pressure (hPa)
    pub pressure_hpa: f64,
}

/// Time-ordered hourly pressure forecast for one location
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ForecastSeries {
    points: Vec<PressurePoint>,
    /// UTC offset of the forecast location, in seconds
    utc_offset_seconds: i32,
}

impl ForecastSeries {
    /// Build a series, checking timestamps are strictly increasing and
    /// pressures are finite.
    pub fn new(points: Vec<PressurePoint>, utc_offset: FixedOffset) -> Result<Self, TrackerError> {
        if let Some(i) = points.iter().position(|p| !p.pressure_hpa.is_finite()) {
            return Err(TrackerError::InvalidInput(format!(
                "pressure at index {} is not a finite number",
                i
            )));
        }

        if let Some(i) = points
            .windows(2)
            .position(|w| w[1].timestamp <= w[0].timestamp)
        {
            return Err(TrackerError::InvalidInput(format!(
                "timestamps must be strictly increasing (index {})",
                i + 1
            )));
        }

        Ok(Self {
            points,
            utc_offset_seconds: utc_offset.local_minus_utc(),
        })
    }

    pub fn points(&self) -> &[PressurePoint] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn pressures(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.pressure_hpa).collect()
    }

    pub fn timestamps(&self) -> Vec<DateTime<Utc>> {
        self.points.iter().map(|p| p.timestamp).collect()
    }

    /// First and last timestamp of the series
    pub fn span(&self) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
        match (self.points.first(), self.points.last()) {
            (Some(first), Some(last)) => Some((first.timestamp, last.timestamp)),
            _ => None,
        }
    }

    /// UTC offset of the forecast location
    pub fn utc_offset(&self) -> FixedOffset {
        FixedOffset::east_opt(self.utc_offset_seconds).unwrap_or_else(|| Utc.fix())
    }
}

/// Detection thresholds for the risk classifier
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Thresholds {
    /// Pressure change over the short window at or below which hours are High (negative)
    pub short_window_drop_hpa: f64,
    /// Short window length (hours)
    pub short_window_hours: usize,
    /// Pressure range over the long window at or above which hours are Medium
    pub long_window_range_hpa: f64,
    /// Long window length (hours)
    pub long_window_hours: usize,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            short_window_drop_hpa: DEFAULT_SHORT_WINDOW_DROP_HPA,
            short_window_hours: DEFAULT_SHORT_WINDOW_HOURS,
            long_window_range_hpa: DEFAULT_LONG_WINDOW_RANGE_HPA,
            long_window_hours: DEFAULT_LONG_WINDOW_HOURS,
        }
    }
}

impl Thresholds {
    /// Default thresholds with a user-chosen short-window drop.
    ///
    /// The drop must be a finite negative number; a non-negative value would
    /// turn the drop detector into a rise detector.
    pub fn with_short_window_drop(drop_hpa: f64) -> Result<Self, TrackerError> {
        validate_drop(drop_hpa)?;
        Ok(Self {
            short_window_drop_hpa: drop_hpa,
            ..Self::default()
        })
    }

    /// Check the configuration-level preconditions
    pub fn validate(&self) -> Result<(), TrackerError> {
        validate_drop(self.short_window_drop_hpa)?;
        if self.short_window_hours == 0 || self.long_window_hours == 0 {
            return Err(TrackerError::InvalidInput(
                "window lengths must be at least one hour".to_string(),
            ));
        }
        if !self.long_window_range_hpa.is_finite() || self.long_window_range_hpa <= 0.0 {
            return Err(TrackerError::InvalidInput(format!(
                "long window range must be positive, got {}",
                self.long_window_range_hpa
            )));
        }
        Ok(())
    }
}

fn validate_drop(drop_hpa: f64) -> Result<(), TrackerError> {
    if !drop_hpa.is_finite() || drop_hpa >= 0.0 {
        return Err(TrackerError::InvalidInput(format!(
            "short window drop must be negative, got {}",
            drop_hpa
        )));
    }
    Ok(())
}

/// One self-reported headache score
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeadacheRecord {
    /// When the score was saved
    #[serde(rename = "time", with = "iso_millis")]
    pub timestamp: DateTime<Utc>,
    /// Severity, 0 (none) to 5 (worst)
    pub score: u8,
}

impl HeadacheRecord {
    /// Create a record, rejecting scores outside 0..=5
    pub fn new(timestamp: DateTime<Utc>, score: u8) -> Result<Self, TrackerError> {
        validate_score(score)?;
        Ok(Self { timestamp, score })
    }
}

pub(crate) fn validate_score(score: u8) -> Result<(), TrackerError> {
    if !(MIN_SCORE..=MAX_SCORE).contains(&score) {
        return Err(TrackerError::InvalidInput(format!(
            "headache score must be between {} and {}, got {}",
            MIN_SCORE, MAX_SCORE, score
        )));
    }
    Ok(())
}

/// A headache score placed on the forecast time axis
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScorePoint {
    pub timestamp: DateTime<Utc>,
    pub score: u8,
}

/// Summary of current and near-future risk
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Insight {
    /// Risk of the immediate window
    pub current_risk: RiskLevel,
    /// First future hour classified High
    pub next_high_onset: Option<DateTime<Utc>>,
    /// Pressure range over the long window (hPa)
    pub range_24h: f64,
    /// Pressure change over the short window (hPa)
    pub delta_3h: f64,
}

/// Classification and insight for one forecast, threshold and instant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Analysis {
    /// One level per forecast hour
    pub levels: RiskSeries,
    /// First future hour classified High
    pub next_high_onset: Option<DateTime<Utc>>,
    pub insight: Insight,
}

/// Resolved location from the geocoder
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Place {
    pub latitude: f64,
    pub longitude: f64,
    pub label: String,
}

/// ISO-8601 with millisecond precision and a `Z` suffix, the persisted log format
mod iso_millis {
    use chrono::{DateTime, SecondsFormat, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(ts: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&ts.to_rfc3339_opts(SecondsFormat::Millis, true))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        DateTime::parse_from_rfc3339(&raw)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(serde::de::Error::custom)
    }
}
