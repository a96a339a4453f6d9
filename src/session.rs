//! Forecast session
//!
//! Owns the current forecast and its analysis. Refreshes are tagged with a
//! generation number when they start; a result is applied only if no newer
//! refresh has started since, so a slow response can never overwrite a
//! fresher one. A failed refresh leaves the previous forecast in place.

use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use serde::Serialize;
use uuid::Uuid;

use crate::error::TrackerError;
use crate::pipeline::analyze;
use crate::types::{Analysis, ForecastSeries, Thresholds};

/// Handle for one in-flight refresh
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshTicket {
    generation: u64,
    label: String,
}

impl RefreshTicket {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn label(&self) -> &str {
        &self.label
    }
}

/// What happened to a completed refresh
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// The result replaced the session's forecast
    Applied,
    /// A newer refresh had started; the result was dropped
    Stale,
}

/// The forecast currently shown, with its analysis
#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    /// Unique per applied forecast
    pub session_id: Uuid,
    /// Place label the forecast was requested for
    pub label: String,
    pub forecast: ForecastSeries,
    pub analysis: Analysis,
    /// When the forecast was applied
    pub applied_at: DateTime<Utc>,
}

/// Session state for one active forecast query
#[derive(Debug)]
pub struct ForecastSession {
    thresholds: Thresholds,
    latest_generation: u64,
    current: Option<SessionSnapshot>,
}

impl Default for ForecastSession {
    fn default() -> Self {
        Self::new(Thresholds::default())
    }
}

impl ForecastSession {
    pub fn new(thresholds: Thresholds) -> Self {
        Self {
            thresholds,
            latest_generation: 0,
            current: None,
        }
    }

    /// Start a refresh; any ticket issued earlier becomes stale
    pub fn begin_refresh(&mut self, label: impl Into<String>) -> RefreshTicket {
        self.latest_generation += 1;
        let ticket = RefreshTicket {
            generation: self.latest_generation,
            label: label.into(),
        };
        debug!("refresh #{} started for '{}'", ticket.generation, ticket.label);
        ticket
    }

    /// Apply the result of a refresh.
    ///
    /// Stale tickets are dropped whether they succeeded or failed. A failure
    /// for the current ticket is returned and the previous forecast is kept.
    pub fn complete(
        &mut self,
        ticket: RefreshTicket,
        result: Result<ForecastSeries, TrackerError>,
        now: DateTime<Utc>,
    ) -> Result<RefreshOutcome, TrackerError> {
        if ticket.generation != self.latest_generation {
            warn!(
                "dropping stale refresh #{} for '{}' (latest is #{})",
                ticket.generation, ticket.label, self.latest_generation
            );
            return Ok(RefreshOutcome::Stale);
        }

        let forecast = match result {
            Ok(forecast) => forecast,
            Err(e) => {
                warn!("refresh #{} for '{}' failed: {}", ticket.generation, ticket.label, e);
                return Err(e);
            }
        };

        let analysis = analyze(&forecast, &self.thresholds, now);
        let snapshot = SessionSnapshot {
            session_id: Uuid::new_v4(),
            label: ticket.label,
            forecast,
            analysis,
            applied_at: now,
        };

        info!(
            "applied forecast for '{}' ({} hours, current risk {})",
            snapshot.label,
            snapshot.forecast.len(),
            snapshot.analysis.insight.current_risk
        );
        self.current = Some(snapshot);

        Ok(RefreshOutcome::Applied)
    }

    /// Change the short-window drop threshold and re-analyze the current
    /// forecast locally.
    pub fn set_short_window_drop(
        &mut self,
        drop_hpa: f64,
        now: DateTime<Utc>,
    ) -> Result<Option<&Analysis>, TrackerError> {
        let thresholds = Thresholds {
            short_window_drop_hpa: drop_hpa,
            ..self.thresholds
        };
        thresholds.validate()?;
        self.thresholds = thresholds;

        self.reanalyze(now);
        Ok(self.current.as_ref().map(|s| &s.analysis))
    }

    /// Recompute the analysis of the current forecast for a new instant
    pub fn reanalyze(&mut self, now: DateTime<Utc>) {
        if let Some(snapshot) = self.current.as_mut() {
            snapshot.analysis = analyze(&snapshot.forecast, &self.thresholds, now);
        }
    }

    pub fn current(&self) -> Option<&SessionSnapshot> {
        self.current.as_ref()
    }

    pub fn thresholds(&self) -> &Thresholds {
        &self.thresholds
    }

    /// Generation of the most recently started refresh
    pub fn latest_generation(&self) -> u64 {
        self.latest_generation
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{PressurePoint, RiskLevel};
    use chrono::{Duration, FixedOffset, TimeZone};

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 15, 0, 0, 0).unwrap()
    }

    fn series(pressures: &[f64]) -> ForecastSeries {
        let points = pressures
            .iter()
            .enumerate()
            .map(|(i, &p)| PressurePoint {
                timestamp: start() + Duration::hours(i as i64),
                pressure_hpa: p,
            })
            .collect();
        ForecastSeries::new(points, FixedOffset::east_opt(9 * 3600).unwrap()).unwrap()
    }

    fn falling() -> ForecastSeries {
        series(&[1013.0, 1012.0, 1010.0, 1008.0, 1007.0, 1006.0])
    }

    fn flat() -> ForecastSeries {
        series(&[1013.0; 6])
    }

    #[test]
    fn test_refresh_applies_latest() {
        let mut session = ForecastSession::default();
        let ticket = session.begin_refresh("東京");

        let outcome = session.complete(ticket, Ok(flat()), start()).unwrap();

        assert_eq!(outcome, RefreshOutcome::Applied);
        let current = session.current().unwrap();
        assert_eq!(current.label, "東京");
        assert_eq!(current.analysis.levels.len(), 6);
    }

    #[test]
    fn test_stale_refresh_is_dropped() {
        let mut session = ForecastSession::default();
        let slow = session.begin_refresh("Osaka");
        let fast = session.begin_refresh("Sapporo");

        assert_eq!(
            session.complete(fast, Ok(flat()), start()).unwrap(),
            RefreshOutcome::Applied
        );
        assert_eq!(
            session.complete(slow, Ok(falling()), start()).unwrap(),
            RefreshOutcome::Stale
        );
        assert_eq!(session.current().unwrap().label, "Sapporo");
        assert_eq!(session.latest_generation(), 2);
    }

    #[test]
    fn test_stale_failure_is_dropped_silently() {
        let mut session = ForecastSession::default();
        let slow = session.begin_refresh("Osaka");
        let _fast = session.begin_refresh("Sapporo");

        let outcome = session
            .complete(
                slow,
                Err(TrackerError::UpstreamError("HTTP 500".to_string())),
                start(),
            )
            .unwrap();
        assert_eq!(outcome, RefreshOutcome::Stale);
    }

    #[test]
    fn test_failed_refresh_keeps_previous_forecast() {
        let mut session = ForecastSession::default();
        let first = session.begin_refresh("東京");
        session.complete(first, Ok(flat()), start()).unwrap();
        let applied_id = session.current().unwrap().session_id;

        let second = session.begin_refresh("東京");
        let result = session.complete(
            second,
            Err(TrackerError::UpstreamError("HTTP 503".to_string())),
            start(),
        );

        assert!(matches!(result, Err(TrackerError::UpstreamError(_))));
        assert_eq!(session.current().unwrap().session_id, applied_id);
    }

    #[test]
    fn test_threshold_change_reanalyzes_locally() {
        let mut session = ForecastSession::default();
        let ticket = session.begin_refresh("東京");
        session.complete(ticket, Ok(falling()), start()).unwrap();

        // 1008 - 1013 = -5 does not reach the default -6.
        assert_eq!(
            session.current().unwrap().analysis.insight.current_risk,
            RiskLevel::Low
        );

        let analysis = session.set_short_window_drop(-4.0, start()).unwrap().unwrap();
        assert_eq!(analysis.insight.current_risk, RiskLevel::High);
        assert_eq!(analysis.levels[0], RiskLevel::High);
        assert_eq!(session.latest_generation(), 1);
    }

    #[test]
    fn test_invalid_threshold_is_rejected() {
        let mut session = ForecastSession::default();
        let result = session.set_short_window_drop(2.0, start());
        assert!(matches!(result, Err(TrackerError::InvalidInput(_))));
        assert_eq!(session.thresholds().short_window_drop_hpa, -6.0);
    }

    #[test]
    fn test_threshold_without_forecast() {
        let mut session = ForecastSession::default();
        assert!(session.set_short_window_drop(-3.0, start()).unwrap().is_none());
        assert_eq!(session.thresholds().short_window_drop_hpa, -3.0);
    }
}
