//! Pipeline orchestration
//!
//! This module provides the public API of the engine. It runs a forecast
//! through classification and insight composition, and ties the network
//! collaborators, the forecast session and the headache log together.

use chrono::{DateTime, Duration, Utc};
use log::info;

use crate::adapters::{ForecastProvider, Geocoder};
use crate::classifier::classify_series;
use crate::error::TrackerError;
use crate::export::export_csv;
use crate::insight::InsightComposer;
use crate::kv::KvStore;
use crate::log_store::HeadacheLog;
use crate::session::{ForecastSession, RefreshOutcome, SessionSnapshot};
use crate::types::{Analysis, ForecastSeries, HeadacheRecord, Place, ScorePoint, Thresholds};

/// Classify a forecast and compose its insight (stateless, one-shot).
///
/// # Arguments
/// * `series` - Hourly pressure forecast
/// * `thresholds` - Detection thresholds
/// * `now` - Instant separating past hours from future ones
///
/// # Example
/// ```ignore
/// let analysis = analyze(&series, &Thresholds::default(), Utc::now());
/// println!("{}", analysis.insight.summary(&series));
/// ```
pub fn analyze(series: &ForecastSeries, thresholds: &Thresholds, now: DateTime<Utc>) -> Analysis {
    // Stage 1: Per-hour risk levels and next onset
    let (levels, next_high_onset) = classify_series(series, thresholds, now);

    // Stage 2: Summary of the leading windows
    let insight = InsightComposer::compose(
        &series.pressures(),
        &series.timestamps(),
        &levels,
        next_high_onset,
        thresholds,
    );

    Analysis {
        levels,
        next_high_onset,
        insight,
    }
}

/// Stateful tracker: one forecast session plus the persistent headache log.
///
/// Network collaborators are injected so the tracker can run against fakes.
pub struct Tracker<S: KvStore> {
    geocoder: Box<dyn Geocoder>,
    provider: Box<dyn ForecastProvider>,
    session: ForecastSession,
    log: HeadacheLog<S>,
}

impl<S: KvStore> Tracker<S> {
    pub fn new(
        geocoder: Box<dyn Geocoder>,
        provider: Box<dyn ForecastProvider>,
        log: HeadacheLog<S>,
        thresholds: Thresholds,
    ) -> Self {
        Self {
            geocoder,
            provider,
            session: ForecastSession::new(thresholds),
            log,
        }
    }

    /// Geocode a place name and refresh the forecast for it.
    ///
    /// A geocoding miss returns `NotFound` and leaves the session untouched.
    pub fn refresh_place(
        &mut self,
        place_name: &str,
        now: DateTime<Utc>,
    ) -> Result<RefreshOutcome, TrackerError> {
        let Place {
            latitude,
            longitude,
            label,
        } = self.geocoder.resolve(place_name)?;
        info!("resolved '{}' to {} ({}, {})", place_name, label, latitude, longitude);

        self.refresh_coordinates(latitude, longitude, &label, now)
    }

    /// Refresh the forecast for a coordinate.
    ///
    /// The fetch is blocking, so the ticket issued here is always the newest
    /// when it completes. Callers that run fetches concurrently should drive
    /// `ForecastSession::begin_refresh` and `ForecastSession::complete`
    /// themselves so late results are dropped.
    pub fn refresh_coordinates(
        &mut self,
        latitude: f64,
        longitude: f64,
        label: &str,
        now: DateTime<Utc>,
    ) -> Result<RefreshOutcome, TrackerError> {
        let ticket = self.session.begin_refresh(label);
        let result = self.provider.fetch(latitude, longitude);
        self.session.complete(ticket, result, now)
    }

    /// Change the drop threshold; only local data is reprocessed
    pub fn set_short_window_drop(
        &mut self,
        drop_hpa: f64,
        now: DateTime<Utc>,
    ) -> Result<Option<&Analysis>, TrackerError> {
        self.session.set_short_window_drop(drop_hpa, now)
    }

    /// Save a headache score at the current instant
    pub fn record_score(&mut self, score: u8) -> Result<HeadacheRecord, TrackerError> {
        self.log.append(score)
    }

    /// Most recent records, newest first
    pub fn history(&self, limit: usize) -> Result<Vec<HeadacheRecord>, TrackerError> {
        self.log.recent(limit)
    }

    /// Delete every headache record
    pub fn clear_log(&mut self) -> Result<(), TrackerError> {
        self.log.clear()
    }

    /// Logged scores inside the current forecast's span
    pub fn overlay_points(&self) -> Result<Vec<ScorePoint>, TrackerError> {
        match self.session.current() {
            Some(snapshot) => self.log.overlay_points(&snapshot.forecast),
            None => Ok(Vec::new()),
        }
    }

    /// CSV export of the current forecast with logged scores
    pub fn export_csv(&self) -> Result<String, TrackerError> {
        let snapshot = self
            .session
            .current()
            .ok_or_else(|| TrackerError::InvalidInput("no forecast loaded".to_string()))?;
        export_forecast(&snapshot.forecast, &self.log)
    }

    pub fn current(&self) -> Option<&SessionSnapshot> {
        self.session.current()
    }

    pub fn session(&self) -> &ForecastSession {
        &self.session
    }

    pub fn log(&self) -> &HeadacheLog<S> {
        &self.log
    }
}

/// Export a forecast with the scores logged during its hours
pub fn export_forecast<S: KvStore>(
    series: &ForecastSeries,
    log: &HeadacheLog<S>,
) -> Result<String, TrackerError> {
    let scores = match series.span() {
        // Include the whole final hour.
        Some((start, end)) => log.points_within(start, end + Duration::hours(1))?,
        None => Vec::new(),
    };
    export_csv(series, &scores)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::MemoryStore;
    use crate::types::{PressurePoint, RiskLevel};
    use chrono::{FixedOffset, TimeZone};
    use std::cell::Cell;
    use std::rc::Rc;

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

    struct FakeGeocoder;

    impl Geocoder for FakeGeocoder {
        fn resolve(&self, place_name: &str) -> Result<Place, TrackerError> {
            if place_name == "Tokyo" {
                Ok(Place {
                    latitude: 35.6895,
                    longitude: 139.6917,
                    label: "東京都, 日本".to_string(),
                })
            } else {
                Err(TrackerError::NotFound(place_name.to_string()))
            }
        }
    }

    /// Serves a falling forecast, or fails when `fail` is set
    struct FakeProvider {
        fail: Rc<Cell<bool>>,
        calls: Rc<Cell<usize>>,
    }

    impl ForecastProvider for FakeProvider {
        fn fetch(&self, _latitude: f64, _longitude: f64) -> Result<ForecastSeries, TrackerError> {
            self.calls.set(self.calls.get() + 1);
            if self.fail.get() {
                return Err(TrackerError::UpstreamError("API 500".to_string()));
            }
            Ok(series(&[1013.0, 1012.0, 1010.0, 1005.0, 1006.0, 1006.0]))
        }
    }

    fn tracker() -> (Tracker<MemoryStore>, Rc<Cell<bool>>, Rc<Cell<usize>>) {
        let fail = Rc::new(Cell::new(false));
        let calls = Rc::new(Cell::new(0));
        let provider = FakeProvider {
            fail: Rc::clone(&fail),
            calls: Rc::clone(&calls),
        };
        let tracker = Tracker::new(
            Box::new(FakeGeocoder),
            Box::new(provider),
            HeadacheLog::new(MemoryStore::new()),
            Thresholds::default(),
        );
        (tracker, fail, calls)
    }

    #[test]
    fn test_analyze() {
        let analysis = analyze(
            &series(&[1013.0, 1012.0, 1010.0, 1005.0, 1004.0, 1003.0]),
            &Thresholds::default(),
            start(),
        );

        assert_eq!(analysis.levels.len(), 6);
        assert_eq!(analysis.insight.current_risk, RiskLevel::High);
        assert_eq!(analysis.next_high_onset, Some(start() + Duration::hours(1)));
        assert_eq!(analysis.insight.next_high_onset, analysis.next_high_onset);
    }

    #[test]
    fn test_refresh_place() {
        let (mut tracker, _, calls) = tracker();
        let outcome = tracker.refresh_place("Tokyo", start()).unwrap();

        assert_eq!(outcome, RefreshOutcome::Applied);
        assert_eq!(calls.get(), 1);
        let current = tracker.current().unwrap();
        assert_eq!(current.label, "東京都, 日本");
        assert_eq!(current.analysis.insight.current_risk, RiskLevel::High);
    }

    #[test]
    fn test_sequential_refreshes_are_never_stale() {
        let (mut tracker, _, _) = tracker();

        let first = tracker.refresh_coordinates(35.0, 139.0, "here", start()).unwrap();
        let second = tracker.refresh_place("Tokyo", start()).unwrap();

        assert_eq!(first, RefreshOutcome::Applied);
        assert_eq!(second, RefreshOutcome::Applied);
        assert_eq!(tracker.session().latest_generation(), 2);
        assert_eq!(tracker.current().unwrap().label, "東京都, 日本");
    }

    #[test]
    fn test_unknown_place_leaves_session_untouched() {
        let (mut tracker, _, calls) = tracker();
        let result = tracker.refresh_place("Atlantis", start());

        assert!(matches!(result, Err(TrackerError::NotFound(_))));
        assert_eq!(calls.get(), 0);
        assert!(tracker.current().is_none());
    }

    #[test]
    fn test_upstream_failure_keeps_stale_forecast() {
        let (mut tracker, fail, _) = tracker();
        tracker.refresh_coordinates(35.0, 139.0, "here", start()).unwrap();

        fail.set(true);
        let result = tracker.refresh_coordinates(35.0, 139.0, "here", start());

        assert!(matches!(result, Err(TrackerError::UpstreamError(_))));
        assert!(tracker.current().is_some());
    }

    #[test]
    fn test_threshold_change_does_not_fetch() {
        let (mut tracker, _, calls) = tracker();
        tracker.refresh_coordinates(35.0, 139.0, "here", start()).unwrap();

        let analysis = tracker.set_short_window_drop(-10.0, start()).unwrap().unwrap();
        assert_eq!(analysis.insight.current_risk, RiskLevel::Low);
        assert!(analysis.levels.iter().all(|l| *l == RiskLevel::Low));
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn test_overlay_and_export() {
        let (mut tracker, _, _) = tracker();
        assert!(tracker.overlay_points().unwrap().is_empty());
        assert!(matches!(
            tracker.export_csv(),
            Err(TrackerError::InvalidInput(_))
        ));

        tracker.refresh_coordinates(35.0, 139.0, "here", start()).unwrap();
        let record = tracker.record_score(3).unwrap();

        assert_eq!(tracker.history(10).unwrap(), vec![record]);
        // The fake forecast is in January 2024, the record is stamped now.
        assert!(tracker.overlay_points().unwrap().is_empty());

        let csv = tracker.export_csv().unwrap();
        assert_eq!(csv.lines().count(), 7);

        tracker.clear_log().unwrap();
        assert!(tracker.history(10).unwrap().is_empty());
    }

    #[test]
    fn test_export_forecast_includes_final_hour() {
        let mut log = HeadacheLog::new(MemoryStore::new());
        let forecast = series(&[1010.0, 1009.0]);
        log.append_at(start() + Duration::minutes(90), 5).unwrap();

        let csv = export_forecast(&forecast, &log).unwrap();
        let last = csv.lines().last().unwrap();
        assert_eq!(last, "\"2024/01/15 10:00\",\"1009.00\",\"5\"");
    }
}
