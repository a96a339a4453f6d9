//! Risk classification
//!
//! Marks each forecast hour Low, Medium or High from two sliding windows:
//! - a short trailing window that fires on a rapid drop (High)
//! - a long window that fires on a wide overall swing (Medium)
//!
//! High always dominates Medium, which dominates Low.

use chrono::{DateTime, Utc};

use crate::error::TrackerError;
use crate::types::{ForecastSeries, RiskLevel, RiskSeries, Thresholds};

/// Classify every hour of a pressure sequence and find the next future High onset.
///
/// `pressures` and `timestamps` are parallel; a length mismatch is rejected.
/// Series shorter than a window simply produce no marks from that window.
pub fn classify(
    pressures: &[f64],
    timestamps: &[DateTime<Utc>],
    thresholds: &Thresholds,
    now: DateTime<Utc>,
) -> Result<(RiskSeries, Option<DateTime<Utc>>), TrackerError> {
    if pressures.len() != timestamps.len() {
        return Err(TrackerError::InvalidInput(format!(
            "pressure and timestamp sequences differ in length ({} vs {})",
            pressures.len(),
            timestamps.len()
        )));
    }

    Ok(classify_parallel(pressures, timestamps, thresholds, now))
}

/// Classify a validated forecast series
pub fn classify_series(
    series: &ForecastSeries,
    thresholds: &Thresholds,
    now: DateTime<Utc>,
) -> (RiskSeries, Option<DateTime<Utc>>) {
    classify_parallel(&series.pressures(), &series.timestamps(), thresholds, now)
}

fn classify_parallel(
    pressures: &[f64],
    timestamps: &[DateTime<Utc>],
    thresholds: &Thresholds,
    now: DateTime<Utc>,
) -> (RiskSeries, Option<DateTime<Utc>>) {
    let mut levels = vec![RiskLevel::Low; pressures.len()];

    mark_rapid_drops(pressures, thresholds, &mut levels);
    mark_wide_ranges(pressures, thresholds, &mut levels);

    let next_high = next_high_onset(&levels, timestamps, now);

    (levels, next_high)
}

/// High pass: any trailing short window whose change is at or below the drop
/// threshold marks all of its hours High.
fn mark_rapid_drops(pressures: &[f64], thresholds: &Thresholds, levels: &mut [RiskLevel]) {
    let window = thresholds.short_window_hours;
    if window == 0 {
        return;
    }

    for i in window..pressures.len() {
        if pressures[i] - pressures[i - window] <= thresholds.short_window_drop_hpa {
            for level in &mut levels[i - window..=i] {
                *level = RiskLevel::High;
            }
        }
    }
}

/// Medium pass: any long window whose max-min range reaches the range
/// threshold raises its Low hours to Medium. High hours are left alone.
fn mark_wide_ranges(pressures: &[f64], thresholds: &Thresholds, levels: &mut [RiskLevel]) {
    let window = thresholds.long_window_hours;
    if window == 0 || pressures.len() < window {
        return;
    }

    for end in (window - 1)..pressures.len() {
        let start = end + 1 - window;
        if pressure_range(&pressures[start..=end]) >= thresholds.long_window_range_hpa {
            for level in &mut levels[start..=end] {
                if *level == RiskLevel::Low {
                    *level = RiskLevel::Medium;
                }
            }
        }
    }
}

fn next_high_onset(
    levels: &[RiskLevel],
    timestamps: &[DateTime<Utc>],
    now: DateTime<Utc>,
) -> Option<DateTime<Utc>> {
    levels
        .iter()
        .zip(timestamps)
        .find(|(level, ts)| **level == RiskLevel::High && **ts > now)
        .map(|(_, ts)| *ts)
}

/// Max minus min of a slice; 0 for an empty slice
pub(crate) fn pressure_range(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let (lo, hi) = values
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| {
            (lo.min(v), hi.max(v))
        });
    hi - lo
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use pretty_assertions::assert_eq;
    use RiskLevel::{High, Low, Medium};

    fn hours(n: usize) -> Vec<DateTime<Utc>> {
        let start = Utc.with_ymd_and_hms(2024, 1, 15, 0, 0, 0).unwrap();
        (0..n).map(|i| start + Duration::hours(i as i64)).collect()
    }

    fn long_ago() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2000, 1, 1, 0, 0, 0).unwrap()
    }

    #[test]
    fn test_rapid_drop_marks_window_high() {
        let pressures = [1013.0, 1012.0, 1010.0, 1005.0, 1004.0, 1003.0];
        let (levels, _) =
            classify(&pressures, &hours(6), &Thresholds::default(), long_ago()).unwrap();

        // 1005 - 1013 = -8 fires at index 3; 1004 - 1012 = -8 fires at index 4;
        // 1003 - 1010 = -7 fires at index 5.
        assert_eq!(levels, vec![High; 6]);
    }

    #[test]
    fn test_single_drop_window() {
        // Only the index-3 window reaches -6.
        let pressures = [1013.0, 1012.0, 1010.0, 1005.0, 1007.0, 1006.0];
        let (levels, _) =
            classify(&pressures, &hours(6), &Thresholds::default(), long_ago()).unwrap();

        assert_eq!(levels, vec![High, High, High, High, Low, Low]);
    }

    #[test]
    fn test_wide_range_marks_medium() {
        let mut pressures = vec![1013.0; 24];
        pressures[23] = 1002.0;
        let (levels, next_high) =
            classify(&pressures, &hours(24), &Thresholds::default(), long_ago()).unwrap();

        assert_eq!(levels, vec![Medium; 24]);
        assert_eq!(next_high, None);
    }

    #[test]
    fn test_medium_never_downgrades_high() {
        // Rapid drop at hours 20..=23 inside a 24h window that also spans > 10 hPa.
        let mut pressures = vec![1015.0; 30];
        pressures[21] = 1012.0;
        pressures[22] = 1008.0;
        pressures[23] = 1004.0;
        for p in pressures.iter_mut().skip(24) {
            *p = 1004.0;
        }
        let (levels, _) =
            classify(&pressures, &hours(30), &Thresholds::default(), long_ago()).unwrap();

        for i in 20..=23 {
            assert_eq!(levels[i], High, "index {} should stay High", i);
        }
        assert_eq!(levels[0], Medium);
        assert_eq!(levels[29], Medium);
    }

    #[test]
    fn test_flat_series_is_all_low() {
        let pressures = vec![1013.0; 72];
        let (levels, next_high) =
            classify(&pressures, &hours(72), &Thresholds::default(), long_ago()).unwrap();

        assert_eq!(levels.len(), 72);
        assert!(levels.iter().all(|l| *l == Low));
        assert_eq!(next_high, None);
    }

    #[test]
    fn test_next_high_skips_past_hours() {
        let pressures = [1013.0, 1012.0, 1010.0, 1005.0, 1007.0, 1008.0, 1008.0, 1001.0];
        let ts = hours(8);
        // Window 0..=3 is High (past), window 4..=7 is High (1001 - 1007 = -6).
        let now = ts[3];
        let (levels, next_high) = classify(&pressures, &ts, &Thresholds::default(), now).unwrap();

        assert_eq!(levels[3], High);
        assert_eq!(levels[4], High);
        assert_eq!(next_high, Some(ts[4]));
    }

    #[test]
    fn test_next_high_is_strictly_after_now() {
        let pressures = [1013.0, 1012.0, 1010.0, 1005.0];
        let ts = hours(4);
        let (_, next_high) = classify(&pressures, &ts, &Thresholds::default(), ts[3]).unwrap();
        assert_eq!(next_high, None);
    }

    #[test]
    fn test_short_series_has_no_marks() {
        let (levels, next_high) = classify(
            &[1013.0, 1000.0, 990.0],
            &hours(3),
            &Thresholds::default(),
            long_ago(),
        )
        .unwrap();
        assert_eq!(levels, vec![Low; 3]);
        assert_eq!(next_high, None);

        let (levels, _) = classify(&[], &[], &Thresholds::default(), long_ago()).unwrap();
        assert!(levels.is_empty());
    }

    #[test]
    fn test_length_mismatch_rejected() {
        let result = classify(&[1013.0, 1012.0], &hours(3), &Thresholds::default(), long_ago());
        assert!(matches!(result, Err(TrackerError::InvalidInput(_))));
    }

    #[test]
    fn test_zero_windows_do_not_panic() {
        let thresholds = Thresholds {
            short_window_hours: 0,
            long_window_hours: 0,
            ..Thresholds::default()
        };
        let (levels, _) =
            classify(&[1013.0, 990.0], &hours(2), &thresholds, long_ago()).unwrap();
        assert_eq!(levels, vec![Low, Low]);
    }

    #[test]
    fn test_classification_is_deterministic() {
        let pressures: Vec<f64> = (0..72)
            .map(|i| 1013.0 + 8.0 * ((i as f64) / 6.0).sin())
            .collect();
        let ts = hours(72);
        let now = ts[10];
        let first = classify(&pressures, &ts, &Thresholds::default(), now).unwrap();
        let second = classify(&pressures, &ts, &Thresholds::default(), now).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.0.len(), pressures.len());
    }

    #[test]
    fn test_classify_series_matches_slices() {
        let pressures = [1013.0, 1012.0, 1010.0, 1005.0, 1007.0, 1006.0];
        let ts = hours(6);
        let points = pressures
            .iter()
            .zip(&ts)
            .map(|(&p, &t)| crate::types::PressurePoint {
                timestamp: t,
                pressure_hpa: p,
            })
            .collect();
        let series =
            ForecastSeries::new(points, chrono::FixedOffset::east_opt(0).unwrap()).unwrap();

        let from_series = classify_series(&series, &Thresholds::default(), long_ago());
        let from_slices = classify(&pressures, &ts, &Thresholds::default(), long_ago()).unwrap();
        assert_eq!(from_series, from_slices);
    }

    #[test]
    fn test_pressure_range() {
        assert_eq!(pressure_range(&[]), 0.0);
        assert_eq!(pressure_range(&[1010.0]), 0.0);
        assert_eq!(pressure_range(&[1010.0, 1002.5, 1013.0]), 10.5);
    }
}
