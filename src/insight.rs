//! Insight composition
//!
//! Derives the human-facing summary from a forecast and its classification:
//! - current risk from the immediate short and long windows
//! - next High onset
//! - long-window range and short-window change

use chrono::{DateTime, FixedOffset, Utc};

use crate::classifier::pressure_range;
use crate::types::{ForecastSeries, Insight, RiskLevel, Thresholds};

/// Insight composer
pub struct InsightComposer;

impl InsightComposer {
    /// Compose an insight from a classified forecast.
    ///
    /// `current_risk` is re-derived from the leading windows of the forecast
    /// rather than read from `levels`, which flags any window in the horizon.
    /// `timestamps` and `levels` are the classifier's output for the same
    /// forecast; they are accepted so every stage shares one call shape, but
    /// only the pressures and the onset feed the summary today.
    pub fn compose(
        pressures: &[f64],
        _timestamps: &[DateTime<Utc>],
        _levels: &[RiskLevel],
        next_high_onset: Option<DateTime<Utc>>,
        thresholds: &Thresholds,
    ) -> Insight {
        let range_24h = compute_leading_range(pressures, thresholds.long_window_hours);
        let delta_3h = compute_leading_delta(pressures, thresholds.short_window_hours);

        let current_risk = if delta_3h <= thresholds.short_window_drop_hpa {
            RiskLevel::High
        } else if range_24h >= thresholds.long_window_range_hpa {
            RiskLevel::Medium
        } else {
            RiskLevel::Low
        };

        Insight {
            current_risk,
            next_high_onset,
            range_24h,
            delta_3h,
        }
    }
}

/// Range over the first `hours` points (or all of them if fewer exist)
fn compute_leading_range(pressures: &[f64], hours: usize) -> f64 {
    let end = hours.min(pressures.len());
    pressure_range(&pressures[..end])
}

/// Change across the first short window; 0 when the series is too short
fn compute_leading_delta(pressures: &[f64], hours: usize) -> f64 {
    match (pressures.first(), pressures.get(hours)) {
        (Some(first), Some(last)) if hours > 0 => last - first,
        _ => 0.0,
    }
}

impl Insight {
    /// Render the three-line summary shown next to the chart.
    ///
    /// Times are shown in the forecast location's offset; the no-onset line
    /// names the forecast's own length in hours.
    pub fn summary(&self, series: &ForecastSeries) -> String {
        let next_high = match self.next_high_onset {
            Some(onset) => format_hour(onset, series.utc_offset()),
            None => format!("なし（{}時間以内）", series.len()),
        };

        format!(
            "現在リスク：{}\n次のHigh：{}\n24h変動幅：{:.1} hPa / 3h変化：{:.1} hPa",
            self.current_risk, next_high, self.range_24h, self.delta_3h
        )
    }
}

/// `M/D HH:00` in the given offset
pub fn format_hour(ts: DateTime<Utc>, offset: FixedOffset) -> String {
    ts.with_timezone(&offset).format("%-m/%-d %H:00").to_string()
}
