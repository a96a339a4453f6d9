//! CSV export
//!
//! One row per forecast hour with the highest headache score logged during
//! that hour. The document starts with a UTF-8 byte-order mark so spreadsheet
//! tools detect the encoding, and every field is double-quoted.

use chrono::Duration;
use csv::{QuoteStyle, Terminator, WriterBuilder};

use crate::error::TrackerError;
use crate::types::{ForecastSeries, ScorePoint};

/// Header row
pub const CSV_HEADER: [&str; 3] = ["日時", "気圧(hPa)", "頭痛スコア"];

/// UTF-8 byte-order mark
pub const UTF8_BOM: &str = "\u{feff}";

/// Build the export document.
///
/// `scores` may be in any order; scores outside the forecast hours are ignored.
pub fn export_csv(series: &ForecastSeries, scores: &[ScorePoint]) -> Result<String, TrackerError> {
    let offset = series.utc_offset();

    let mut writer = WriterBuilder::new()
        .quote_style(QuoteStyle::Always)
        .terminator(Terminator::CRLF)
        .from_writer(UTF8_BOM.as_bytes().to_vec());
    writer.write_record(CSV_HEADER)?;

    for point in series.points() {
        let hour_end = point.timestamp + Duration::hours(1);
        let score = scores
            .iter()
            .filter(|s| s.timestamp >= point.timestamp && s.timestamp < hour_end)
            .map(|s| s.score)
            .max();

        let when = point
            .timestamp
            .with_timezone(&offset)
            .format("%Y/%m/%d %H:%M")
            .to_string();
        let pressure = format!("{:.2}", point.pressure_hpa);
        let score = score.map(|s| s.to_string()).unwrap_or_default();

        writer.write_record([when, pressure, score])?;
    }

    let bytes = writer
        .into_inner()
        .map_err(|e| TrackerError::ExportError(e.to_string()))?;
    String::from_utf8(bytes).map_err(|e| TrackerError::ExportError(e.to_string()))
}
