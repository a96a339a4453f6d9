//! Open-Meteo forecast adapter
//!
//! Parses `hourly.pressure_msl` forecasts requested with `timezone=auto`.
//! Times arrive as local wall-clock strings and are resolved with the
//! payload's `utc_offset_seconds`.

use chrono::{FixedOffset, NaiveDateTime, TimeZone, Utc};
use log::debug;
use serde::Deserialize;

use crate::error::TrackerError;
use crate::types::{ForecastSeries, PressurePoint};

#[cfg(feature = "net")]
use super::ForecastProvider;

/// Default API base URL
pub const DEFAULT_BASE_URL: &str = "https://api.open-meteo.com";

/// Parse an Open-Meteo payload, keeping at most `horizon` hourly points.
pub fn parse_forecast(raw_json: &str, horizon: usize) -> Result<ForecastSeries, TrackerError> {
    let payload: OpenMeteoPayload = serde_json::from_str(raw_json)
        .map_err(|e| TrackerError::UpstreamError(format!("malformed forecast payload: {}", e)))?;

    let offset = FixedOffset::east_opt(payload.utc_offset_seconds).ok_or_else(|| {
        TrackerError::UpstreamError(format!(
            "invalid utc_offset_seconds {}",
            payload.utc_offset_seconds
        ))
    })?;

    let hourly = payload.hourly.unwrap_or_default();
    let times: Vec<&String> = hourly.time.iter().take(horizon).collect();
    let pressures: Vec<Option<f64>> = hourly.pressure_msl.iter().take(horizon).copied().collect();

    if times.is_empty() || times.len() != pressures.len() {
        return Err(TrackerError::UpstreamError(format!(
            "invalid weather data ({} times, {} pressures)",
            times.len(),
            pressures.len()
        )));
    }

    let mut points = Vec::with_capacity(times.len());
    for (i, (time, pressure)) in times.iter().zip(pressures).enumerate() {
        let local = parse_local_time(time).ok_or_else(|| {
            TrackerError::UpstreamError(format!("unparseable forecast time '{}'", time))
        })?;
        let pressure_hpa = pressure.ok_or_else(|| {
            TrackerError::UpstreamError(format!("missing pressure at index {}", i))
        })?;

        points.push(PressurePoint {
            timestamp: offset
                .from_local_datetime(&local)
                .single()
                .ok_or_else(|| {
                    TrackerError::UpstreamError(format!("ambiguous forecast time '{}'", time))
                })?
                .with_timezone(&Utc),
            pressure_hpa,
        });
    }

    debug!(
        "parsed {} forecast hours (offset {}s)",
        points.len(),
        payload.utc_offset_seconds
    );

    ForecastSeries::new(points, offset)
        .map_err(|e| TrackerError::UpstreamError(format!("invalid weather data: {}", e)))
}

fn parse_local_time(time_str: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(time_str, "%Y-%m-%dT%H:%M")
        .or_else(|_| NaiveDateTime::parse_from_str(time_str, "%Y-%m-%dT%H:%M:%S"))
        .ok()
}

/// Blocking Open-Meteo client
#[cfg(feature = "net")]
pub struct OpenMeteoProvider {
    client: reqwest::blocking::Client,
    base_url: String,
    horizon: usize,
}

#[cfg(feature = "net")]
impl OpenMeteoProvider {
    pub fn new(base_url: &str, user_agent: &str, horizon: usize) -> Result<Self, TrackerError> {
        let client = reqwest::blocking::Client::builder()
            .user_agent(user_agent)
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            horizon,
        })
    }
}

#[cfg(feature = "net")]
impl ForecastProvider for OpenMeteoProvider {
    fn fetch(&self, latitude: f64, longitude: f64) -> Result<ForecastSeries, TrackerError> {
        let url = format!("{}/v1/forecast", self.base_url);
        debug!("fetching forecast for {}, {}", latitude, longitude);

        let response = self
            .client
            .get(&url)
            .query(&[
                ("latitude", latitude.to_string()),
                ("longitude", longitude.to_string()),
                ("hourly", "pressure_msl".to_string()),
                ("forecast_days", "3".to_string()),
                ("timezone", "auto".to_string()),
            ])
            .send()?;

        let status = response.status();
        if !status.is_success() {
            return Err(TrackerError::UpstreamError(format!(
                "forecast API returned HTTP {}",
                status.as_u16()
            )));
        }

        let body = response.text()?;
        parse_forecast(&body, self.horizon)
    }
}

// Open-Meteo response structures

#[derive(Debug, Deserialize)]
struct OpenMeteoPayload {
    #[serde(default)]
    utc_offset_seconds: i32,
    hourly: Option<OpenMeteoHourly>,
}

#[derive(Debug, Default, Deserialize)]
struct OpenMeteoHourly {
    #[serde(default)]
    time: Vec<String>,
    #[serde(default)]
    pressure_msl: Vec<Option<f64>>,
}
