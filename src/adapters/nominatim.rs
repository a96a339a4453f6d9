//! Nominatim geocoding adapter

use serde::Deserialize;

use crate::error::TrackerError;
use crate::types::Place;

#[cfg(feature = "net")]
use super::Geocoder;
#[cfg(feature = "net")]
use log::debug;

/// Default API base URL
pub const DEFAULT_BASE_URL: &str = "https://nominatim.openstreetmap.org";

/// Parse a Nominatim `/search` response, taking the first match.
pub fn parse_place(raw_json: &str, place_name: &str) -> Result<Place, TrackerError> {
    let results: Vec<NominatimResult> = serde_json::from_str(raw_json)
        .map_err(|e| TrackerError::UpstreamError(format!("malformed geocoder payload: {}", e)))?;

    let first = results
        .into_iter()
        .next()
        .ok_or_else(|| TrackerError::NotFound(format!("no place matches '{}'", place_name)))?;

    let latitude = parse_coordinate(&first.lat, "lat")?;
    let longitude = parse_coordinate(&first.lon, "lon")?;

    Ok(Place {
        latitude,
        longitude,
        label: first.display_name.unwrap_or_else(|| place_name.to_string()),
    })
}

fn parse_coordinate(raw: &str, field: &str) -> Result<f64, TrackerError> {
    raw.trim()
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| TrackerError::UpstreamError(format!("invalid {} '{}'", field, raw)))
}

/// Blocking Nominatim client
#[cfg(feature = "net")]
pub struct NominatimGeocoder {
    client: reqwest::blocking::Client,
    base_url: String,
}

#[cfg(feature = "net")]
impl NominatimGeocoder {
    /// Nominatim's usage policy requires an identifying user agent
    pub fn new(base_url: &str, user_agent: &str) -> Result<Self, TrackerError> {
        let client = reqwest::blocking::Client::builder()
            .user_agent(user_agent)
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[cfg(feature = "net")]
impl Geocoder for NominatimGeocoder {
    fn resolve(&self, place_name: &str) -> Result<Place, TrackerError> {
        let url = format!("{}/search", self.base_url);
        debug!("geocoding '{}'", place_name);

        let response = self
            .client
            .get(&url)
            .query(&[("city", place_name), ("format", "json"), ("limit", "1")])
            .send()?;

        let status = response.status();
        if !status.is_success() {
            return Err(TrackerError::UpstreamError(format!(
                "geocoder returned HTTP {}",
                status.as_u16()
            )));
        }

        let body = response.text()?;
        parse_place(&body, place_name)
    }
}

#[derive(Debug, Deserialize)]
struct NominatimResult {
    lat: String,
    lon: String,
    display_name: Option<String>,
}
