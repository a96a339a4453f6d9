//! Forecast and geocoding adapters
//!
//! This module parses third-party API payloads into the crate's types and,
//! with the `net` feature, fetches them over HTTP.

mod nominatim;
mod open_meteo;

pub use nominatim::{parse_place, DEFAULT_BASE_URL as NOMINATIM_BASE_URL};
pub use open_meteo::{parse_forecast, DEFAULT_BASE_URL as OPEN_METEO_BASE_URL};

#[cfg(feature = "net")]
pub use nominatim::NominatimGeocoder;
#[cfg(feature = "net")]
pub use open_meteo::OpenMeteoProvider;

use crate::error::TrackerError;
use crate::types::{ForecastSeries, Place};

/// Resolves a place name to coordinates
pub trait Geocoder {
    /// Look up a place; `NotFound` when nothing matches
    fn resolve(&self, place_name: &str) -> Result<Place, TrackerError>;
}

/// Supplies hourly pressure forecasts
pub trait ForecastProvider {
    /// Fetch the forecast for a coordinate; `UpstreamError` on any failure
    fn fetch(&self, latitude: f64, longitude: f64) -> Result<ForecastSeries, TrackerError>;
}
