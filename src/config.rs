//! User configuration
//!
//! Stored as JSON. Every field has a default, so a missing file or a partial
//! file both load cleanly.

use log::debug;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::adapters::{NOMINATIM_BASE_URL, OPEN_METEO_BASE_URL};
use crate::error::TrackerError;
use crate::types::{Place, Thresholds, DEFAULT_SHORT_WINDOW_DROP_HPA, FORECAST_HORIZON_HOURS};

/// Directory name under the platform data/config dirs
pub const APP_DIR: &str = "pressure-headache";

/// Tracker configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackerConfig {
    /// Short-window drop that marks hours High (hPa, negative)
    #[serde(default = "default_short_window_drop")]
    pub short_window_drop_hpa: f64,
    /// Hourly points kept from each forecast
    #[serde(default = "default_horizon_hours")]
    pub horizon_hours: usize,
    /// Location used when none is given
    #[serde(default = "default_location")]
    pub default_location: Place,
    /// Key-value store file holding the headache log
    #[serde(default = "default_data_file")]
    pub data_file: PathBuf,
    #[serde(default = "default_geocoder_url")]
    pub geocoder_url: String,
    #[serde(default = "default_forecast_url")]
    pub forecast_url: String,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            short_window_drop_hpa: default_short_window_drop(),
            horizon_hours: default_horizon_hours(),
            default_location: default_location(),
            data_file: default_data_file(),
            geocoder_url: default_geocoder_url(),
            forecast_url: default_forecast_url(),
            user_agent: default_user_agent(),
        }
    }
}

impl TrackerConfig {
    /// Load from `path`, falling back to defaults when the file does not exist
    pub fn load(path: &Path) -> Result<Self, TrackerError> {
        if !path.exists() {
            debug!("no config at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path).map_err(|e| {
            TrackerError::ConfigError(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_json(&content)
    }

    pub fn from_json(json: &str) -> Result<Self, TrackerError> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| TrackerError::ConfigError(format!("invalid config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json(&self) -> Result<String, TrackerError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<(), TrackerError> {
        self.thresholds()?;
        if self.horizon_hours == 0 {
            return Err(TrackerError::ConfigError(
                "horizon_hours must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Detection thresholds, with the configured drop validated
    pub fn thresholds(&self) -> Result<Thresholds, TrackerError> {
        Thresholds::with_short_window_drop(self.short_window_drop_hpa)
    }

    /// Default config file location
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(APP_DIR)
            .join("config.json")
    }
}

fn default_short_window_drop() -> f64 {
    DEFAULT_SHORT_WINDOW_DROP_HPA
}
fn default_horizon_hours() -> usize {
    FORECAST_HORIZON_HOURS
}
fn default_location() -> Place {
    Place {
        latitude: 35.6895,
        longitude: 139.6917,
        label: "東京".to_string(),
    }
}
fn default_data_file() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR)
        .join("store.json")
}
fn default_geocoder_url() -> String {
    NOMINATIM_BASE_URL.to_string()
}
fn default_forecast_url() -> String {
    OPEN_METEO_BASE_URL.to_string()
}
fn default_user_agent() -> String {
    format!("{}/{}", crate::PRODUCER_NAME, crate::VERSION)
}
