//! pressure-headache - On-device engine correlating barometric pressure
//! forecasts with self-reported headaches
//!
//! A forecast flows through a deterministic pipeline: adapter → risk
//! classification → insight composition. A local append-only log of headache
//! scores supplies overlay points and CSV export.
//!
//! ## Modules
//!
//! - **Classifier / Insight**: per-hour Low/Medium/High risk and the summary
//! - **Headache log**: append-only score log over a key-value store
//! - **Session / Tracker**: current forecast, refresh generations, threshold changes

pub mod adapters;
pub mod classifier;
pub mod config;
pub mod error;
pub mod export;
pub mod insight;
pub mod kv;
pub mod log_store;
pub mod pipeline;
pub mod session;
pub mod types;

pub use classifier::{classify, classify_series};
pub use config::TrackerConfig;
pub use error::TrackerError;
pub use insight::InsightComposer;
pub use kv::{JsonFileStore, KvStore, MemoryStore};
pub use log_store::HeadacheLog;
pub use pipeline::{analyze, Tracker};
pub use session::{ForecastSession, RefreshOutcome};
pub use types::{
    Analysis, ForecastSeries, HeadacheRecord, Insight, Place, PressurePoint, RiskLevel,
    RiskSeries, Thresholds,
};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Producer name used in the HTTP user agent
pub const PRODUCER_NAME: &str = "pressure-headache";
