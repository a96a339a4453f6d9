//! zutsu - command-line front end for pressure-headache
//!
//! Commands:
//! - forecast: Fetch a forecast and show the risk strip and insight
//! - analyze: Same, on a saved Open-Meteo payload (offline)
//! - log: Save a headache score
//! - history: List saved scores, newest first
//! - clear: Delete every saved score
//! - export: Write the forecast and scores as CSV
//! - doctor: Diagnose configuration and storage

use chrono::{DateTime, FixedOffset, Local, Utc};
use clap::{Args, Parser, Subcommand};
use log::debug;
use serde::Serialize;
use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use pressure_headache::adapters::{parse_forecast, NominatimGeocoder, OpenMeteoProvider};
use pressure_headache::insight::format_hour;
use pressure_headache::log_store::{HeadacheLog, DEFAULT_HISTORY_LIMIT};
use pressure_headache::pipeline::{analyze, export_forecast, Tracker};
use pressure_headache::types::{Analysis, ForecastSeries, HeadacheRecord, RiskLevel, ScorePoint};
use pressure_headache::{
    JsonFileStore, Thresholds, TrackerConfig, TrackerError, PRODUCER_NAME, VERSION,
};

/// zutsu - barometric pressure headache tracker
#[derive(Parser)]
#[command(name = "zutsu")]
#[command(version = VERSION)]
#[command(about = "Anticipate pressure-drop headaches", long_about = None)]
struct Cli {
    /// Configuration file (JSON)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch a forecast and show risk and insight
    Forecast {
        #[command(flatten)]
        location: LocationArgs,

        /// Short-window drop threshold in hPa (negative)
        #[arg(long, allow_hyphen_values = true)]
        threshold: Option<f64>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Analyze a saved Open-Meteo payload
    Analyze {
        /// Input file path (use - for stdin)
        #[arg(short, long)]
        input: PathBuf,

        /// Short-window drop threshold in hPa (negative)
        #[arg(long, allow_hyphen_values = true)]
        threshold: Option<f64>,

        /// Reference instant (RFC 3339); defaults to now
        #[arg(long)]
        now: Option<String>,

        /// Label shown in the report
        #[arg(long, default_value = "input")]
        label: String,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Save a headache score (0-5)
    Log {
        score: u8,
    },

    /// List saved scores, newest first
    History {
        /// Number of records to show
        #[arg(long, default_value_t = DEFAULT_HISTORY_LIMIT)]
        limit: usize,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Delete every saved score
    Clear {
        /// Confirm deletion
        #[arg(long)]
        yes: bool,
    },

    /// Export the forecast and scores as CSV
    Export {
        /// Saved Open-Meteo payload instead of fetching
        #[arg(short, long, conflicts_with_all = ["city", "lat", "lon"])]
        input: Option<PathBuf>,

        #[command(flatten)]
        location: LocationArgs,

        /// Output file path (use - for stdout)
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Diagnose configuration and storage
    Doctor {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Args)]
struct LocationArgs {
    /// Place name to geocode
    #[arg(long, conflicts_with_all = ["lat", "lon"])]
    city: Option<String>,

    /// Latitude
    #[arg(long, requires = "lon", allow_hyphen_values = true)]
    lat: Option<f64>,

    /// Longitude
    #[arg(long, requires = "lat", allow_hyphen_values = true)]
    lon: Option<f64>,
}

fn main() -> ExitCode {
    env_logger::init();
    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!(
                "{}",
                serde_json::to_string(&CliError::from(e))
                    .unwrap_or_else(|_| "Unknown error".to_string())
            );
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), ZutsuCliError> {
    let config_path = cli.config.unwrap_or_else(TrackerConfig::default_path);

    match cli.command {
        Commands::Forecast {
            location,
            threshold,
            json,
        } => {
            let config = TrackerConfig::load(&config_path)?;
            cmd_forecast(&config, &location, threshold, json)
        }

        Commands::Analyze {
            input,
            threshold,
            now,
            label,
            json,
        } => {
            let config = TrackerConfig::load(&config_path)?;
            cmd_analyze(&config, &input, threshold, now.as_deref(), &label, json)
        }

        Commands::Log { score } => {
            let config = TrackerConfig::load(&config_path)?;
            cmd_log(&config, score)
        }

        Commands::History { limit, json } => {
            let config = TrackerConfig::load(&config_path)?;
            cmd_history(&config, limit, json)
        }

        Commands::Clear { yes } => {
            let config = TrackerConfig::load(&config_path)?;
            cmd_clear(&config, yes)
        }

        Commands::Export {
            input,
            location,
            output,
        } => {
            let config = TrackerConfig::load(&config_path)?;
            cmd_export(&config, input.as_deref(), &location, &output)
        }

        Commands::Doctor { json } => cmd_doctor(&config_path, json),
    }
}

fn cmd_forecast(
    config: &TrackerConfig,
    location: &LocationArgs,
    threshold: Option<f64>,
    json: bool,
) -> Result<(), ZutsuCliError> {
    let thresholds = resolve_thresholds(config, threshold)?;
    let mut tracker = build_tracker(config, thresholds)?;
    let now = Utc::now();

    refresh(&mut tracker, config, location, now)?;

    let snapshot = tracker.current().ok_or(ZutsuCliError::NoForecast)?;
    let scores = tracker.overlay_points()?;
    let report = ForecastReport::new(
        &snapshot.label,
        &snapshot.forecast,
        &snapshot.analysis,
        &thresholds,
        scores,
    );

    print_report(&report, &snapshot.forecast, &snapshot.analysis, json)
}

fn cmd_analyze(
    config: &TrackerConfig,
    input: &Path,
    threshold: Option<f64>,
    now: Option<&str>,
    label: &str,
    json: bool,
) -> Result<(), ZutsuCliError> {
    let thresholds = resolve_thresholds(config, threshold)?;
    let now = match now {
        Some(raw) => DateTime::parse_from_rfc3339(raw)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| ZutsuCliError::Usage(format!("invalid --now '{}': {}", raw, e)))?,
        None => Utc::now(),
    };

    let forecast = parse_forecast(&read_input(input)?, config.horizon_hours)?;
    let analysis = analyze(&forecast, &thresholds, now);

    let log = open_log(config)?;
    let scores = log.overlay_points(&forecast)?;
    let report = ForecastReport::new(label, &forecast, &analysis, &thresholds, scores);

    print_report(&report, &forecast, &analysis, json)
}

fn cmd_log(config: &TrackerConfig, score: u8) -> Result<(), ZutsuCliError> {
    let mut log = open_log(config)?;
    let record = log.append(score)?;

    println!(
        "Saved score {} at {}",
        record.score,
        record.timestamp.with_timezone(&Local).format("%-m/%-d %H:%M")
    );
    Ok(())
}

fn cmd_history(config: &TrackerConfig, limit: usize, json: bool) -> Result<(), ZutsuCliError> {
    let log = open_log(config)?;
    let records = log.recent(limit)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&records)?);
        return Ok(());
    }

    if records.is_empty() {
        println!("まだ記録がありません");
        return Ok(());
    }

    for record in &records {
        println!("{}", format_record(record));
    }
    Ok(())
}

fn cmd_clear(config: &TrackerConfig, yes: bool) -> Result<(), ZutsuCliError> {
    if !yes {
        return Err(ZutsuCliError::ConfirmationRequired);
    }

    let mut log = open_log(config)?;
    // A log with invalid records still has to be removable.
    let count = log.list().map(|records| records.len()).ok();
    log.clear()?;

    match count {
        Some(count) => println!("Deleted {} records", count),
        None => println!("Deleted unreadable headache log"),
    }
    Ok(())
}

fn cmd_export(
    config: &TrackerConfig,
    input: Option<&Path>,
    location: &LocationArgs,
    output: &Path,
) -> Result<(), ZutsuCliError> {
    let csv = match input {
        Some(input) => {
            let forecast = parse_forecast(&read_input(input)?, config.horizon_hours)?;
            export_forecast(&forecast, &open_log(config)?)?
        }
        None => {
            let mut tracker = build_tracker(config, config.thresholds()?)?;
            refresh(&mut tracker, config, location, Utc::now())?;
            tracker.export_csv()?
        }
    };

    if output.to_string_lossy() == "-" {
        let mut stdout = io::stdout();
        stdout.write_all(csv.as_bytes())?;
        stdout.flush()?;
    } else {
        fs::write(output, csv)?;
        println!("Exported to {}", output.display());
    }

    Ok(())
}

fn cmd_doctor(config_path: &Path, json: bool) -> Result<(), ZutsuCliError> {
    let report = DoctorReport {
        producer: PRODUCER_NAME.to_string(),
        version: VERSION.to_string(),
        checks: doctor_checks(config_path),
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("zutsu Doctor Report");
        println!("===================");
        println!("Producer: {}", report.producer);
        println!("Version:  {}", report.version);
        println!("\nChecks:");

        for check in &report.checks {
            let status_icon = match check.status {
                CheckStatus::Ok => "[OK]",
                CheckStatus::Warning => "[WARN]",
                CheckStatus::Error => "[ERR]",
            };
            println!("  {} {}: {}", status_icon, check.name, check.message);
        }
    }

    let has_errors = report
        .checks
        .iter()
        .any(|c| matches!(c.status, CheckStatus::Error));
    if has_errors {
        Err(ZutsuCliError::DoctorFailed)
    } else {
        Ok(())
    }
}

fn doctor_checks(config_path: &Path) -> Vec<DoctorCheck> {
    let mut checks: Vec<DoctorCheck> = Vec::new();

    checks.push(DoctorCheck {
        name: "version".to_string(),
        status: CheckStatus::Ok,
        message: format!("{} {}", PRODUCER_NAME, VERSION),
    });

    // Configuration file
    let config = if config_path.exists() {
        match TrackerConfig::load(config_path) {
            Ok(config) => {
                checks.push(DoctorCheck {
                    name: "config".to_string(),
                    status: CheckStatus::Ok,
                    message: format!("Loaded {}", config_path.display()),
                });
                config
            }
            Err(e) => {
                checks.push(DoctorCheck {
                    name: "config".to_string(),
                    status: CheckStatus::Error,
                    message: e.to_string(),
                });
                TrackerConfig::default()
            }
        }
    } else {
        checks.push(DoctorCheck {
            name: "config".to_string(),
            status: CheckStatus::Warning,
            message: format!("{} does not exist, using defaults", config_path.display()),
        });
        TrackerConfig::default()
    };

    checks.push(match config.thresholds() {
        Ok(t) => DoctorCheck {
            name: "thresholds".to_string(),
            status: CheckStatus::Ok,
            message: format!(
                "High at <= {} hPa over {}h, Medium at >= {} hPa over {}h",
                t.short_window_drop_hpa,
                t.short_window_hours,
                t.long_window_range_hpa,
                t.long_window_hours
            ),
        },
        Err(e) => DoctorCheck {
            name: "thresholds".to_string(),
            status: CheckStatus::Error,
            message: e.to_string(),
        },
    });

    // Headache log
    checks.push(match open_log(&config).and_then(|log| log.list()) {
        Ok(records) => DoctorCheck {
            name: "headache_log".to_string(),
            status: CheckStatus::Ok,
            message: format!("{} records in {}", records.len(), config.data_file.display()),
        },
        Err(e) => DoctorCheck {
            name: "headache_log".to_string(),
            status: CheckStatus::Error,
            message: e.to_string(),
        },
    });

    checks
}

// Helper functions

fn resolve_thresholds(
    config: &TrackerConfig,
    threshold: Option<f64>,
) -> Result<Thresholds, ZutsuCliError> {
    Ok(match threshold {
        Some(drop) => Thresholds::with_short_window_drop(drop)?,
        None => config.thresholds()?,
    })
}

fn open_log(config: &TrackerConfig) -> Result<HeadacheLog<JsonFileStore>, TrackerError> {
    debug!("using store {}", config.data_file.display());
    Ok(HeadacheLog::new(JsonFileStore::open(&config.data_file)?))
}

fn build_tracker(
    config: &TrackerConfig,
    thresholds: Thresholds,
) -> Result<Tracker<JsonFileStore>, ZutsuCliError> {
    let geocoder = NominatimGeocoder::new(&config.geocoder_url, &config.user_agent)?;
    let provider =
        OpenMeteoProvider::new(&config.forecast_url, &config.user_agent, config.horizon_hours)?;

    Ok(Tracker::new(
        Box::new(geocoder),
        Box::new(provider),
        open_log(config)?,
        thresholds,
    ))
}

fn refresh(
    tracker: &mut Tracker<JsonFileStore>,
    config: &TrackerConfig,
    location: &LocationArgs,
    now: DateTime<Utc>,
) -> Result<(), ZutsuCliError> {
    match (&location.city, location.lat, location.lon) {
        (Some(city), _, _) => tracker.refresh_place(city, now)?,
        (None, Some(lat), Some(lon)) => tracker.refresh_coordinates(lat, lon, "現在地", now)?,
        _ => {
            let place = &config.default_location;
            tracker.refresh_coordinates(place.latitude, place.longitude, &place.label, now)?
        }
    };
    Ok(())
}

fn read_input(input: &Path) -> Result<String, ZutsuCliError> {
    if input.to_string_lossy() == "-" {
        if atty::is(atty::Stream::Stdin) {
            return Err(ZutsuCliError::Usage(
                "stdin is a terminal; pipe a forecast payload or pass a file".to_string(),
            ));
        }
        let mut buffer = String::new();
        io::stdin().read_to_string(&mut buffer)?;
        Ok(buffer)
    } else {
        Ok(fs::read_to_string(input)?)
    }
}

fn print_report(
    report: &ForecastReport,
    forecast: &ForecastSeries,
    analysis: &Analysis,
    json: bool,
) -> Result<(), ZutsuCliError> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
        return Ok(());
    }

    let offset = forecast.utc_offset();
    println!("{} ({} hours)", report.label, forecast.len());
    println!();
    for line in risk_strip(forecast, &analysis.levels, offset) {
        println!("  {}", line);
    }
    println!("  (. Low  - Medium  # High)");
    println!();
    println!("{}", report.summary);

    if !report.scores.is_empty() {
        println!();
        println!("頭痛スコア:");
        for point in &report.scores {
            println!(
                "  {}  {}",
                point.timestamp.with_timezone(&offset).format("%-m/%-d %H:%M"),
                point.score
            );
        }
    }
    Ok(())
}

/// One line per 24 hours, each hour as a single glyph
fn risk_strip(forecast: &ForecastSeries, levels: &[RiskLevel], offset: FixedOffset) -> Vec<String> {
    forecast
        .points()
        .chunks(24)
        .zip(levels.chunks(24))
        .map(|(points, levels)| {
            let glyphs: String = levels
                .iter()
                .map(|level| match level {
                    RiskLevel::Low => '.',
                    RiskLevel::Medium => '-',
                    RiskLevel::High => '#',
                })
                .collect();
            format!("{}  {}", format_hour(points[0].timestamp, offset), glyphs)
        })
        .collect()
}

fn format_record(record: &HeadacheRecord) -> String {
    format!(
        "{}  スコア: {}",
        record.timestamp.with_timezone(&Local).format("%-m/%-d %H:%M"),
        record.score
    )
}

// Report types

#[derive(Serialize)]
struct ForecastReport {
    label: String,
    thresholds: Thresholds,
    hours: Vec<HourReport>,
    current_risk: RiskLevel,
    next_high_onset: Option<DateTime<Utc>>,
    range_24h: f64,
    delta_3h: f64,
    summary: String,
    scores: Vec<ScorePoint>,
}

#[derive(Serialize)]
struct HourReport {
    timestamp: DateTime<Utc>,
    pressure_hpa: f64,
    risk: RiskLevel,
}

impl ForecastReport {
    fn new(
        label: &str,
        forecast: &ForecastSeries,
        analysis: &Analysis,
        thresholds: &Thresholds,
        scores: Vec<ScorePoint>,
    ) -> Self {
        let hours = forecast
            .points()
            .iter()
            .zip(&analysis.levels)
            .map(|(point, risk)| HourReport {
                timestamp: point.timestamp,
                pressure_hpa: point.pressure_hpa,
                risk: *risk,
            })
            .collect();

        Self {
            label: label.to_string(),
            thresholds: *thresholds,
            hours,
            current_risk: analysis.insight.current_risk,
            next_high_onset: analysis.next_high_onset,
            range_24h: analysis.insight.range_24h,
            delta_3h: analysis.insight.delta_3h,
            summary: analysis.insight.summary(forecast),
            scores,
        }
    }
}

#[derive(Serialize)]
struct DoctorReport {
    producer: String,
    version: String,
    checks: Vec<DoctorCheck>,
}

#[derive(Serialize)]
struct DoctorCheck {
    name: String,
    status: CheckStatus,
    message: String,
}

#[derive(Debug, PartialEq, Serialize)]
enum CheckStatus {
    Ok,
    Warning,
    Error,
}

// Error types

#[derive(Debug)]
enum ZutsuCliError {
    Io(io::Error),
    Tracker(TrackerError),
    Json(serde_json::Error),
    Usage(String),
    NoForecast,
    ConfirmationRequired,
    DoctorFailed,
}

impl From<io::Error> for ZutsuCliError {
    fn from(e: io::Error) -> Self {
        ZutsuCliError::Io(e)
    }
}

impl From<TrackerError> for ZutsuCliError {
    fn from(e: TrackerError) -> Self {
        ZutsuCliError::Tracker(e)
    }
}

impl From<serde_json::Error> for ZutsuCliError {
    fn from(e: serde_json::Error) -> Self {
        ZutsuCliError::Json(e)
    }
}

#[derive(Serialize)]
struct CliError {
    code: String,
    message: String,
    hint: Option<String>,
}

impl From<ZutsuCliError> for CliError {
    fn from(e: ZutsuCliError) -> Self {
        match e {
            ZutsuCliError::Io(e) => CliError {
                code: "IO_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check file paths and permissions".to_string()),
            },
            ZutsuCliError::Tracker(e) => {
                let (code, hint) = match &e {
                    TrackerError::InvalidInput(_) => {
                        ("INVALID_INPUT", "Scores are 0-5; thresholds must be negative")
                    }
                    TrackerError::NotFound(_) => ("NOT_FOUND", "Try a different place name"),
                    TrackerError::UpstreamError(_) => {
                        ("UPSTREAM_ERROR", "The weather service may be unavailable; retry later")
                    }
                    TrackerError::JsonError(_) => ("JSON_ERROR", "Check JSON syntax"),
                    TrackerError::StorageError(_) => {
                        ("STORAGE_ERROR", "Run 'zutsu doctor' to check the data file")
                    }
                    TrackerError::ConfigError(_) => {
                        ("CONFIG_ERROR", "Fix or remove the configuration file")
                    }
                    TrackerError::ExportError(_) => ("EXPORT_ERROR", "Check the forecast data"),
                };
                CliError {
                    code: code.to_string(),
                    message: e.to_string(),
                    hint: Some(hint.to_string()),
                }
            }
            ZutsuCliError::Json(e) => CliError {
                code: "JSON_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check JSON syntax".to_string()),
            },
            ZutsuCliError::Usage(msg) => CliError {
                code: "USAGE_ERROR".to_string(),
                message: msg,
                hint: Some("Run with --help for usage".to_string()),
            },
            ZutsuCliError::NoForecast => CliError {
                code: "NO_FORECAST".to_string(),
                message: "No forecast was loaded".to_string(),
                hint: None,
            },
            ZutsuCliError::ConfirmationRequired => CliError {
                code: "CONFIRMATION_REQUIRED".to_string(),
                message: "Refusing to delete all records without --yes".to_string(),
                hint: Some("Re-run as 'zutsu clear --yes'".to_string()),
            },
            ZutsuCliError::DoctorFailed => CliError {
                code: "DOCTOR_FAILED".to_string(),
                message: "One or more health checks failed".to_string(),
                hint: Some("Review the doctor report for details".to_string()),
            },
        }
    }
}
