//! Runtime configuration: file + environment layering, with validation at
//! startup rather than deep in the pipeline.

use std::path::{Path, PathBuf};

use serde::Deserialize;
use snafu::{ResultExt, Snafu};

/// Environment variables that override file-provided values take this prefix,
/// e.g. `PIPELINE_QUEUE_URL` overrides `queue_url`.
pub const ENV_PREFIX: &str = "PIPELINE_";

#[derive(Debug, Snafu)]
pub enum ConfigError {
    #[snafu(display("could not read config file {}: {}", path.display(), source))]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[snafu(display("could not parse config file {}: {}", path.display(), source))]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[snafu(display("invalid configuration: {message}"))]
    Invalid { message: String },
}

/// Top-level settings, corresponding one-to-one with the recognized options
/// and defaults enumerated in the specification's external-interfaces
/// section.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub queue_url: String,
    pub max_messages: i32,
    pub wait_seconds: i32,
    pub visibility_seconds: i32,

    pub stream_name: String,

    pub max_batch_records: usize,
    pub max_batch_bytes: usize,
    pub max_record_bytes: usize,
    pub max_retries: u32,
    pub base_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub delivery_concurrency: usize,
    pub shutdown_deadline_ms: u64,

    pub max_accuracy_meters: f64,
    pub rssi_min: i32,
    pub rssi_max: i32,
    pub connected_weight: f64,
    pub scan_weight: f64,
    pub low_link_speed_weight: f64,
    pub low_link_speed_rssi_threshold: i32,
    pub low_link_speed_mbps_threshold: i32,
    pub max_past_days: i64,
    pub max_future_skew_secs: i64,

    pub oui: OuiSettings,

    pub health_port: u16,
    pub delivery_timeout_secs: u64,

    pub feed_processors: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OuiSettings {
    pub enabled: bool,
    pub action: OuiAction,
    pub prefixes: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OuiAction {
    Flag,
    Exclude,
    Log,
}

impl Default for OuiAction {
    fn default() -> Self {
        OuiAction::Flag
    }
}

impl Default for OuiSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            action: OuiAction::Flag,
            prefixes: Vec::new(),
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            queue_url: String::new(),
            max_messages: 10,
            wait_seconds: 20,
            visibility_seconds: 300,
            stream_name: String::new(),
            max_batch_records: 500,
            max_batch_bytes: 4 * 1024 * 1024,
            max_record_bytes: 1_024_000,
            max_retries: 3,
            base_backoff_ms: 1_000,
            max_backoff_ms: 30_000,
            delivery_concurrency: 2,
            shutdown_deadline_ms: 30_000,
            max_accuracy_meters: 150.0,
            rssi_min: -100,
            rssi_max: 0,
            connected_weight: 2.0,
            scan_weight: 1.0,
            low_link_speed_weight: 1.5,
            low_link_speed_rssi_threshold: -65,
            low_link_speed_mbps_threshold: 25,
            max_past_days: 365 * 10,
            max_future_skew_secs: 300,
            oui: OuiSettings::default(),
            health_port: 8080,
            delivery_timeout_secs: 60,
            feed_processors: Vec::new(),
        }
    }
}

impl Settings {
    /// Load from a TOML file, then apply any `PIPELINE_*` environment
    /// variable overrides found for top-level scalar fields.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).context(ReadSnafu { path })?;
        let mut settings: Settings = toml::from_str(&text).context(ParseSnafu { path })?;
        settings.apply_env_overrides();
        settings.validate()?;
        Ok(settings)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var(format!("{ENV_PREFIX}QUEUE_URL")) {
            self.queue_url = v;
        }
        if let Ok(v) = std::env::var(format!("{ENV_PREFIX}STREAM_NAME")) {
            self.stream_name = v;
        }
        if let Ok(v) = std::env::var(format!("{ENV_PREFIX}MAX_MESSAGES")) {
            if let Ok(n) = v.parse() {
                self.max_messages = n;
            }
        }
        if let Ok(v) = std::env::var(format!("{ENV_PREFIX}HEALTH_PORT")) {
            if let Ok(n) = v.parse() {
                self.health_port = n;
            }
        }
    }

    /// Range and consistency checks applied once at startup so that a
    /// misconfigured process fails fast rather than misbehaving at runtime.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.queue_url.is_empty() {
            return Err(ConfigError::Invalid {
                message: "queue_url must not be empty".into(),
            });
        }
        if self.stream_name.is_empty() {
            return Err(ConfigError::Invalid {
                message: "stream_name must not be empty".into(),
            });
        }
        if self.max_record_bytes > self.max_batch_bytes {
            return Err(ConfigError::Invalid {
                message: "max_record_bytes must not exceed max_batch_bytes".into(),
            });
        }
        if self.max_batch_records == 0 {
            return Err(ConfigError::Invalid {
                message: "max_batch_records must be greater than zero".into(),
            });
        }
        if self.rssi_min > self.rssi_max {
            return Err(ConfigError::Invalid {
                message: "rssi_min must not exceed rssi_max".into(),
            });
        }
        if self.base_backoff_ms > self.max_backoff_ms {
            return Err(ConfigError::Invalid {
                message: "base_backoff_ms must not exceed max_backoff_ms".into(),
            });
        }
        Ok(())
    }
}
