//! Monitor configuration.
//!
//! Settings come from, in increasing precedence: built-in defaults, a TOML
//! file, `AIRTRACK_*` environment variables, and command-line flags (applied
//! by the binary through the `with_*` builders).
//!
//! ```toml
//! eviction_period_secs = 30
//! max_age = 4
//! smoothing_weight = 0.25
//!
//! [logging]
//! format = "json"
//! file = "/var/log/airtrack.log"
//!
//! [metrics]
//! enabled = true
//! port = 9090
//! ```

use crate::registry::SignalSmoothing;
use crate::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable naming an explicit config file.
pub const CONFIG_PATH_ENV: &str = "AIRTRACK_CONFIG_PATH";

/// Default seconds between eviction passes.
pub const DEFAULT_EVICTION_PERIOD_SECS: u64 = 30;
/// Default number of idle passes a record survives.
pub const DEFAULT_MAX_AGE: u32 = 4;
/// Default capacity of the publisher's broadcast buffer.
pub const DEFAULT_PUBLISHER_CAPACITY: usize = 1024;
/// Default live capture read timeout in milliseconds.
pub const DEFAULT_READ_TIMEOUT_MS: u64 = 500;
/// Default number of records shown per registry in the shutdown summary.
pub const DEFAULT_SNAPSHOT_LIMIT: usize = 32;

/// Runtime configuration for the monitor.
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// Time between eviction passes.
    pub eviction_period: Duration,
    /// Idle passes a record survives before removal.
    pub max_age: u32,
    /// Weight of the newest signal sample in the running average.
    pub smoothing_weight: f64,
    /// Events buffered per subscriber before it starts missing events.
    pub publisher_capacity: usize,
    /// How long a live capture read waits before reporting idle.
    pub read_timeout: Duration,
    /// Records listed per registry in the shutdown summary.
    pub snapshot_limit: usize,
    /// Logging section, resolved by [`crate::observability`].
    pub logging: LoggingSettings,
    /// Metrics section, resolved by [`crate::observability`].
    pub metrics: MetricsSettings,
}

/// Configuration file structure (for TOML parsing).
#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct ConfigFile {
    /// Seconds between eviction passes.
    pub eviction_period_secs: Option<u64>,
    /// Idle passes a record survives.
    pub max_age: Option<u32>,
    /// Signal smoothing weight.
    pub smoothing_weight: Option<f64>,
    /// Publisher buffer capacity.
    pub publisher_capacity: Option<usize>,
    /// Live capture read timeout in milliseconds.
    pub read_timeout_ms: Option<u64>,
    /// Shutdown summary record limit.
    pub snapshot_limit: Option<usize>,
    /// Logging section.
    pub logging: Option<LoggingSettings>,
    /// Metrics section.
    pub metrics: Option<MetricsSettings>,
}

/// Logging section in config file.
#[derive(Debug, Clone, Deserialize, Default, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct LoggingSettings {
    /// Output format: `pretty`, `compact` or `json`.
    pub format: Option<String>,
    /// Filter directive, e.g. `airtrack=debug`.
    pub filter: Option<String>,
    /// Write logs to this file instead of stderr.
    pub file: Option<PathBuf>,
}

/// Metrics section in config file.
#[derive(Debug, Clone, Deserialize, Default, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct MetricsSettings {
    /// Whether the Prometheus exporter is installed.
    pub enabled: Option<bool>,
    /// Port for the Prometheus HTTP listener.
    pub port: Option<u16>,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            eviction_period: Duration::from_secs(DEFAULT_EVICTION_PERIOD_SECS),
            max_age: DEFAULT_MAX_AGE,
            smoothing_weight: SignalSmoothing::DEFAULT_WEIGHT,
            publisher_capacity: DEFAULT_PUBLISHER_CAPACITY,
            read_timeout: Duration::from_millis(DEFAULT_READ_TIMEOUT_MS),
            snapshot_limit: DEFAULT_SNAPSHOT_LIMIT,
            logging: LoggingSettings::default(),
            metrics: MetricsSettings::default(),
        }
    }
}

impl MonitorConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads configuration from a file path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| Error::OperationFailed {
            operation: "read_config_file".to_string(),
            cause: format!("{}: {e}", path.display()),
        })?;
        Self::from_toml(&contents)
    }

    /// Parses configuration from TOML text.
    ///
    /// # Errors
    ///
    /// Returns an error if the text is not a valid config file.
    pub fn from_toml(contents: &str) -> Result<Self> {
        let file: ConfigFile = toml::from_str(contents).map_err(|e| Error::OperationFailed {
            operation: "parse_config_file".to_string(),
            cause: e.to_string(),
        })?;
        Ok(Self::from_config_file(file))
    }

    /// Loads configuration from the default location.
    ///
    /// Reads `airtrack/config.toml` under the platform config directory.
    /// Returns the defaults if no file exists or it cannot be parsed.
    #[must_use]
    pub fn load_default() -> Self {
        let Some(path) = default_config_path() else {
            return Self::default();
        };
        if !path.exists() {
            return Self::default();
        }
        match Self::load_from_file(&path) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Ignoring unreadable config file");
                Self::default()
            },
        }
    }

    /// Loads configuration the way the binary does.
    ///
    /// An explicit path (from `--config` or `AIRTRACK_CONFIG_PATH`) must load
    /// successfully; otherwise the default location is tried. Environment
    /// overrides are applied last.
    ///
    /// # Errors
    ///
    /// Returns an error if an explicitly named file cannot be loaded.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let from_env = std::env::var_os(CONFIG_PATH_ENV).map(PathBuf::from);
        let mut config = match explicit.map(Path::to_path_buf).or(from_env) {
            Some(path) => Self::load_from_file(&path)?,
            None => Self::load_default(),
        };
        config.apply_env_overrides();
        Ok(config)
    }

    /// Applies `AIRTRACK_*` environment overrides.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|key| std::env::var(key).ok());
    }

    /// Applies overrides from an arbitrary variable lookup.
    ///
    /// Unparseable values are ignored with a warning.
    pub fn apply_overrides_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(secs) = parse_env(&lookup, "AIRTRACK_EVICTION_PERIOD_SECS") {
            self.eviction_period = Duration::from_secs(secs);
        }
        if let Some(max_age) = parse_env(&lookup, "AIRTRACK_MAX_AGE") {
            self.max_age = max_age;
        }
        if let Some(weight) = parse_env(&lookup, "AIRTRACK_SMOOTHING_WEIGHT") {
            self.smoothing_weight = weight;
        }
        if let Some(enabled) = lookup("AIRTRACK_METRICS_ENABLED") {
            self.metrics.enabled = Some(parse_bool(&enabled));
        }
        if let Some(port) = parse_env(&lookup, "AIRTRACK_METRICS_PORT") {
            self.metrics.port = Some(port);
        }
        if let Some(format) = lookup("AIRTRACK_LOG_FORMAT") {
            self.logging.format = Some(format);
        }
        if let Some(file) = lookup("AIRTRACK_LOG_FILE") {
            self.logging.file = Some(PathBuf::from(file));
        }
    }

    /// Sets the eviction period.
    #[must_use]
    pub const fn with_eviction_period(mut self, period: Duration) -> Self {
        self.eviction_period = period;
        self
    }

    /// Sets the maximum age.
    #[must_use]
    pub const fn with_max_age(mut self, max_age: u32) -> Self {
        self.max_age = max_age;
        self
    }

    /// Checks that every value is usable.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] naming the first offending setting.
    pub fn validate(&self) -> Result<()> {
        if self.eviction_period.is_zero() {
            return Err(Error::InvalidInput(
                "eviction period must be greater than zero".to_string(),
            ));
        }
        if self.read_timeout.is_zero() {
            return Err(Error::InvalidInput(
                "read timeout must be greater than zero".to_string(),
            ));
        }
        if self.publisher_capacity == 0 {
            return Err(Error::InvalidInput(
                "publisher capacity must be greater than zero".to_string(),
            ));
        }
        self.smoothing().map(|_| ())
    }

    /// Builds the smoothing policy from the configured weight.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if the weight is outside (0, 1].
    pub fn smoothing(&self) -> Result<SignalSmoothing> {
        SignalSmoothing::new(self.smoothing_weight)
    }

    fn from_config_file(file: ConfigFile) -> Self {
        let mut config = Self::default();

        if let Some(secs) = file.eviction_period_secs {
            config.eviction_period = Duration::from_secs(secs);
        }
        if let Some(max_age) = file.max_age {
            config.max_age = max_age;
        }
        if let Some(weight) = file.smoothing_weight {
            config.smoothing_weight = weight;
        }
        if let Some(capacity) = file.publisher_capacity {
            config.publisher_capacity = capacity;
        }
        if let Some(ms) = file.read_timeout_ms {
            config.read_timeout = Duration::from_millis(ms);
        }
        if let Some(limit) = file.snapshot_limit {
            config.snapshot_limit = limit;
        }
        if let Some(logging) = file.logging {
            config.logging = logging;
        }
        if let Some(metrics) = file.metrics {
            config.metrics = metrics;
        }

        config
    }
}

/// Returns the platform default config path, if a home directory exists.
#[must_use]
pub fn default_config_path() -> Option<PathBuf> {
    directories::BaseDirs::new()
        .map(|dirs| dirs.config_dir().join("airtrack").join("config.toml"))
}

pub(crate) fn parse_bool(value: &str) -> bool {
    let value = value.trim().to_lowercase();
    value == "true" || value == "1" || value == "yes"
}

fn parse_env<T: std::str::FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    let raw = lookup(key)?;
    let parsed = raw.trim().parse::<T>().ok();
    if parsed.is_none() {
        tracing::warn!(key, value = %raw, "Ignoring unparseable environment override");
    }
    parsed
}
