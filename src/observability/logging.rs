//! Log output configuration.

use crate::config::LoggingSettings;
use crate::{Error, Result};
use std::path::PathBuf;
use std::str::FromStr;

/// Filter used when neither config nor environment sets one.
pub const DEFAULT_FILTER: &str = "airtrack=info";
/// Filter used with `--verbose`.
pub const VERBOSE_FILTER: &str = "airtrack=debug";

/// Log line format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Multi-line human-readable output.
    #[default]
    Pretty,
    /// Single-line human-readable output.
    Compact,
    /// Newline-delimited JSON.
    Json,
}

impl FromStr for LogFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "pretty" => Ok(Self::Pretty),
            "compact" | "text" => Ok(Self::Compact),
            "json" => Ok(Self::Json),
            other => Err(Error::InvalidInput(format!("unknown log format: {other}"))),
        }
    }
}

/// Resolved logging configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingConfig {
    /// Output format.
    pub format: LogFormat,
    /// `EnvFilter` directive string.
    pub filter: String,
    /// Log file; stderr when `None`.
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::default(),
            filter: DEFAULT_FILTER.to_string(),
            file: None,
        }
    }
}

impl LoggingConfig {
    /// Resolves logging from config settings and the process environment.
    ///
    /// # Errors
    ///
    /// Returns an error if the configured format is unknown.
    pub fn from_settings(settings: &LoggingSettings, verbose: bool) -> Result<Self> {
        Self::resolve(settings, verbose, |key| std::env::var(key).ok())
    }

    /// Resolves logging with an explicit environment lookup.
    ///
    /// The filter comes from, in order: `--verbose`, `AIRTRACK_LOG`,
    /// `RUST_LOG`, the config file, then [`DEFAULT_FILTER`].
    ///
    /// # Errors
    ///
    /// Returns an error if the configured format is unknown.
    pub fn resolve(
        settings: &LoggingSettings,
        verbose: bool,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self> {
        let format = settings
            .format
            .as_deref()
            .map(LogFormat::from_str)
            .transpose()?
            .unwrap_or_default();

        let filter = if verbose {
            VERBOSE_FILTER.to_string()
        } else {
            lookup("AIRTRACK_LOG")
                .or_else(|| lookup("RUST_LOG"))
                .or_else(|| settings.filter.clone())
                .filter(|f| !f.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_FILTER.to_string())
        };

        Ok(Self {
            format,
            filter,
            file: settings.file.clone(),
        })
    }
}
