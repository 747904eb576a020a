//! Configuration for the `regstats` CLI.
//!
//! Configuration is stored in TOML format at `~/.config/regstats/config.toml`
//! (or XDG equivalent). A missing file means defaults.
//!
//! # Example Configuration
//!
//! ```toml
//! data_dir = "data"
//! max_records = 1000000
//! malformed_rows = "skip"
//! default_granularity = "month"
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::analytics::Granularity;
use crate::store::{
    CsvFileSource, DEFAULT_MAX_RECORDS, DataDirSource, LoadOptions, MalformedPolicy, RecordSource,
};

/// Environment variable naming an explicit data file.
pub const DATA_ENV: &str = "REGSTATS_DATA";
/// Environment variable naming an explicit config file.
pub const CONFIG_ENV: &str = "REGSTATS_CONFIG";

/// Errors that can occur when loading configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Read(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Could not determine config directory")]
    NoConfigDir,

    #[error("Validation error: {0}")]
    Validation(String),
}

/// Root configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Directory probed for the scraped, then the synthetic, data file.
    pub data_dir: PathBuf,

    /// Explicit data file; takes precedence over `data_dir`.
    pub data_file: Option<PathBuf>,

    /// Upper bound on records per load.
    pub max_records: usize,

    /// What to do with rows that fail validation.
    pub malformed_rows: MalformedPolicy,

    /// Granularity used when a command does not pass `--granularity`.
    pub default_granularity: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            data_file: None,
            max_records: DEFAULT_MAX_RECORDS,
            malformed_rows: MalformedPolicy::Fail,
            default_granularity: Granularity::default().to_string(),
        }
    }
}

impl AppConfig {
    /// Load from the default location, or defaults if it does not exist.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::config_path()?)
    }

    /// Load configuration from a specific path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Get the default configuration file path.
    pub fn config_path() -> Result<PathBuf, ConfigError> {
        // Respect XDG_CONFIG_HOME first (important for testing and Linux users)
        if let Ok(xdg_config) = dotenvy::var("XDG_CONFIG_HOME") {
            return Ok(PathBuf::from(xdg_config).join("regstats").join("config.toml"));
        }

        dirs::config_dir()
            .map(|p| p.join("regstats").join("config.toml"))
            .ok_or(ConfigError::NoConfigDir)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_records == 0 {
            return Err(ConfigError::Validation(
                "max_records must be greater than zero".into(),
            ));
        }
        self.granularity()?;
        Ok(())
    }

    pub fn granularity(&self) -> Result<Granularity, ConfigError> {
        self.default_granularity
            .parse()
            .map_err(|e: crate::analytics::AnalyticsError| ConfigError::Validation(e.to_string()))
    }

    pub fn load_options(&self) -> LoadOptions {
        LoadOptions {
            max_records: self.max_records,
            malformed: self.malformed_rows,
        }
    }

    /// The record source this configuration points at.
    pub fn source(&self) -> Box<dyn RecordSource> {
        match &self.data_file {
            Some(file) => Box::new(CsvFileSource::new(file)),
            None => Box::new(DataDirSource::new(&self.data_dir)),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
