//! `config.toml`: logging and audio output settings.
//!
//! Decoder settings are fixed by the MPEG plugin and have no entry here.

use crate::paths::AppDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const CONFIG_VERSION: u32 = 1;
pub const CONFIG_FILE_NAME: &str = "config.toml";

const DEFAULT_MAX_LOG_FILES: usize = 7;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub config_version: u32,
    pub logging: LoggingConfig,
    pub output: OutputConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            config_version: CONFIG_VERSION,
            logging: LoggingConfig::default(),
            output: OutputConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: LogLevel,
    /// Rolled log files kept on disk.
    pub max_log_files: usize,
    /// Log to stderr.
    pub console: bool,
    /// Log to daily-rolled files in the log directory.
    pub file: bool,
    /// File name stem; a bare name, never a path.
    pub file_name: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            max_log_files: DEFAULT_MAX_LOG_FILES,
            console: true,
            file: true,
            file_name: None,
        }
    }
}

impl LoggingConfig {
    fn validate(&self) -> Result<(), ValidationError> {
        if self.file && self.max_log_files == 0 {
            return Err(ValidationError::NoLogFilesKept);
        }
        if let Some(name) = &self.file_name {
            if name.is_empty() || name.contains(['/', '\\']) {
                return Err(ValidationError::InvalidLogFileName(name.clone()));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_filter_directive(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

/// Where decoded PCM goes when the binary plays a file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct OutputConfig {
    pub backend: OutputBackend,
    /// Target file for the `raw` backend.
    pub raw_path: Option<PathBuf>,
}

impl OutputConfig {
    fn validate(&self) -> Result<(), ValidationError> {
        if self.backend == OutputBackend::Raw && self.raw_path.is_none() {
            return Err(ValidationError::MissingRawPath);
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum OutputBackend {
    /// Decode and discard.
    #[default]
    Null,
    /// The default output device.
    Cpal,
    /// Raw native-endian s16 samples in a file.
    Raw,
}

impl OutputBackend {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutputBackend::Null => "null",
            OutputBackend::Cpal => "cpal",
            OutputBackend::Raw => "raw",
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config at {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse config at {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("invalid config at {path}: {source}")]
    Validation {
        path: PathBuf,
        source: ValidationError,
    },
    #[error("failed to prepare configuration directories: {0}")]
    Directories(#[from] crate::paths::DirsError),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("unsupported config_version {found}, expected {expected}")]
    UnsupportedVersion { found: u32, expected: u32 },
    #[error("output backend `raw` requires output.raw_path")]
    MissingRawPath,
    #[error("logging.max_log_files must be at least 1 when file logging is on")]
    NoLogFilesKept,
    #[error("logging.file_name must be a bare file name, got {0:?}")]
    InvalidLogFileName(String),
}

impl Config {
    /// Loads `config.toml` from the platform config directory, creating the
    /// directories on first run.
    pub fn load_or_default(dirs: &AppDirs) -> Result<Self, ConfigError> {
        dirs.ensure_exists()?;
        Self::load_from(&dirs.config_file())
    }

    /// Loads `path`, falling back to defaults when the file does not exist.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let contents = match fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "no config file, using defaults");
                return Ok(Self::default());
            }
            Err(source) => {
                return Err(ConfigError::Io {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };

        let config: Config = toml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate().map_err(|source| ConfigError::Validation {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(config)
    }

    /// Writes the config as TOML, replacing `path`.
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        let contents = toml::to_string_pretty(self)?;
        fs::write(path, contents).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.config_version != CONFIG_VERSION {
            return Err(ValidationError::UnsupportedVersion {
                found: self.config_version,
                expected: CONFIG_VERSION,
            });
        }
        self.logging.validate()?;
        self.output.validate()
    }
}
