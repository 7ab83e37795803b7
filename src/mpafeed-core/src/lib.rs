pub mod config;
pub mod logging;
pub mod paths;

pub use config::{
    Config, ConfigError, LogLevel, LoggingConfig, OutputBackend, OutputConfig, ValidationError,
};
pub use logging::{init_logging, LoggingError, LoggingGuard, LOG_ENV};
pub use paths::{AppDirs, DirsError};

pub const APP_NAME: &str = "mpafeed";
pub const APP_AUTHOR: &str = "Mpafeed";
pub const APP_QUALIFIER: &str = "io";
