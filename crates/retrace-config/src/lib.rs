//! Configuration management.

mod settings;

pub use settings::{AppConfig, AppSettings, BacktestSettings, DataSettings, LogFormat, LoggingConfig};

use config::{Config, Environment, File, FileFormat};
use std::path::Path;
use thiserror::Error;

use retrace_core::traits::ValidateConfig;

/// Configuration loading errors.
#[derive(Error, Debug)]
pub enum LoadError {
    #[error("Failed to read configuration: {0}")]
    Source(#[from] config::ConfigError),

    #[error("Invalid configuration: {0}")]
    Invalid(#[from] retrace_core::error::ConfigError),
}

fn environment() -> Environment {
    Environment::with_prefix("RETRACE")
        .separator("__")
        .try_parsing(true)
}

/// Load configuration from file and environment, then validate it.
///
/// Environment variables such as `RETRACE__BACKTEST__INITIAL_EQUITY`
/// override file values.
pub fn load_config(path: &Path) -> Result<AppConfig, LoadError> {
    let config = Config::builder()
        .add_source(File::from(path).required(true))
        .add_source(environment())
        .build()?;

    let app: AppConfig = config.try_deserialize()?;
    app.validate()?;
    Ok(app)
}

/// Parse configuration from a TOML string, without environment overrides.
pub fn parse_config(toml: &str) -> Result<AppConfig, LoadError> {
    let config = Config::builder()
        .add_source(File::from_str(toml, FileFormat::Toml))
        .build()?;

    let app: AppConfig = config.try_deserialize()?;
    app.validate()?;
    Ok(app)
}

/// Render a configuration as TOML.
pub fn to_toml(config: &AppConfig) -> Result<String, toml::ser::Error> {
    toml::to_string_pretty(config)
}
