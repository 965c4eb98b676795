//! Configuration structures.

use std::path::PathBuf;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use retrace_backtest::{BacktestConfig, ParamGrid, StrategyConfig};
use retrace_broker::LiveConfig;
use retrace_core::error::ConfigError;
use retrace_core::traits::ValidateConfig;
use retrace_core::types::Timeframe;
use retrace_strategies::PresetRegistry;

/// Main application configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct AppConfig {
    #[serde(default)]
    pub app: AppSettings,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub data: DataSettings,
    #[serde(default)]
    pub backtest: BacktestSettings,
    #[serde(default)]
    pub strategy: StrategyConfig,
    #[serde(default)]
    pub sweep: ParamGrid,
    #[serde(default)]
    pub paper: LiveConfig,
}

impl AppConfig {
    /// Replace the detector with a registered preset, keeping entry, exit,
    /// sizing and fee settings.
    pub fn apply_preset(&mut self, name: &str) -> Result<(), ConfigError> {
        let detector = PresetRegistry::new().config(name)?;
        self.strategy.name = name.to_string();
        self.strategy.detector = detector;
        Ok(())
    }

    /// Engine configuration for a backtest run.
    pub fn backtest_config(&self) -> BacktestConfig {
        BacktestConfig {
            initial_equity: self.backtest.initial_equity,
            strategy: self.strategy.clone(),
        }
    }
}

impl ValidateConfig for AppConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        self.backtest_config().validate()?;
        if self.data.symbols.iter().any(|s| s.trim().is_empty()) {
            return Err(ConfigError::invalid("data.symbols", "symbols must not be blank"));
        }
        Ok(())
    }
}

/// General app settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AppSettings {
    pub name: String,
    pub environment: String,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            name: "retrace".to_string(),
            environment: "development".to_string(),
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Pretty,
    Compact,
    Json,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
    /// Also write logs to this file
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
            file: None,
        }
    }
}

/// Where historical bars come from.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DataSettings {
    /// Directory of `SYMBOL[_TF].csv` files
    pub dir: PathBuf,
    pub timeframe: Timeframe,
    /// Symbols to load; empty loads every file in `dir`
    pub symbols: Vec<String>,
}

impl Default for DataSettings {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("data"),
            timeframe: Timeframe::Hour1,
            symbols: Vec::new(),
        }
    }
}

/// Backtest settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BacktestSettings {
    pub initial_equity: Decimal,
}

impl Default for BacktestSettings {
    fn default() -> Self {
        Self {
            initial_equity: dec!(10000),
        }
    }
}
