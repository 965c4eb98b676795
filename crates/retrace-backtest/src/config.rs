//! Strategy and run configuration.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use retrace_core::error::ConfigError;
use retrace_core::traits::ValidateConfig;
use retrace_indicators::IndicatorSettings;
use retrace_risk::SizingConfig;
use retrace_strategies::DetectorConfig;

use crate::ledger::FeeModel;
use crate::orders::EntryConfig;
use crate::position::ExitConfig;

/// One complete strategy instance: detection, entry, exits, sizing, fees.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StrategyConfig {
    /// Name reported by the detector
    pub name: String,
    pub detector: DetectorConfig,
    pub entry: EntryConfig,
    pub exits: ExitConfig,
    pub sizing: SizingConfig,
    pub fees: FeeModel,
    pub atr_period: usize,
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            name: "rsi_reversal".to_string(),
            detector: DetectorConfig::default(),
            entry: EntryConfig::default(),
            exits: ExitConfig::default(),
            sizing: SizingConfig::default(),
            fees: FeeModel::default(),
            atr_period: 14,
        }
    }
}

impl StrategyConfig {
    /// Indicators every slot computes for this strategy.
    pub fn indicator_settings(&self) -> IndicatorSettings {
        self.detector.indicator_settings(self.atr_period)
    }
}

impl ValidateConfig for StrategyConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.atr_period == 0 {
            return Err(ConfigError::invalid("atr_period", "must be at least 1"));
        }
        self.detector.validate()?;
        self.entry.validate()?;
        self.exits.validate()?;
        self.sizing.validate()?;
        self.fees.validate()?;
        self.indicator_settings().validate()
    }
}

/// Backtest run configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BacktestConfig {
    /// Starting equity of the pooled account
    pub initial_equity: Decimal,
    pub strategy: StrategyConfig,
}

impl Default for BacktestConfig {
    fn default() -> Self {
        Self {
            initial_equity: dec!(10000),
            strategy: StrategyConfig::default(),
        }
    }
}

impl ValidateConfig for BacktestConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.initial_equity <= Decimal::ZERO {
            return Err(ConfigError::invalid("initial_equity", "must be > 0"));
        }
        self.strategy.validate()
    }
}
