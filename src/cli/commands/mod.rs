//! CLI command implementations.

pub mod backtest;
pub mod paper;
pub mod strategies;
pub mod sweep;
pub mod validate;

use std::collections::BTreeMap;

use anyhow::{bail, Context, Result};
use tracing::info;

use retrace_backtest::BacktestConfig;
use retrace_config::AppConfig;
use retrace_core::traits::ValidateConfig;
use retrace_core::types::{Bar, Timeframe};
use retrace_data::{load_symbols, CsvDataSource};

use crate::cli::{DataArgs, StrategyArgs};

/// Load the bars selected by `args`, falling back to the `data` section.
pub async fn load_data(
    args: &DataArgs,
    config: &AppConfig,
) -> Result<(BTreeMap<String, Vec<Bar>>, Timeframe)> {
    let path = args.data.clone().unwrap_or_else(|| config.data.dir.clone());
    let timeframe = args.timeframe.unwrap_or(config.data.timeframe);
    let mut symbols = if args.symbols.is_empty() {
        config.data.symbols.clone()
    } else {
        args.symbols.clone()
    };

    if !path.exists() {
        bail!(
            "Data path '{}' does not exist. Provide a CSV file or directory containing CSV files (e.g. --data ./data)",
            path.display()
        );
    }

    let source = if path.is_file() {
        let symbol = match symbols.first() {
            Some(symbol) => symbol.clone(),
            None => path
                .file_stem()
                .and_then(|s| s.to_str())
                .map(|s| s.split('_').next().unwrap_or(s).to_uppercase())
                .context("Cannot derive a symbol from the data file name, pass --symbols")?,
        };
        symbols = vec![symbol.clone()];
        CsvDataSource::from_file(&symbol, &path)?
    } else {
        CsvDataSource::from_dir(&path)?
    };

    let data = load_symbols(&source, &symbols, timeframe).await?;
    if data.is_empty() {
        bail!("No data loaded");
    }

    info!("Loaded data for {} symbols", data.len());
    Ok((data, timeframe))
}

/// Apply the strategy overrides and build the engine configuration.
pub fn run_config(args: &StrategyArgs, config: &mut AppConfig) -> Result<BacktestConfig> {
    if let Some(preset) = &args.preset {
        config
            .apply_preset(preset)
            .with_context(|| format!("Unknown preset '{}'", preset))?;
    }
    if let Some(capital) = args.capital {
        config.backtest.initial_equity = capital;
    }

    let run = config.backtest_config();
    run.validate().context("Invalid strategy configuration")?;
    Ok(run)
}
