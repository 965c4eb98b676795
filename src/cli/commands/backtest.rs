//! Backtest command implementation.

use anyhow::{Context, Result};
use tracing::info;

use retrace_backtest::BacktestEngine;
use retrace_config::AppConfig;

use super::{load_data, run_config};
use crate::cli::{BacktestArgs, OutputFormat};

pub async fn run(args: BacktestArgs, mut config: AppConfig) -> Result<()> {
    let run = run_config(&args.strategy, &mut config)?;
    info!("Starting backtest for strategy: {}", run.strategy.name);

    let (data, timeframe) = load_data(&args.data, &config).await?;
    info!(%timeframe, symbols = data.len(), "Running backtest");

    let engine = BacktestEngine::new(run).context("Failed to create engine")?;
    let report = engine.run(&data)?;

    match args.output {
        OutputFormat::Json => println!("{}", report.to_json()?),
        OutputFormat::Text => println!("{}", report.summary()),
    }

    if let Some(path) = &args.save {
        std::fs::write(path, report.to_json()?)?;
        info!("Results saved to {:?}", path);
    }
    if let Some(path) = &args.trades_csv {
        std::fs::write(path, report.trades_to_csv()?)?;
        info!("Trade log saved to {:?}", path);
    }
    if let Some(path) = &args.equity_csv {
        std::fs::write(path, report.equity_to_csv()?)?;
        info!("Equity curve saved to {:?}", path);
    }

    Ok(())
}
