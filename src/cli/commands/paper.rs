//! Paper trading command implementation.

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;

use retrace_backtest::BacktestReport;
use retrace_broker::{replay_feed, ClockMode, LiveConfig, LiveTrader, PaperExchange};
use retrace_config::AppConfig;

use super::{load_data, run_config};
use crate::cli::PaperArgs;

pub async fn run(args: PaperArgs, mut config: AppConfig) -> Result<()> {
    let run = run_config(&args.strategy, &mut config)?;
    let (data, timeframe) = load_data(&args.data, &config).await?;
    let symbols: Vec<String> = data.keys().cloned().collect();

    // Replayed history expires orders against bar time, not system time
    let live = LiveConfig {
        timeframe,
        clock: ClockMode::BarClose,
    };

    let (exchange, fills) = PaperExchange::with_fill_notifications();
    let exchange = Arc::new(exchange);
    let trader = LiveTrader::new(run.clone(), live, &symbols, exchange.clone())
        .context("Failed to create paper trader")?;

    info!("Starting paper replay for strategy: {}", run.strategy.name);
    let stats = trader.run(replay_feed(exchange, data), fills).await?;

    let ledger = trader.ledger();
    let ledger = ledger.lock().await;
    let report = BacktestReport {
        config: run,
        symbols,
        stats,
        trades: ledger.trades().to_vec(),
        equity_curve: ledger.equity_curve().to_vec(),
        drawdown_pct: ledger.drawdown_series(),
        events: trader.events().await,
    };
    println!("{}", report.summary());

    Ok(())
}
