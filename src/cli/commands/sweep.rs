//! Parameter sweep command implementation.

use anyhow::Result;
use tracing::info;

use retrace_backtest::{total_counters, ParamSweep};
use retrace_config::AppConfig;

use super::{load_data, run_config};
use crate::cli::SweepArgs;

pub async fn run(args: SweepArgs, mut config: AppConfig) -> Result<()> {
    let run = run_config(&args.strategy, &mut config)?;
    let (data, _) = load_data(&args.data, &config).await?;
    info!(
        combinations = config.sweep.size(),
        symbols = data.len(),
        "Starting sweep"
    );

    let outcomes = ParamSweep::new(run.initial_equity)
        .with_parallelism(!args.sequential)
        .sweep(&config.sweep, &run.strategy, &data)?;

    println!("Parameter Sweep: {} ranked results", outcomes.len());
    println!("═══════════════════════════════════════════════════════════════════════════");
    println!(
        "  {:>4}  {:>7}  {:>9}  {:>8}  {:>7}  Parameters",
        "Rank", "Trades", "Return %", "MaxDD %", "R/DD"
    );
    println!("───────────────────────────────────────────────────────────────────────────");
    for (rank, outcome) in outcomes.iter().take(args.top).enumerate() {
        let stats = &outcome.stats;
        let rdd = stats
            .return_to_drawdown
            .map(|v| format!("{:.2}", v))
            .unwrap_or_else(|| "n/a".to_string());
        let label = if outcome.label.is_empty() {
            "(base)"
        } else {
            outcome.label.as_str()
        };
        println!(
            "  {:>4}  {:>7}  {:>9.2}  {:>8.2}  {:>7}  {}",
            rank + 1,
            stats.total_trades,
            stats.total_return_pct,
            stats.max_drawdown_pct,
            rdd,
            label
        );
    }

    let totals = total_counters(&outcomes);
    println!("───────────────────────────────────────────────────────────────────────────");
    println!(
        "  Across all points: {} signals, {} orders placed, {} filled, {} expired",
        totals.signals, totals.orders_placed, totals.orders_filled, totals.orders_expired
    );

    if let Some(path) = &args.save {
        std::fs::write(path, serde_json::to_string_pretty(&outcomes)?)?;
        info!("Sweep results saved to {:?}", path);
    }

    Ok(())
}
