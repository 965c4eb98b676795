//! Validate configuration command.

use anyhow::Result;
use std::path::Path;

use retrace_config::load_config;

pub async fn run(config_path: &Path) -> Result<()> {
    println!("Validating configuration: {:?}", config_path);

    match load_config(config_path) {
        Ok(config) => {
            let detector = &config.strategy.detector;
            println!("Configuration is valid!");
            println!();
            println!("App: {}", config.app.name);
            println!("Environment: {}", config.app.environment);
            println!("Log level: {}", config.logging.level);
            println!("Strategy: {}", config.strategy.name);
            println!(
                "Triggers: RSI({}) {}/{}, lookback {}",
                detector.rsi_period, detector.high_trigger, detector.low_trigger, detector.lookback
            );
            println!("Max wait: {} bars", config.strategy.entry.max_wait_bars);
            println!("Risk per trade: {}%", config.strategy.sizing.risk_pct);
            println!("Initial equity: {}", config.backtest.initial_equity);
            println!("Sweep combinations: {}", config.sweep.size());
        }
        Err(e) => {
            println!("Configuration error: {}", e);
            return Err(e.into());
        }
    }

    Ok(())
}
