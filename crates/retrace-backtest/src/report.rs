//! Backtest report generation.

use std::fmt::Display;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use retrace_core::types::{ClosedTrade, EquityPoint};

use crate::config::BacktestConfig;
use crate::slot::LifecycleEvent;
use crate::statistics::BacktestStats;

/// Complete backtest report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktestReport {
    /// Configuration used
    pub config: BacktestConfig,
    /// Symbols in replay order
    pub symbols: Vec<String>,
    /// Statistics
    pub stats: BacktestStats,
    /// Closed trades in close order
    pub trades: Vec<ClosedTrade>,
    /// Equity after every closed trade
    pub equity_curve: Vec<EquityPoint>,
    /// Drawdown percent at every equity point
    pub drawdown_pct: Vec<Decimal>,
    /// Lifecycle transitions, kept in memory only
    #[serde(skip)]
    pub events: Vec<LifecycleEvent>,
}

#[derive(Serialize)]
struct EquityRow {
    trade_index: usize,
    equity: Decimal,
    drawdown_pct: Decimal,
}

fn or_na<T: Display>(value: Option<T>, suffix: &str) -> String {
    match value {
        Some(v) => format!("{:.2}{}", v, suffix),
        None => "n/a".to_string(),
    }
}

impl BacktestReport {
    /// Generate a text summary.
    pub fn summary(&self) -> String {
        let stats = &self.stats;
        let counters = &stats.counters;
        let mut s = String::new();

        s.push_str("═══════════════════════════════════════════════════════════\n");
        s.push_str("                     BACKTEST REPORT                        \n");
        s.push_str("═══════════════════════════════════════════════════════════\n\n");

        s.push_str(&format!("  Strategy:            {}\n", self.config.strategy.name));
        s.push_str(&format!("  Symbols:             {}\n\n", self.symbols.join(", ")));

        s.push_str("PERFORMANCE\n");
        s.push_str("───────────────────────────────────────────────────────────\n");
        s.push_str(&format!("  Initial Equity:      {:.2}\n", stats.initial_equity));
        s.push_str(&format!("  Final Equity:        {:.2}\n", stats.final_equity));
        s.push_str(&format!("  Total Return:        {:.2}%\n", stats.total_return_pct));
        s.push_str(&format!("  Max Drawdown:        {:.2}%\n", stats.max_drawdown_pct));
        s.push_str(&format!("  Return / Drawdown:   {}\n", or_na(stats.return_to_drawdown, "")));
        s.push_str(&format!("  Profit Factor:       {}\n", or_na(stats.profit_factor, "")));
        s.push_str(&format!("  Total Fees:          {:.2}\n", stats.total_fees));
        s.push('\n');

        s.push_str("TRADE STATISTICS\n");
        s.push_str("───────────────────────────────────────────────────────────\n");
        s.push_str(&format!("  Total Trades:        {}\n", stats.total_trades));
        s.push_str(&format!("  Winning Trades:      {}\n", stats.winning_trades));
        s.push_str(&format!("  Losing Trades:       {}\n", stats.losing_trades));
        s.push_str(&format!("  Breakeven Trades:    {}\n", stats.breakeven_trades));
        s.push_str(&format!("  Win Rate:            {}\n", or_na(stats.win_rate_pct, "%")));
        s.push_str(&format!("  Avg Win:             {}\n", or_na(stats.avg_win, "")));
        s.push_str(&format!("  Avg Loss:            {}\n", or_na(stats.avg_loss, "")));
        s.push_str(&format!("  Avg Bars Held:       {}\n", or_na(stats.avg_bars_held, "")));
        s.push('\n');

        s.push_str("EXIT REASONS\n");
        s.push_str("───────────────────────────────────────────────────────────\n");
        if stats.exit_reasons.is_empty() {
            s.push_str("  (none)\n");
        }
        for (reason, count) in &stats.exit_reasons {
            s.push_str(&format!("  {:<21}{}\n", format!("{}:", reason), count));
        }
        s.push('\n');

        s.push_str("LIFECYCLE\n");
        s.push_str("───────────────────────────────────────────────────────────\n");
        s.push_str(&format!("  Bars Processed:      {}\n", counters.bars_processed));
        s.push_str(&format!("  Setups Armed:        {}\n", counters.setups_armed));
        s.push_str(&format!(
            "  Abandoned:           {} stop distance, {} filtered, {} expired\n",
            counters.abandoned_stop_distance, counters.abandoned_filtered, counters.abandoned_expired
        ));
        s.push_str(&format!("  Signals:             {}\n", counters.signals));
        s.push_str(&format!("  Orders Placed:       {}\n", counters.orders_placed));
        s.push_str(&format!("  Orders Filled:       {}\n", counters.orders_filled));
        s.push_str(&format!("  Orders Expired:      {}\n", counters.orders_expired));
        s.push_str(&format!("  Orders Rejected:     {}\n", counters.orders_rejected));
        s.push_str(&format!("  Fill Rate:           {}\n", or_na(stats.fill_rate_pct(), "%")));
        s.push_str(&format!("  Pending At End:      {}\n", counters.pending_dropped_at_end));
        s.push_str(&format!("  Open At End:         {}\n", stats.open_at_data_end));
        s.push('\n');

        s.push_str("═══════════════════════════════════════════════════════════\n");

        s
    }

    /// Export to JSON.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Trade log as CSV, one row per closed trade.
    pub fn trades_to_csv(&self) -> Result<String, csv::Error> {
        let mut writer = csv::Writer::from_writer(Vec::new());
        for trade in &self.trades {
            writer.serialize(trade)?;
        }
        finish_csv(writer)
    }

    /// Equity curve with drawdown as CSV.
    pub fn equity_to_csv(&self) -> Result<String, csv::Error> {
        let mut writer = csv::Writer::from_writer(Vec::new());
        for (point, drawdown_pct) in self.equity_curve.iter().zip(&self.drawdown_pct) {
            writer.serialize(EquityRow {
                trade_index: point.trade_index,
                equity: point.equity,
                drawdown_pct: *drawdown_pct,
            })?;
        }
        finish_csv(writer)
    }
}

fn finish_csv(writer: csv::Writer<Vec<u8>>) -> Result<String, csv::Error> {
    let bytes = writer
        .into_inner()
        .map_err(|e| csv::Error::from(e.into_error()))?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}
