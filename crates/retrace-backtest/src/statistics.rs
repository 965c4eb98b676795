//! Backtest statistics.

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use retrace_core::types::ExitReason;

use crate::ledger::Ledger;

/// Lifecycle counters collected while driving a run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunCounters {
    /// Bars processed across all slots
    pub bars_processed: usize,
    pub setups_armed: usize,
    /// Arms discarded for an invalid stop distance
    pub abandoned_stop_distance: usize,
    /// Arms discarded by a signal-stage filter or missing ATR
    pub abandoned_filtered: usize,
    /// Arms that never broke within `max_arm_bars`
    pub abandoned_expired: usize,
    pub signals: usize,
    /// Signals whose limit price was unusable
    pub signals_discarded: usize,
    pub orders_placed: usize,
    pub orders_filled: usize,
    pub orders_expired: usize,
    /// Fills refused because the exit plan or size was invalid
    pub orders_rejected: usize,
    /// Orders still pending when the data ran out
    pub pending_dropped_at_end: usize,
}

impl RunCounters {
    /// Fold another run's counters into this one.
    pub fn merge(&mut self, other: &RunCounters) {
        self.bars_processed += other.bars_processed;
        self.setups_armed += other.setups_armed;
        self.abandoned_stop_distance += other.abandoned_stop_distance;
        self.abandoned_filtered += other.abandoned_filtered;
        self.abandoned_expired += other.abandoned_expired;
        self.signals += other.signals;
        self.signals_discarded += other.signals_discarded;
        self.orders_placed += other.orders_placed;
        self.orders_filled += other.orders_filled;
        self.orders_expired += other.orders_expired;
        self.orders_rejected += other.orders_rejected;
        self.pending_dropped_at_end += other.pending_dropped_at_end;
    }
}

/// Summary statistics of a finished run.
///
/// Ratios whose denominator is zero are `None` rather than NaN or infinity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestStats {
    pub initial_equity: Decimal,
    pub final_equity: Decimal,
    pub total_return_pct: Decimal,
    /// Deepest drawdown, percent, never positive
    pub max_drawdown_pct: Decimal,
    /// Total return over the absolute max drawdown
    pub return_to_drawdown: Option<Decimal>,
    pub total_trades: usize,
    pub winning_trades: usize,
    pub losing_trades: usize,
    pub breakeven_trades: usize,
    pub win_rate_pct: Option<Decimal>,
    pub avg_win: Option<Decimal>,
    pub avg_loss: Option<Decimal>,
    /// Gross profit over gross loss
    pub profit_factor: Option<Decimal>,
    pub total_fees: Decimal,
    pub avg_bars_held: Option<f64>,
    pub exit_reasons: BTreeMap<ExitReason, usize>,
    /// Positions force-closed at the end of the data
    pub open_at_data_end: usize,
    pub counters: RunCounters,
}

impl BacktestStats {
    /// Compute statistics from a finished ledger.
    pub fn from_ledger(ledger: &Ledger, counters: RunCounters) -> Self {
        let trades = ledger.trades();

        let mut winning_trades = 0;
        let mut losing_trades = 0;
        let mut gross_profit = Decimal::ZERO;
        let mut gross_loss = Decimal::ZERO;
        let mut total_fees = Decimal::ZERO;
        let mut bars_held = 0usize;
        let mut exit_reasons = BTreeMap::new();

        for trade in trades {
            if trade.pnl_amount > Decimal::ZERO {
                winning_trades += 1;
                gross_profit += trade.pnl_amount;
            } else if trade.pnl_amount < Decimal::ZERO {
                losing_trades += 1;
                gross_loss += trade.pnl_amount.abs();
            }
            total_fees += trade.fees;
            bars_held += trade.bars_held();
            *exit_reasons.entry(trade.exit_reason).or_insert(0) += 1;
        }

        let total_trades = trades.len();
        let total_return_pct = ledger.total_return_pct();
        let max_drawdown_pct = ledger.max_drawdown_pct();

        let return_to_drawdown =
            (!max_drawdown_pct.is_zero()).then(|| total_return_pct / max_drawdown_pct.abs());
        let win_rate_pct = (total_trades > 0)
            .then(|| Decimal::from(winning_trades * 100) / Decimal::from(total_trades));
        let avg_win = (winning_trades > 0).then(|| gross_profit / Decimal::from(winning_trades));
        let avg_loss = (losing_trades > 0).then(|| gross_loss / Decimal::from(losing_trades));
        let profit_factor = (gross_loss > Decimal::ZERO).then(|| gross_profit / gross_loss);
        let avg_bars_held = (total_trades > 0).then(|| bars_held as f64 / total_trades as f64);

        Self {
            initial_equity: ledger.initial_equity(),
            final_equity: ledger.equity(),
            total_return_pct,
            max_drawdown_pct,
            return_to_drawdown,
            total_trades,
            winning_trades,
            losing_trades,
            breakeven_trades: total_trades - winning_trades - losing_trades,
            win_rate_pct,
            avg_win,
            avg_loss,
            profit_factor,
            total_fees,
            avg_bars_held,
            open_at_data_end: exit_reasons
                .get(&ExitReason::OpenAtDataEnd)
                .copied()
                .unwrap_or(0),
            exit_reasons,
            counters,
        }
    }

    /// Fill rate of placed orders, percent.
    pub fn fill_rate_pct(&self) -> Option<Decimal> {
        (self.counters.orders_placed > 0).then(|| {
            Decimal::from(self.counters.orders_filled) * dec!(100)
                / Decimal::from(self.counters.orders_placed)
        })
    }
}
