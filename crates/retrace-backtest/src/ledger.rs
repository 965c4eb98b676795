//! Pooled equity ledger: fees, trade records and the equity curve.

use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use tracing::debug;

use retrace_core::error::ConfigError;
use retrace_core::traits::ValidateConfig;
use retrace_core::types::{ClosedTrade, EquityPoint, ExitReason, Position};

/// Trading fee model. Rates are percentages of notional.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum FeeModel {
    /// One charge on the entry notional covering the round trip
    Flat { rate_pct: Decimal },
    /// Separate charges on the entry and exit notionals
    Split { entry_pct: Decimal, exit_pct: Decimal },
}

impl Default for FeeModel {
    fn default() -> Self {
        FeeModel::Flat { rate_pct: dec!(0.1) }
    }
}

impl FeeModel {
    /// Fees for a round trip of `size` notional with the given price ratio
    /// `exit / entry`.
    pub fn round_trip(&self, size: Decimal, exit_ratio: Decimal) -> Decimal {
        match *self {
            FeeModel::Flat { rate_pct } => size * rate_pct / dec!(100),
            FeeModel::Split {
                entry_pct,
                exit_pct,
            } => size * entry_pct / dec!(100) + size * exit_ratio * exit_pct / dec!(100),
        }
    }
}

impl ValidateConfig for FeeModel {
    fn validate(&self) -> Result<(), ConfigError> {
        let negative = match *self {
            FeeModel::Flat { rate_pct } => rate_pct < Decimal::ZERO,
            FeeModel::Split {
                entry_pct,
                exit_pct,
            } => entry_pct < Decimal::ZERO || exit_pct < Decimal::ZERO,
        };
        if negative {
            return Err(ConfigError::invalid("fees", "rates must be >= 0"));
        }
        Ok(())
    }
}

/// Convert a price-derived ratio into money arithmetic.
///
/// Bars are checked for finite prices at load, so the fallback is not hit
/// in practice.
pub(crate) fn to_decimal(value: f64) -> Decimal {
    Decimal::from_f64(value).unwrap_or(Decimal::ZERO)
}

/// Account shared by every slot of a run.
///
/// Equity changes only when a trade closes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ledger {
    initial_equity: Decimal,
    equity: Decimal,
    fees: FeeModel,
    trades: Vec<ClosedTrade>,
    curve: Vec<EquityPoint>,
}

impl Ledger {
    pub fn new(initial_equity: Decimal, fees: FeeModel) -> Self {
        Self {
            initial_equity,
            equity: initial_equity,
            fees,
            trades: Vec::new(),
            curve: Vec::new(),
        }
    }

    pub fn initial_equity(&self) -> Decimal {
        self.initial_equity
    }

    /// Current equity.
    pub fn equity(&self) -> Decimal {
        self.equity
    }

    pub fn trades(&self) -> &[ClosedTrade] {
        &self.trades
    }

    pub fn equity_curve(&self) -> &[EquityPoint] {
        &self.curve
    }

    /// Realize a position at `exit_price` and append its trade record.
    pub fn close(
        &mut self,
        position: &Position,
        exit_bar: usize,
        exit_time: i64,
        exit_price: f64,
        exit_reason: ExitReason,
    ) -> &ClosedTrade {
        let pnl_pct = position.return_fraction(exit_price);
        let fees = self
            .fees
            .round_trip(position.size, to_decimal(exit_price / position.entry_price));
        let pnl_amount = position.size * to_decimal(pnl_pct) - fees;

        self.equity += pnl_amount;
        let trade_index = self.trades.len() + 1;

        debug!(
            symbol = %position.symbol,
            trade = trade_index,
            reason = %exit_reason,
            entry = position.entry_price,
            exit = exit_price,
            pnl = %pnl_amount,
            equity = %self.equity,
            "Trade closed"
        );

        self.curve.push(EquityPoint {
            trade_index,
            equity: self.equity,
        });
        self.trades.push(ClosedTrade {
            trade_index,
            symbol: position.symbol.clone(),
            direction: position.direction,
            signal_reason: position.signal.reason,
            entry_bar: position.entry_bar,
            entry_time: position.entry_time,
            entry_price: position.entry_price,
            exit_bar,
            exit_time,
            exit_price,
            stop_price: position.stop_price,
            target_price: position.target_price,
            size: position.size,
            fees,
            pnl_pct: pnl_pct * 100.0,
            pnl_amount,
            exit_reason,
            equity_after: self.equity,
        });

        &self.trades[self.trades.len() - 1]
    }

    /// Drawdown in percent at every equity point, running max seeded with
    /// the initial equity. Every value is `<= 0`.
    pub fn drawdown_series(&self) -> Vec<Decimal> {
        let mut peak = self.initial_equity;
        self.curve
            .iter()
            .map(|point| {
                peak = peak.max(point.equity);
                if peak > Decimal::ZERO {
                    (point.equity - peak) / peak * dec!(100)
                } else {
                    Decimal::ZERO
                }
            })
            .collect()
    }

    /// Deepest drawdown in percent, `0` with no trades.
    pub fn max_drawdown_pct(&self) -> Decimal {
        self.drawdown_series()
            .into_iter()
            .min()
            .unwrap_or(Decimal::ZERO)
            .min(Decimal::ZERO)
    }

    /// Total return in percent of the initial equity.
    pub fn total_return_pct(&self) -> Decimal {
        if self.initial_equity.is_zero() {
            return Decimal::ZERO;
        }
        (self.equity - self.initial_equity) / self.initial_equity * dec!(100)
    }
}
