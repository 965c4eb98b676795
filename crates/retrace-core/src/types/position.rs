//! Open positions, closed trades and equity points.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::{Bar, Direction, Signal, SignalReason};

/// Why a position was closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ExitReason {
    /// Target level reached
    #[serde(rename = "TP")]
    TakeProfit,
    /// Stop level reached
    #[serde(rename = "SL")]
    StopLoss,
    /// Maximum holding period elapsed
    #[serde(rename = "TIME")]
    Time,
    /// Opposite trigger fired while in the trade
    #[serde(rename = "OPPOSITE")]
    Opposite,
    /// Still open when the data ran out
    #[serde(rename = "OPEN_AT_DATA_END")]
    OpenAtDataEnd,
}

impl ExitReason {
    /// Tag used in reports and trade logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            ExitReason::TakeProfit => "TP",
            ExitReason::StopLoss => "SL",
            ExitReason::Time => "TIME",
            ExitReason::Opposite => "OPPOSITE",
            ExitReason::OpenAtDataEnd => "OPEN_AT_DATA_END",
        }
    }
}

impl std::fmt::Display for ExitReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An open position with fixed stop and target levels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    /// Instrument slot
    pub symbol: String,
    /// Position direction
    pub direction: Direction,
    /// Fill price of the entry order
    pub entry_price: f64,
    /// Bar index of the fill
    pub entry_bar: usize,
    /// Fill timestamp (Unix milliseconds)
    pub entry_time: i64,
    /// Stop level
    pub stop_price: f64,
    /// Target level
    pub target_price: f64,
    /// Notional size in quote currency
    pub size: Decimal,
    /// The signal that led to this position
    pub signal: Signal,
}

impl Position {
    /// Whether the bar's range reaches the stop.
    pub fn stop_hit(&self, bar: &Bar) -> bool {
        match self.direction {
            Direction::Long => bar.low <= self.stop_price,
            Direction::Short => bar.high >= self.stop_price,
        }
    }

    /// Whether the bar's range reaches the target.
    pub fn target_hit(&self, bar: &Bar) -> bool {
        match self.direction {
            Direction::Long => bar.high >= self.target_price,
            Direction::Short => bar.low <= self.target_price,
        }
    }

    /// Bars held as of `bar_index`.
    pub fn bars_held(&self, bar_index: usize) -> usize {
        bar_index.saturating_sub(self.entry_bar)
    }

    /// Signed fractional return if closed at `price`.
    pub fn return_fraction(&self, price: f64) -> f64 {
        self.direction.price_change_fraction(self.entry_price, price)
    }
}

/// A completed trade as recorded in the ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClosedTrade {
    /// Sequence number in close order, starting at 1
    pub trade_index: usize,
    /// Instrument slot
    pub symbol: String,
    /// Trade direction
    pub direction: Direction,
    /// Reason the originating setup armed
    pub signal_reason: SignalReason,
    /// Bar index of the entry fill
    pub entry_bar: usize,
    /// Entry timestamp (Unix milliseconds)
    pub entry_time: i64,
    /// Entry price
    pub entry_price: f64,
    /// Bar index of the exit
    pub exit_bar: usize,
    /// Exit timestamp (Unix milliseconds)
    pub exit_time: i64,
    /// Exit price
    pub exit_price: f64,
    /// Stop level at entry
    pub stop_price: f64,
    /// Target level at entry
    pub target_price: f64,
    /// Notional size
    pub size: Decimal,
    /// Total fees charged
    pub fees: Decimal,
    /// Signed price return in percent, before fees
    pub pnl_pct: f64,
    /// Net PnL after fees
    pub pnl_amount: Decimal,
    /// Exit reason
    pub exit_reason: ExitReason,
    /// Ledger equity after this trade
    pub equity_after: Decimal,
}

impl ClosedTrade {
    /// Whether the trade made money after fees.
    pub fn is_win(&self) -> bool {
        self.pnl_amount > Decimal::ZERO
    }

    /// Bars between entry and exit.
    pub fn bars_held(&self) -> usize {
        self.exit_bar.saturating_sub(self.entry_bar)
    }
}

/// Equity after a trade close.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EquityPoint {
    /// Trade that produced this point, 1-based
    pub trade_index: usize,
    /// Equity value
    pub equity: Decimal,
}
