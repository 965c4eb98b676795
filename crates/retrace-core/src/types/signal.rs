//! Armed setups and confirmed signals.

use serde::{Deserialize, Serialize};

use super::{Bar, Direction};

/// Why a setup armed, and therefore what kind of entry the signal is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalReason {
    /// Trigger crossed above the high threshold, short on breakdown.
    OverboughtReversal,
    /// Trigger crossed below the low threshold, long on breakout.
    OversoldReversal,
    /// Trigger crossed above the high threshold, long on breakout.
    OverboughtContinuation,
    /// Trigger crossed below the low threshold, short on breakdown.
    OversoldContinuation,
}

impl std::fmt::Display for SignalReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SignalReason::OverboughtReversal => "overbought_reversal",
            SignalReason::OversoldReversal => "oversold_reversal",
            SignalReason::OverboughtContinuation => "overbought_continuation",
            SignalReason::OversoldContinuation => "oversold_continuation",
        };
        write!(f, "{}", s)
    }
}

/// A setup waiting for its structural break.
///
/// The window high/low cover every bar from the arm bar through the most
/// recent bar seen while armed.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ArmedSetup {
    /// Direction the signal will take on confirmation
    pub direction: Direction,
    /// Arm reason, carried into the signal
    pub reason: SignalReason,
    /// Bar index at which the setup armed
    pub armed_at: usize,
    /// Trigger indicator value on the arm bar
    pub trigger_value: f64,
    /// Swing extreme captured at arm time; a close beyond it confirms
    pub break_level: f64,
    /// Highest high since arming
    pub window_high: f64,
    /// Lowest low since arming
    pub window_low: f64,
}

impl ArmedSetup {
    /// Arm on `bar`, seeding the arm-to-break window with that bar.
    pub fn new(
        direction: Direction,
        reason: SignalReason,
        armed_at: usize,
        trigger_value: f64,
        break_level: f64,
        bar: &Bar,
    ) -> Self {
        Self {
            direction,
            reason,
            armed_at,
            trigger_value,
            break_level,
            window_high: bar.high,
            window_low: bar.low,
        }
    }

    /// Extend the arm-to-break window with a new bar.
    pub fn extend(&mut self, bar: &Bar) {
        self.window_high = self.window_high.max(bar.high);
        self.window_low = self.window_low.min(bar.low);
    }

    /// Whether `close` confirms the setup.
    pub fn is_broken_by(&self, close: f64) -> bool {
        match self.direction {
            Direction::Long => close > self.break_level,
            Direction::Short => close < self.break_level,
        }
    }

    /// Opposite extreme over the arm-to-break window.
    pub fn stop_reference(&self) -> f64 {
        match self.direction {
            Direction::Long => self.window_low,
            Direction::Short => self.window_high,
        }
    }

    /// Bars elapsed since arming.
    pub fn bars_armed(&self, bar_index: usize) -> usize {
        bar_index.saturating_sub(self.armed_at)
    }
}

/// A confirmed directional trade intent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    /// Instrument slot
    pub symbol: String,
    /// Trade direction
    pub direction: Direction,
    /// Close of the break bar
    pub reference_price: f64,
    /// Break bar index
    pub bar_index: usize,
    /// Break bar timestamp (Unix milliseconds)
    pub timestamp: i64,
    /// Swing extreme that was broken
    pub break_level: f64,
    /// Structural stop level
    pub stop_reference: f64,
    /// ATR on the break bar
    pub atr: f64,
    /// Signal-quality measure (recent range %), used for tiered sizing
    pub quality: Option<f64>,
    /// Reason tag
    pub reason: SignalReason,
}
