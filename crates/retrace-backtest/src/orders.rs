//! Retracement limit orders placed from signals.

use serde::{Deserialize, Serialize};

use retrace_core::error::ConfigError;
use retrace_core::traits::ValidateConfig;
use retrace_core::types::{Bar, PendingOrder, Signal};

/// Price the limit offset is measured from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LimitAnchor {
    /// The signal's reference price (close of the break bar)
    #[default]
    BreakoutPrice,
    /// The swing extreme captured when the setup armed
    SwingExtreme,
}

/// Distance of the limit from its anchor, always toward a retracement.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum LimitOffset {
    /// `multiple × signal ATR`
    AtrMultiple { multiple: f64 },
    /// `anchor × pct / 100`
    Percent { pct: f64 },
}

impl Default for LimitOffset {
    fn default() -> Self {
        LimitOffset::AtrMultiple { multiple: 0.5 }
    }
}

/// Entry order configuration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EntryConfig {
    pub anchor: LimitAnchor,
    pub offset: LimitOffset,
    /// Bars a pending order may wait for its fill
    pub max_wait_bars: usize,
}

impl Default for EntryConfig {
    fn default() -> Self {
        Self {
            anchor: LimitAnchor::BreakoutPrice,
            offset: LimitOffset::default(),
            max_wait_bars: 3,
        }
    }
}

impl ValidateConfig for EntryConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.max_wait_bars == 0 {
            return Err(ConfigError::invalid("entry.max_wait_bars", "must be at least 1"));
        }
        match self.offset {
            LimitOffset::AtrMultiple { multiple } if multiple.is_nan() || multiple < 0.0 => Err(
                ConfigError::invalid("entry.offset.multiple", "must be >= 0"),
            ),
            LimitOffset::Percent { pct } if pct.is_nan() || !(0.0..100.0).contains(&pct) => Err(
                ConfigError::invalid("entry.offset.pct", "must lie within 0..100"),
            ),
            _ => Ok(()),
        }
    }
}

/// Outcome of servicing a pending order on one bar.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OrderEvent {
    /// The bar traded through the limit; filled at exactly `price`
    Filled { price: f64 },
    /// The waiting window is used up without a fill
    Expired,
    /// Still resting
    Waiting,
}

/// Limit price for a signal: below the anchor for longs, above it for shorts.
pub fn limit_price(config: &EntryConfig, signal: &Signal) -> f64 {
    let anchor = match config.anchor {
        LimitAnchor::BreakoutPrice => signal.reference_price,
        LimitAnchor::SwingExtreme => signal.break_level,
    };
    let offset = match config.offset {
        LimitOffset::AtrMultiple { multiple } => multiple * signal.atr,
        LimitOffset::Percent { pct } => anchor * pct / 100.0,
    };
    signal.direction.adverse(anchor, offset)
}

/// Turn a signal into a pending order.
///
/// Returns `None` when the computed limit is not a usable price.
pub fn place_order(id: u64, config: &EntryConfig, signal: Signal) -> Option<PendingOrder> {
    let limit = limit_price(config, &signal);
    if !limit.is_finite() || limit <= 0.0 {
        return None;
    }
    Some(PendingOrder {
        id,
        symbol: signal.symbol.clone(),
        direction: signal.direction,
        limit_price: limit,
        placed_at: signal.bar_index,
        expiry_bars: config.max_wait_bars,
        signal,
    })
}

/// Service a pending order on bar `bar_index`.
///
/// The fill check runs before the expiry check, so the last eligible bar
/// can still fill. The placement bar itself never fills.
pub fn service_order(order: &PendingOrder, bar_index: usize, bar: &Bar) -> OrderEvent {
    if bar_index <= order.placed_at {
        return OrderEvent::Waiting;
    }
    if order.is_fillable_by(bar) {
        return OrderEvent::Filled {
            price: order.limit_price,
        };
    }
    if order.is_expired_at(bar_index) {
        return OrderEvent::Expired;
    }
    OrderEvent::Waiting
}
