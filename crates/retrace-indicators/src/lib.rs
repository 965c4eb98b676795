//! Streaming technical indicators.
//!
//! Every indicator consumes one bar at a time and reports `None` until its
//! warm-up has elapsed:
//! - Momentum: RSI (Wilder), trailing return
//! - Moving averages: EMA, rolling mean
//! - Volatility: ATR, rolling range/return window
//! - Swing extremes over a lookback
//!
//! [`IndicatorProvider`] composes them into one snapshot per bar.

pub mod momentum;
pub mod moving_average;
pub mod provider;
pub mod swing;
pub mod volatility;

pub use momentum::{Rsi, TrailingReturn};
pub use moving_average::{Ema, RollingMean};
pub use provider::{IndicatorProvider, IndicatorSettings};
pub use swing::{Swing, SwingLevels};
pub use volatility::{Atr, RangeWindow, RangeWindowOutput};
