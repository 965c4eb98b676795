//! Signal detectors.
//!
//! This crate provides the ARM → CONFIRM detector family:
//! - RSI trigger crossings armed against a captured swing extreme
//! - Reversal and continuation entry styles
//! - Optional pre-filters (momentum, range window, volatility, session, trend bias)
//! - A registry of named presets

mod filters;
mod registry;
mod rsi_break;

pub use filters::{
    FilterConfig, FilterStage, MomentumFilter, MomentumMode, SessionFilter, TrendBiasFilter,
    WindowFilter,
};
pub use registry::{PresetInfo, PresetRegistry};
pub use rsi_break::{ArmSide, DetectorConfig, EntryStyle, RsiBreakDetector};
