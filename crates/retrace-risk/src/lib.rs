//! Risk-based position sizing.
//!
//! Converts current equity and stop distance into trade notional, with an
//! optional leverage cap and quality-tiered risk.

mod position_sizer;

pub use position_sizer::{PositionSizer, RiskTier, SizeDecision, SizingConfig};
