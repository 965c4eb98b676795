//! Core types and traits for the retracement backtester.
//!
//! This crate provides the foundational building blocks including:
//! - Market data types (Bar, Timeframe, IndicatorSnapshot)
//! - Slot lifecycle types (ArmedSetup, Signal, PendingOrder, Position, ClosedTrade)
//! - Core traits for indicators, signal detectors, exchanges, and data sources

pub mod types;
pub mod traits;
pub mod error;

pub use error::{RetraceError, RetraceResult};
pub use types::*;
pub use traits::*;
