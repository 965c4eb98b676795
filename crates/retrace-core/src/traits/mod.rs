//! Core traits for the backtester.

mod data_source;
mod detector;
mod exchange;
mod indicator;

pub use data_source::{ensure_ascending, ensure_valid_prices, DataSource};
pub use detector::{AbandonReason, BarContext, DetectorStep, SignalDetector, ValidateConfig};
pub use exchange::ExchangeClient;
pub use indicator::StreamingIndicator;
