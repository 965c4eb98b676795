//! Core data types for the backtester.

mod direction;
mod ohlcv;
mod order;
mod position;
mod signal;
mod snapshot;
mod timeframe;

pub use direction::{Direction, Side};
pub use ohlcv::Bar;
pub use order::{CancelOutcome, ExchangeOrder, Fill, OrderKind, OrderRequest, OrderStatus, PendingOrder};
pub use position::{ClosedTrade, EquityPoint, ExitReason, Position};
pub use signal::{ArmedSetup, Signal, SignalReason};
pub use snapshot::IndicatorSnapshot;
pub use timeframe::Timeframe;
