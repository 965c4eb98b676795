//! Exchange clients and the live slot runner.
//!
//! - [`PaperExchange`]: in-process exchange that fills limit orders at
//!   their limit price when a bar trades through it
//! - [`LiveTrader`]: per-symbol slots behind async mutexes, settling into
//!   one pooled ledger

mod live;
mod paper;

pub use live::{ClockMode, LiveConfig, LiveError, LiveOrder, LiveState, LiveTrader};
pub use paper::{replay_feed, PaperExchange};
