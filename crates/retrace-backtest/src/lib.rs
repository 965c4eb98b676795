//! Backtesting engine.
//!
//! Replays bars through per-symbol slots (detector → limit order →
//! position), settles trades into one pooled ledger and reports the
//! results. Sweeps run many configurations in parallel.

pub mod config;
pub mod ledger;
pub mod orders;
pub mod position;
pub mod slot;

mod engine;
mod report;
mod statistics;
mod sweep;

pub use config::{BacktestConfig, StrategyConfig};
pub use engine::BacktestEngine;
pub use ledger::{FeeModel, Ledger};
pub use orders::{EntryConfig, LimitAnchor, LimitOffset, OrderEvent};
pub use position::{
    AnchorPolicy, ExitConfig, ExitFill, ExitKind, ExitPlan, IntrabarPriority, PlanRejection,
};
pub use report::BacktestReport;
pub use slot::{detect, Detection, EventKind, LifecycleEvent, Slot, SlotEnv, SlotState};
pub use statistics::{BacktestStats, RunCounters};
pub use sweep::{total_counters, GridPoint, ParamGrid, ParamSweep, SweepOutcome};
