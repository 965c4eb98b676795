//! Signal detector trait definitions.

use crate::error::ConfigError;
use crate::types::{ArmedSetup, Bar, Direction, IndicatorSnapshot, Signal};

/// Configuration records that can be checked before a run starts.
pub trait ValidateConfig {
    /// Validate the configuration.
    fn validate(&self) -> Result<(), ConfigError>;
}

/// Everything a detector may look at for one bar of one slot.
#[derive(Debug, Clone, Copy)]
pub struct BarContext<'a> {
    /// Instrument slot
    pub symbol: &'a str,
    /// Index of the bar within the slot's series
    pub bar_index: usize,
    /// The bar itself
    pub bar: &'a Bar,
    /// Indicator values up to and including this bar
    pub snapshot: &'a IndicatorSnapshot,
}

/// Why an armed setup was dropped without a signal.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AbandonReason {
    /// Stop distance was non-positive or above the configured maximum
    StopDistance { distance_pct: f64, max_pct: f64 },
    /// A signal-stage pre-filter rejected the break
    Filtered(&'static str),
    /// The setup did not break within the allowed number of bars
    ArmExpired,
}

impl std::fmt::Display for AbandonReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AbandonReason::StopDistance {
                distance_pct,
                max_pct,
            } => write!(f, "stop distance {:.3}% outside (0, {}%]", distance_pct, max_pct),
            AbandonReason::Filtered(name) => write!(f, "filtered by {}", name),
            AbandonReason::ArmExpired => write!(f, "arm expired"),
        }
    }
}

/// Outcome of evaluating a detector on one bar.
#[derive(Debug, Clone, PartialEq)]
pub enum DetectorStep {
    /// Nothing armed after this bar
    Idle,
    /// A setup is armed (new or carried over)
    Armed(ArmedSetup),
    /// The armed setup was dropped
    Abandoned {
        setup: ArmedSetup,
        reason: AbandonReason,
    },
    /// The armed setup broke and produced a signal
    Signal(Signal),
}

/// ARM → CONFIRM signal detector.
///
/// Detectors hold configuration only. The armed state lives in the slot
/// that owns it and is passed in on every step, so one detector can serve
/// any number of slots and a busy slot simply never calls `step`.
pub trait SignalDetector: Send + Sync {
    /// Get the unique name of this detector.
    fn name(&self) -> &str;

    /// Bars needed before every indicator the detector reads is defined.
    fn warmup_period(&self) -> usize;

    /// Advance the ARM/CONFIRM state machine by one bar.
    fn step(&self, armed: Option<ArmedSetup>, ctx: &BarContext<'_>) -> DetectorStep;

    /// Whether the arm condition opposing `direction` fires on this bar.
    fn opposite_trigger(&self, direction: Direction, snapshot: &IndicatorSnapshot) -> bool;

    /// Get a description of the detector.
    fn description(&self) -> &str {
        ""
    }
}
