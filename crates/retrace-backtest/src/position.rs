//! Exit planning and per-bar exit evaluation for open positions.

use serde::{Deserialize, Serialize};

use retrace_core::error::ConfigError;
use retrace_core::traits::ValidateConfig;
use retrace_core::types::{Bar, Direction, ExitReason, Position, Signal};

/// Which price and ATR the stop and target are measured from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnchorPolicy {
    /// Fill price and the ATR on the fill bar
    #[default]
    Entry,
    /// Signal reference price and the ATR at signal time
    Signal,
}

/// One exit condition checked on each bar of an open position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitKind {
    /// Stop level touched, fills at the stop
    Stop,
    /// Target level touched, fills at the target
    Target,
    /// Opposite arm condition, fills at the close
    Opposite,
    /// Holding timeout, fills at the close
    Time,
}

/// Order in which exit conditions are checked on one bar.
///
/// The first condition that fires wins. `StopFirst` and `TargetFirst` only
/// decide between the two levels and check the opposite trigger and the
/// timeout afterwards; `Custom` orders all four.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntrabarPriority {
    #[default]
    StopFirst,
    TargetFirst,
    Custom([ExitKind; 4]),
}

impl IntrabarPriority {
    pub fn sequence(&self) -> [ExitKind; 4] {
        match self {
            IntrabarPriority::StopFirst => {
                [ExitKind::Stop, ExitKind::Target, ExitKind::Opposite, ExitKind::Time]
            }
            IntrabarPriority::TargetFirst => {
                [ExitKind::Target, ExitKind::Stop, ExitKind::Opposite, ExitKind::Time]
            }
            IntrabarPriority::Custom(order) => *order,
        }
    }
}

/// Exit configuration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExitConfig {
    pub anchor: AnchorPolicy,
    pub stop_atr_mult: f64,
    pub target_atr_mult: f64,
    /// Use the signal's structural stop reference instead of an ATR stop
    pub structural_stop: bool,
    pub priority: IntrabarPriority,
    /// Exit at the close when the opposite arm condition fires
    pub exit_on_opposite: bool,
    /// Exit at the close after this many bars in the trade
    pub max_hold_bars: Option<usize>,
}

impl Default for ExitConfig {
    fn default() -> Self {
        Self {
            anchor: AnchorPolicy::Entry,
            stop_atr_mult: 1.5,
            target_atr_mult: 3.0,
            structural_stop: false,
            priority: IntrabarPriority::StopFirst,
            exit_on_opposite: false,
            max_hold_bars: Some(48),
        }
    }
}

impl ValidateConfig for ExitConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if !self.structural_stop && (self.stop_atr_mult.is_nan() || self.stop_atr_mult <= 0.0) {
            return Err(ConfigError::invalid("exits.stop_atr_mult", "must be > 0"));
        }
        if self.target_atr_mult.is_nan() || self.target_atr_mult <= 0.0 {
            return Err(ConfigError::TargetWrongSide(format!(
                "target_atr_mult {} puts the target on the losing side",
                self.target_atr_mult
            )));
        }
        if self.max_hold_bars == Some(0) {
            return Err(ConfigError::invalid("exits.max_hold_bars", "must be at least 1"));
        }
        let order = self.priority.sequence();
        for (i, kind) in order.iter().enumerate() {
            if order[..i].contains(kind) {
                return Err(ConfigError::invalid(
                    "exits.priority",
                    format!("{:?} listed more than once", kind),
                ));
            }
        }
        Ok(())
    }
}

/// Stop and target levels fixed at fill time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExitPlan {
    pub stop: f64,
    pub target: f64,
}

/// Why a fill could not become a position.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PlanRejection {
    StopWrongSide { stop: f64, fill: f64 },
    TargetWrongSide { target: f64, fill: f64 },
}

impl std::fmt::Display for PlanRejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PlanRejection::StopWrongSide { stop, fill } => {
                write!(f, "stop {:.6} not on the losing side of fill {:.6}", stop, fill)
            }
            PlanRejection::TargetWrongSide { target, fill } => {
                write!(f, "target {:.6} not on the winning side of fill {:.6}", target, fill)
            }
        }
    }
}

/// Compute and validate the stop/target for a fill.
///
/// `atr_at_fill` is only read under [`AnchorPolicy::Entry`].
pub fn plan_exits(
    config: &ExitConfig,
    signal: &Signal,
    fill_price: f64,
    atr_at_fill: f64,
) -> Result<ExitPlan, PlanRejection> {
    let direction = signal.direction;
    let (base, atr) = match config.anchor {
        AnchorPolicy::Entry => (fill_price, atr_at_fill),
        AnchorPolicy::Signal => (signal.reference_price, signal.atr),
    };

    let stop = if config.structural_stop {
        signal.stop_reference
    } else {
        direction.adverse(base, config.stop_atr_mult * atr)
    };
    let target = direction.favorable(base, config.target_atr_mult * atr);

    let stop_ok = match direction {
        Direction::Long => stop < fill_price,
        Direction::Short => stop > fill_price,
    };
    if !stop_ok {
        return Err(PlanRejection::StopWrongSide {
            stop,
            fill: fill_price,
        });
    }

    let target_ok = match direction {
        Direction::Long => target > fill_price,
        Direction::Short => target < fill_price,
    };
    if !target_ok {
        return Err(PlanRejection::TargetWrongSide {
            target,
            fill: fill_price,
        });
    }

    Ok(ExitPlan { stop, target })
}

/// A triggered exit: reason and execution price.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExitFill {
    pub reason: ExitReason,
    pub price: f64,
}

/// Evaluate exit conditions on bar `bar_index`.
///
/// Conditions are checked in `config.priority` order. Stop and target fill
/// at their level, the opposite trigger and the holding timeout at the
/// close. At most one exit is returned. Nothing fires on the fill bar.
pub fn check_exit(
    config: &ExitConfig,
    position: &Position,
    bar_index: usize,
    bar: &Bar,
    opposite_fired: bool,
) -> Option<ExitFill> {
    if bar_index <= position.entry_bar {
        return None;
    }

    config.priority.sequence().into_iter().find_map(|kind| match kind {
        ExitKind::Stop => position.stop_hit(bar).then_some(ExitFill {
            reason: ExitReason::StopLoss,
            price: position.stop_price,
        }),
        ExitKind::Target => position.target_hit(bar).then_some(ExitFill {
            reason: ExitReason::TakeProfit,
            price: position.target_price,
        }),
        ExitKind::Opposite => (config.exit_on_opposite && opposite_fired).then_some(ExitFill {
            reason: ExitReason::Opposite,
            price: bar.close,
        }),
        ExitKind::Time => config
            .max_hold_bars
            .filter(|max| position.bars_held(bar_index) >= *max)
            .map(|_| ExitFill {
                reason: ExitReason::Time,
                price: bar.close,
            }),
    })
}
