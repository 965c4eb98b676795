//! Parameter sweeps over strategy configurations.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use rayon::prelude::*;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use retrace_core::error::DataError;
use retrace_core::traits::ValidateConfig;
use retrace_core::types::Bar;

use crate::config::{BacktestConfig, StrategyConfig};
use crate::engine::BacktestEngine;
use crate::orders::LimitOffset;
use crate::statistics::{BacktestStats, RunCounters};

/// Parameter grid.
///
/// Each axis lists the values to try; an empty axis keeps the base value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParamGrid {
    pub high_trigger: Vec<f64>,
    pub low_trigger: Vec<f64>,
    pub lookback: Vec<usize>,
    pub max_stop_distance_pct: Vec<f64>,
    /// Limit offsets as ATR multiples
    pub offset_atr: Vec<f64>,
    pub max_wait_bars: Vec<usize>,
    pub stop_atr_mult: Vec<f64>,
    pub target_atr_mult: Vec<f64>,
    pub max_hold_bars: Vec<usize>,
    pub risk_pct: Vec<Decimal>,
}

/// One grid point.
#[derive(Debug, Clone, PartialEq)]
pub struct GridPoint {
    /// `key=value` pairs of the swept parameters
    pub label: String,
    pub strategy: StrategyConfig,
}

fn axis<T: Clone>(values: &[T], base: T) -> Vec<T> {
    if values.is_empty() {
        vec![base]
    } else {
        values.to_vec()
    }
}

fn expand<T: Clone + std::fmt::Display>(
    points: Vec<GridPoint>,
    name: &str,
    values: &[T],
    apply: impl Fn(&mut StrategyConfig, T),
) -> Vec<GridPoint> {
    if values.is_empty() {
        return points;
    }
    let apply = &apply;
    points
        .into_iter()
        .flat_map(|point| {
            values.iter().map(move |value| {
                let mut strategy = point.strategy.clone();
                apply(&mut strategy, value.clone());
                let sep = if point.label.is_empty() { "" } else { " " };
                GridPoint {
                    label: format!("{}{}{}={}", point.label, sep, name, value),
                    strategy,
                }
            })
        })
        .collect()
}

impl ParamGrid {
    /// Total number of combinations, invalid ones included.
    pub fn size(&self) -> usize {
        axis(&self.high_trigger, 0.0).len()
            * axis(&self.low_trigger, 0.0).len()
            * axis(&self.lookback, 0).len()
            * axis(&self.max_stop_distance_pct, 0.0).len()
            * axis(&self.offset_atr, 0.0).len()
            * axis(&self.max_wait_bars, 0).len()
            * axis(&self.stop_atr_mult, 0.0).len()
            * axis(&self.target_atr_mult, 0.0).len()
            * axis(&self.max_hold_bars, 0).len()
            * axis(&self.risk_pct, Decimal::ZERO).len()
    }

    /// Expand the grid around `base`, dropping combinations that fail
    /// validation.
    pub fn generate(&self, base: &StrategyConfig) -> Vec<GridPoint> {
        let mut points = vec![GridPoint {
            label: String::new(),
            strategy: base.clone(),
        }];

        points = expand(points, "high", &self.high_trigger, |s, v| s.detector.high_trigger = v);
        points = expand(points, "low", &self.low_trigger, |s, v| s.detector.low_trigger = v);
        points = expand(points, "lookback", &self.lookback, |s, v| s.detector.lookback = v);
        points = expand(points, "max_stop", &self.max_stop_distance_pct, |s, v| {
            s.detector.max_stop_distance_pct = v
        });
        points = expand(points, "offset", &self.offset_atr, |s, v| {
            s.entry.offset = LimitOffset::AtrMultiple { multiple: v }
        });
        points = expand(points, "wait", &self.max_wait_bars, |s, v| s.entry.max_wait_bars = v);
        points = expand(points, "stop", &self.stop_atr_mult, |s, v| s.exits.stop_atr_mult = v);
        points = expand(points, "target", &self.target_atr_mult, |s, v| {
            s.exits.target_atr_mult = v
        });
        points = expand(points, "hold", &self.max_hold_bars, |s, v| {
            s.exits.max_hold_bars = Some(v)
        });
        points = expand(points, "risk", &self.risk_pct, |s, v| s.sizing.risk_pct = v);

        points
            .into_iter()
            .filter(|point| match point.strategy.validate() {
                Ok(()) => true,
                Err(e) => {
                    warn!(params = %point.label, error = %e, "Skipping invalid grid point");
                    false
                }
            })
            .collect()
    }
}

/// Result of one grid point.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweepOutcome {
    pub label: String,
    pub strategy: StrategyConfig,
    pub stats: BacktestStats,
}

/// Lifecycle counters summed over every outcome.
pub fn total_counters(outcomes: &[SweepOutcome]) -> RunCounters {
    outcomes.iter().fold(RunCounters::default(), |mut total, outcome| {
        total.merge(&outcome.stats.counters);
        total
    })
}

/// Ranking order: return/drawdown descending (unavailable last), then total
/// return descending, then label.
fn rank(a: &SweepOutcome, b: &SweepOutcome) -> Ordering {
    let by_rdd = match (a.stats.return_to_drawdown, b.stats.return_to_drawdown) {
        (Some(x), Some(y)) => y.cmp(&x),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    };
    by_rdd
        .then_with(|| b.stats.total_return_pct.cmp(&a.stats.total_return_pct))
        .then_with(|| a.label.cmp(&b.label))
}

/// Parameter sweep executor.
///
/// Every grid point runs in its own engine; with parallelism enabled the
/// runs are spread over the rayon pool. The ranked output does not depend
/// on scheduling.
pub struct ParamSweep {
    initial_equity: Decimal,
    parallel: bool,
}

impl ParamSweep {
    pub fn new(initial_equity: Decimal) -> Self {
        Self {
            initial_equity,
            parallel: true,
        }
    }

    /// Enables or disables parallel execution.
    pub fn with_parallelism(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    fn run_point(
        &self,
        point: &GridPoint,
        data: &BTreeMap<String, Vec<Bar>>,
    ) -> Option<Result<SweepOutcome, DataError>> {
        let config = BacktestConfig {
            initial_equity: self.initial_equity,
            strategy: point.strategy.clone(),
        };
        let engine = match BacktestEngine::new(config) {
            Ok(engine) => engine,
            Err(e) => {
                warn!(params = %point.label, error = %e, "Skipping grid point");
                return None;
            }
        };
        Some(engine.run(data).map(|report| SweepOutcome {
            label: point.label.clone(),
            strategy: point.strategy.clone(),
            stats: report.stats,
        }))
    }

    /// Run every grid point over `data` and rank the outcomes.
    pub fn sweep(
        &self,
        grid: &ParamGrid,
        base: &StrategyConfig,
        data: &BTreeMap<String, Vec<Bar>>,
    ) -> Result<Vec<SweepOutcome>, DataError> {
        let points = grid.generate(base);
        info!(points = points.len(), parallel = self.parallel, "Starting parameter sweep");

        let outcomes: Vec<Option<Result<SweepOutcome, DataError>>> = if self.parallel {
            points
                .par_iter()
                .map(|point| self.run_point(point, data))
                .collect()
        } else {
            points.iter().map(|point| self.run_point(point, data)).collect()
        };

        let mut outcomes = outcomes
            .into_iter()
            .flatten()
            .collect::<Result<Vec<_>, _>>()?;
        outcomes.sort_by(rank);

        let totals = total_counters(&outcomes);
        info!(
            ranked = outcomes.len(),
            signals = totals.signals,
            orders_placed = totals.orders_placed,
            orders_filled = totals.orders_filled,
            "Parameter sweep complete"
        );

        Ok(outcomes)
    }
}
