//! RSI trigger with structural-break confirmation.
//!
//! IDLE → ARMED when RSI crosses a trigger level; the swing extreme at that
//! moment becomes the break level. ARMED → signal when a close crosses the
//! break level. The stop reference is the opposite extreme of every bar from
//! the arm bar through the break bar.

use serde::{Deserialize, Serialize};
use tracing::debug;

use retrace_core::error::ConfigError;
use retrace_core::traits::{AbandonReason, BarContext, DetectorStep, SignalDetector, ValidateConfig};
use retrace_core::types::{ArmedSetup, Direction, IndicatorSnapshot, Signal, SignalReason};
use retrace_indicators::IndicatorSettings;

use crate::filters::{FilterConfig, FilterStage};

/// How a trigger crossing maps to a trade direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryStyle {
    /// Fade the extreme: overbought arms a short, oversold arms a long
    #[default]
    Reversal,
    /// Follow the extreme: overbought arms a long, oversold arms a short
    Continuation,
}

/// Which directions may arm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArmSide {
    #[default]
    Both,
    LongOnly,
    ShortOnly,
}

impl ArmSide {
    pub fn allows(&self, direction: Direction) -> bool {
        match self {
            ArmSide::Both => true,
            ArmSide::LongOnly => direction == Direction::Long,
            ArmSide::ShortOnly => direction == Direction::Short,
        }
    }
}

/// Which trigger level RSI crossed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Crossing {
    AboveHigh,
    BelowLow,
}

/// Configuration for [`RsiBreakDetector`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    /// RSI calculation period
    pub rsi_period: usize,
    /// Crossing above this level is the overbought trigger
    pub high_trigger: f64,
    /// Crossing below this level is the oversold trigger
    pub low_trigger: f64,
    /// Swing lookback in bars, current bar included
    pub lookback: usize,
    pub style: EntryStyle,
    pub arm_side: ArmSide,
    /// Abandon an arm that has not broken after this many bars
    pub max_arm_bars: Option<usize>,
    /// Largest allowed `|reference - stop| / reference`, percent
    pub max_stop_distance_pct: f64,
    /// Bars in the rolling range window (filters and signal quality)
    pub window_bars: usize,
    pub filters: FilterConfig,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            rsi_period: 14,
            high_trigger: 72.0,
            low_trigger: 28.0,
            lookback: 5,
            style: EntryStyle::Reversal,
            arm_side: ArmSide::Both,
            max_arm_bars: None,
            max_stop_distance_pct: 5.0,
            window_bars: 24,
            filters: FilterConfig::default(),
        }
    }
}

impl DetectorConfig {
    /// Indicators this detector reads, with the given ATR period.
    pub fn indicator_settings(&self, atr_period: usize) -> IndicatorSettings {
        IndicatorSettings {
            rsi_period: self.rsi_period,
            atr_period,
            swing_lookback: self.lookback,
            ema_spans: self.filters.trend_bias.iter().map(|b| b.ema_span).collect(),
            trailing_return_bars: self.filters.momentum.map(|m| m.bars),
            range_window_bars: Some(self.window_bars),
        }
    }
}

impl ValidateConfig for DetectorConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.rsi_period < 2 {
            return Err(ConfigError::invalid("detector.rsi_period", "must be at least 2"));
        }
        if !(0.0..=100.0).contains(&self.low_trigger) || !(0.0..=100.0).contains(&self.high_trigger) {
            return Err(ConfigError::invalid("detector.triggers", "must lie within 0..=100"));
        }
        if self.low_trigger >= self.high_trigger {
            return Err(ConfigError::invalid(
                "detector.triggers",
                format!(
                    "low trigger {} must be below high trigger {}",
                    self.low_trigger, self.high_trigger
                ),
            ));
        }
        if self.lookback == 0 {
            return Err(ConfigError::invalid("detector.lookback", "must be at least 1"));
        }
        if self.max_arm_bars == Some(0) {
            return Err(ConfigError::invalid("detector.max_arm_bars", "must be at least 1"));
        }
        if self.max_stop_distance_pct.is_nan() || self.max_stop_distance_pct <= 0.0 {
            return Err(ConfigError::invalid("detector.max_stop_distance_pct", "must be > 0"));
        }
        if self.window_bars == 0 {
            return Err(ConfigError::invalid("detector.window_bars", "must be at least 1"));
        }
        self.filters.validate()
    }
}

/// ARM → CONFIRM detector driven by RSI trigger crossings.
#[derive(Debug, Clone)]
pub struct RsiBreakDetector {
    name: String,
    config: DetectorConfig,
}

impl RsiBreakDetector {
    /// Create a detector from a validated configuration.
    pub fn new(name: impl Into<String>, config: DetectorConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            name: name.into(),
            config,
        })
    }

    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    fn crossing(&self, snapshot: &IndicatorSnapshot) -> Option<(Crossing, f64)> {
        let prev = snapshot.prev_rsi?;
        let rsi = snapshot.rsi?;
        if prev <= self.config.high_trigger && rsi > self.config.high_trigger {
            Some((Crossing::AboveHigh, rsi))
        } else if prev >= self.config.low_trigger && rsi < self.config.low_trigger {
            Some((Crossing::BelowLow, rsi))
        } else {
            None
        }
    }

    fn classify(&self, crossing: Crossing) -> (Direction, SignalReason) {
        match (self.config.style, crossing) {
            (EntryStyle::Reversal, Crossing::AboveHigh) => {
                (Direction::Short, SignalReason::OverboughtReversal)
            }
            (EntryStyle::Reversal, Crossing::BelowLow) => {
                (Direction::Long, SignalReason::OversoldReversal)
            }
            (EntryStyle::Continuation, Crossing::AboveHigh) => {
                (Direction::Long, SignalReason::OverboughtContinuation)
            }
            (EntryStyle::Continuation, Crossing::BelowLow) => {
                (Direction::Short, SignalReason::OversoldContinuation)
            }
        }
    }

    fn try_arm(&self, ctx: &BarContext<'_>) -> DetectorStep {
        let Some((crossing, rsi)) = self.crossing(ctx.snapshot) else {
            return DetectorStep::Idle;
        };
        let (direction, reason) = self.classify(crossing);
        if !self.config.arm_side.allows(direction) {
            return DetectorStep::Idle;
        }

        let break_level = match direction {
            Direction::Long => ctx.snapshot.swing_high,
            Direction::Short => ctx.snapshot.swing_low,
        };
        let Some(break_level) = break_level else {
            return DetectorStep::Idle;
        };

        if self.config.filters.stage == FilterStage::Arm {
            if let Err(filter) = self.config.filters.check(direction, ctx) {
                debug!(
                    symbol = ctx.symbol,
                    bar = ctx.bar_index,
                    %direction,
                    filter,
                    "Arm blocked by filter"
                );
                return DetectorStep::Idle;
            }
        }

        debug!(
            symbol = ctx.symbol,
            bar = ctx.bar_index,
            %direction,
            rsi,
            break_level,
            "Setup armed"
        );
        DetectorStep::Armed(ArmedSetup::new(
            direction,
            reason,
            ctx.bar_index,
            rsi,
            break_level,
            ctx.bar,
        ))
    }

    fn confirm(&self, setup: ArmedSetup, ctx: &BarContext<'_>) -> DetectorStep {
        let Some(atr) = ctx.snapshot.atr else {
            return DetectorStep::Abandoned {
                setup,
                reason: AbandonReason::Filtered("atr_unavailable"),
            };
        };

        let reference_price = ctx.bar.close;
        let stop_reference = setup.stop_reference();
        // Signed: a stop on the wrong side of the reference is negative
        let distance_pct =
            setup.direction.sign() * (reference_price - stop_reference) / reference_price * 100.0;

        if distance_pct.is_nan()
            || distance_pct <= 0.0
            || distance_pct > self.config.max_stop_distance_pct
        {
            return DetectorStep::Abandoned {
                setup,
                reason: AbandonReason::StopDistance {
                    distance_pct,
                    max_pct: self.config.max_stop_distance_pct,
                },
            };
        }

        if self.config.filters.stage == FilterStage::Signal {
            if let Err(filter) = self.config.filters.check(setup.direction, ctx) {
                return DetectorStep::Abandoned {
                    setup,
                    reason: AbandonReason::Filtered(filter),
                };
            }
        }

        DetectorStep::Signal(Signal {
            symbol: ctx.symbol.to_string(),
            direction: setup.direction,
            reference_price,
            bar_index: ctx.bar_index,
            timestamp: ctx.bar.timestamp,
            break_level: setup.break_level,
            stop_reference,
            atr,
            quality: ctx.snapshot.window_range_pct,
            reason: setup.reason,
        })
    }
}

impl SignalDetector for RsiBreakDetector {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        match self.config.style {
            EntryStyle::Reversal => "Fades RSI extremes after a swing break against the move",
            EntryStyle::Continuation => "Follows RSI extremes after a swing break with the move",
        }
    }

    fn warmup_period(&self) -> usize {
        // prev_rsi needs one bar beyond the first RSI value
        (self.config.rsi_period + 2).max(self.config.lookback)
    }

    fn step(&self, armed: Option<ArmedSetup>, ctx: &BarContext<'_>) -> DetectorStep {
        let Some(mut setup) = armed else {
            return self.try_arm(ctx);
        };

        setup.extend(ctx.bar);
        if setup.is_broken_by(ctx.bar.close) {
            let step = self.confirm(setup, ctx);
            if let DetectorStep::Abandoned { reason, .. } = &step {
                debug!(symbol = ctx.symbol, bar = ctx.bar_index, %reason, "Setup abandoned");
            }
            return step;
        }

        if let Some(max) = self.config.max_arm_bars {
            if setup.bars_armed(ctx.bar_index) >= max {
                debug!(symbol = ctx.symbol, bar = ctx.bar_index, "Arm expired without a break");
                return DetectorStep::Abandoned {
                    setup,
                    reason: AbandonReason::ArmExpired,
                };
            }
        }

        DetectorStep::Armed(setup)
    }

    fn opposite_trigger(&self, direction: Direction, snapshot: &IndicatorSnapshot) -> bool {
        self.crossing(snapshot)
            .map(|(crossing, _)| self.classify(crossing).0 == direction.opposite())
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filters::{MomentumFilter, MomentumMode};
    use retrace_core::types::Bar;

    fn snap(prev_rsi: f64, rsi: f64, swing_low: f64, swing_high: f64) -> IndicatorSnapshot {
        IndicatorSnapshot {
            rsi: Some(rsi),
            prev_rsi: Some(prev_rsi),
            atr: Some(0.5),
            swing_low: Some(swing_low),
            swing_high: Some(swing_high),
            window_range_pct: Some(6.0),
            ..Default::default()
        }
    }

    fn step(
        detector: &RsiBreakDetector,
        armed: Option<ArmedSetup>,
        index: usize,
        bar: Bar,
        snapshot: IndicatorSnapshot,
    ) -> DetectorStep {
        let snapshot = IndicatorSnapshot {
            bar_index: index,
            close: bar.close,
            ..snapshot
        };
        let ctx = BarContext {
            symbol: "BTCUSDT",
            bar_index: index,
            bar: &bar,
            snapshot: &snapshot,
        };
        detector.step(armed, &ctx)
    }

    fn detector(config: DetectorConfig) -> RsiBreakDetector {
        RsiBreakDetector::new("test", config).unwrap()
    }

    fn armed(step: DetectorStep) -> ArmedSetup {
        match step {
            DetectorStep::Armed(setup) => setup,
            other => panic!("expected armed, got {:?}", other),
        }
    }

    #[test]
    fn test_overbought_reversal_arms_short_at_swing_low() {
        let d = detector(DetectorConfig::default());
        let setup = armed(step(
            &d,
            None,
            0,
            Bar::new(0, 10.4, 10.6, 10.1, 10.5, 1.0),
            snap(70.0, 73.0, 10.0, 10.6),
        ));

        assert_eq!(setup.direction, Direction::Short);
        assert_eq!(setup.reason, SignalReason::OverboughtReversal);
        assert_eq!(setup.break_level, 10.0);
        assert_eq!(setup.trigger_value, 73.0);
    }

    #[test]
    fn test_break_emits_signal_with_window_stop() {
        let d = detector(DetectorConfig {
            max_stop_distance_pct: 10.0,
            ..Default::default()
        });
        let neutral = snap(73.0, 68.0, 10.0, 10.8);

        let setup = armed(step(&d, None, 0, Bar::new(0, 10.4, 10.6, 10.1, 10.5, 1.0), snap(70.0, 73.0, 10.0, 10.6)));
        let setup = armed(step(&d, Some(setup), 1, Bar::new(1, 10.5, 10.8, 10.2, 10.3, 1.0), neutral.clone()));
        let signal = match step(&d, Some(setup), 2, Bar::new(2, 10.3, 10.3, 9.7, 9.9, 1.0), neutral) {
            DetectorStep::Signal(signal) => signal,
            other => panic!("expected signal, got {:?}", other),
        };

        assert_eq!(signal.direction, Direction::Short);
        assert_eq!(signal.reference_price, 9.9);
        assert_eq!(signal.break_level, 10.0);
        assert_eq!(signal.stop_reference, 10.8);
        assert_eq!(signal.atr, 0.5);
        assert_eq!(signal.bar_index, 2);
        assert_eq!(signal.quality, Some(6.0));
    }

    #[test]
    fn test_wide_stop_abandons_arm() {
        let d = detector(DetectorConfig::default());
        let neutral = snap(73.0, 68.0, 10.0, 10.8);

        let setup = armed(step(&d, None, 0, Bar::new(0, 10.4, 10.6, 10.1, 10.5, 1.0), snap(70.0, 73.0, 10.0, 10.6)));
        let setup = armed(step(&d, Some(setup), 1, Bar::new(1, 10.5, 10.8, 10.2, 10.3, 1.0), neutral.clone()));
        match step(&d, Some(setup), 2, Bar::new(2, 10.3, 10.3, 9.7, 9.9, 1.0), neutral) {
            DetectorStep::Abandoned {
                reason: AbandonReason::StopDistance { distance_pct, max_pct },
                ..
            } => {
                assert!((distance_pct - 0.9 / 9.9 * 100.0).abs() < 1e-9);
                assert_eq!(max_pct, 5.0);
            }
            other => panic!("expected stop-distance abandon, got {:?}", other),
        }
    }

    #[test]
    fn test_continuation_maps_oversold_to_short() {
        let d = detector(DetectorConfig {
            style: EntryStyle::Continuation,
            ..Default::default()
        });
        let setup = armed(step(&d, None, 0, Bar::new(0, 20.0, 20.2, 19.5, 19.6, 1.0), snap(30.0, 25.0, 19.5, 20.5)));

        assert_eq!(setup.direction, Direction::Short);
        assert_eq!(setup.reason, SignalReason::OversoldContinuation);
        assert_eq!(setup.break_level, 19.5);
    }

    #[test]
    fn test_no_crossing_without_previous_rsi() {
        let d = detector(DetectorConfig::default());
        let snapshot = IndicatorSnapshot {
            prev_rsi: None,
            ..snap(0.0, 80.0, 10.0, 11.0)
        };
        assert_eq!(step(&d, None, 0, Bar::new(0, 10.5, 11.0, 10.0, 10.5, 1.0), snapshot), DetectorStep::Idle);
    }

    #[test]
    fn test_arm_side_restriction() {
        let d = detector(DetectorConfig {
            arm_side: ArmSide::LongOnly,
            ..Default::default()
        });
        // overbought reversal would arm a short
        assert_eq!(
            step(&d, None, 0, Bar::new(0, 10.4, 10.6, 10.1, 10.5, 1.0), snap(70.0, 73.0, 10.0, 10.6)),
            DetectorStep::Idle
        );
    }

    #[test]
    fn test_arm_expires() {
        let d = detector(DetectorConfig {
            max_arm_bars: Some(2),
            ..Default::default()
        });
        let neutral = snap(73.0, 68.0, 10.0, 10.8);
        let bar = Bar::new(0, 10.4, 10.6, 10.1, 10.5, 1.0);

        let setup = armed(step(&d, None, 5, bar, snap(70.0, 73.0, 10.0, 10.6)));
        let setup = armed(step(&d, Some(setup), 6, bar, neutral.clone()));
        assert!(matches!(
            step(&d, Some(setup), 7, bar, neutral),
            DetectorStep::Abandoned { reason: AbandonReason::ArmExpired, .. }
        ));
    }

    #[test]
    fn test_signal_stage_filter_abandons_break() {
        let d = detector(DetectorConfig {
            max_stop_distance_pct: 10.0,
            filters: FilterConfig {
                stage: FilterStage::Signal,
                momentum: Some(MomentumFilter { bars: 12, mode: MomentumMode::WithTrend }),
                ..Default::default()
            },
            ..Default::default()
        });
        // arm is not gated at signal stage even though momentum is undefined
        let setup = armed(step(&d, None, 0, Bar::new(0, 10.4, 10.6, 10.1, 10.5, 1.0), snap(70.0, 73.0, 10.0, 10.6)));

        let rising = IndicatorSnapshot {
            trailing_return: Some(0.02),
            ..snap(73.0, 68.0, 10.0, 10.8)
        };
        assert!(matches!(
            step(&d, Some(setup), 1, Bar::new(1, 10.3, 10.3, 9.7, 9.9, 1.0), rising),
            DetectorStep::Abandoned { reason: AbandonReason::Filtered("momentum"), .. }
        ));
    }

    #[test]
    fn test_opposite_trigger() {
        let reversal = detector(DetectorConfig::default());
        let overbought = snap(70.0, 73.0, 10.0, 10.6);
        // overbought arms a short, which opposes a long
        assert!(reversal.opposite_trigger(Direction::Long, &overbought));
        assert!(!reversal.opposite_trigger(Direction::Short, &overbought));

        let continuation = detector(DetectorConfig {
            style: EntryStyle::Continuation,
            ..Default::default()
        });
        assert!(continuation.opposite_trigger(Direction::Short, &overbought));
        assert!(!continuation.opposite_trigger(Direction::Long, &snap(60.0, 65.0, 10.0, 10.6)));
    }

    #[test]
    fn test_config_validation() {
        assert!(DetectorConfig::default().validate().is_ok());

        let inverted = DetectorConfig {
            low_trigger: 80.0,
            high_trigger: 70.0,
            ..Default::default()
        };
        assert!(RsiBreakDetector::new("bad", inverted).is_err());

        let zero_stop = DetectorConfig {
            max_stop_distance_pct: 0.0,
            ..Default::default()
        };
        assert!(matches!(
            zero_stop.validate(),
            Err(ConfigError::InvalidParameter { field: "detector.max_stop_distance_pct", .. })
        ));
    }

    #[test]
    fn test_indicator_settings_follow_filters() {
        let config = DetectorConfig {
            filters: FilterConfig {
                momentum: Some(MomentumFilter { bars: 12, mode: MomentumMode::WithTrend }),
                trend_bias: Some(crate::filters::TrendBiasFilter { ema_span: 200 }),
                ..Default::default()
            },
            ..Default::default()
        };
        let settings = config.indicator_settings(14);

        assert_eq!(settings.ema_spans, vec![200]);
        assert_eq!(settings.trailing_return_bars, Some(12));
        assert_eq!(settings.range_window_bars, Some(24));
        assert_eq!(settings.swing_lookback, 5);
    }
}
