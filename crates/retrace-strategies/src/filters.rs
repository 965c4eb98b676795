//! Optional pre-filters gating arms or signals.
//!
//! A filter never changes the state machine itself. It either lets the
//! gated transition through or blocks it, and a filter whose input is not
//! yet defined blocks.

use chrono::{Datelike, Timelike, Weekday};
use serde::{Deserialize, Serialize};

use retrace_core::error::ConfigError;
use retrace_core::traits::{BarContext, ValidateConfig};
use retrace_core::types::Direction;

/// Where the filters are applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterStage {
    /// Gate the IDLE → ARMED transition
    #[default]
    Arm,
    /// Gate signal emission on the break bar
    Signal,
}

/// Required relation between trailing momentum and trade direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MomentumMode {
    /// Long only after a positive trailing return, short only after a negative one
    WithTrend,
    /// Long only after a negative trailing return, short only after a positive one
    AgainstTrend,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MomentumFilter {
    /// Bars the trailing return is measured over
    pub bars: usize,
    pub mode: MomentumMode,
}

/// Thresholds on the rolling range window.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowFilter {
    /// Minimum high-low range of the window, percent
    pub min_range_pct: Option<f64>,
    /// Maximum absolute return across the window, percent
    pub max_abs_return_pct: Option<f64>,
}

/// UTC trading-session restriction.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionFilter {
    /// Hours (0-23, UTC) in which the gated transition may happen; empty means all
    pub allowed_hours: Vec<u32>,
    /// Days on which the gated transition may not happen
    pub excluded_weekdays: Vec<Weekday>,
}

/// Higher-timeframe bias approximated by a long-span EMA on the base timeframe.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrendBiasFilter {
    pub ema_span: usize,
}

/// All pre-filters of a detector.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    pub stage: FilterStage,
    pub momentum: Option<MomentumFilter>,
    pub window: Option<WindowFilter>,
    /// Minimum `atr / close`, percent
    pub min_atr_pct: Option<f64>,
    pub session: Option<SessionFilter>,
    pub trend_bias: Option<TrendBiasFilter>,
}

impl FilterConfig {
    /// Whether any filter is configured.
    pub fn is_empty(&self) -> bool {
        self.momentum.is_none()
            && self.window.is_none()
            && self.min_atr_pct.is_none()
            && self.session.is_none()
            && self.trend_bias.is_none()
    }

    /// Check every configured filter for a transition in `direction`.
    ///
    /// Returns the name of the first filter that blocks.
    pub fn check(&self, direction: Direction, ctx: &BarContext<'_>) -> Result<(), &'static str> {
        if self.is_empty() {
            return Ok(());
        }
        let snap = ctx.snapshot;

        if let Some(momentum) = &self.momentum {
            let ret = snap.trailing_return.ok_or("momentum")?;
            let aligned = match direction {
                Direction::Long => ret > 0.0,
                Direction::Short => ret < 0.0,
            };
            let countered = match direction {
                Direction::Long => ret < 0.0,
                Direction::Short => ret > 0.0,
            };
            let pass = match momentum.mode {
                MomentumMode::WithTrend => aligned,
                MomentumMode::AgainstTrend => countered,
            };
            if !pass {
                return Err("momentum");
            }
        }

        if let Some(window) = &self.window {
            if let Some(min_range) = window.min_range_pct {
                let range = snap.window_range_pct.ok_or("window_range")?;
                if range < min_range {
                    return Err("window_range");
                }
            }
            if let Some(max_return) = window.max_abs_return_pct {
                let ret = snap.window_return_pct.ok_or("window_return")?;
                if ret.abs() > max_return {
                    return Err("window_return");
                }
            }
        }

        if let Some(min_atr_pct) = self.min_atr_pct {
            let atr_pct = snap.atr_pct().ok_or("volatility")?;
            if atr_pct < min_atr_pct {
                return Err("volatility");
            }
        }

        if let Some(session) = &self.session {
            let time = ctx.bar.datetime();
            if !session.allowed_hours.is_empty() && !session.allowed_hours.contains(&time.hour()) {
                return Err("session");
            }
            if session.excluded_weekdays.contains(&time.weekday()) {
                return Err("session");
            }
        }

        if let Some(bias) = &self.trend_bias {
            let ema = snap.ema(bias.ema_span).ok_or("trend_bias")?;
            let pass = match direction {
                Direction::Long => snap.close > ema,
                Direction::Short => snap.close < ema,
            };
            if !pass {
                return Err("trend_bias");
            }
        }

        Ok(())
    }
}

impl ValidateConfig for FilterConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if let Some(momentum) = &self.momentum {
            if momentum.bars == 0 {
                return Err(ConfigError::invalid("filters.momentum.bars", "must be at least 1"));
            }
        }
        if let Some(window) = &self.window {
            if window.min_range_pct.is_some_and(|v| v < 0.0) {
                return Err(ConfigError::invalid("filters.window.min_range_pct", "must be >= 0"));
            }
            if window.max_abs_return_pct.is_some_and(|v| v <= 0.0) {
                return Err(ConfigError::invalid(
                    "filters.window.max_abs_return_pct",
                    "must be > 0",
                ));
            }
        }
        if self.min_atr_pct.is_some_and(|v| v < 0.0) {
            return Err(ConfigError::invalid("filters.min_atr_pct", "must be >= 0"));
        }
        if let Some(session) = &self.session {
            if let Some(hour) = session.allowed_hours.iter().find(|h| **h > 23) {
                return Err(ConfigError::invalid(
                    "filters.session.allowed_hours",
                    format!("hour {} outside 0..=23", hour),
                ));
            }
        }
        if let Some(bias) = &self.trend_bias {
            if bias.ema_span < 2 {
                return Err(ConfigError::invalid("filters.trend_bias.ema_span", "must be at least 2"));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use retrace_core::types::{Bar, IndicatorSnapshot};

    // 2024-01-01 was a Monday
    const MONDAY_MIDNIGHT: i64 = 1_704_067_200_000;
    const HOUR: i64 = 3_600_000;

    fn check(
        filters: &FilterConfig,
        direction: Direction,
        bar: &Bar,
        snapshot: &IndicatorSnapshot,
    ) -> Result<(), &'static str> {
        let ctx = BarContext {
            symbol: "BTCUSDT",
            bar_index: 0,
            bar,
            snapshot,
        };
        filters.check(direction, &ctx)
    }

    #[test]
    fn test_empty_filters_pass() {
        let filters = FilterConfig::default();
        assert!(filters.is_empty());
        assert!(check(&filters, Direction::Long, &Bar::default(), &IndicatorSnapshot::default()).is_ok());
    }

    #[test]
    fn test_momentum_modes() {
        let snapshot = IndicatorSnapshot {
            trailing_return: Some(0.03),
            ..Default::default()
        };
        let bar = Bar::default();

        let with = FilterConfig {
            momentum: Some(MomentumFilter { bars: 12, mode: MomentumMode::WithTrend }),
            ..Default::default()
        };
        assert!(check(&with, Direction::Long, &bar, &snapshot).is_ok());
        assert_eq!(check(&with, Direction::Short, &bar, &snapshot), Err("momentum"));

        let against = FilterConfig {
            momentum: Some(MomentumFilter { bars: 12, mode: MomentumMode::AgainstTrend }),
            ..Default::default()
        };
        assert!(check(&against, Direction::Short, &bar, &snapshot).is_ok());
        assert_eq!(check(&against, Direction::Long, &bar, &snapshot), Err("momentum"));
    }

    #[test]
    fn test_undefined_input_blocks() {
        let filters = FilterConfig {
            min_atr_pct: Some(0.5),
            ..Default::default()
        };
        let snapshot = IndicatorSnapshot {
            close: 100.0,
            ..Default::default()
        };
        assert_eq!(check(&filters, Direction::Long, &Bar::default(), &snapshot), Err("volatility"));
    }

    #[test]
    fn test_window_thresholds() {
        let filters = FilterConfig {
            window: Some(WindowFilter {
                min_range_pct: Some(3.0),
                max_abs_return_pct: Some(5.0),
            }),
            ..Default::default()
        };
        let bar = Bar::default();
        let ok = IndicatorSnapshot {
            window_range_pct: Some(4.0),
            window_return_pct: Some(-4.5),
            ..Default::default()
        };
        assert!(check(&filters, Direction::Long, &bar, &ok).is_ok());

        let narrow = IndicatorSnapshot {
            window_range_pct: Some(2.0),
            ..ok.clone()
        };
        assert_eq!(check(&filters, Direction::Long, &bar, &narrow), Err("window_range"));

        let runaway = IndicatorSnapshot {
            window_return_pct: Some(6.0),
            ..ok
        };
        assert_eq!(check(&filters, Direction::Long, &bar, &runaway), Err("window_return"));
    }

    #[test]
    fn test_session_hours_and_weekdays() {
        let filters = FilterConfig {
            session: Some(SessionFilter {
                allowed_hours: vec![8, 9, 10],
                excluded_weekdays: vec![Weekday::Sat, Weekday::Sun],
            }),
            ..Default::default()
        };
        let snapshot = IndicatorSnapshot::default();

        let monday_9 = Bar::new(MONDAY_MIDNIGHT + 9 * HOUR, 1.0, 1.0, 1.0, 1.0, 0.0);
        assert!(check(&filters, Direction::Long, &monday_9, &snapshot).is_ok());

        let monday_12 = Bar::new(MONDAY_MIDNIGHT + 12 * HOUR, 1.0, 1.0, 1.0, 1.0, 0.0);
        assert_eq!(check(&filters, Direction::Long, &monday_12, &snapshot), Err("session"));

        let saturday_9 = Bar::new(MONDAY_MIDNIGHT + (5 * 24 + 9) * HOUR, 1.0, 1.0, 1.0, 1.0, 0.0);
        assert_eq!(check(&filters, Direction::Long, &saturday_9, &snapshot), Err("session"));
    }

    #[test]
    fn test_trend_bias() {
        let filters = FilterConfig {
            trend_bias: Some(TrendBiasFilter { ema_span: 200 }),
            ..Default::default()
        };
        let snapshot = IndicatorSnapshot {
            close: 105.0,
            emas: vec![(200, Some(100.0))],
            ..Default::default()
        };
        let bar = Bar::default();

        assert!(check(&filters, Direction::Long, &bar, &snapshot).is_ok());
        assert_eq!(check(&filters, Direction::Short, &bar, &snapshot), Err("trend_bias"));
    }

    #[test]
    fn test_validation() {
        assert!(FilterConfig::default().validate().is_ok());

        let bad_hour = FilterConfig {
            session: Some(SessionFilter {
                allowed_hours: vec![24],
                excluded_weekdays: vec![],
            }),
            ..Default::default()
        };
        assert!(bad_hour.validate().is_err());
    }
}
