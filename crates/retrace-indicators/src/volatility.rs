//! Volatility indicators.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use retrace_core::error::IndicatorError;
use retrace_core::traits::StreamingIndicator;
use retrace_core::types::Bar;

use crate::moving_average::RollingMean;
use crate::swing::Swing;

/// Average True Range (ATR).
///
/// Rolling arithmetic mean of true range over `period` bars. The first
/// bar has no previous close, so its true range is `high - low`.
#[derive(Debug, Clone)]
pub struct Atr {
    period: usize,
    prev_close: Option<f64>,
    mean: RollingMean,
}

impl Atr {
    /// Create a new ATR indicator.
    ///
    /// Common period is 14.
    pub fn new(period: usize) -> Result<Self, IndicatorError> {
        Ok(Self {
            period,
            prev_close: None,
            mean: RollingMean::new(period)?,
        })
    }
}

impl StreamingIndicator for Atr {
    type Output = f64;

    fn update(&mut self, bar: &Bar) -> Option<f64> {
        let tr = bar.true_range(self.prev_close);
        self.prev_close = Some(bar.close);
        self.mean.push(tr)
    }

    fn current(&self) -> Option<f64> {
        self.mean.mean()
    }

    fn reset(&mut self) {
        self.prev_close = None;
        self.mean.clear();
    }

    fn period(&self) -> usize {
        self.period
    }

    fn name(&self) -> &str {
        "ATR"
    }
}

/// Range and return across a rolling window of bars.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RangeWindowOutput {
    /// `(max high - min low) / min low * 100`
    pub range_pct: f64,
    /// `(last close / first close - 1) * 100`
    pub return_pct: f64,
}

/// Rolling range/return window, e.g. the trailing 24 hours when
/// `bars * timeframe` spans a day.
#[derive(Debug, Clone)]
pub struct RangeWindow {
    bars: usize,
    extremes: Swing,
    closes: VecDeque<f64>,
}

impl RangeWindow {
    /// Create a range window over `bars` bars.
    pub fn new(bars: usize) -> Result<Self, IndicatorError> {
        Ok(Self {
            bars,
            extremes: Swing::new(bars)?,
            closes: VecDeque::with_capacity(bars),
        })
    }
}

impl StreamingIndicator for RangeWindow {
    type Output = RangeWindowOutput;

    fn update(&mut self, bar: &Bar) -> Option<RangeWindowOutput> {
        self.extremes.update(bar);
        if self.closes.len() == self.bars {
            self.closes.pop_front();
        }
        self.closes.push_back(bar.close);
        self.current()
    }

    fn current(&self) -> Option<RangeWindowOutput> {
        let levels = self.extremes.current()?;
        let first = *self.closes.front()?;
        let last = *self.closes.back()?;
        if levels.low <= 0.0 || first <= 0.0 {
            return None;
        }
        Some(RangeWindowOutput {
            range_pct: (levels.high - levels.low) / levels.low * 100.0,
            return_pct: (last / first - 1.0) * 100.0,
        })
    }

    fn reset(&mut self) {
        self.extremes.reset();
        self.closes.clear();
    }

    fn period(&self) -> usize {
        self.bars
    }

    fn name(&self) -> &str {
        "RangeWindow"
    }
}
