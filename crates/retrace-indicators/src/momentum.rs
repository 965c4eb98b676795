//! Momentum indicators.

use std::collections::VecDeque;

use retrace_core::error::IndicatorError;
use retrace_core::traits::StreamingIndicator;
use retrace_core::types::Bar;

/// Relative Strength Index (RSI) with Wilder's smoothing.
///
/// Average gain and loss are seeded with the simple mean of the first
/// `period` close-to-close changes, then smoothed as
/// `avg = (prev_avg * (period - 1) + change) / period`.
/// The first value is available after `period + 1` bars.
#[derive(Debug, Clone)]
pub struct Rsi {
    period: usize,
    prev_close: Option<f64>,
    changes: usize,
    gain_sum: f64,
    loss_sum: f64,
    avg_gain: f64,
    avg_loss: f64,
    current: Option<f64>,
}

impl Rsi {
    /// Create a new RSI indicator.
    ///
    /// Common periods are 14 (default) or 9.
    pub fn new(period: usize) -> Result<Self, IndicatorError> {
        if period == 0 {
            return Err(IndicatorError::InvalidParameter(
                "RSI period must be greater than 0".to_string(),
            ));
        }
        Ok(Self {
            period,
            prev_close: None,
            changes: 0,
            gain_sum: 0.0,
            loss_sum: 0.0,
            avg_gain: 0.0,
            avg_loss: 0.0,
            current: None,
        })
    }

    fn value(avg_gain: f64, avg_loss: f64) -> f64 {
        if avg_loss == 0.0 {
            100.0
        } else {
            100.0 - (100.0 / (1.0 + avg_gain / avg_loss))
        }
    }
}

impl StreamingIndicator for Rsi {
    type Output = f64;

    fn update(&mut self, bar: &Bar) -> Option<f64> {
        let prev = self.prev_close.replace(bar.close)?;

        let change = bar.close - prev;
        let (gain, loss) = if change > 0.0 { (change, 0.0) } else { (0.0, -change) };
        self.changes += 1;

        let period = self.period as f64;
        if self.changes < self.period {
            self.gain_sum += gain;
            self.loss_sum += loss;
            return None;
        }
        if self.changes == self.period {
            self.avg_gain = (self.gain_sum + gain) / period;
            self.avg_loss = (self.loss_sum + loss) / period;
        } else {
            self.avg_gain = (self.avg_gain * (period - 1.0) + gain) / period;
            self.avg_loss = (self.avg_loss * (period - 1.0) + loss) / period;
        }

        self.current = Some(Self::value(self.avg_gain, self.avg_loss));
        self.current
    }

    fn current(&self) -> Option<f64> {
        self.current
    }

    fn reset(&mut self) {
        self.prev_close = None;
        self.changes = 0;
        self.gain_sum = 0.0;
        self.loss_sum = 0.0;
        self.avg_gain = 0.0;
        self.avg_loss = 0.0;
        self.current = None;
    }

    fn period(&self) -> usize {
        self.period + 1
    }

    fn name(&self) -> &str {
        "RSI"
    }
}

/// Close-to-close return over `bars` bars, as a fraction.
#[derive(Debug, Clone)]
pub struct TrailingReturn {
    bars: usize,
    closes: VecDeque<f64>,
}

impl TrailingReturn {
    /// Create a trailing return over `bars` bars.
    pub fn new(bars: usize) -> Result<Self, IndicatorError> {
        if bars == 0 {
            return Err(IndicatorError::InvalidParameter(
                "trailing return length must be greater than 0".to_string(),
            ));
        }
        Ok(Self {
            bars,
            closes: VecDeque::with_capacity(bars + 1),
        })
    }
}

impl StreamingIndicator for TrailingReturn {
    type Output = f64;

    fn update(&mut self, bar: &Bar) -> Option<f64> {
        if self.closes.len() == self.bars + 1 {
            self.closes.pop_front();
        }
        self.closes.push_back(bar.close);
        self.current()
    }

    fn current(&self) -> Option<f64> {
        if self.closes.len() < self.bars + 1 {
            return None;
        }
        let first = *self.closes.front()?;
        let last = *self.closes.back()?;
        (first != 0.0).then(|| last / first - 1.0)
    }

    fn reset(&mut self) {
        self.closes.clear();
    }

    fn period(&self) -> usize {
        self.bars + 1
    }

    fn name(&self) -> &str {
        "TrailingReturn"
    }
}
