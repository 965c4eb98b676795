//! Moving averages.

use std::collections::VecDeque;

use retrace_core::error::IndicatorError;
use retrace_core::traits::StreamingIndicator;
use retrace_core::types::Bar;

/// Exponential moving average of closes.
///
/// Multiplier `2 / (span + 1)`, seeded with the SMA of the first `span`
/// closes.
#[derive(Debug, Clone)]
pub struct Ema {
    span: usize,
    multiplier: f64,
    current: Option<f64>,
    count: usize,
    sum: f64,
}

impl Ema {
    /// Create a new streaming EMA.
    pub fn new(span: usize) -> Result<Self, IndicatorError> {
        if span == 0 {
            return Err(IndicatorError::InvalidParameter(
                "EMA span must be greater than 0".to_string(),
            ));
        }
        Ok(Self {
            span,
            multiplier: 2.0 / (span as f64 + 1.0),
            current: None,
            count: 0,
            sum: 0.0,
        })
    }

    /// The EMA span.
    pub fn span(&self) -> usize {
        self.span
    }

    /// Update with a raw value instead of a bar.
    pub fn update_value(&mut self, value: f64) -> Option<f64> {
        self.count += 1;

        match self.current {
            Some(ema) => {
                self.current = Some(value * self.multiplier + ema * (1.0 - self.multiplier));
            }
            None => {
                self.sum += value;
                if self.count == self.span {
                    // First EMA value is the SMA
                    self.current = Some(self.sum / self.span as f64);
                }
            }
        }
        self.current
    }
}

impl StreamingIndicator for Ema {
    type Output = f64;

    fn update(&mut self, bar: &Bar) -> Option<f64> {
        self.update_value(bar.close)
    }

    fn current(&self) -> Option<f64> {
        self.current
    }

    fn reset(&mut self) {
        self.current = None;
        self.count = 0;
        self.sum = 0.0;
    }

    fn period(&self) -> usize {
        self.span
    }

    fn name(&self) -> &str {
        "EMA"
    }
}

/// Rolling arithmetic mean over a fixed window of values.
#[derive(Debug, Clone)]
pub struct RollingMean {
    period: usize,
    window: VecDeque<f64>,
    sum: f64,
}

impl RollingMean {
    /// Create a rolling mean over `period` values.
    pub fn new(period: usize) -> Result<Self, IndicatorError> {
        if period == 0 {
            return Err(IndicatorError::InvalidParameter(
                "rolling mean period must be greater than 0".to_string(),
            ));
        }
        Ok(Self {
            period,
            window: VecDeque::with_capacity(period),
            sum: 0.0,
        })
    }

    /// Push a value and return the mean once the window is full.
    pub fn push(&mut self, value: f64) -> Option<f64> {
        if self.window.len() == self.period {
            if let Some(old) = self.window.pop_front() {
                self.sum -= old;
            }
        }
        self.window.push_back(value);
        self.sum += value;
        self.mean()
    }

    /// Current mean, if the window is full.
    pub fn mean(&self) -> Option<f64> {
        (self.window.len() == self.period).then(|| self.sum / self.period as f64)
    }

    /// Clear the window.
    pub fn clear(&mut self) {
        self.window.clear();
        self.sum = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ema_seed_and_smoothing() {
        let mut ema = Ema::new(3).unwrap();

        assert!(!ema.is_ready());
        assert!(ema.update_value(1.0).is_none());
        assert!(ema.update_value(2.0).is_none());

        // Third value triggers first output
        let first = ema.update_value(3.0).unwrap();
        assert!((first - 2.0).abs() < 1e-10); // SMA of first 3
        assert!(ema.is_ready());

        // mult = 2/(3+1) = 0.5
        let second = ema.update_value(4.0).unwrap();
        assert!((second - 3.0).abs() < 1e-10);
    }

    #[test]
    fn test_ema_reset() {
        let mut ema = Ema::new(2).unwrap();
        ema.update(&Bar::new(0, 1.0, 1.0, 1.0, 1.0, 0.0));
        ema.update(&Bar::new(1, 3.0, 3.0, 3.0, 3.0, 0.0));

        assert_eq!(ema.current(), Some(2.0));
        ema.reset();
        assert!(!ema.is_ready());
        assert!(ema.current().is_none());
    }

    #[test]
    fn test_rolling_mean() {
        let mut mean = RollingMean::new(3).unwrap();
        assert_eq!(mean.push(1.0), None);
        assert_eq!(mean.push(2.0), None);
        assert_eq!(mean.push(3.0), Some(2.0));
        assert_eq!(mean.push(7.0), Some(4.0));
    }
}
