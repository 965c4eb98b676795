//! Per-bar indicator values.

use serde::{Deserialize, Serialize};

/// Indicator values derived for one bar.
///
/// Every value is `None` until its warm-up has elapsed. Consumers skip
/// bars with undefined inputs instead of treating them as zero.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IndicatorSnapshot {
    /// Index of the bar this snapshot belongs to
    pub bar_index: usize,
    /// Close of the bar
    pub close: f64,
    /// RSI on this bar
    pub rsi: Option<f64>,
    /// RSI on the previous bar
    pub prev_rsi: Option<f64>,
    /// Average true range
    pub atr: Option<f64>,
    /// EMA values keyed by span
    pub emas: Vec<(usize, Option<f64>)>,
    /// Lowest low over the swing lookback, current bar included
    pub swing_low: Option<f64>,
    /// Highest high over the swing lookback, current bar included
    pub swing_high: Option<f64>,
    /// Trailing close-to-close return as a fraction
    pub trailing_return: Option<f64>,
    /// High-low range of the rolling window as a percentage of its low
    pub window_range_pct: Option<f64>,
    /// Return across the rolling window as a percentage
    pub window_return_pct: Option<f64>,
}

impl IndicatorSnapshot {
    /// EMA value for `span`, if that span is tracked and warmed up.
    pub fn ema(&self, span: usize) -> Option<f64> {
        self.emas
            .iter()
            .find(|(s, _)| *s == span)
            .and_then(|(_, v)| *v)
    }

    /// ATR as a percentage of the close.
    pub fn atr_pct(&self) -> Option<f64> {
        self.atr
            .filter(|_| self.close > 0.0)
            .map(|atr| atr / self.close * 100.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ema_lookup() {
        let snapshot = IndicatorSnapshot {
            emas: vec![(20, Some(101.5)), (200, None)],
            ..Default::default()
        };

        assert_eq!(snapshot.ema(20), Some(101.5));
        assert_eq!(snapshot.ema(200), None);
        assert_eq!(snapshot.ema(50), None);
    }

    #[test]
    fn test_atr_pct() {
        let snapshot = IndicatorSnapshot {
            close: 200.0,
            atr: Some(3.0),
            ..Default::default()
        };
        assert!((snapshot.atr_pct().unwrap() - 1.5).abs() < 1e-12);

        let not_ready = IndicatorSnapshot {
            close: 200.0,
            ..Default::default()
        };
        assert!(not_ready.atr_pct().is_none());
    }
}
