//! Per-bar indicator snapshots.

use serde::{Deserialize, Serialize};

use retrace_core::error::{ConfigError, IndicatorError};
use retrace_core::traits::{StreamingIndicator, ValidateConfig};
use retrace_core::types::{Bar, IndicatorSnapshot};

use crate::momentum::{Rsi, TrailingReturn};
use crate::moving_average::Ema;
use crate::swing::Swing;
use crate::volatility::{Atr, RangeWindow};

/// Which indicators to compute, and with what windows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndicatorSettings {
    pub rsi_period: usize,
    pub atr_period: usize,
    pub swing_lookback: usize,
    pub ema_spans: Vec<usize>,
    pub trailing_return_bars: Option<usize>,
    pub range_window_bars: Option<usize>,
}

impl Default for IndicatorSettings {
    fn default() -> Self {
        Self {
            rsi_period: 14,
            atr_period: 14,
            swing_lookback: 5,
            ema_spans: Vec::new(),
            trailing_return_bars: None,
            range_window_bars: None,
        }
    }
}

impl ValidateConfig for IndicatorSettings {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.rsi_period < 2 {
            return Err(ConfigError::invalid("rsi_period", "must be at least 2"));
        }
        if self.atr_period == 0 {
            return Err(ConfigError::invalid("atr_period", "must be at least 1"));
        }
        if self.swing_lookback == 0 {
            return Err(ConfigError::invalid("lookback", "must be at least 1"));
        }
        if self.ema_spans.contains(&0) {
            return Err(ConfigError::invalid("ema_spans", "spans must be at least 1"));
        }
        if self.trailing_return_bars == Some(0) {
            return Err(ConfigError::invalid("trailing_return_bars", "must be at least 1"));
        }
        if self.range_window_bars == Some(0) {
            return Err(ConfigError::invalid("range_window_bars", "must be at least 1"));
        }
        Ok(())
    }
}

/// Feeds bars through every configured indicator and emits one
/// [`IndicatorSnapshot`] per bar.
///
/// The provider is owned by a single instrument slot and must see every
/// bar of that slot's series exactly once, in order.
#[derive(Debug, Clone)]
pub struct IndicatorProvider {
    rsi: Rsi,
    atr: Atr,
    swing: Swing,
    emas: Vec<Ema>,
    trailing_return: Option<TrailingReturn>,
    range_window: Option<RangeWindow>,
    prev_rsi: Option<f64>,
    bar_index: usize,
}

impl IndicatorProvider {
    /// Build a provider from settings.
    pub fn new(settings: &IndicatorSettings) -> Result<Self, IndicatorError> {
        let mut spans = settings.ema_spans.clone();
        spans.sort_unstable();
        spans.dedup();

        Ok(Self {
            rsi: Rsi::new(settings.rsi_period)?,
            atr: Atr::new(settings.atr_period)?,
            swing: Swing::new(settings.swing_lookback)?,
            emas: spans.into_iter().map(Ema::new).collect::<Result<_, _>>()?,
            trailing_return: settings.trailing_return_bars.map(TrailingReturn::new).transpose()?,
            range_window: settings.range_window_bars.map(RangeWindow::new).transpose()?,
            prev_rsi: None,
            bar_index: 0,
        })
    }

    /// Number of bars consumed so far.
    pub fn bars_seen(&self) -> usize {
        self.bar_index
    }

    /// Consume the next bar and return its snapshot.
    pub fn update(&mut self, bar: &Bar) -> IndicatorSnapshot {
        let prev_rsi = self.prev_rsi;
        let rsi = self.rsi.update(bar);
        self.prev_rsi = rsi;

        let swing = self.swing.update(bar);
        let range = self.range_window.as_mut().and_then(|w| w.update(bar));

        let snapshot = IndicatorSnapshot {
            bar_index: self.bar_index,
            close: bar.close,
            rsi,
            prev_rsi,
            atr: self.atr.update(bar),
            emas: self
                .emas
                .iter_mut()
                .map(|ema| (ema.span(), ema.update(bar)))
                .collect(),
            swing_low: swing.map(|s| s.low),
            swing_high: swing.map(|s| s.high),
            trailing_return: self.trailing_return.as_mut().and_then(|r| r.update(bar)),
            window_range_pct: range.map(|r| r.range_pct),
            window_return_pct: range.map(|r| r.return_pct),
        };

        self.bar_index += 1;
        snapshot
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn series(n: usize) -> Vec<Bar> {
        (0..n)
            .map(|i| {
                let c = 100.0 + (i as f64 * 0.4).sin() * 5.0;
                Bar::new(i as i64 * 60_000, c, c + 1.0, c - 1.0, c, 10.0)
            })
            .collect()
    }

    fn snapshots(bars: &[Bar]) -> Vec<IndicatorSnapshot> {
        let mut provider = IndicatorProvider::new(&settings()).unwrap();
        bars.iter().map(|bar| provider.update(bar)).collect()
    }

    fn settings() -> IndicatorSettings {
        IndicatorSettings {
            rsi_period: 14,
            atr_period: 14,
            swing_lookback: 5,
            ema_spans: vec![50, 20, 20],
            trailing_return_bars: Some(10),
            range_window_bars: Some(24),
        }
    }

    #[test]
    fn test_snapshot_warmup_is_undefined_not_zero() {
        let snaps = snapshots(&series(60));

        assert!(snaps[0].rsi.is_none());
        assert!(snaps[0].atr.is_none());
        assert!(snaps[13].rsi.is_none());
        assert!(snaps[14].rsi.is_some());
        assert!(snaps[14].prev_rsi.is_none());
        assert!(snaps[15].prev_rsi.is_some());
        assert!(snaps[3].swing_low.is_none());
        assert!(snaps[4].swing_low.is_some());
        assert!(snaps[48].ema(50).is_none());
        assert!(snaps[49].ema(50).is_some());
    }

    #[test]
    fn test_prev_rsi_is_previous_bar_value() {
        let snaps = snapshots(&series(40));
        for pair in snaps.windows(2) {
            assert_eq!(pair[1].prev_rsi, pair[0].rsi);
        }
    }

    #[test]
    fn test_ema_spans_deduplicated_and_sorted() {
        let mut provider = IndicatorProvider::new(&settings()).unwrap();
        let snap = provider.update(&Bar::new(0, 1.0, 1.0, 1.0, 1.0, 0.0));
        let spans: Vec<usize> = snap.emas.iter().map(|(s, _)| *s).collect();
        assert_eq!(spans, vec![20, 50]);
    }

    #[test]
    fn test_bar_indices_follow_bars_seen() {
        let mut provider = IndicatorProvider::new(&IndicatorSettings::default()).unwrap();
        for (i, bar) in series(20).iter().enumerate() {
            assert_eq!(provider.bars_seen(), i);
            assert_eq!(provider.update(bar).bar_index, i);
        }
        assert_eq!(provider.bars_seen(), 20);
    }

    #[test]
    fn test_settings_validation() {
        assert!(IndicatorSettings::default().validate().is_ok());

        let bad = IndicatorSettings {
            rsi_period: 1,
            ..Default::default()
        };
        assert!(matches!(
            bad.validate(),
            Err(ConfigError::InvalidParameter { field: "rsi_period", .. })
        ));
    }
}
