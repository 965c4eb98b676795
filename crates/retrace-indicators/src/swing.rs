//! Rolling swing extremes.

use std::collections::VecDeque;

use retrace_core::error::IndicatorError;
use retrace_core::traits::StreamingIndicator;
use retrace_core::types::Bar;

/// Lowest low and highest high over a trailing window.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SwingLevels {
    pub low: f64,
    pub high: f64,
}

/// Monotonic deque tracking the extreme of a sliding window.
///
/// Each entry is `(sequence, value)`; values are kept sorted so the front
/// is always the window extreme.
#[derive(Debug, Clone)]
struct RollingExtreme {
    entries: VecDeque<(usize, f64)>,
    keep_max: bool,
}

impl RollingExtreme {
    fn new(keep_max: bool) -> Self {
        Self {
            entries: VecDeque::new(),
            keep_max,
        }
    }

    fn push(&mut self, seq: usize, value: f64, window: usize) {
        while let Some(&(_, back)) = self.entries.back() {
            let dominated = if self.keep_max { back <= value } else { back >= value };
            if !dominated {
                break;
            }
            self.entries.pop_back();
        }
        self.entries.push_back((seq, value));

        while let Some(&(front_seq, _)) = self.entries.front() {
            if front_seq + window > seq {
                break;
            }
            self.entries.pop_front();
        }
    }

    fn value(&self) -> Option<f64> {
        self.entries.front().map(|&(_, v)| v)
    }

    fn clear(&mut self) {
        self.entries.clear();
    }
}

/// Swing low/high over the last `lookback` bars, current bar included.
#[derive(Debug, Clone)]
pub struct Swing {
    lookback: usize,
    seen: usize,
    lows: RollingExtreme,
    highs: RollingExtreme,
}

impl Swing {
    /// Create a swing tracker over `lookback` bars.
    pub fn new(lookback: usize) -> Result<Self, IndicatorError> {
        if lookback == 0 {
            return Err(IndicatorError::InvalidParameter(
                "swing lookback must be greater than 0".to_string(),
            ));
        }
        Ok(Self {
            lookback,
            seen: 0,
            lows: RollingExtreme::new(false),
            highs: RollingExtreme::new(true),
        })
    }
}

impl StreamingIndicator for Swing {
    type Output = SwingLevels;

    fn update(&mut self, bar: &Bar) -> Option<SwingLevels> {
        self.lows.push(self.seen, bar.low, self.lookback);
        self.highs.push(self.seen, bar.high, self.lookback);
        self.seen += 1;
        self.current()
    }

    fn current(&self) -> Option<SwingLevels> {
        if self.seen < self.lookback {
            return None;
        }
        Some(SwingLevels {
            low: self.lows.value()?,
            high: self.highs.value()?,
        })
    }

    fn reset(&mut self) {
        self.seen = 0;
        self.lows.clear();
        self.highs.clear();
    }

    fn period(&self) -> usize {
        self.lookback
    }

    fn name(&self) -> &str {
        "Swing"
    }
}
