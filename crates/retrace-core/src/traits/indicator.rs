//! Indicator trait definitions.

use crate::types::Bar;

/// Streaming indicator that maintains internal state.
///
/// Fed one bar at a time, in order. Output stays `None` until the warm-up
/// has elapsed, and an indicator never looks at a bar it has not been given.
pub trait StreamingIndicator: Send + Sync {
    /// The output type of the indicator.
    type Output;

    /// Update the indicator with the next bar.
    ///
    /// # Returns
    /// The current indicator value, or None if not yet ready
    fn update(&mut self, bar: &Bar) -> Option<Self::Output>;

    /// Get the current value without adding new data.
    fn current(&self) -> Option<Self::Output>;

    /// Reset the indicator state.
    fn reset(&mut self);

    /// Check if the indicator has enough data to produce values.
    fn is_ready(&self) -> bool {
        self.current().is_some()
    }

    /// Number of bars needed before the first value.
    fn period(&self) -> usize;

    /// Get the name of the indicator.
    fn name(&self) -> &str;
}
