//! Data source trait definitions.

use crate::error::DataError;
use crate::types::{Bar, Timeframe};
use async_trait::async_trait;

/// Trait for historical bar sources.
#[async_trait]
pub trait DataSource: Send + Sync {
    /// Load every bar available for a symbol.
    ///
    /// # Returns
    /// Bars ordered from oldest to newest, timestamps strictly increasing
    async fn load_bars(&self, symbol: &str, timeframe: Timeframe) -> Result<Vec<Bar>, DataError>;

    /// Symbols this source can serve.
    async fn symbols(&self) -> Result<Vec<String>, DataError>;

    /// Get the data source name.
    fn name(&self) -> &str;
}

/// Check that timestamps are strictly increasing.
pub fn ensure_ascending(bars: &[Bar]) -> Result<(), DataError> {
    for (index, pair) in bars.windows(2).enumerate() {
        if pair[1].timestamp <= pair[0].timestamp {
            return Err(DataError::OutOfOrder {
                index: index + 1,
                previous: pair[0].timestamp,
                timestamp: pair[1].timestamp,
            });
        }
    }
    Ok(())
}

/// Check that every price is finite and positive with `low <= high`.
pub fn ensure_valid_prices(bars: &[Bar]) -> Result<(), DataError> {
    for (index, bar) in bars.iter().enumerate() {
        let prices = [bar.open, bar.high, bar.low, bar.close];
        if prices.iter().any(|p| !p.is_finite() || *p <= 0.0) || bar.low > bar.high {
            return Err(DataError::ParseError(format!(
                "invalid prices at index {} (timestamp {})",
                index, bar.timestamp
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bar(ts: i64) -> Bar {
        Bar::new(ts, 1.0, 1.0, 1.0, 1.0, 0.0)
    }

    #[test]
    fn test_ensure_ascending() {
        assert!(ensure_ascending(&[]).is_ok());
        assert!(ensure_ascending(&[bar(1), bar(2), bar(5)]).is_ok());

        match ensure_ascending(&[bar(1), bar(3), bar(3)]) {
            Err(DataError::OutOfOrder { index, previous, timestamp }) => {
                assert_eq!(index, 2);
                assert_eq!(previous, 3);
                assert_eq!(timestamp, 3);
            }
            other => panic!("expected OutOfOrder, got {:?}", other),
        }
    }

    #[test]
    fn test_ensure_valid_prices() {
        assert!(ensure_valid_prices(&[bar(1), bar(2)]).is_ok());

        let inverted = Bar::new(3, 1.0, 0.9, 1.1, 1.0, 0.0);
        assert!(matches!(
            ensure_valid_prices(&[bar(1), inverted]),
            Err(DataError::ParseError(_))
        ));
        let nan = Bar::new(4, 1.0, f64::NAN, 1.0, 1.0, 0.0);
        assert!(ensure_valid_prices(&[nan]).is_err());
    }
}
