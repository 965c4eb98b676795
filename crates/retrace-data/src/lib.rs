//! Historical bar loading.

mod csv_source;

use std::collections::BTreeMap;

pub use csv_source::{parse_bars, parse_timestamp, read_bars, CsvDataSource};

use retrace_core::error::DataError;
use retrace_core::traits::DataSource;
use retrace_core::types::{Bar, Timeframe};

/// Load `symbols` from `source`, keyed by symbol.
///
/// An empty `symbols` list loads everything the source serves.
pub async fn load_symbols(
    source: &dyn DataSource,
    symbols: &[String],
    timeframe: Timeframe,
) -> Result<BTreeMap<String, Vec<Bar>>, DataError> {
    let symbols = if symbols.is_empty() {
        source.symbols().await?
    } else {
        symbols.to_vec()
    };

    let mut data = BTreeMap::new();
    for symbol in symbols {
        let bars = source.load_bars(&symbol, timeframe).await?;
        tracing::info!(
            source = source.name(),
            %symbol,
            %timeframe,
            bars = bars.len(),
            "Loaded bars"
        );
        data.insert(symbol, bars);
    }
    Ok(data)
}
