//! Bar timeframes.

use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Bar interval. Crypto markets trade around the clock, so every bar of a
/// given timeframe spans the same wall-clock duration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum Timeframe {
    #[serde(rename = "1m")]
    Minute1,
    #[serde(rename = "5m")]
    Minute5,
    #[serde(rename = "15m")]
    Minute15,
    #[serde(rename = "30m")]
    Minute30,
    #[serde(rename = "1h")]
    #[default]
    Hour1,
    #[serde(rename = "2h")]
    Hour2,
    #[serde(rename = "4h")]
    Hour4,
    #[serde(rename = "12h")]
    Hour12,
    #[serde(rename = "1d")]
    Daily,
}

impl Timeframe {
    /// Duration of one bar in seconds.
    pub fn as_secs(&self) -> u64 {
        match self {
            Timeframe::Minute1 => 60,
            Timeframe::Minute5 => 300,
            Timeframe::Minute15 => 900,
            Timeframe::Minute30 => 1800,
            Timeframe::Hour1 => 3600,
            Timeframe::Hour2 => 7200,
            Timeframe::Hour4 => 14400,
            Timeframe::Hour12 => 43200,
            Timeframe::Daily => 86400,
        }
    }

    /// Duration of one bar in milliseconds.
    pub fn as_millis(&self) -> i64 {
        self.as_secs() as i64 * 1000
    }

    /// Wall-clock span of `bars` consecutive bars.
    pub fn span(&self, bars: usize) -> Duration {
        Duration::milliseconds(self.as_millis() * bars as i64)
    }

    /// Get all available timeframes.
    pub fn all() -> &'static [Timeframe] {
        &[
            Timeframe::Minute1,
            Timeframe::Minute5,
            Timeframe::Minute15,
            Timeframe::Minute30,
            Timeframe::Hour1,
            Timeframe::Hour2,
            Timeframe::Hour4,
            Timeframe::Hour12,
            Timeframe::Daily,
        ]
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Timeframe::Minute1 => "1m",
            Timeframe::Minute5 => "5m",
            Timeframe::Minute15 => "15m",
            Timeframe::Minute30 => "30m",
            Timeframe::Hour1 => "1h",
            Timeframe::Hour2 => "2h",
            Timeframe::Hour4 => "4h",
            Timeframe::Hour12 => "12h",
            Timeframe::Daily => "1d",
        };
        write!(f, "{}", s)
    }
}

impl FromStr for Timeframe {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "1m" | "1min" => Ok(Timeframe::Minute1),
            "5m" | "5min" => Ok(Timeframe::Minute5),
            "15m" | "15min" => Ok(Timeframe::Minute15),
            "30m" | "30min" => Ok(Timeframe::Minute30),
            "1h" | "60m" | "hour" => Ok(Timeframe::Hour1),
            "2h" | "120m" => Ok(Timeframe::Hour2),
            "4h" | "240m" => Ok(Timeframe::Hour4),
            "12h" => Ok(Timeframe::Hour12),
            "1d" | "day" | "daily" => Ok(Timeframe::Daily),
            _ => {
                let valid: Vec<String> = Timeframe::all().iter().map(|tf| tf.to_string()).collect();
                Err(format!("Invalid timeframe: {} (expected one of {})", s, valid.join(", ")))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeframe_duration() {
        assert_eq!(Timeframe::Minute15.as_secs(), 900);
        assert_eq!(Timeframe::Hour4.as_millis(), 14_400_000);
        assert_eq!(Timeframe::Hour1.span(3), Duration::seconds(10_800));
    }

    #[test]
    fn test_timeframe_parse() {
        assert_eq!(Timeframe::from_str("4h").unwrap(), Timeframe::Hour4);
        assert_eq!(Timeframe::from_str("240m").unwrap(), Timeframe::Hour4);
        assert_eq!(Timeframe::from_str("daily").unwrap(), Timeframe::Daily);
        let err = Timeframe::from_str("1w").unwrap_err();
        assert!(err.contains("expected one of 1m, 5m, 15m"));
    }

    #[test]
    fn test_timeframe_display_roundtrips_through_serde() {
        for tf in Timeframe::all() {
            let json = serde_json::to_string(tf).unwrap();
            assert_eq!(json, format!("\"{}\"", tf));
        }
    }
}
