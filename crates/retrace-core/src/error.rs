//! Error types for the backtester.

use thiserror::Error;

/// Top-level error.
#[derive(Error, Debug)]
pub enum RetraceError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Exchange error: {0}")]
    Exchange(#[from] ExchangeError),

    #[error("Data error: {0}")]
    Data(#[from] DataError),

    #[error("Indicator error: {0}")]
    Indicator(#[from] IndicatorError),

    #[error("Sizing error: {0}")]
    Sizing(#[from] SizingError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Strategy configuration errors.
///
/// Raised when a strategy instance is constructed, never mid-run.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    InvalidParameter { field: &'static str, reason: String },

    #[error("target on the wrong side of entry: {0}")]
    TargetWrongSide(String),

    #[error("strategy preset not found: {0}")]
    PresetNotFound(String),

    #[error("malformed configuration: {0}")]
    Malformed(String),
}

impl ConfigError {
    /// Shorthand for [`ConfigError::InvalidParameter`].
    pub fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        ConfigError::InvalidParameter {
            field,
            reason: reason.into(),
        }
    }
}

/// Exchange client errors.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExchangeError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Order rejected: {0}")]
    OrderRejected(String),

    #[error("Order not found: {0}")]
    OrderNotFound(String),

    #[error("Rate limited: retry after {retry_after_secs} seconds")]
    RateLimited { retry_after_secs: u64 },

    #[error("API error: {0}")]
    ApiError(String),
}

/// Data source errors.
#[derive(Error, Debug)]
pub enum DataError {
    #[error("Symbol not found: {0}")]
    SymbolNotFound(String),

    #[error("No data available for the requested range")]
    NoDataAvailable,

    #[error("Bars out of order at index {index}: {timestamp} <= {previous}")]
    OutOfOrder {
        index: usize,
        previous: i64,
        timestamp: i64,
    },

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Data source error: {0}")]
    Internal(String),
}

/// Indicator calculation errors.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum IndicatorError {
    #[error("Insufficient data: need {required} points, have {available}")]
    InsufficientData { required: usize, available: usize },

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),
}

/// Position sizing errors.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SizingError {
    #[error("stop distance is zero")]
    ZeroStopDistance,

    #[error("stop distance is negative or not finite: {0}")]
    InvalidStopDistance(f64),

    #[error("equity is not positive: {0}")]
    NonPositiveEquity(rust_decimal::Decimal),
}

/// Result type alias for backtester operations.
pub type RetraceResult<T> = Result<T, RetraceError>;
