//! Risk-based position sizing.

use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use retrace_core::error::{ConfigError, SizingError};
use retrace_core::traits::ValidateConfig;

/// Risk percentage applied when signal quality reaches `min_quality`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskTier {
    /// Minimum quality (window range %) for this tier
    pub min_quality: f64,
    /// Percent of equity at risk
    pub risk_pct: Decimal,
}

/// Sizing configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SizingConfig {
    /// Percent of current equity at risk per trade
    pub risk_pct: Decimal,
    /// Cap on notional as a multiple of equity
    pub max_leverage: Option<Decimal>,
    /// Quality tiers, ascending by `min_quality`; the highest matching tier wins
    pub tiers: Vec<RiskTier>,
}

impl Default for SizingConfig {
    fn default() -> Self {
        Self {
            risk_pct: dec!(1),
            max_leverage: None,
            tiers: Vec::new(),
        }
    }
}

impl ValidateConfig for SizingConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.risk_pct <= Decimal::ZERO {
            return Err(ConfigError::invalid("sizing.risk_pct", "must be > 0"));
        }
        if self.risk_pct > dec!(100) {
            return Err(ConfigError::invalid("sizing.risk_pct", "must be <= 100"));
        }
        if self.max_leverage.is_some_and(|l| l <= Decimal::ZERO) {
            return Err(ConfigError::invalid("sizing.max_leverage", "must be > 0"));
        }
        for tier in &self.tiers {
            if tier.risk_pct <= Decimal::ZERO || tier.risk_pct > dec!(100) {
                return Err(ConfigError::invalid("sizing.tiers", "risk_pct must be in (0, 100]"));
            }
            if !tier.min_quality.is_finite() {
                return Err(ConfigError::invalid("sizing.tiers", "min_quality must be finite"));
            }
        }
        if self
            .tiers
            .windows(2)
            .any(|pair| pair[1].min_quality <= pair[0].min_quality)
        {
            return Err(ConfigError::invalid(
                "sizing.tiers",
                "min_quality must be strictly ascending",
            ));
        }
        Ok(())
    }
}

/// Result of a sizing decision.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SizeDecision {
    /// Notional size in quote currency
    pub size: Decimal,
    /// Risk percentage that was applied
    pub risk_pct: Decimal,
    /// Whether the leverage cap reduced the size
    pub capped: bool,
}

/// Position sizer: `size = equity * risk_pct / 100 / stop_distance_fraction`.
///
/// Always sized on current equity, so gains and losses compound.
#[derive(Debug, Clone)]
pub struct PositionSizer {
    config: SizingConfig,
}

impl PositionSizer {
    /// Create a new position sizer.
    pub fn new(config: SizingConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &SizingConfig {
        &self.config
    }

    /// Risk percentage for a signal of the given quality.
    pub fn risk_pct_for(&self, quality: Option<f64>) -> Decimal {
        quality
            .and_then(|q| {
                self.config
                    .tiers
                    .iter()
                    .rev()
                    .find(|tier| q >= tier.min_quality)
                    .map(|tier| tier.risk_pct)
            })
            .unwrap_or(self.config.risk_pct)
    }

    /// Size from an explicit stop-distance fraction.
    pub fn size_for_distance(
        &self,
        equity: Decimal,
        risk_pct: Decimal,
        stop_fraction: Decimal,
    ) -> Result<SizeDecision, SizingError> {
        if equity <= Decimal::ZERO {
            return Err(SizingError::NonPositiveEquity(equity));
        }
        if stop_fraction.is_zero() {
            return Err(SizingError::ZeroStopDistance);
        }
        if stop_fraction.is_sign_negative() {
            return Err(SizingError::InvalidStopDistance(
                stop_fraction.to_f64().unwrap_or(f64::NAN),
            ));
        }

        let risk_amount = equity * risk_pct / dec!(100);
        let raw = risk_amount / stop_fraction;

        let (size, capped) = match self.config.max_leverage {
            Some(leverage) if raw > equity * leverage => (equity * leverage, true),
            _ => (raw, false),
        };

        Ok(SizeDecision {
            size,
            risk_pct,
            capped,
        })
    }

    /// Size a trade entering at `entry` with its stop at `stop`.
    pub fn size(
        &self,
        equity: Decimal,
        entry: f64,
        stop: f64,
        quality: Option<f64>,
    ) -> Result<SizeDecision, SizingError> {
        let fraction = (entry - stop).abs() / entry;
        if fraction == 0.0 {
            return Err(SizingError::ZeroStopDistance);
        }
        let stop_fraction = Decimal::from_f64(fraction)
            .filter(|_| fraction.is_finite())
            .ok_or(SizingError::InvalidStopDistance(fraction))?;

        self.size_for_distance(equity, self.risk_pct_for(quality), stop_fraction)
    }
}
