//! Trade direction and order side.

use serde::{Deserialize, Serialize};

/// Direction of a setup, order or position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Long,
    Short,
}

impl Direction {
    /// Get the opposite direction.
    pub fn opposite(&self) -> Self {
        match self {
            Direction::Long => Direction::Short,
            Direction::Short => Direction::Long,
        }
    }

    /// +1 for long, -1 for short.
    #[inline]
    pub fn sign(&self) -> f64 {
        match self {
            Direction::Long => 1.0,
            Direction::Short => -1.0,
        }
    }

    /// Signed fractional price change from `entry` to `exit` in this direction.
    #[inline]
    pub fn price_change_fraction(&self, entry: f64, exit: f64) -> f64 {
        self.sign() * (exit - entry) / entry
    }

    /// Move `price` by `distance` in the favorable direction.
    #[inline]
    pub fn favorable(&self, price: f64, distance: f64) -> f64 {
        price + self.sign() * distance
    }

    /// Move `price` by `distance` in the adverse direction.
    #[inline]
    pub fn adverse(&self, price: f64, distance: f64) -> f64 {
        price - self.sign() * distance
    }

    /// Order side that opens a position in this direction.
    pub fn entry_side(&self) -> Side {
        match self {
            Direction::Long => Side::Buy,
            Direction::Short => Side::Sell,
        }
    }

    /// Order side that closes a position in this direction.
    pub fn exit_side(&self) -> Side {
        self.entry_side().opposite()
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Direction::Long => write!(f, "LONG"),
            Direction::Short => write!(f, "SHORT"),
        }
    }
}

/// Order side (buy or sell).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    /// Get the opposite side.
    pub fn opposite(&self) -> Self {
        match self {
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
        }
    }
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Side::Buy => write!(f, "BUY"),
            Side::Sell => write!(f, "SELL"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_direction_opposite() {
        assert_eq!(Direction::Long.opposite(), Direction::Short);
        assert_eq!(Direction::Short.opposite(), Direction::Long);
    }

    #[test]
    fn test_price_change_fraction() {
        assert!((Direction::Long.price_change_fraction(100.0, 110.0) - 0.10).abs() < 1e-12);
        assert!((Direction::Short.price_change_fraction(100.0, 110.0) + 0.10).abs() < 1e-12);
        assert!((Direction::Short.price_change_fraction(100.0, 95.0) - 0.05).abs() < 1e-12);
    }

    #[test]
    fn test_favorable_and_adverse() {
        assert_eq!(Direction::Long.favorable(10.0, 1.0), 11.0);
        assert_eq!(Direction::Long.adverse(10.0, 1.0), 9.0);
        assert_eq!(Direction::Short.favorable(10.0, 1.0), 9.0);
        assert_eq!(Direction::Short.adverse(10.0, 1.0), 11.0);
    }

    #[test]
    fn test_sides() {
        assert_eq!(Direction::Long.entry_side(), Side::Buy);
        assert_eq!(Direction::Long.exit_side(), Side::Sell);
        assert_eq!(Direction::Short.entry_side(), Side::Sell);
        assert_eq!(Direction::Short.exit_side(), Side::Buy);
    }
}
