//! Pending limit orders and exchange order types.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{Bar, Direction, Side, Signal};

/// A resting retracement limit order owned by an instrument slot.
///
/// Eligible to fill on bars `placed_at + 1 ..= placed_at + expiry_bars`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingOrder {
    /// Sequence number within a run
    pub id: u64,
    /// Instrument slot
    pub symbol: String,
    /// Entry direction
    pub direction: Direction,
    /// Limit price
    pub limit_price: f64,
    /// Bar index the order was placed on
    pub placed_at: usize,
    /// Number of bars the order may wait for a fill
    pub expiry_bars: usize,
    /// The signal this order was created from
    pub signal: Signal,
}

impl PendingOrder {
    /// Bars elapsed since placement.
    pub fn bars_elapsed(&self, bar_index: usize) -> usize {
        bar_index.saturating_sub(self.placed_at)
    }

    /// Whether the bar's range reaches the limit price.
    pub fn is_fillable_by(&self, bar: &Bar) -> bool {
        bar.contains(self.limit_price)
    }

    /// Whether an unfilled order is cancelled at `bar_index`.
    ///
    /// The order may fill on bars `placed_at + 1 ..= placed_at + expiry_bars`.
    /// The last of those is checked for a fill first and expires the order
    /// when it misses, hence `>=`: no bar beyond the window is ever seen.
    pub fn is_expired_at(&self, bar_index: usize) -> bool {
        self.bars_elapsed(bar_index) >= self.expiry_bars
    }
}

/// Order type sent to an exchange.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum OrderKind {
    /// Rest at `price` until filled or canceled
    Limit { price: f64 },
    /// Execute at the next available price
    Market,
}

impl std::fmt::Display for OrderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrderKind::Limit { price } => write!(f, "LIMIT@{}", price),
            OrderKind::Market => write!(f, "MARKET"),
        }
    }
}

/// Order status at the exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    /// Resting, may still fill
    Open,
    /// Completely filled
    Filled,
    /// Canceled before any fill
    Canceled,
    /// Refused by the exchange
    Rejected,
}

impl OrderStatus {
    /// Check if the order is in a terminal state.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, OrderStatus::Open)
    }
}

/// Order request for submitting new orders.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderRequest {
    /// Symbol to trade
    pub symbol: String,
    /// Buy or sell
    pub side: Side,
    /// Limit or market
    pub kind: OrderKind,
    /// Notional size in quote currency
    pub size: Decimal,
    /// Client-provided order ID
    pub client_order_id: Option<String>,
}

impl OrderRequest {
    /// Create a limit order request.
    pub fn limit(symbol: impl Into<String>, side: Side, size: Decimal, price: f64) -> Self {
        Self {
            symbol: symbol.into(),
            side,
            kind: OrderKind::Limit { price },
            size,
            client_order_id: None,
        }
    }

    /// Create a market order request.
    pub fn market(symbol: impl Into<String>, side: Side, size: Decimal) -> Self {
        Self {
            symbol: symbol.into(),
            side,
            kind: OrderKind::Market,
            size,
            client_order_id: None,
        }
    }

    /// Set a client order ID.
    pub fn with_client_order_id(mut self, id: impl Into<String>) -> Self {
        self.client_order_id = Some(id.into());
        self
    }
}

/// A complete execution of an order. Partial fills are not modeled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fill {
    /// Order ID this fill belongs to
    pub order_id: Uuid,
    /// Execution price
    pub price: f64,
    /// Notional filled
    pub size: Decimal,
    /// Timestamp of the fill
    pub timestamp: DateTime<Utc>,
}

/// Order as tracked by an exchange.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExchangeOrder {
    /// Exchange order ID
    pub id: Uuid,
    /// Client-provided order ID
    pub client_order_id: String,
    /// Original request
    pub request: OrderRequest,
    /// Current status
    pub status: OrderStatus,
    /// Fill, once filled
    pub fill: Option<Fill>,
    /// When the order was created
    pub created_at: DateTime<Utc>,
    /// When the order was last updated
    pub updated_at: DateTime<Utc>,
}

impl ExchangeOrder {
    /// Create a new open order from a request.
    pub fn from_request(request: OrderRequest, now: DateTime<Utc>) -> Self {
        let id = Uuid::new_v4();
        Self {
            id,
            client_order_id: request
                .client_order_id
                .clone()
                .unwrap_or_else(|| id.to_string()),
            request,
            status: OrderStatus::Open,
            fill: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Mark the order filled at `price`. Returns the fill.
    pub fn fill_at(&mut self, price: f64, now: DateTime<Utc>) -> Fill {
        let fill = Fill {
            order_id: self.id,
            price,
            size: self.request.size,
            timestamp: now,
        };
        self.fill = Some(fill.clone());
        self.status = OrderStatus::Filled;
        self.updated_at = now;
        fill
    }
}

/// Result of a cancel request. Canceling is idempotent: repeating it, or
/// racing it against a fill, always reports what actually happened.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CancelOutcome {
    /// The order was open and is now canceled
    Canceled,
    /// The order had already been canceled
    AlreadyCanceled,
    /// The order filled before the cancel took effect
    AlreadyFilled(Fill),
}
