//! In-process paper exchange.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::{BoxStream, StreamExt};
use rust_decimal::Decimal;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, warn};
use uuid::Uuid;

use retrace_core::error::ExchangeError;
use retrace_core::traits::ExchangeClient;
use retrace_core::types::{
    Bar, CancelOutcome, ExchangeOrder, Fill, OrderKind, OrderRequest, OrderStatus,
};

/// Paper exchange for simulation.
///
/// Limit orders fill at exactly their limit price on the first bar whose
/// range contains it.
///
/// A market order fills inside `place_order` at the last close seen for its
/// symbol. Before any bar of that symbol has arrived it rests open instead,
/// and the next bar fed through [`PaperExchange::on_bar`] fills it at that
/// bar's open.
pub struct PaperExchange {
    orders: Arc<Mutex<HashMap<Uuid, ExchangeOrder>>>,
    last_prices: Arc<Mutex<HashMap<String, f64>>>,
    fills_tx: Option<mpsc::UnboundedSender<Fill>>,
}

impl PaperExchange {
    pub fn new() -> Self {
        Self {
            orders: Arc::new(Mutex::new(HashMap::new())),
            last_prices: Arc::new(Mutex::new(HashMap::new())),
            fills_tx: None,
        }
    }

    /// Create an exchange that also pushes every fill to a channel.
    pub fn with_fill_notifications() -> (Self, mpsc::UnboundedReceiver<Fill>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let exchange = Self {
            fills_tx: Some(tx),
            ..Self::new()
        };
        (exchange, rx)
    }

    fn notify(&self, fill: &Fill) {
        if let Some(tx) = &self.fills_tx {
            if tx.send(fill.clone()).is_err() {
                debug!(order = %fill.order_id, "Fill receiver dropped");
            }
        }
    }

    /// Feed a bar: fills every open order of `symbol` the bar trades through.
    pub async fn on_bar(&self, symbol: &str, bar: &Bar) -> Vec<Fill> {
        self.on_bar_at(symbol, bar, Utc::now()).await
    }

    /// [`PaperExchange::on_bar`] with an explicit fill timestamp.
    pub async fn on_bar_at(&self, symbol: &str, bar: &Bar, now: DateTime<Utc>) -> Vec<Fill> {
        let mut fills = Vec::new();
        {
            let mut orders = self.orders.lock().await;
            for order in orders.values_mut() {
                if order.status != OrderStatus::Open || order.request.symbol != symbol {
                    continue;
                }
                let price = match order.request.kind {
                    OrderKind::Limit { price } if bar.contains(price) => price,
                    OrderKind::Limit { .. } => continue,
                    // Only market orders placed before the symbol's first bar rest
                    OrderKind::Market => bar.open,
                };
                fills.push(order.fill_at(price, now));
            }
        }
        self.last_prices
            .lock()
            .await
            .insert(symbol.to_string(), bar.close);

        // Deterministic notification order
        fills.sort_by_key(|fill| fill.order_id);
        for fill in &fills {
            debug!(order = %fill.order_id, price = fill.price, "Paper fill");
            self.notify(fill);
        }
        fills
    }

    /// Orders still open for `symbol`.
    pub async fn open_orders(&self, symbol: &str) -> Vec<ExchangeOrder> {
        self.orders
            .lock()
            .await
            .values()
            .filter(|o| o.status == OrderStatus::Open && o.request.symbol == symbol)
            .cloned()
            .collect()
    }

    pub async fn order(&self, order_id: Uuid) -> Option<ExchangeOrder> {
        self.orders.lock().await.get(&order_id).cloned()
    }
}

impl Default for PaperExchange {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ExchangeClient for PaperExchange {
    async fn place_order(&self, request: OrderRequest) -> Result<ExchangeOrder, ExchangeError> {
        if request.size <= Decimal::ZERO {
            return Err(ExchangeError::OrderRejected(format!(
                "size must be positive, got {}",
                request.size
            )));
        }
        if let OrderKind::Limit { price } = request.kind {
            if !price.is_finite() || price <= 0.0 {
                return Err(ExchangeError::OrderRejected(format!(
                    "invalid limit price {}",
                    price
                )));
            }
        }

        let now = Utc::now();
        let last_price = self.last_prices.lock().await.get(&request.symbol).copied();
        let mut order = ExchangeOrder::from_request(request, now);

        let fill = match (order.request.kind, last_price) {
            (OrderKind::Market, Some(price)) => Some(order.fill_at(price, now)),
            _ => None,
        };

        self.orders.lock().await.insert(order.id, order.clone());
        if let Some(fill) = &fill {
            self.notify(fill);
        }
        Ok(order)
    }

    async fn cancel_order(&self, order_id: Uuid) -> Result<CancelOutcome, ExchangeError> {
        let mut orders = self.orders.lock().await;
        let order = orders
            .get_mut(&order_id)
            .ok_or_else(|| ExchangeError::OrderNotFound(order_id.to_string()))?;

        match order.status {
            OrderStatus::Open => {
                order.status = OrderStatus::Canceled;
                order.updated_at = Utc::now();
                Ok(CancelOutcome::Canceled)
            }
            OrderStatus::Filled => match &order.fill {
                Some(fill) => Ok(CancelOutcome::AlreadyFilled(fill.clone())),
                None => {
                    warn!(order = %order_id, "Filled order without fill record");
                    Err(ExchangeError::ApiError(format!(
                        "order {} filled without fill record",
                        order_id
                    )))
                }
            },
            OrderStatus::Canceled | OrderStatus::Rejected => Ok(CancelOutcome::AlreadyCanceled),
        }
    }

    async fn poll_fill(&self, order_id: Uuid) -> Result<Option<Fill>, ExchangeError> {
        self.orders
            .lock()
            .await
            .get(&order_id)
            .map(|order| order.fill.clone())
            .ok_or_else(|| ExchangeError::OrderNotFound(order_id.to_string()))
    }

    fn name(&self) -> &str {
        "Paper Exchange"
    }
}

/// Replay historical bars through `exchange` as a live feed.
///
/// Bars are yielded in `(timestamp, symbol)` order. Each bar is shown to the
/// exchange before it is yielded, so resting orders fill before the
/// consumer sees the bar that filled them.
pub fn replay_feed(
    exchange: Arc<PaperExchange>,
    data: BTreeMap<String, Vec<Bar>>,
) -> BoxStream<'static, (String, Bar)> {
    let mut merged: Vec<(String, Bar)> = data
        .into_iter()
        .flat_map(|(symbol, bars)| bars.into_iter().map(move |bar| (symbol.clone(), bar)))
        .collect();
    // Stable, so symbols keep map order within a timestamp
    merged.sort_by_key(|(_, bar)| bar.timestamp);

    tokio_stream::iter(merged)
        .then(move |(symbol, bar)| {
            let exchange = Arc::clone(&exchange);
            async move {
                exchange.on_bar_at(&symbol, &bar, bar.datetime()).await;
                (symbol, bar)
            }
        })
        .boxed()
}
