//! Exchange client trait definition.

use crate::error::ExchangeError;
use crate::types::{CancelOutcome, ExchangeOrder, Fill, OrderRequest};
use async_trait::async_trait;
use uuid::Uuid;

/// Trait for exchange integrations.
///
/// Only the three operations the order lifecycle needs are required.
/// Implementations must make `cancel_order` idempotent and must report a
/// fill that raced the cancel as [`CancelOutcome::AlreadyFilled`].
#[async_trait]
pub trait ExchangeClient: Send + Sync {
    /// Submit a new order.
    ///
    /// # Returns
    /// The created order with an ID and initial status
    async fn place_order(&self, request: OrderRequest) -> Result<ExchangeOrder, ExchangeError>;

    /// Cancel an order, reporting what actually happened to it.
    async fn cancel_order(&self, order_id: Uuid) -> Result<CancelOutcome, ExchangeError>;

    /// Check whether an order has filled.
    async fn poll_fill(&self, order_id: Uuid) -> Result<Option<Fill>, ExchangeError>;

    /// Get the exchange name.
    fn name(&self) -> &str;
}
