use super::order::{MinorUnits, Order, OrderStatus, StatusHistoryEntry};
use super::payment::{Payment, PaymentAttempt, PaymentProvider};
use super::settings::PaymentSettings;
use crate::error::Result;
use async_trait::async_trait;
use std::sync::Arc;
use uuid::Uuid;

#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Persists a new order. Order numbers are unique across the store.
    async fn insert(&self, order: Order) -> Result<()>;
    async fn find_by_id(&self, order_id: Uuid) -> Result<Option<Order>>;
    async fn find_by_order_number(&self, order_number: &str) -> Result<Option<Order>>;
    /// Atomically sets the status and appends `entry` to the history.
    ///
    /// Fails with `OrderError::Conflict` when the stored status is no longer
    /// `expected`, and with `NotFound` when the order does not exist.
    async fn update_status_and_append_history(
        &self,
        order_id: Uuid,
        expected: OrderStatus,
        entry: StatusHistoryEntry,
    ) -> Result<Order>;
}

#[async_trait]
pub trait PaymentStore: Send + Sync {
    /// Returns the payment for (order, provider), creating a `Pending` one
    /// for `amount` if none exists. Atomic with respect to concurrent callers.
    async fn find_or_create(
        &self,
        order_id: Uuid,
        provider: PaymentProvider,
        amount: MinorUnits,
    ) -> Result<Payment>;
    async fn find(&self, payment_id: Uuid) -> Result<Option<Payment>>;
    async fn find_by_transaction_id(
        &self,
        provider: PaymentProvider,
        transaction_id: &str,
    ) -> Result<Option<Payment>>;
    /// Saves payment state. A provider transaction id may be bound to one
    /// payment only.
    async fn update(&self, payment: Payment) -> Result<()>;
    async fn append_attempt(&self, attempt: PaymentAttempt) -> Result<()>;
    async fn attempts(&self, payment_id: Uuid) -> Result<Vec<PaymentAttempt>>;
    async fn payments_for_order(&self, order_id: Uuid) -> Result<Vec<Payment>>;
}

#[async_trait]
pub trait PaymentSettingsStore: Send + Sync {
    async fn settings_for(
        &self,
        store_id: Uuid,
        provider: PaymentProvider,
    ) -> Result<Option<PaymentSettings>>;
}

pub type SharedOrderStore = Arc<dyn OrderStore>;
pub type SharedPaymentStore = Arc<dyn PaymentStore>;
pub type SharedSettingsStore = Arc<dyn PaymentSettingsStore>;
