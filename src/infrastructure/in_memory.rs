use crate::domain::order::{MinorUnits, Order, OrderStatus, StatusHistoryEntry};
use crate::domain::payment::{Payment, PaymentAttempt, PaymentProvider};
use crate::domain::ports::{OrderStore, PaymentSettingsStore, PaymentStore};
use crate::domain::settings::PaymentSettings;
use crate::error::{OrderError, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Default)]
struct OrderTables {
    orders: HashMap<Uuid, Order>,
    by_number: HashMap<String, Uuid>,
}

/// A thread-safe in-memory order store.
///
/// Both tables sit behind one `RwLock`, so the status update and history
/// append happen under a single write guard.
#[derive(Default, Clone)]
pub struct InMemoryOrderStore {
    tables: Arc<RwLock<OrderTables>>,
}

impl InMemoryOrderStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl OrderStore for InMemoryOrderStore {
    async fn insert(&self, order: Order) -> Result<()> {
        let mut tables = self.tables.write().await;
        if let Some(existing) = tables.by_number.get(&order.order_number)
            && *existing != order.id
        {
            return Err(OrderError::ValidationError(format!(
                "Order number {} already exists",
                order.order_number
            )));
        }
        tables.by_number.insert(order.order_number.clone(), order.id);
        tables.orders.insert(order.id, order);
        Ok(())
    }

    async fn find_by_id(&self, order_id: Uuid) -> Result<Option<Order>> {
        let tables = self.tables.read().await;
        Ok(tables.orders.get(&order_id).cloned())
    }

    async fn find_by_order_number(&self, order_number: &str) -> Result<Option<Order>> {
        let tables = self.tables.read().await;
        Ok(tables
            .by_number
            .get(order_number)
            .and_then(|id| tables.orders.get(id))
            .cloned())
    }

    async fn update_status_and_append_history(
        &self,
        order_id: Uuid,
        expected: OrderStatus,
        entry: StatusHistoryEntry,
    ) -> Result<Order> {
        let mut tables = self.tables.write().await;
        let order = tables
            .orders
            .get_mut(&order_id)
            .ok_or_else(|| OrderError::order_not_found(order_id))?;
        if order.status != expected {
            return Err(OrderError::Conflict(order_id));
        }
        order.record_transition(entry);
        Ok(order.clone())
    }
}

#[derive(Default)]
struct PaymentTables {
    payments: HashMap<Uuid, Payment>,
    by_order: HashMap<(Uuid, PaymentProvider), Uuid>,
    by_transaction: HashMap<(PaymentProvider, String), Uuid>,
    attempts: HashMap<Uuid, Vec<PaymentAttempt>>,
}

/// A thread-safe in-memory payment ledger store.
#[derive(Default, Clone)]
pub struct InMemoryPaymentStore {
    tables: Arc<RwLock<PaymentTables>>,
}

impl InMemoryPaymentStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PaymentStore for InMemoryPaymentStore {
    async fn find_or_create(
        &self,
        order_id: Uuid,
        provider: PaymentProvider,
        amount: MinorUnits,
    ) -> Result<Payment> {
        let mut tables = self.tables.write().await;
        if let Some(id) = tables.by_order.get(&(order_id, provider))
            && let Some(existing) = tables.payments.get(id)
        {
            return Ok(existing.clone());
        }

        let payment = Payment::new(order_id, provider, amount);
        tables.by_order.insert((order_id, provider), payment.id);
        tables.payments.insert(payment.id, payment.clone());
        Ok(payment)
    }

    async fn find(&self, payment_id: Uuid) -> Result<Option<Payment>> {
        let tables = self.tables.read().await;
        Ok(tables.payments.get(&payment_id).cloned())
    }

    async fn find_by_transaction_id(
        &self,
        provider: PaymentProvider,
        transaction_id: &str,
    ) -> Result<Option<Payment>> {
        let tables = self.tables.read().await;
        Ok(tables
            .by_transaction
            .get(&(provider, transaction_id.to_string()))
            .and_then(|id| tables.payments.get(id))
            .cloned())
    }

    async fn update(&self, payment: Payment) -> Result<()> {
        let mut tables = self.tables.write().await;
        let previous = tables
            .payments
            .get(&payment.id)
            .ok_or_else(|| OrderError::payment_not_found(payment.id))?
            .provider_transaction_id
            .clone();
        if let Some(tx_id) = &payment.provider_transaction_id {
            let key = (payment.provider, tx_id.clone());
            if let Some(bound) = tables.by_transaction.get(&key).copied()
                && bound != payment.id
            {
                return Err(OrderError::ValidationError(format!(
                    "{} transaction {} is already bound to payment {}",
                    payment.provider, tx_id, bound
                )));
            }
            tables.by_transaction.insert(key, payment.id);
        }
        if let Some(old_tx) = previous
            && payment.provider_transaction_id.as_ref() != Some(&old_tx)
        {
            let old_key = (payment.provider, old_tx);
            if tables.by_transaction.get(&old_key) == Some(&payment.id) {
                tables.by_transaction.remove(&old_key);
            }
        }
        tables.payments.insert(payment.id, payment);
        Ok(())
    }

    async fn append_attempt(&self, attempt: PaymentAttempt) -> Result<()> {
        let mut tables = self.tables.write().await;
        tables
            .attempts
            .entry(attempt.payment_id)
            .or_default()
            .push(attempt);
        Ok(())
    }

    async fn attempts(&self, payment_id: Uuid) -> Result<Vec<PaymentAttempt>> {
        let tables = self.tables.read().await;
        Ok(tables.attempts.get(&payment_id).cloned().unwrap_or_default())
    }

    async fn payments_for_order(&self, order_id: Uuid) -> Result<Vec<Payment>> {
        let tables = self.tables.read().await;
        Ok(tables
            .payments
            .values()
            .filter(|p| p.order_id == order_id)
            .cloned()
            .collect())
    }
}

/// Payment settings held in memory: per-store entries, plus per-provider
/// defaults applied to every store without its own entry.
#[derive(Default, Clone)]
pub struct InMemoryPaymentSettingsStore {
    per_store: Arc<RwLock<HashMap<(Uuid, PaymentProvider), PaymentSettings>>>,
    defaults: Arc<HashMap<PaymentProvider, PaymentSettings>>,
}

impl InMemoryPaymentSettingsStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_defaults(defaults: impl IntoIterator<Item = PaymentSettings>) -> Self {
        Self {
            per_store: Arc::default(),
            defaults: Arc::new(defaults.into_iter().map(|s| (s.provider, s)).collect()),
        }
    }

    pub async fn put(&self, store_id: Uuid, settings: PaymentSettings) {
        let mut per_store = self.per_store.write().await;
        per_store.insert((store_id, settings.provider), settings);
    }
}

#[async_trait]
impl PaymentSettingsStore for InMemoryPaymentSettingsStore {
    async fn settings_for(
        &self,
        store_id: Uuid,
        provider: PaymentProvider,
    ) -> Result<Option<PaymentSettings>> {
        let per_store = self.per_store.read().await;
        Ok(per_store
            .get(&(store_id, provider))
            .or_else(|| self.defaults.get(&provider))
            .cloned())
    }
}
