use crate::domain::order::{MinorUnits, Order, OrderStatus, StatusHistoryEntry};
use crate::domain::payment::{Payment, PaymentAttempt, PaymentProvider};
use crate::domain::ports::{OrderStore, PaymentStore};
use crate::error::{OrderError, Result};
use async_trait::async_trait;
use rocksdb::{
    ColumnFamily, ColumnFamilyDescriptor, DB, Direction, IteratorMode, Options, WriteBatch,
};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

/// Column Family for orders (status history is stored inline).
pub const CF_ORDERS: &str = "orders";
/// Column Family mapping order numbers to order ids.
pub const CF_ORDER_NUMBERS: &str = "order_numbers";
/// Column Family for payment records.
pub const CF_PAYMENTS: &str = "payments";
/// Column Family mapping (order id, provider) to the payment id.
pub const CF_PAYMENT_INDEX: &str = "payment_index";
/// Column Family mapping (provider, provider transaction id) to the payment id.
pub const CF_TRANSACTION_INDEX: &str = "transaction_index";
/// Column Family for the append-only attempt log, keyed by payment id then time.
pub const CF_ATTEMPTS: &str = "attempts";

const COLUMN_FAMILIES: [&str; 6] = [
    CF_ORDERS,
    CF_ORDER_NUMBERS,
    CF_PAYMENTS,
    CF_PAYMENT_INDEX,
    CF_TRANSACTION_INDEX,
    CF_ATTEMPTS,
];

/// A persistent store implementation using RocksDB.
///
/// Implements both `OrderStore` and `PaymentStore`. Read-modify-write
/// operations are serialized by `write_lock` and committed through a single
/// `WriteBatch`, so an index and its record never diverge.
///
/// This struct is thread-safe (`Clone` shares the underlying `Arc<DB>`).
#[derive(Clone)]
pub struct RocksDBStore {
    db: Arc<DB>,
    write_lock: Arc<Mutex<()>>,
}

fn internal(message: String) -> OrderError {
    OrderError::InternalError(Box::new(std::io::Error::other(message)))
}

fn uuid_from(bytes: &[u8]) -> Result<Uuid> {
    Uuid::from_slice(bytes).map_err(|e| OrderError::InternalError(Box::new(e)))
}

fn payment_index_key(order_id: Uuid, provider: PaymentProvider) -> Vec<u8> {
    let mut key = order_id.as_bytes().to_vec();
    key.push(provider.tag());
    key
}

fn transaction_index_key(provider: PaymentProvider, transaction_id: &str) -> Vec<u8> {
    let mut key = vec![provider.tag()];
    key.extend_from_slice(transaction_id.as_bytes());
    key
}

fn attempt_key(attempt: &PaymentAttempt) -> Vec<u8> {
    let mut key = attempt.payment_id.as_bytes().to_vec();
    key.extend_from_slice(&(attempt.created_at.timestamp_micros() as u64).to_be_bytes());
    key.extend_from_slice(attempt.id.as_bytes());
    key
}

impl RocksDBStore {
    /// Opens or creates a RocksDB instance at the specified path, creating
    /// any missing column families.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let descriptors = COLUMN_FAMILIES
            .iter()
            .map(|name| ColumnFamilyDescriptor::new(*name, Options::default()));
        let db = DB::open_cf_descriptors(&opts, path, descriptors)?;

        Ok(Self {
            db: Arc::new(db),
            write_lock: Arc::new(Mutex::new(())),
        })
    }

    fn cf(&self, name: &str) -> Result<&ColumnFamily> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| internal(format!("Column family {name} not found")))
    }

    fn get_json<T: DeserializeOwned>(&self, cf_name: &str, key: &[u8]) -> Result<Option<T>> {
        let cf = self.cf(cf_name)?;
        match self.db.get_pinned_cf(cf, key)? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    fn get_id(&self, cf_name: &str, key: &[u8]) -> Result<Option<Uuid>> {
        let cf = self.cf(cf_name)?;
        self.db
            .get_pinned_cf(cf, key)?
            .map(|bytes| uuid_from(&bytes))
            .transpose()
    }

    fn put_json<T: Serialize>(
        &self,
        batch: &mut WriteBatch,
        cf_name: &str,
        key: &[u8],
        value: &T,
    ) -> Result<()> {
        let cf = self.cf(cf_name)?;
        batch.put_cf(cf, key, serde_json::to_vec(value)?);
        Ok(())
    }

    fn scan_prefix(&self, cf_name: &str, prefix: &[u8]) -> Result<Vec<Box<[u8]>>> {
        let cf = self.cf(cf_name)?;
        let mut values = Vec::new();
        for item in self
            .db
            .iterator_cf(cf, IteratorMode::From(prefix, Direction::Forward))
        {
            let (key, value) =
                item.map_err(|e| internal(format!("RocksDB iteration error: {e}")))?;
            if !key.starts_with(prefix) {
                break;
            }
            values.push(value);
        }
        Ok(values)
    }
}

#[async_trait]
impl OrderStore for RocksDBStore {
    async fn insert(&self, order: Order) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        if let Some(existing) = self.get_id(CF_ORDER_NUMBERS, order.order_number.as_bytes())?
            && existing != order.id
        {
            return Err(OrderError::ValidationError(format!(
                "Order number {} already exists",
                order.order_number
            )));
        }

        let mut batch = WriteBatch::default();
        self.put_json(&mut batch, CF_ORDERS, order.id.as_bytes(), &order)?;
        batch.put_cf(
            self.cf(CF_ORDER_NUMBERS)?,
            order.order_number.as_bytes(),
            order.id.as_bytes(),
        );
        self.db.write(batch)?;
        Ok(())
    }

    async fn find_by_id(&self, order_id: Uuid) -> Result<Option<Order>> {
        self.get_json(CF_ORDERS, order_id.as_bytes())
    }

    async fn find_by_order_number(&self, order_number: &str) -> Result<Option<Order>> {
        match self.get_id(CF_ORDER_NUMBERS, order_number.as_bytes())? {
            Some(id) => self.get_json(CF_ORDERS, id.as_bytes()),
            None => Ok(None),
        }
    }

    async fn update_status_and_append_history(
        &self,
        order_id: Uuid,
        expected: OrderStatus,
        entry: StatusHistoryEntry,
    ) -> Result<Order> {
        let _guard = self.write_lock.lock().await;
        let mut order: Order = self
            .get_json(CF_ORDERS, order_id.as_bytes())?
            .ok_or_else(|| OrderError::order_not_found(order_id))?;
        if order.status != expected {
            return Err(OrderError::Conflict(order_id));
        }
        order.record_transition(entry);

        let mut batch = WriteBatch::default();
        self.put_json(&mut batch, CF_ORDERS, order.id.as_bytes(), &order)?;
        self.db.write(batch)?;
        Ok(order)
    }
}

#[async_trait]
impl PaymentStore for RocksDBStore {
    async fn find_or_create(
        &self,
        order_id: Uuid,
        provider: PaymentProvider,
        amount: MinorUnits,
    ) -> Result<Payment> {
        let _guard = self.write_lock.lock().await;
        let index_key = payment_index_key(order_id, provider);
        if let Some(id) = self.get_id(CF_PAYMENT_INDEX, &index_key)?
            && let Some(existing) = self.get_json(CF_PAYMENTS, id.as_bytes())?
        {
            return Ok(existing);
        }

        let payment = Payment::new(order_id, provider, amount);
        let mut batch = WriteBatch::default();
        self.put_json(&mut batch, CF_PAYMENTS, payment.id.as_bytes(), &payment)?;
        batch.put_cf(self.cf(CF_PAYMENT_INDEX)?, &index_key, payment.id.as_bytes());
        self.db.write(batch)?;
        Ok(payment)
    }

    async fn find(&self, payment_id: Uuid) -> Result<Option<Payment>> {
        self.get_json(CF_PAYMENTS, payment_id.as_bytes())
    }

    async fn find_by_transaction_id(
        &self,
        provider: PaymentProvider,
        transaction_id: &str,
    ) -> Result<Option<Payment>> {
        match self.get_id(
            CF_TRANSACTION_INDEX,
            &transaction_index_key(provider, transaction_id),
        )? {
            Some(id) => self.get_json(CF_PAYMENTS, id.as_bytes()),
            None => Ok(None),
        }
    }

    async fn update(&self, payment: Payment) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let previous: Payment = self
            .get_json(CF_PAYMENTS, payment.id.as_bytes())?
            .ok_or_else(|| OrderError::payment_not_found(payment.id))?;

        let mut batch = WriteBatch::default();
        if let Some(tx_id) = &payment.provider_transaction_id {
            let key = transaction_index_key(payment.provider, tx_id);
            if let Some(bound) = self.get_id(CF_TRANSACTION_INDEX, &key)?
                && bound != payment.id
            {
                return Err(OrderError::ValidationError(format!(
                    "{} transaction {} is already bound to payment {}",
                    payment.provider, tx_id, bound
                )));
            }
            batch.put_cf(self.cf(CF_TRANSACTION_INDEX)?, &key, payment.id.as_bytes());
        }
        if let Some(old_tx) = &previous.provider_transaction_id
            && payment.provider_transaction_id.as_ref() != Some(old_tx)
        {
            let old_key = transaction_index_key(payment.provider, old_tx);
            if self.get_id(CF_TRANSACTION_INDEX, &old_key)? == Some(payment.id) {
                batch.delete_cf(self.cf(CF_TRANSACTION_INDEX)?, &old_key);
            }
        }
        self.put_json(&mut batch, CF_PAYMENTS, payment.id.as_bytes(), &payment)?;
        self.db.write(batch)?;
        Ok(())
    }

    async fn append_attempt(&self, attempt: PaymentAttempt) -> Result<()> {
        let mut batch = WriteBatch::default();
        self.put_json(&mut batch, CF_ATTEMPTS, &attempt_key(&attempt), &attempt)?;
        self.db.write(batch)?;
        Ok(())
    }

    async fn attempts(&self, payment_id: Uuid) -> Result<Vec<PaymentAttempt>> {
        self.scan_prefix(CF_ATTEMPTS, payment_id.as_bytes())?
            .iter()
            .map(|bytes| serde_json::from_slice(bytes).map_err(OrderError::from))
            .collect()
    }

    async fn payments_for_order(&self, order_id: Uuid) -> Result<Vec<Payment>> {
        let mut payments = Vec::new();
        for id_bytes in self.scan_prefix(CF_PAYMENT_INDEX, order_id.as_bytes())? {
            let id = uuid_from(&id_bytes)?;
            if let Some(payment) = self.get_json(CF_PAYMENTS, id.as_bytes())? {
                payments.push(payment);
            }
        }
        Ok(payments)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::order::{NewOrder, OrderItem};
    use serde_json::json;
    use tempfile::tempdir;

    fn order(number: &str) -> Order {
        Order::new(NewOrder {
            store_id: Uuid::new_v4(),
            order_number: number.to_string(),
            status: OrderStatus::PendingPayment,
            items: vec![OrderItem {
                product_name: "Tea".to_string(),
                quantity: 3,
                unit_price: MinorUnits::from(250),
            }],
            delivery_fee: MinorUnits::ZERO,
            customer: Default::default(),
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_rocksdb_open_cf() {
        let dir = tempdir().unwrap();
        let store = RocksDBStore::open(dir.path()).expect("Failed to open RocksDB");

        for name in COLUMN_FAMILIES {
            assert!(store.db.cf_handle(name).is_some(), "{name}");
        }
    }

    #[tokio::test]
    async fn test_rocksdb_order_store() {
        let dir = tempdir().unwrap();
        let store = RocksDBStore::open(dir.path()).unwrap();
        let order = order("R-1");

        OrderStore::insert(&store, order.clone()).await.unwrap();
        let by_number = store.find_by_order_number("R-1").await.unwrap().unwrap();
        assert_eq!(by_number, order);

        let entry = StatusHistoryEntry::new(OrderStatus::PendingPayment, OrderStatus::Paid, None);
        let updated = store
            .update_status_and_append_history(order.id, OrderStatus::PendingPayment, entry.clone())
            .await
            .unwrap();
        assert_eq!(updated.status, OrderStatus::Paid);

        let stale = store
            .update_status_and_append_history(order.id, OrderStatus::PendingPayment, entry)
            .await;
        assert!(matches!(stale, Err(OrderError::Conflict(_))));
        assert_eq!(
            store.find_by_id(order.id).await.unwrap().unwrap().history.len(),
            1
        );
    }

    #[tokio::test]
    async fn test_rocksdb_payment_store() {
        let dir = tempdir().unwrap();
        let store = RocksDBStore::open(dir.path()).unwrap();
        let order_id = Uuid::new_v4();

        let mut payment = store
            .find_or_create(order_id, PaymentProvider::Click, MinorUnits::from(750))
            .await
            .unwrap();
        let again = store
            .find_or_create(order_id, PaymentProvider::Click, MinorUnits::from(750))
            .await
            .unwrap();
        assert_eq!(payment.id, again.id);

        payment.start("991".to_string());
        store.update(payment.clone()).await.unwrap();
        let found = store
            .find_by_transaction_id(PaymentProvider::Click, "991")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.id, payment.id);

        payment.start("992".to_string());
        store.update(payment.clone()).await.unwrap();
        assert!(
            store
                .find_by_transaction_id(PaymentProvider::Click, "991")
                .await
                .unwrap()
                .is_none()
        );
        let rebound = store
            .find_by_transaction_id(PaymentProvider::Click, "992")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(rebound.id, payment.id);

        store
            .append_attempt(PaymentAttempt::new(payment.id, json!({"action": 0})))
            .await
            .unwrap();
        store
            .append_attempt(PaymentAttempt::new(payment.id, json!({"action": 1})))
            .await
            .unwrap();
        let attempts = store.attempts(payment.id).await.unwrap();
        assert_eq!(attempts.len(), 2);
        assert_eq!(store.payments_for_order(order_id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_rocksdb_reopen_keeps_state() {
        let dir = tempdir().unwrap();
        let order = order("R-2");
        {
            let store = RocksDBStore::open(dir.path()).unwrap();
            OrderStore::insert(&store, order.clone()).await.unwrap();
        }
        let store = RocksDBStore::open(dir.path()).unwrap();
        assert!(store.find_by_id(order.id).await.unwrap().is_some());
    }
}
