use crate::domain::order::Order;
use crate::domain::payment::{Payment, PaymentAttempt, PaymentProvider};
use crate::domain::ports::SharedPaymentStore;
use crate::error::Result;
use serde_json::Value;
use tracing::debug;
use uuid::Uuid;

/// Payment records and their audit trail.
#[derive(Clone)]
pub struct PaymentLedger {
    payments: SharedPaymentStore,
}

impl PaymentLedger {
    pub fn new(payments: SharedPaymentStore) -> Self {
        Self { payments }
    }

    /// Returns the single payment for (order, provider), creating a `Pending`
    /// one for the order total on first use.
    pub async fn find_or_create(
        &self,
        order: &Order,
        provider: PaymentProvider,
    ) -> Result<Payment> {
        self.payments
            .find_or_create(order.id, provider, order.total)
            .await
    }

    pub async fn find_by_transaction_id(
        &self,
        provider: PaymentProvider,
        transaction_id: &str,
    ) -> Result<Option<Payment>> {
        self.payments
            .find_by_transaction_id(provider, transaction_id)
            .await
    }

    /// Appends an attempt with the already sanitized `payload` and keeps it
    /// as the payment's last known payload.
    pub async fn record_attempt(
        &self,
        payment: &mut Payment,
        payload: Value,
    ) -> Result<PaymentAttempt> {
        let attempt = PaymentAttempt::new(payment.id, payload.clone());
        self.payments.append_attempt(attempt.clone()).await?;

        payment.raw_payload = Some(payload);
        self.payments.update(payment.clone()).await?;
        debug!(payment_id = %payment.id, provider = %payment.provider, "Recorded payment attempt");
        Ok(attempt)
    }

    pub async fn save(&self, payment: &Payment) -> Result<()> {
        self.payments.update(payment.clone()).await
    }

    pub async fn attempts(&self, payment_id: Uuid) -> Result<Vec<PaymentAttempt>> {
        self.payments.attempts(payment_id).await
    }

    pub async fn payments_for_order(&self, order_id: Uuid) -> Result<Vec<Payment>> {
        self.payments.payments_for_order(order_id).await
    }
}
