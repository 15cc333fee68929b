use super::order::MinorUnits;
use crate::error::{OrderError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentProvider {
    Payme,
    Click,
    Cash,
}

impl PaymentProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentProvider::Payme => "payme",
            PaymentProvider::Click => "click",
            PaymentProvider::Cash => "cash",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            PaymentProvider::Payme => "Payme",
            PaymentProvider::Click => "Click",
            PaymentProvider::Cash => "Cash",
        }
    }

    /// Stable single-byte tag used in storage keys.
    pub fn tag(&self) -> u8 {
        match self {
            PaymentProvider::Payme => 1,
            PaymentProvider::Click => 2,
            PaymentProvider::Cash => 3,
        }
    }
}

impl fmt::Display for PaymentProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaymentProvider {
    type Err = OrderError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "payme" => Ok(PaymentProvider::Payme),
            "click" => Ok(PaymentProvider::Click),
            "cash" => Ok(PaymentProvider::Cash),
            other => Err(OrderError::ValidationError(format!(
                "Unknown payment provider: {other}"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    Pending,
    Processing,
    Paid,
    Failed,
    Cancelled,
}

/// Gateway-specific settlement record attached to an order.
///
/// There is at most one payment per (order, provider); the ledger reuses it
/// across callbacks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payment {
    pub id: Uuid,
    pub order_id: Uuid,
    pub provider: PaymentProvider,
    pub amount: MinorUnits,
    pub status: PaymentStatus,
    pub provider_transaction_id: Option<String>,
    /// Last sanitized callback payload.
    pub raw_payload: Option<Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub performed_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
}

impl Payment {
    pub fn new(order_id: Uuid, provider: PaymentProvider, amount: MinorUnits) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            order_id,
            provider,
            amount,
            status: PaymentStatus::Pending,
            provider_transaction_id: None,
            raw_payload: None,
            created_at: now,
            updated_at: now,
            started_at: None,
            performed_at: None,
            cancelled_at: None,
        }
    }

    pub fn is_bound_to(&self, transaction_id: &str) -> bool {
        self.provider_transaction_id.as_deref() == Some(transaction_id)
    }

    /// Starts a (possibly new) gateway transaction on this payment.
    pub fn start(&mut self, transaction_id: String) {
        let now = Utc::now();
        self.status = PaymentStatus::Processing;
        self.provider_transaction_id = Some(transaction_id);
        self.started_at = Some(now);
        self.performed_at = None;
        self.cancelled_at = None;
        self.updated_at = now;
    }

    pub fn mark_paid(&mut self) {
        let now = Utc::now();
        self.status = PaymentStatus::Paid;
        self.started_at.get_or_insert(now);
        self.performed_at = Some(now);
        self.updated_at = now;
    }

    pub fn mark_failed(&mut self) {
        self.status = PaymentStatus::Failed;
        self.updated_at = Utc::now();
    }

    pub fn mark_cancelled(&mut self) {
        let now = Utc::now();
        self.status = PaymentStatus::Cancelled;
        self.cancelled_at = Some(now);
        self.updated_at = now;
    }
}

/// Immutable audit record of one inbound callback.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentAttempt {
    pub id: Uuid,
    pub payment_id: Uuid,
    pub payload: Value,
    pub created_at: DateTime<Utc>,
}

impl PaymentAttempt {
    pub fn new(payment_id: Uuid, payload: Value) -> Self {
        Self {
            id: Uuid::new_v4(),
            payment_id,
            payload,
            created_at: Utc::now(),
        }
    }
}
