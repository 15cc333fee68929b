use crate::error::{OrderError, Result};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// A monetary value expressed in minor currency units (e.g. tiyin).
///
/// Backed by `rust_decimal::Decimal` so totals never go through floating point,
/// but only whole, non-negative values are accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(try_from = "Decimal", into = "Decimal")]
pub struct MinorUnits(Decimal);

impl MinorUnits {
    pub const ZERO: Self = Self(Decimal::ZERO);

    pub fn new(value: Decimal) -> Result<Self> {
        if value.is_sign_negative() && !value.is_zero() {
            return Err(OrderError::ValidationError(
                "Amount must not be negative".to_string(),
            ));
        }
        if !value.fract().is_zero() {
            return Err(OrderError::ValidationError(
                "Amount in minor units must be a whole number".to_string(),
            ));
        }
        Ok(Self(value.trunc()))
    }

    pub fn value(&self) -> Decimal {
        self.0
    }

    pub fn checked_add(self, rhs: Self) -> Result<Self> {
        self.0.checked_add(rhs.0).map(Self).ok_or_else(amount_overflow)
    }

    pub fn checked_mul(self, quantity: u32) -> Result<Self> {
        self.0
            .checked_mul(Decimal::from(quantity))
            .map(Self)
            .ok_or_else(amount_overflow)
    }
}

fn amount_overflow() -> OrderError {
    OrderError::ValidationError("Amount overflow".to_string())
}

impl TryFrom<Decimal> for MinorUnits {
    type Error = OrderError;

    fn try_from(value: Decimal) -> Result<Self> {
        Self::new(value)
    }
}

impl From<MinorUnits> for Decimal {
    fn from(amount: MinorUnits) -> Self {
        amount.0
    }
}

impl From<u64> for MinorUnits {
    fn from(value: u64) -> Self {
        Self(Decimal::from(value))
    }
}

impl fmt::Display for MinorUnits {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    Draft,
    PendingPayment,
    Paid,
    Processing,
    Ready,
    Shipped,
    Delivered,
    Cancelled,
    Refunded,
    /// Legacy alias kept for older records; precedes `PendingPayment`.
    Pending,
    /// Legacy alias kept for older records; precedes `Processing`.
    Confirmed,
}

impl OrderStatus {
    pub const ALL: [OrderStatus; 11] = [
        OrderStatus::Draft,
        OrderStatus::PendingPayment,
        OrderStatus::Paid,
        OrderStatus::Processing,
        OrderStatus::Ready,
        OrderStatus::Shipped,
        OrderStatus::Delivered,
        OrderStatus::Cancelled,
        OrderStatus::Refunded,
        OrderStatus::Pending,
        OrderStatus::Confirmed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Draft => "DRAFT",
            OrderStatus::PendingPayment => "PENDING_PAYMENT",
            OrderStatus::Paid => "PAID",
            OrderStatus::Processing => "PROCESSING",
            OrderStatus::Ready => "READY",
            OrderStatus::Shipped => "SHIPPED",
            OrderStatus::Delivered => "DELIVERED",
            OrderStatus::Cancelled => "CANCELLED",
            OrderStatus::Refunded => "REFUNDED",
            OrderStatus::Pending => "PENDING",
            OrderStatus::Confirmed => "CONFIRMED",
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = OrderError;

    fn from_str(s: &str) -> Result<Self> {
        OrderStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| OrderError::ValidationError(format!("Unknown order status: {s}")))
    }
}

/// One row of the append-only status history of an order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusHistoryEntry {
    pub from_status: OrderStatus,
    pub to_status: OrderStatus,
    pub comment: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl StatusHistoryEntry {
    pub fn new(from_status: OrderStatus, to_status: OrderStatus, comment: Option<String>) -> Self {
        Self {
            from_status,
            to_status,
            comment,
            created_at: Utc::now(),
        }
    }
}

/// Contact and delivery details captured at checkout time.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CustomerSnapshot {
    pub name: String,
    pub phone: String,
    #[serde(default)]
    pub address: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderItem {
    pub product_name: String,
    pub quantity: u32,
    pub unit_price: MinorUnits,
}

impl OrderItem {
    pub fn line_total(&self) -> Result<MinorUnits> {
        self.unit_price.checked_mul(self.quantity)
    }
}

/// A purchase scoped to a single store.
///
/// Status only changes through `OrderStateMachine`, which records every
/// change in `history`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: Uuid,
    pub store_id: Uuid,
    /// Human-readable number the gateways use to reference the order.
    pub order_number: String,
    pub status: OrderStatus,
    pub subtotal: MinorUnits,
    pub delivery_fee: MinorUnits,
    pub total: MinorUnits,
    pub customer: CustomerSnapshot,
    pub items: Vec<OrderItem>,
    pub history: Vec<StatusHistoryEntry>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Order as handed over by the checkout collaborator.
#[derive(Debug, Clone, Deserialize)]
pub struct NewOrder {
    pub store_id: Uuid,
    pub order_number: String,
    #[serde(default = "NewOrder::default_status")]
    pub status: OrderStatus,
    pub items: Vec<OrderItem>,
    #[serde(default)]
    pub delivery_fee: MinorUnits,
    #[serde(default)]
    pub customer: CustomerSnapshot,
}

impl NewOrder {
    fn default_status() -> OrderStatus {
        OrderStatus::PendingPayment
    }
}

impl Order {
    /// Builds an order in `Draft` or `PendingPayment`, computing its totals.
    pub fn new(new: NewOrder) -> Result<Self> {
        if !matches!(new.status, OrderStatus::Draft | OrderStatus::PendingPayment) {
            return Err(OrderError::ValidationError(format!(
                "Orders must start as DRAFT or PENDING_PAYMENT, got {}",
                new.status
            )));
        }
        if new.order_number.trim().is_empty() {
            return Err(OrderError::ValidationError(
                "Order number must not be empty".to_string(),
            ));
        }

        let subtotal = new.items.iter().try_fold(MinorUnits::ZERO, |acc, item| {
            acc.checked_add(item.line_total()?)
        })?;
        let total = subtotal.checked_add(new.delivery_fee)?;
        let now = Utc::now();
        Ok(Self {
            id: Uuid::new_v4(),
            store_id: new.store_id,
            order_number: new.order_number,
            status: new.status,
            subtotal,
            delivery_fee: new.delivery_fee,
            total,
            customer: new.customer,
            items: new.items,
            history: Vec::new(),
            created_at: now,
            updated_at: now,
        })
    }

    /// Moves the order to `entry.to_status` and appends `entry` to the history.
    ///
    /// Graph validation is the caller's job; stores call this inside their
    /// atomic update.
    pub fn record_transition(&mut self, entry: StatusHistoryEntry) {
        self.status = entry.to_status;
        self.updated_at = entry.created_at;
        self.history.push(entry);
    }
}
