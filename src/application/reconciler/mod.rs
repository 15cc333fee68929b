//! Payment gateway callback reconciliation.
//!
//! Every protocol follows the same sequence: resolve the order from the raw
//! payload, find or create the payment, record the attempt, check
//! authenticity, parse the payload into typed input, dispatch, and answer
//! with a protocol body. A body that names a known order is audited even
//! when it fails to parse. Handlers
//! produce a provider-agnostic [`Outcome`]; each protocol only translates
//! it to its wire shape. Callers always reply with HTTP 200.

pub mod click;
pub mod payme;
pub mod signature;

use crate::application::ledger::PaymentLedger;
use crate::application::locks::OrderLocks;
use crate::application::redactor;
use crate::application::state_machine::OrderStateMachine;
use crate::domain::order::{Order, OrderStatus};
use crate::domain::payment::{Payment, PaymentProvider};
use crate::domain::ports::{SharedOrderStore, SharedSettingsStore};
use crate::domain::settings::PaymentSettings;
use crate::error::{OrderError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use signature::Verification;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

pub use click::ClickProtocol;
pub use payme::PaymeProtocol;

/// Inbound callback, already decoded from the HTTP body.
#[derive(Debug, Clone)]
pub struct CallbackRequest {
    pub authorization: Option<String>,
    pub body: Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lookup {
    Order,
    Transaction,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    Malformed(String),
    /// Unknown method or action.
    Unsupported,
    SignatureMismatch,
    AlreadyPaid,
    TransactionCancelled,
    /// The payment is held by a different gateway transaction.
    TransactionConflict,
    Internal,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Outcome<T> {
    Success(T),
    Rejected(Rejection),
    NotFound(Lookup),
}

/// Scalar identifier that gateways send either as a JSON number or a string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    Integer(i64),
    Text(String),
}

impl Scalar {
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Scalar::Integer(n) => Some(*n),
            Scalar::Text(s) => s.trim().parse().ok(),
        }
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Integer(n) => write!(f, "{n}"),
            Scalar::Text(s) => f.write_str(s),
        }
    }
}

/// Text of a scalar field as the gateway sent it: strings verbatim,
/// numbers in JSON form.
pub fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[async_trait]
pub trait GatewayProtocol: Send + Sync {
    fn provider(&self) -> PaymentProvider;

    /// Processes one callback and returns the protocol response body.
    /// Never fails: errors are encoded in the body.
    async fn handle(&self, request: CallbackRequest) -> Value;

    /// Response body for a request whose body could not be decoded at all.
    fn malformed(&self, reason: &str) -> Value;
}

/// Collaborators shared by the protocol handlers.
#[derive(Clone)]
pub struct GatewayContext {
    pub orders: SharedOrderStore,
    pub ledger: PaymentLedger,
    pub state_machine: Arc<OrderStateMachine>,
    pub settings: SharedSettingsStore,
    pub locks: OrderLocks,
    /// Reject callbacks that fail or cannot run authenticity checks.
    pub strict: bool,
}

impl GatewayContext {
    pub async fn resolve_order(&self, order_number: &str) -> Result<Option<Order>> {
        self.orders.find_by_order_number(order_number).await
    }

    pub async fn find_order(&self, order_id: Uuid) -> Result<Option<Order>> {
        self.orders.find_by_id(order_id).await
    }

    /// Finds or creates the payment for (order, provider) and records the
    /// sanitized payload as an attempt, before the body is parsed or
    /// dispatched.
    pub async fn open_payment(
        &self,
        order: &Order,
        provider: PaymentProvider,
        body: &Value,
    ) -> Result<Payment> {
        let mut payment = self.ledger.find_or_create(order, provider).await?;
        self.ledger
            .record_attempt(&mut payment, redactor::redact(provider, body))
            .await?;
        Ok(payment)
    }

    /// Runs `check` against the store's settings and applies the strict-mode
    /// policy. Returns whether the callback may be processed.
    pub async fn verify<F>(
        &self,
        order: &Order,
        provider: PaymentProvider,
        check: F,
    ) -> Result<bool>
    where
        F: FnOnce(&PaymentSettings) -> Verification + Send,
    {
        let verification = match self.settings.settings_for(order.store_id, provider).await? {
            Some(settings) if settings.enabled => check(&settings),
            Some(_) => Verification::Unavailable("provider disabled for store"),
            None => Verification::Unavailable("no settings for store"),
        };

        Ok(match verification {
            Verification::Verified => true,
            Verification::Mismatch => {
                warn!(
                    provider = %provider,
                    order_number = %order.order_number,
                    strict = self.strict,
                    "Callback failed authenticity check"
                );
                !self.strict
            }
            Verification::Unavailable(reason) if self.strict => {
                warn!(
                    provider = %provider,
                    order_number = %order.order_number,
                    reason,
                    "Callback rejected: cannot verify"
                );
                false
            }
            Verification::Unavailable(reason) => {
                debug!(provider = %provider, reason, "Skipping callback authenticity check");
                true
            }
        })
    }

    /// Moves the order to `PAID` after a completed payment. Repeated
    /// confirmations leave a paid order untouched.
    ///
    /// An order whose status cannot reach `PAID` is left as is: the money has
    /// moved and the gateway cannot act on a refusal.
    pub async fn confirm_paid(&self, order_id: Uuid, provider: PaymentProvider) -> Result<()> {
        let comment = format!("{} payment confirmed", provider.label());
        match self
            .state_machine
            .ensure_status(order_id, OrderStatus::Paid, Some(comment))
            .await
        {
            Ok(_) => Ok(()),
            Err(OrderError::IllegalTransition { from, to }) => {
                warn!(
                    order_id = %order_id,
                    provider = %provider,
                    from = %from,
                    to = %to,
                    "Payment completed but order cannot be marked paid"
                );
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}

/// Routes callbacks to the registered protocol for each provider.
pub struct GatewayReconciler {
    protocols: HashMap<PaymentProvider, Arc<dyn GatewayProtocol>>,
}

impl GatewayReconciler {
    /// Registers the Payme and Click protocols.
    pub fn new(context: GatewayContext) -> Self {
        Self::with_protocols([
            Arc::new(PaymeProtocol::new(context.clone())) as Arc<dyn GatewayProtocol>,
            Arc::new(ClickProtocol::new(context)),
        ])
    }

    pub fn with_protocols(protocols: impl IntoIterator<Item = Arc<dyn GatewayProtocol>>) -> Self {
        Self {
            protocols: protocols
                .into_iter()
                .map(|protocol| (protocol.provider(), protocol))
                .collect(),
        }
    }

    pub fn protocol(&self, provider: PaymentProvider) -> Option<Arc<dyn GatewayProtocol>> {
        self.protocols.get(&provider).cloned()
    }
}
