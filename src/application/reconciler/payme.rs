use super::signature::verify_payme_authorization;
use super::{
    CallbackRequest, GatewayContext, GatewayProtocol, Lookup, Outcome, Rejection, Scalar,
    scalar_text,
};
use crate::domain::order::Order;
use crate::domain::payment::{Payment, PaymentProvider, PaymentStatus};
use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{Map, Value, json};
use tracing::{error, info, warn};

const ERR_ORDER_NOT_FOUND: i64 = -31050;
const ERR_TRANSACTION_NOT_FOUND: i64 = -31003;
const ERR_CANNOT_PERFORM: i64 = -31008;
const ERR_ORDER_BUSY: i64 = -31099;
const ERR_INVALID_REQUEST: i64 = -32600;
const ERR_METHOD_NOT_FOUND: i64 = -32601;
const ERR_PARSE: i64 = -32700;
const ERR_INSUFFICIENT_PRIVILEGE: i64 = -32504;
const ERR_SYSTEM: i64 = -32400;

const STATE_CREATED: i64 = 1;
const STATE_PERFORMED: i64 = 2;
const STATE_CANCELLED: i64 = -1;

#[derive(Debug, Deserialize)]
struct PaymeRequest {
    method: String,
    #[serde(default)]
    params: PaymeParams,
}

#[derive(Debug, Default, Deserialize)]
struct PaymeParams {
    #[serde(default)]
    id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum PaymeMethod {
    CheckPerformTransaction,
    CreateTransaction,
    PerformTransaction,
    CancelTransaction,
    CheckTransaction,
    Unknown,
}

impl From<&str> for PaymeMethod {
    fn from(method: &str) -> Self {
        match method {
            "CheckPerformTransaction" => PaymeMethod::CheckPerformTransaction,
            "CreateTransaction" => PaymeMethod::CreateTransaction,
            "PerformTransaction" => PaymeMethod::PerformTransaction,
            "CancelTransaction" => PaymeMethod::CancelTransaction,
            "CheckTransaction" => PaymeMethod::CheckTransaction,
            _ => PaymeMethod::Unknown,
        }
    }
}

impl PaymeMethod {
    fn is_unknown(&self) -> bool {
        *self == PaymeMethod::Unknown
    }
}

#[derive(Debug, Clone, PartialEq)]
enum PaymeResult {
    Allow { order_number: String },
    Created(Payment),
    Performed(Payment),
    Cancelled(Payment),
    Checked(Payment),
}

/// Payme-style JSON-RPC callbacks (`{id, method, params}`).
pub struct PaymeProtocol {
    ctx: GatewayContext,
}

impl PaymeProtocol {
    pub fn new(ctx: GatewayContext) -> Self {
        Self { ctx }
    }

    async fn process(&self, request: &CallbackRequest) -> Result<Outcome<PaymeResult>> {
        let parsed = serde_json::from_value::<PaymeRequest>(request.body.clone());
        let order = match self.resolve_order(&request.body).await? {
            Ok(order) => order,
            Err(outcome) => {
                return Ok(match &parsed {
                    Err(e) => malformed(e),
                    Ok(parsed) if PaymeMethod::from(parsed.method.as_str()).is_unknown() => {
                        Outcome::Rejected(Rejection::Unsupported)
                    }
                    Ok(_) => outcome,
                });
            }
        };

        let _guard = self.ctx.locks.lock(order.id).await;
        let mut payment = self
            .ctx
            .open_payment(&order, PaymentProvider::Payme, &request.body)
            .await?;

        let authorization = request.authorization.as_deref();
        if !self
            .ctx
            .verify(&order, PaymentProvider::Payme, |settings| {
                verify_payme_authorization(authorization, settings)
            })
            .await?
        {
            return Ok(Outcome::Rejected(Rejection::SignatureMismatch));
        }

        let parsed = match parsed {
            Ok(parsed) => parsed,
            Err(e) => return Ok(malformed(&e)),
        };
        let transaction_id = parsed.params.id.as_deref();
        info!(
            order_number = %order.order_number,
            method = %parsed.method,
            transaction_id = ?transaction_id,
            "Processing Payme callback"
        );
        match PaymeMethod::from(parsed.method.as_str()) {
            PaymeMethod::CheckPerformTransaction => Ok(Outcome::Success(PaymeResult::Allow {
                order_number: order.order_number.clone(),
            })),
            PaymeMethod::CreateTransaction => self.create(&mut payment, transaction_id).await,
            PaymeMethod::PerformTransaction => self.perform(&mut payment, transaction_id).await,
            PaymeMethod::CancelTransaction => self.cancel(&mut payment, transaction_id).await,
            PaymeMethod::CheckTransaction => Ok(match transaction_id {
                Some(tx) if payment.is_bound_to(tx) => {
                    Outcome::Success(PaymeResult::Checked(payment))
                }
                _ => Outcome::NotFound(Lookup::Transaction),
            }),
            PaymeMethod::Unknown => Ok(Outcome::Rejected(Rejection::Unsupported)),
        }
    }

    /// Resolves by `params.account.order_id`, falling back to the payment
    /// bound to `params.id` for methods that only carry the transaction id.
    /// Reads the raw body so that unparseable callbacks are still audited.
    async fn resolve_order(
        &self,
        body: &Value,
    ) -> Result<std::result::Result<Order, Outcome<PaymeResult>>> {
        if let Some(order_ref) = body.pointer("/params/account/order_id").and_then(scalar_text) {
            return Ok(self
                .ctx
                .resolve_order(&order_ref)
                .await?
                .ok_or(Outcome::NotFound(Lookup::Order)));
        }

        let Some(transaction_id) = body.pointer("/params/id").and_then(Value::as_str) else {
            return Ok(Err(Outcome::Rejected(Rejection::Malformed(
                "missing params.account.order_id".to_string(),
            ))));
        };
        let Some(payment) = self
            .ctx
            .ledger
            .find_by_transaction_id(PaymentProvider::Payme, transaction_id)
            .await?
        else {
            return Ok(Err(Outcome::NotFound(Lookup::Transaction)));
        };
        Ok(self
            .ctx
            .find_order(payment.order_id)
            .await?
            .ok_or(Outcome::NotFound(Lookup::Order)))
    }

    async fn create(
        &self,
        payment: &mut Payment,
        transaction_id: Option<&str>,
    ) -> Result<Outcome<PaymeResult>> {
        let Some(tx) = transaction_id else {
            return Ok(Outcome::Rejected(Rejection::Malformed(
                "missing params.id".to_string(),
            )));
        };

        if payment.is_bound_to(tx) {
            return Ok(Outcome::Success(PaymeResult::Created(payment.clone())));
        }
        if matches!(payment.status, PaymentStatus::Processing | PaymentStatus::Paid) {
            warn!(
                payment_id = %payment.id,
                transaction_id = tx,
                "Order already has an active Payme transaction"
            );
            return Ok(Outcome::Rejected(Rejection::TransactionConflict));
        }

        payment.start(tx.to_string());
        self.ctx.ledger.save(payment).await?;
        Ok(Outcome::Success(PaymeResult::Created(payment.clone())))
    }

    async fn perform(
        &self,
        payment: &mut Payment,
        transaction_id: Option<&str>,
    ) -> Result<Outcome<PaymeResult>> {
        if let Some(tx) = transaction_id
            && payment.provider_transaction_id.is_some()
            && !payment.is_bound_to(tx)
        {
            return Ok(Outcome::NotFound(Lookup::Transaction));
        }

        match payment.status {
            PaymentStatus::Paid => {}
            PaymentStatus::Cancelled | PaymentStatus::Failed => {
                return Ok(Outcome::Rejected(Rejection::TransactionCancelled));
            }
            PaymentStatus::Pending | PaymentStatus::Processing => {
                if payment.provider_transaction_id.is_none()
                    && let Some(tx) = transaction_id
                {
                    payment.start(tx.to_string());
                }
                payment.mark_paid();
                self.ctx.ledger.save(payment).await?;
            }
        }

        self.ctx
            .confirm_paid(payment.order_id, PaymentProvider::Payme)
            .await?;
        Ok(Outcome::Success(PaymeResult::Performed(payment.clone())))
    }

    async fn cancel(
        &self,
        payment: &mut Payment,
        transaction_id: Option<&str>,
    ) -> Result<Outcome<PaymeResult>> {
        if let Some(tx) = transaction_id
            && !payment.is_bound_to(tx)
        {
            return Ok(Outcome::NotFound(Lookup::Transaction));
        }

        if payment.status != PaymentStatus::Cancelled {
            if payment.status == PaymentStatus::Paid {
                warn!(payment_id = %payment.id, "Cancelling a performed Payme transaction");
            }
            payment.mark_cancelled();
            self.ctx.ledger.save(payment).await?;
            info!(
                payment_id = %payment.id,
                order_id = %payment.order_id,
                "Payme transaction cancelled; order status left unchanged"
            );
        }
        Ok(Outcome::Success(PaymeResult::Cancelled(payment.clone())))
    }

    fn render(id: Option<&Scalar>, outcome: Outcome<PaymeResult>) -> Value {
        let mut body = Map::new();
        if let Some(id) = id {
            body.insert("id".to_string(), json!(id));
        }
        match outcome {
            Outcome::Success(result) => {
                body.insert("result".to_string(), Self::result_body(result));
            }
            Outcome::NotFound(lookup) => {
                let (code, message) = match lookup {
                    Lookup::Order => (ERR_ORDER_NOT_FOUND, "Order not found"),
                    Lookup::Transaction => (ERR_TRANSACTION_NOT_FOUND, "Transaction not found"),
                };
                body.insert("error".to_string(), error_body(code, message));
            }
            Outcome::Rejected(rejection) => {
                let (code, message) = match &rejection {
                    Rejection::Malformed(_) => (ERR_INVALID_REQUEST, "Invalid request"),
                    Rejection::Unsupported => (ERR_METHOD_NOT_FOUND, "Method not found"),
                    Rejection::SignatureMismatch => {
                        (ERR_INSUFFICIENT_PRIVILEGE, "Insufficient privilege")
                    }
                    Rejection::TransactionConflict => {
                        (ERR_ORDER_BUSY, "Order has another active transaction")
                    }
                    Rejection::AlreadyPaid | Rejection::TransactionCancelled => {
                        (ERR_CANNOT_PERFORM, "Unable to perform operation")
                    }
                    Rejection::Internal => (ERR_SYSTEM, "System error"),
                };
                body.insert("error".to_string(), error_body(code, message));
            }
        }
        Value::Object(body)
    }

    fn result_body(result: PaymeResult) -> Value {
        match result {
            PaymeResult::Allow { order_number } => json!({
                "allow": true,
                "additional": {"order_id": order_number},
            }),
            PaymeResult::Created(payment) => json!({
                "create_time": millis(payment.started_at),
                "transaction": payment.id.to_string(),
                "state": state(&payment),
            }),
            PaymeResult::Performed(payment) => json!({
                "perform_time": millis(payment.performed_at),
                "transaction": payment.id.to_string(),
                "state": STATE_PERFORMED,
            }),
            PaymeResult::Cancelled(payment) => json!({
                "cancel_time": millis(payment.cancelled_at),
                "transaction": payment.id.to_string(),
                "state": STATE_CANCELLED,
            }),
            PaymeResult::Checked(payment) => json!({
                "create_time": millis(payment.started_at),
                "perform_time": millis(payment.performed_at),
                "cancel_time": millis(payment.cancelled_at),
                "transaction": payment.id.to_string(),
                "state": state(&payment),
                "reason": Value::Null,
            }),
        }
    }
}

fn malformed(error: &serde_json::Error) -> Outcome<PaymeResult> {
    warn!(error = %error, "Invalid Payme request");
    Outcome::Rejected(Rejection::Malformed(error.to_string()))
}

fn error_body(code: i64, message: &str) -> Value {
    json!({"code": code, "message": message})
}

fn millis(at: Option<DateTime<Utc>>) -> i64 {
    at.map(|t| t.timestamp_millis()).unwrap_or(0)
}

fn state(payment: &Payment) -> i64 {
    match payment.status {
        PaymentStatus::Pending | PaymentStatus::Processing => STATE_CREATED,
        PaymentStatus::Paid => STATE_PERFORMED,
        PaymentStatus::Cancelled | PaymentStatus::Failed => STATE_CANCELLED,
    }
}

#[async_trait]
impl GatewayProtocol for PaymeProtocol {
    fn provider(&self) -> PaymentProvider {
        PaymentProvider::Payme
    }

    async fn handle(&self, request: CallbackRequest) -> Value {
        let id = request
            .body
            .get("id")
            .and_then(|id| serde_json::from_value::<Scalar>(id.clone()).ok());
        let outcome = match self.process(&request).await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!(error = %e, "Payme callback failed");
                Outcome::Rejected(Rejection::Internal)
            }
        };
        Self::render(id.as_ref(), outcome)
    }

    fn malformed(&self, reason: &str) -> Value {
        warn!(reason, "Unparseable Payme request");
        json!({"error": error_body(ERR_PARSE, "Parse error")})
    }
}
