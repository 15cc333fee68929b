use super::signature::verify_click_signature;
use super::{
    CallbackRequest, GatewayContext, GatewayProtocol, Lookup, Outcome, Rejection, Scalar,
    scalar_text,
};
use crate::domain::payment::{Payment, PaymentProvider, PaymentStatus};
use crate::error::Result;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{error, info, warn};

const ACTION_PREPARE: i64 = 0;
const ACTION_COMPLETE: i64 = 1;

const SUCCESS: i64 = 0;
const ERR_SIGN_CHECK_FAILED: i64 = -1;
const ERR_ALREADY_PAID: i64 = -4;
const ERR_ORDER_NOT_FOUND: i64 = -5;
const ERR_TRANSACTION_NOT_FOUND: i64 = -6;
const ERR_FAILED_TO_UPDATE: i64 = -7;
const ERR_BAD_REQUEST: i64 = -8;
const ERR_TRANSACTION_CANCELLED: i64 = -9;

#[derive(Debug, Deserialize)]
struct ClickRequest {
    click_trans_id: Scalar,
    merchant_trans_id: Scalar,
    #[serde(default)]
    merchant_prepare_id: Option<Scalar>,
    action: Scalar,
    #[serde(default)]
    error: Option<Scalar>,
}

#[derive(Debug, Clone, PartialEq)]
enum ClickResult {
    Prepared(Payment),
    Completed(Payment),
}

/// Click-style callbacks: flat body, numeric `action`.
pub struct ClickProtocol {
    ctx: GatewayContext,
}

impl ClickProtocol {
    pub fn new(ctx: GatewayContext) -> Self {
        Self { ctx }
    }

    async fn process(&self, request: &CallbackRequest) -> Result<Outcome<ClickResult>> {
        let parsed = serde_json::from_value::<ClickRequest>(request.body.clone());
        let order_number = request.body.get("merchant_trans_id").and_then(scalar_text);
        let order = match &order_number {
            Some(order_number) => self.ctx.resolve_order(order_number).await?,
            None => None,
        };
        let Some(order) = order else {
            return Ok(match parsed {
                Ok(_) => Outcome::NotFound(Lookup::Order),
                Err(e) => malformed(&e),
            });
        };

        let _guard = self.ctx.locks.lock(order.id).await;
        let mut payment = self
            .ctx
            .open_payment(&order, PaymentProvider::Click, &request.body)
            .await?;

        if !self
            .ctx
            .verify(&order, PaymentProvider::Click, |settings| {
                verify_click_signature(&request.body, settings)
            })
            .await?
        {
            return Ok(Outcome::Rejected(Rejection::SignatureMismatch));
        }

        let parsed = match parsed {
            Ok(parsed) => parsed,
            Err(e) => return Ok(malformed(&e)),
        };
        let transaction_id = parsed.click_trans_id.to_string();
        info!(
            order_number = %parsed.merchant_trans_id,
            action = %parsed.action,
            transaction_id = %transaction_id,
            "Processing Click callback"
        );
        match parsed.action.as_i64() {
            Some(ACTION_PREPARE) => self.prepare(&mut payment, transaction_id).await,
            Some(ACTION_COMPLETE) => self.complete(&mut payment, transaction_id, &parsed).await,
            _ => Ok(Outcome::Rejected(Rejection::Unsupported)),
        }
    }

    async fn prepare(
        &self,
        payment: &mut Payment,
        transaction_id: String,
    ) -> Result<Outcome<ClickResult>> {
        if payment.status == PaymentStatus::Paid {
            return Ok(Outcome::Rejected(Rejection::AlreadyPaid));
        }
        if !payment.is_bound_to(&transaction_id) {
            payment.provider_transaction_id = Some(transaction_id);
            self.ctx.ledger.save(payment).await?;
        }
        Ok(Outcome::Success(ClickResult::Prepared(payment.clone())))
    }

    async fn complete(
        &self,
        payment: &mut Payment,
        transaction_id: String,
        parsed: &ClickRequest,
    ) -> Result<Outcome<ClickResult>> {
        // A missing or non-numeric error code is never read as success.
        let Some(reported_error) = parsed.error.as_ref().and_then(Scalar::as_i64) else {
            return Ok(Outcome::Rejected(Rejection::Malformed(
                "missing or invalid error code".to_string(),
            )));
        };
        if let Some(prepare_id) = &parsed.merchant_prepare_id
            && prepare_id.to_string() != payment.id.to_string()
        {
            return Ok(Outcome::NotFound(Lookup::Transaction));
        }

        if reported_error != SUCCESS {
            if payment.status == PaymentStatus::Paid {
                warn!(
                    payment_id = %payment.id,
                    reported_error,
                    "Ignoring Click failure for a paid payment"
                );
            } else {
                payment.provider_transaction_id = Some(transaction_id);
                payment.mark_failed();
                self.ctx.ledger.save(payment).await?;
                info!(payment_id = %payment.id, reported_error, "Click reported a failed payment");
            }
            return Ok(Outcome::Success(ClickResult::Completed(payment.clone())));
        }

        match payment.status {
            PaymentStatus::Paid if !payment.is_bound_to(&transaction_id) => {
                return Ok(Outcome::Rejected(Rejection::AlreadyPaid));
            }
            PaymentStatus::Paid => {}
            PaymentStatus::Cancelled => {
                return Ok(Outcome::Rejected(Rejection::TransactionCancelled));
            }
            PaymentStatus::Pending | PaymentStatus::Processing | PaymentStatus::Failed => {
                payment.provider_transaction_id = Some(transaction_id);
                payment.mark_paid();
                self.ctx.ledger.save(payment).await?;
            }
        }

        self.ctx
            .confirm_paid(payment.order_id, PaymentProvider::Click)
            .await?;
        Ok(Outcome::Success(ClickResult::Completed(payment.clone())))
    }

    /// Success bodies echo the identifiers exactly as the gateway sent them.
    fn render(body: &Value, outcome: Outcome<ClickResult>) -> Value {
        let echo = |key: &str| body.get(key).cloned().unwrap_or(Value::Null);
        match outcome {
            Outcome::Success(ClickResult::Prepared(payment)) => json!({
                "click_trans_id": echo("click_trans_id"),
                "merchant_trans_id": echo("merchant_trans_id"),
                "merchant_prepare_id": payment.id.to_string(),
                "error": SUCCESS,
                "error_note": "Success",
            }),
            Outcome::Success(ClickResult::Completed(payment)) => json!({
                "click_trans_id": echo("click_trans_id"),
                "merchant_trans_id": echo("merchant_trans_id"),
                "merchant_confirm_id": payment.id.to_string(),
                "error": SUCCESS,
                "error_note": "Success",
            }),
            Outcome::NotFound(Lookup::Order) => error_body(ERR_ORDER_NOT_FOUND, "Order not found"),
            Outcome::NotFound(Lookup::Transaction) => {
                error_body(ERR_TRANSACTION_NOT_FOUND, "Transaction does not exist")
            }
            Outcome::Rejected(rejection) => match rejection {
                Rejection::Unsupported => error_body(ERR_BAD_REQUEST, "Unknown action"),
                Rejection::Malformed(_) => error_body(ERR_BAD_REQUEST, "Malformed request"),
                Rejection::SignatureMismatch => {
                    error_body(ERR_SIGN_CHECK_FAILED, "SIGN CHECK FAILED")
                }
                Rejection::AlreadyPaid => error_body(ERR_ALREADY_PAID, "Already paid"),
                Rejection::TransactionCancelled => {
                    error_body(ERR_TRANSACTION_CANCELLED, "Transaction cancelled")
                }
                Rejection::TransactionConflict | Rejection::Internal => {
                    error_body(ERR_FAILED_TO_UPDATE, "Failed to update")
                }
            },
        }
    }
}

fn malformed(error: &serde_json::Error) -> Outcome<ClickResult> {
    warn!(error = %error, "Invalid Click request");
    Outcome::Rejected(Rejection::Malformed(error.to_string()))
}

fn error_body(code: i64, note: &str) -> Value {
    json!({"error": code, "error_note": note})
}

#[async_trait]
impl GatewayProtocol for ClickProtocol {
    fn provider(&self) -> PaymentProvider {
        PaymentProvider::Click
    }

    async fn handle(&self, request: CallbackRequest) -> Value {
        let outcome = match self.process(&request).await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!(error = %e, "Click callback failed");
                Outcome::Rejected(Rejection::Internal)
            }
        };
        Self::render(&request.body, outcome)
    }

    fn malformed(&self, reason: &str) -> Value {
        warn!(reason, "Invalid Click request");
        error_body(ERR_BAD_REQUEST, "Malformed request")
    }
}
