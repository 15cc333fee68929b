//! Allow-list sanitizer for inbound gateway payloads.
//!
//! Only the fields listed here are ever persisted. Anything else, and any
//! listed field holding a non-scalar value, is dropped.

use crate::domain::payment::PaymentProvider;
use serde_json::{Map, Value};

const CLICK_FIELDS: [&str; 7] = [
    "click_trans_id",
    "merchant_trans_id",
    "amount",
    "action",
    "error",
    "error_note",
    "sign_time",
];

pub fn redact(provider: PaymentProvider, payload: &Value) -> Value {
    match provider {
        PaymentProvider::Payme => redact_payme(payload),
        PaymentProvider::Click => redact_click(payload),
        PaymentProvider::Cash => Value::Object(Map::new()),
    }
}

/// Keeps `method`, `id`, `params.{id,time,amount}` and
/// `params.account.order_id`.
pub fn redact_payme(payload: &Value) -> Value {
    let mut out = Map::new();
    copy_scalar(payload, &mut out, "method");
    copy_scalar(payload, &mut out, "id");

    if let Some(params) = payload.get("params") {
        let mut kept = Map::new();
        for key in ["id", "time", "amount"] {
            copy_scalar(params, &mut kept, key);
        }
        if let Some(account) = params.get("account") {
            let mut kept_account = Map::new();
            copy_scalar(account, &mut kept_account, "order_id");
            if !kept_account.is_empty() {
                kept.insert("account".to_string(), Value::Object(kept_account));
            }
        }
        if !kept.is_empty() {
            out.insert("params".to_string(), Value::Object(kept));
        }
    }
    Value::Object(out)
}

/// Keeps the Click transaction fields; `sign_string` never survives.
pub fn redact_click(payload: &Value) -> Value {
    let mut out = Map::new();
    for key in CLICK_FIELDS {
        copy_scalar(payload, &mut out, key);
    }
    Value::Object(out)
}

fn copy_scalar(source: &Value, target: &mut Map<String, Value>, key: &str) {
    if let Some(value) = source.get(key)
        && (value.is_string() || value.is_number() || value.is_boolean())
    {
        target.insert(key.to_string(), value.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_click_drops_signature() {
        let payload = json!({
            "click_trans_id": 555,
            "service_id": 12,
            "merchant_trans_id": "A-1",
            "amount": "1500.00",
            "action": 1,
            "error": 0,
            "error_note": "Success",
            "sign_time": "2026-01-01 10:00:00",
            "sign_string": "deadbeef",
            "card_token": "secret"
        });

        let redacted = redact_click(&payload);
        assert!(redacted.get("sign_string").is_none());
        assert!(redacted.get("card_token").is_none());
        assert!(redacted.get("service_id").is_none());
        assert_eq!(redacted["click_trans_id"], json!(555));
        assert_eq!(redacted["sign_time"], json!("2026-01-01 10:00:00"));
    }

    #[test]
    fn test_payme_allow_list() {
        let payload = json!({
            "jsonrpc": "2.0",
            "id": 77,
            "method": "PerformTransaction",
            "params": {
                "id": "5305e3bab097f420a62ced0b",
                "time": 1399114284039u64,
                "amount": 500000,
                "reason": 3,
                "account": {"order_id": "A-1", "phone": "998901234567"}
            }
        });

        let redacted = redact_payme(&payload);
        assert_eq!(
            redacted,
            json!({
                "id": 77,
                "method": "PerformTransaction",
                "params": {
                    "id": "5305e3bab097f420a62ced0b",
                    "time": 1399114284039u64,
                    "amount": 500000,
                    "account": {"order_id": "A-1"}
                }
            })
        );
    }

    #[test]
    fn test_mistyped_fields_are_omitted() {
        let payload = json!({
            "method": {"nested": true},
            "params": {"id": ["x"], "account": "A-1"}
        });
        assert_eq!(redact_payme(&payload), json!({}));
        assert_eq!(redact_click(&json!("not an object")), json!({}));
        assert_eq!(redact_click(&json!({"amount": null})), json!({}));
    }
}
