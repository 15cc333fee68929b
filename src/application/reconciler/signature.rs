//! Callback authenticity checks.
//!
//! Payme authenticates with HTTP Basic credentials `Paycom:<key>`; Click
//! signs each request with an MD5 digest over its fields and the secret.

use super::scalar_text;
use crate::domain::settings::PaymentSettings;
use base64::Engine;
use base64::prelude::BASE64_STANDARD;
use md5::{Digest, Md5};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verification {
    Verified,
    Mismatch,
    /// The check could not run (no secret, provider disabled, ...).
    Unavailable(&'static str),
}

pub fn verify_payme_authorization(
    header: Option<&str>,
    settings: &PaymentSettings,
) -> Verification {
    let key = settings.secret_key.expose();
    if key.is_empty() {
        return Verification::Unavailable("no Payme key configured");
    }
    let Some(encoded) = header.and_then(|h| h.trim().strip_prefix("Basic ")) else {
        return Verification::Mismatch;
    };
    let Ok(decoded) = BASE64_STANDARD.decode(encoded.trim()) else {
        return Verification::Mismatch;
    };

    let expected = format!("Paycom:{key}");
    if constant_time_eq(&decoded, expected.as_bytes()) {
        Verification::Verified
    } else {
        Verification::Mismatch
    }
}

/// Computes the Click `sign_string` for `body`, or `None` when a signed
/// field is missing.
pub fn click_signature(body: &Value, secret: &str) -> Option<String> {
    let action = field_text(body, "action")?;
    let mut text = String::new();
    text.push_str(&field_text(body, "click_trans_id")?);
    text.push_str(&field_text(body, "service_id")?);
    text.push_str(secret);
    text.push_str(&field_text(body, "merchant_trans_id")?);
    if action == "1" {
        text.push_str(&field_text(body, "merchant_prepare_id")?);
    }
    text.push_str(&field_text(body, "amount")?);
    text.push_str(&action);
    text.push_str(&field_text(body, "sign_time")?);

    Some(hex::encode(Md5::digest(text.as_bytes())))
}

pub fn verify_click_signature(body: &Value, settings: &PaymentSettings) -> Verification {
    let secret = settings.secret_key.expose();
    if secret.is_empty() {
        return Verification::Unavailable("no Click secret configured");
    }
    let (Some(expected), Some(received)) = (
        click_signature(body, secret),
        body.get("sign_string").and_then(Value::as_str),
    ) else {
        return Verification::Mismatch;
    };

    if constant_time_eq(
        expected.as_bytes(),
        received.trim().to_ascii_lowercase().as_bytes(),
    ) {
        Verification::Verified
    } else {
        Verification::Mismatch
    }
}

fn field_text(body: &Value, key: &str) -> Option<String> {
    body.get(key).and_then(scalar_text)
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    a.len() == b.len() && a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
