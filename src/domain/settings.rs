use super::payment::PaymentProvider;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Gateway secret. Write-only: never serialized and masked in `Debug`.
#[derive(Clone, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct SecretKey(String);

impl SecretKey {
    pub fn new(secret: impl Into<String>) -> Self {
        Self(secret.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecretKey(***)")
    }
}

/// Per-store, per-provider gateway configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentSettings {
    pub provider: PaymentProvider,
    /// Merchant id for Payme, service id for Click.
    pub merchant_id: String,
    #[serde(skip_serializing)]
    pub secret_key: SecretKey,
    pub enabled: bool,
}
