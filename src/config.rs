use crate::domain::payment::PaymentProvider;
use crate::domain::settings::{PaymentSettings, SecretKey};
use crate::error::{OrderError, Result};
use clap::Parser;
use std::path::PathBuf;
use tracing::warn;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Address the HTTP server listens on
    #[arg(long, env = "ORDERFLOW_BIND", default_value = "127.0.0.1:8080")]
    pub bind: String,

    /// Path to persistent database (optional). If provided, uses RocksDB.
    #[arg(long, env = "ORDERFLOW_DB_PATH")]
    pub db_path: Option<PathBuf>,

    /// Orders to import before serving, as a stream of JSON objects
    #[arg(long, env = "ORDERFLOW_ORDERS")]
    pub orders: Option<PathBuf>,

    /// Reject callbacks whose authenticity cannot be verified, and refuse to
    /// start without gateway secrets
    #[arg(long, env = "ORDERFLOW_STRICT")]
    pub strict: bool,

    /// Payme merchant id
    #[arg(long, env = "ORDERFLOW_PAYME_MERCHANT_ID", default_value = "")]
    pub payme_merchant_id: String,

    /// Payme merchant key used for Basic authentication
    #[arg(long, env = "ORDERFLOW_PAYME_KEY", hide_env_values = true)]
    pub payme_key: Option<String>,

    /// Click service id
    #[arg(long, env = "ORDERFLOW_CLICK_SERVICE_ID", default_value = "")]
    pub click_service_id: String,

    /// Click secret key used for request signatures
    #[arg(long, env = "ORDERFLOW_CLICK_SECRET", hide_env_values = true)]
    pub click_secret: Option<String>,

    /// Log filter, in `RUST_LOG` syntax
    #[arg(long, env = "RUST_LOG", default_value = "info")]
    pub log: String,
}

impl Cli {
    /// Gateway settings applied to every store without its own entry.
    ///
    /// A missing secret is fatal in strict mode and a warning otherwise.
    pub fn default_payment_settings(&self) -> Result<Vec<PaymentSettings>> {
        let gateways = [
            (
                PaymentProvider::Payme,
                &self.payme_merchant_id,
                &self.payme_key,
                "--payme-key / ORDERFLOW_PAYME_KEY",
            ),
            (
                PaymentProvider::Click,
                &self.click_service_id,
                &self.click_secret,
                "--click-secret / ORDERFLOW_CLICK_SECRET",
            ),
        ];

        let mut settings = Vec::new();
        for (provider, merchant_id, secret, source) in gateways {
            match secret.as_deref().filter(|s| !s.is_empty()) {
                Some(secret) => settings.push(PaymentSettings {
                    provider,
                    merchant_id: merchant_id.clone(),
                    secret_key: SecretKey::new(secret),
                    enabled: true,
                }),
                None if self.strict => {
                    return Err(OrderError::ConfigurationError(format!(
                        "missing {} secret ({source}) in strict mode",
                        provider.label()
                    )));
                }
                None => warn!(
                    provider = %provider,
                    "No {} secret configured; callbacks will not be verified",
                    provider.label()
                ),
            }
        }
        Ok(settings)
    }
}
