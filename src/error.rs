use crate::domain::order::OrderStatus;
use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum OrderError {
    #[error("{entity} not found: {key}")]
    NotFound { entity: &'static str, key: String },
    #[error("Illegal transition from {from} to {to}")]
    IllegalTransition { from: OrderStatus, to: OrderStatus },
    #[error("Validation error: {0}")]
    ValidationError(String),
    #[error("Configuration error: {0}")]
    ConfigurationError(String),
    #[error("Concurrent status update on order {0}")]
    Conflict(Uuid),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
    #[cfg(feature = "storage-rocksdb")]
    #[error("RocksDB error: {0}")]
    RocksDbError(#[from] rocksdb::Error),
    #[error("Internal error: {0}")]
    InternalError(Box<dyn std::error::Error + Send + Sync>),
}

impl OrderError {
    pub fn order_not_found(key: impl ToString) -> Self {
        Self::NotFound {
            entity: "order",
            key: key.to_string(),
        }
    }

    pub fn payment_not_found(key: impl ToString) -> Self {
        Self::NotFound {
            entity: "payment",
            key: key.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, OrderError>;
