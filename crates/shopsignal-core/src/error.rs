use thiserror::Error;

#[derive(Error, Debug)]
pub enum ShopError {
    #[error("Storage error: {0}")]
    Storage(String),
    #[error("Transport error: {0}")]
    Transport(String),
    #[error("Invalid configuration: {key}: {reason}")]
    Config { key: String, reason: String },
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, ShopError>;
