use shopsignal_core::ShopError;
use thiserror::Error;

/// Failures of the key-value seam. Any of them puts the queue into its
/// in-memory fallback.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Store unavailable: {0}")]
    Unavailable(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Corrupt value under {key}: {reason}")]
    Corrupt { key: String, reason: String },
}

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("Transport error: {0}")]
    Other(String),
}

impl From<StoreError> for ShopError {
    fn from(e: StoreError) -> Self {
        ShopError::Storage(e.to_string())
    }
}

impl From<TransportError> for ShopError {
    fn from(e: TransportError) -> Self {
        ShopError::Transport(e.to_string())
    }
}
