//! Hand-off seams between producers and the delivery side.

use crate::error::Result;
use async_trait::async_trait;
use serde_json::Value;

/// Accepts payloads bound for the ingestion endpoint.
///
/// Ownership of the payload passes to the sink; producers keep no reference.
#[async_trait]
pub trait PayloadSink: Send + Sync {
    async fn submit(&self, payload: Value) -> Result<()>;
}

/// Accepts flushed capture records. Returns the acknowledgment.
///
/// Records travel as raw JSON so relays forward whatever the page produced,
/// unknown fields included.
#[async_trait]
pub trait EventLogSink: Send + Sync {
    async fn save(&self, record: &Value) -> bool;
}
