use async_trait::async_trait;
use shopsignal_core::sink::EventLogSink;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::TransportError;
use crate::transport::{build_client, post_json, DeliveryOutcome};

/// Sends capture records straight to the event-log endpoint. One attempt per
/// record; failures are logged and reported as `false`.
#[derive(Clone)]
pub struct HttpEventLogSink {
    client: reqwest::Client,
    url: String,
}

impl HttpEventLogSink {
    pub fn new(url: impl Into<String>, timeout: Option<Duration>) -> Result<Self, TransportError> {
        Ok(Self { client: build_client(timeout)?, url: url.into() })
    }
}

#[async_trait]
impl EventLogSink for HttpEventLogSink {
    async fn save(&self, record: &Value) -> bool {
        match post_json(&self.client, &self.url, record).await {
            Ok(DeliveryOutcome::Delivered(_)) => {
                debug!(
                    events = record.get("events").and_then(serde_json::Value::as_array).map_or(0, Vec::len),
                    "event log delivered"
                );
                true
            }
            Ok(DeliveryOutcome::Rejected(status, body)) => {
                warn!(status, body = %body, "event log save failed");
                false
            }
            Err(e) => {
                warn!(error = %e, "event log error");
                false
            }
        }
    }
}
