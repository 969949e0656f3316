//! Application state shared across all handlers.

use shopsignal_core::config::ShopSignalConfig;
use shopsignal_core::sink::EventLogSink;
use shopsignal_core::Result;
use shopsignal_queue::{DeliveryQueue, FileKvStore, HttpEventLogSink, HttpTransport};
use std::sync::Arc;

use crate::event_logs::EventLogStore;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub queue: Arc<DeliveryQueue>,
    pub event_log: Arc<dyn EventLogSink>,
    pub event_logs: Arc<EventLogStore>,
    pub start_time: std::time::Instant,
}

impl AppState {
    pub fn new(
        queue: Arc<DeliveryQueue>,
        event_log: Arc<dyn EventLogSink>,
        event_logs: Arc<EventLogStore>,
    ) -> Self {
        Self {
            queue,
            event_log,
            event_logs,
            start_time: std::time::Instant::now(),
        }
    }

    /// File-backed queue and HTTP sinks wired from configuration. The queue
    /// is initialized before it is returned.
    pub async fn from_config(config: &ShopSignalConfig) -> Result<Self> {
        let timeout = config.queue.request_timeout();
        let store = Arc::new(FileKvStore::new(config.queue.storage_dir.clone()));
        let transport = Arc::new(HttpTransport::new(config.endpoints.ingest_url.clone(), timeout)?);
        let event_log = Arc::new(HttpEventLogSink::new(config.endpoints.event_log_url.clone(), timeout)?);

        let queue = Arc::new(DeliveryQueue::new(store, transport, &config.queue));
        queue.init().await;
        let event_logs = Arc::new(EventLogStore::new(config.server.event_log_dir.clone()));
        Ok(Self::new(queue, event_log, event_logs))
    }
}
