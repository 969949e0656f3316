use crate::error::{Result, ShopError};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ShopSignalConfig {
    pub endpoints: EndpointConfig,
    pub capture: CaptureConfig,
    pub aggregator: AggregatorConfig,
    pub queue: QueueConfig,
    pub server: ServerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointConfig {
    pub ingest_url: String,
    pub event_log_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureConfig {
    pub window_ms: u64,
    /// Delay past expiry before the flush timer fires, to absorb in-flight reads.
    pub flush_grace_ms: u64,
    pub entity_window_ms: u64,
    /// Cadence for re-sending event logs the sink did not acknowledge.
    pub event_log_retry_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregatorConfig {
    pub debounce_ms: u64,
    pub min_send_interval_ms: u64,
    pub duplicate_window_ms: u64,
    pub min_text_chars: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    pub max_retries: u32,
    pub drain_interval_ms: u64,
    pub queue_key: String,
    pub storage_dir: PathBuf,
    pub request_timeout_ms: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Directory the event-log endpoint writes records into.
    pub event_log_dir: PathBuf,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            ingest_url: "http://localhost:8000/api/ingest".into(),
            event_log_url: "http://localhost:8000/api/event-log".into(),
        }
    }
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            window_ms: 30_000,
            flush_grace_ms: 300,
            entity_window_ms: 8_000,
            event_log_retry_ms: 2_000,
        }
    }
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 900,
            min_send_interval_ms: 2_500,
            duplicate_window_ms: 60_000,
            min_text_chars: 40,
        }
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            drain_interval_ms: 10_000,
            queue_key: "ingest_queue".into(),
            storage_dir: PathBuf::from(".shopsignal"),
            request_timeout_ms: None,
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 8765,
            event_log_dir: PathBuf::from("event_logs"),
        }
    }
}

impl CaptureConfig {
    pub fn window(&self) -> Duration {
        Duration::from_millis(self.window_ms)
    }

    pub fn flush_delay(&self) -> Duration {
        Duration::from_millis(self.window_ms + self.flush_grace_ms)
    }

    pub fn entity_window(&self) -> Duration {
        Duration::from_millis(self.entity_window_ms)
    }

    pub fn event_log_retry(&self) -> Duration {
        Duration::from_millis(self.event_log_retry_ms)
    }
}

impl AggregatorConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

impl QueueConfig {
    pub fn drain_interval(&self) -> Duration {
        Duration::from_millis(self.drain_interval_ms)
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_ms.map(Duration::from_millis)
    }
}

impl ShopSignalConfig {
    /// Defaults overlaid with `SHOPSIGNAL_*` environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut cfg = Self::default();

        if let Some(v) = lookup("SHOPSIGNAL_INGEST_URL") {
            cfg.endpoints.ingest_url = v;
        }
        if let Some(v) = lookup("SHOPSIGNAL_EVENT_LOG_URL") {
            cfg.endpoints.event_log_url = v;
        }
        if let Some(v) = lookup("SHOPSIGNAL_STORAGE_DIR") {
            cfg.queue.storage_dir = PathBuf::from(v);
        }
        if let Some(v) = lookup("SHOPSIGNAL_QUEUE_KEY") {
            cfg.queue.queue_key = v;
        }
        if let Some(v) = lookup("SHOPSIGNAL_MAX_RETRIES") {
            cfg.queue.max_retries = parse("SHOPSIGNAL_MAX_RETRIES", &v)?;
        }
        if let Some(v) = lookup("SHOPSIGNAL_DRAIN_INTERVAL_MS") {
            cfg.queue.drain_interval_ms = parse("SHOPSIGNAL_DRAIN_INTERVAL_MS", &v)?;
        }
        if let Some(v) = lookup("SHOPSIGNAL_REQUEST_TIMEOUT_MS") {
            cfg.queue.request_timeout_ms = Some(parse("SHOPSIGNAL_REQUEST_TIMEOUT_MS", &v)?);
        }
        if let Some(v) = lookup("SHOPSIGNAL_CAPTURE_WINDOW_MS") {
            cfg.capture.window_ms = parse("SHOPSIGNAL_CAPTURE_WINDOW_MS", &v)?;
        }
        if let Some(v) = lookup("SHOPSIGNAL_EVENT_LOG_RETRY_MS") {
            cfg.capture.event_log_retry_ms = parse("SHOPSIGNAL_EVENT_LOG_RETRY_MS", &v)?;
        }
        if let Some(v) = lookup("SHOPSIGNAL_DEBOUNCE_MS") {
            cfg.aggregator.debounce_ms = parse("SHOPSIGNAL_DEBOUNCE_MS", &v)?;
        }
        if let Some(v) = lookup("SHOPSIGNAL_HOST") {
            cfg.server.host = v;
        }
        if let Some(v) = lookup("SHOPSIGNAL_PORT") {
            cfg.server.port = parse("SHOPSIGNAL_PORT", &v)?;
        }
        if let Some(v) = lookup("SHOPSIGNAL_EVENT_LOG_DIR") {
            cfg.server.event_log_dir = PathBuf::from(v);
        }

        if cfg.queue.drain_interval_ms == 0 {
            return Err(ShopError::Config {
                key: "SHOPSIGNAL_DRAIN_INTERVAL_MS".into(),
                reason: "must be greater than zero".into(),
            });
        }
        if cfg.capture.event_log_retry_ms == 0 {
            return Err(ShopError::Config {
                key: "SHOPSIGNAL_EVENT_LOG_RETRY_MS".into(),
                reason: "must be greater than zero".into(),
            });
        }
        Ok(cfg)
    }
}

fn parse<T: std::str::FromStr>(key: &str, raw: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    raw.trim().parse::<T>().map_err(|e| ShopError::Config {
        key: key.to_string(),
        reason: e.to_string(),
    })
}
