//! Event-log endpoint storage.
//!
//! Each posted capture record becomes one pretty-printed JSON file named
//! `<clicked_at>__<conversation>__<hint>.json`, with every part reduced to
//! filename-safe characters. Files are listed newest name first.

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use shopsignal_core::types::EVENT_LOG_SOURCE;
use shopsignal_queue::StoreError;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use tracing::debug;

/// URL prefix the saved files are served under.
pub const FILES_PREFIX: &str = "/event_logs";

const HINT_MAX_CHARS: usize = 60;

static RE_HINT_UNSAFE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[^a-z0-9_-]+").unwrap());

/// Body accepted by the event-log endpoint. Only `events` is required.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventLogPayload {
    #[serde(default = "default_source")]
    pub source: String,
    #[serde(default)]
    pub conversation_id: Option<String>,
    #[serde(default)]
    pub product_hint: Option<String>,
    /// Kept as sent; it names the file.
    #[serde(default)]
    pub clicked_at: Option<String>,
    pub events: Vec<Map<String, Value>>,
}

fn default_source() -> String {
    EVENT_LOG_SOURCE.to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SavedEventLog {
    pub file: String,
    pub filename: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EventLogFile {
    pub name: String,
    pub url: String,
    pub size: u64,
}

pub fn safe_timestamp(ts: &str) -> String {
    ts.chars()
        .filter(|c| c.is_ascii_digit() || matches!(c, 'T' | ':' | '_' | '-'))
        .map(|c| if c == ':' { '-' } else { c })
        .collect()
}

pub fn safe_conversation(conversation_id: Option<&str>) -> String {
    let raw = conversation_id.filter(|c| !c.is_empty()).unwrap_or("noid").trim();
    let safe: String = raw
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-'))
        .collect();
    if safe.is_empty() {
        "noid".into()
    } else {
        safe
    }
}

pub fn safe_hint(hint: Option<&str>) -> String {
    let lowered: String = hint
        .filter(|h| !h.is_empty())
        .unwrap_or("product")
        .trim()
        .to_lowercase()
        .chars()
        .take(HINT_MAX_CHARS)
        .collect();
    let safe = RE_HINT_UNSAFE.replace_all(&lowered, "-");
    if safe.is_empty() {
        "product".into()
    } else {
        safe.into_owned()
    }
}

pub fn file_name(payload: &EventLogPayload, ts: &str) -> String {
    format!(
        "{}__{}__{}.json",
        safe_timestamp(ts),
        safe_conversation(payload.conversation_id.as_deref()),
        safe_hint(payload.product_hint.as_deref())
    )
}

/// Directory of saved event-log files.
pub struct EventLogStore {
    dir: PathBuf,
}

impl EventLogStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Write one record. A missing `clicked_at` is stamped with the current
    /// UTC time. A later record with the same name replaces the earlier one.
    pub async fn save(&self, payload: &EventLogPayload) -> Result<SavedEventLog, StoreError> {
        let ts = payload
            .clicked_at
            .clone()
            .filter(|ts| !ts.is_empty())
            .unwrap_or_else(|| chrono::Utc::now().format("%Y-%m-%dT%H:%M:%S%.6f").to_string());
        let filename = file_name(payload, &ts);

        let record = json!({
            "source": payload.source,
            "conversation_id": payload.conversation_id,
            "product_hint": payload.product_hint,
            "clicked_at": ts,
            "events": payload.events,
        });
        let body = serde_json::to_vec_pretty(&record)
            .map_err(|e| StoreError::Corrupt { key: filename.clone(), reason: e.to_string() })?;

        tokio::fs::create_dir_all(&self.dir).await?;
        tokio::fs::write(self.dir.join(&filename), body).await?;
        debug!(file = %filename, events = payload.events.len(), "event log written");

        Ok(SavedEventLog { file: format!("{FILES_PREFIX}/{filename}"), filename })
    }

    /// Saved `.json` files, sorted by name descending.
    pub async fn list(&self) -> Result<Vec<EventLogFile>, StoreError> {
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut files = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                continue;
            };
            if !name.ends_with(".json") {
                continue;
            }
            let size = entry.metadata().await?.len();
            files.push(EventLogFile { url: format!("{FILES_PREFIX}/{name}"), name, size });
        }
        files.sort_by(|a, b| b.name.cmp(&a.name));
        Ok(files)
    }

    /// Contents of one saved file. Names that could leave the directory
    /// read as absent.
    pub async fn read(&self, name: &str) -> Result<Option<Value>, StoreError> {
        if name.starts_with('.') || name.contains(['/', '\\']) || !name.ends_with(".json") {
            return Ok(None);
        }
        let raw = match tokio::fs::read(self.dir.join(name)).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        serde_json::from_slice(&raw)
            .map(Some)
            .map_err(|e| StoreError::Corrupt { key: name.to_string(), reason: e.to_string() })
    }
}
