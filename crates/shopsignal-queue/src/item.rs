use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Dedup keys are cut to this many characters.
pub const HASH_LEN: usize = 120;

/// Dedup key: base64 of `conversation_id + "|" + trim(raw_chatgpt_text)`,
/// truncated. Missing fields count as empty.
pub fn payload_hash(payload: &Value) -> String {
    let conversation = field_text(payload, "conversation_id");
    let raw = field_text(payload, "raw_chatgpt_text");
    let mut encoded = STANDARD.encode(format!("{conversation}|{}", raw.trim()));
    encoded.truncate(HASH_LEN);
    encoded
}

fn field_text(payload: &Value, key: &str) -> String {
    match payload.get(key) {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

/// One pending delivery.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueItem {
    pub id: Uuid,
    pub payload: Value,
    pub retries: u32,
    /// Enqueue time, epoch milliseconds.
    pub timestamp: i64,
    pub hash: String,
}

impl QueueItem {
    pub fn new(payload: Value) -> Self {
        Self {
            id: Uuid::new_v4(),
            hash: payload_hash(&payload),
            payload,
            retries: 0,
            timestamp: Utc::now().timestamp_millis(),
        }
    }

    /// Retry budget spent; kept in place but never sent again.
    pub fn is_parked(&self, max_retries: u32) -> bool {
        self.retries >= max_retries
    }
}
