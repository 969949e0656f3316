use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Source tag on flushed capture records.
pub const EVENT_LOG_SOURCE: &str = "chatgpt-extension";
/// Source tag on conversation aggregates.
pub const AGGREGATE_SOURCE: &str = "chatgpt-extension-conversation-aggregate";

/// Value of `/type` that marks a product entity in the stream.
pub const PRODUCT_ENTITY: &str = "product_entity";

/// Patch operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PatchKind {
    Add,
    Replace,
    Append,
    Remove,
    Truncate,
    #[serde(other)]
    Unknown,
}

/// One `{p, o, v}` instruction of the streamed patch dialect.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatchOp {
    #[serde(rename = "p", alias = "path", default)]
    pub path: String,
    #[serde(rename = "o", alias = "op")]
    pub op: PatchKind,
    #[serde(rename = "v", alias = "value", default)]
    pub value: Value,
}

impl PatchOp {
    pub fn new(path: impl Into<String>, op: PatchKind, value: Value) -> Self {
        Self { path: path.into(), op, value }
    }

    /// `""` and `"/"` both address the document root.
    pub fn is_root(&self) -> bool {
        self.path.is_empty() || self.path == "/"
    }

    pub fn is_entity_marker(&self) -> bool {
        self.path == "/type"
            && self.op == PatchKind::Replace
            && self.value.as_str() == Some(PRODUCT_ENTITY)
    }

    pub fn is_root_append(&self) -> bool {
        self.is_root() && self.op == PatchKind::Append
    }

    pub fn is_data_remove(&self) -> bool {
        self.path == "/data" && self.op == PatchKind::Remove
    }
}

/// A group of kept operations from one stream frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatchBatch {
    #[serde(rename = "o", alias = "op", default = "PatchBatch::default_kind")]
    pub kind: String,
    #[serde(rename = "v")]
    pub ops: Vec<PatchOp>,
}

impl PatchBatch {
    pub fn new(ops: Vec<PatchOp>) -> Self {
        Self { kind: Self::default_kind(), ops }
    }

    fn default_kind() -> String {
        "patch".into()
    }
}

/// Record emitted once per capture session when it is flushed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventLogRecord {
    pub source: String,
    pub conversation_id: Option<String>,
    pub product_hint: String,
    pub clicked_at: DateTime<Utc>,
    pub events: Vec<PatchBatch>,
}

/// Heuristics block nested in an aggregate payload.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HeuristicsBlock {
    pub urls: Vec<String>,
    pub price_text: Option<String>,
    pub avg_rating: Option<f64>,
    pub num_ratings: Option<u64>,
    pub free_delivery: bool,
    pub min_spend_for_free_delivery: Option<u64>,
}

/// Deduplicated snapshot of assistant text plus derived heuristics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregatePayload {
    pub source: String,
    pub conversation_id: String,
    pub raw_chatgpt_text: String,
    pub heuristics: HeuristicsBlock,
    pub merchant_default: Option<String>,
    pub price_text: Option<String>,
    pub price_numeric: Option<f64>,
    pub free_delivery: bool,
}
