//! One aggregation pass and the per-conversation emission policy.
//!
//! `last_sent` lives for the life of the aggregator: it is created empty,
//! written only by successful passes, and never pruned.

use serde::{Deserialize, Serialize};
use shopsignal_core::config::AggregatorConfig;
use shopsignal_core::types::{AggregatePayload, AGGREGATE_SOURCE};
use shopsignal_core::{conversation_id_from_path, NO_CONVERSATION_ID};
use std::collections::HashMap;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

use crate::hash::djb2;
use crate::heuristics::extract_heuristics;
use crate::text::{collect_assistant_texts, js_len, normalize_text};

/// What the page shows at the moment of a pass.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PageSnapshot {
    pub url_path: String,
    /// Rendered text of each assistant-authored message, in page order.
    pub assistant_messages: Vec<String>,
}

/// Last emission for a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Emission {
    pub hash: u32,
    pub at: Instant,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Send,
    /// Same text inside the duplicate window.
    Duplicate,
    /// Too soon after the previous emission.
    Throttled,
}

pub struct Aggregator {
    min_text_chars: usize,
    min_send_interval: Duration,
    duplicate_window: Duration,
    last_sent: HashMap<String, Emission>,
}

impl Aggregator {
    pub fn new(config: &AggregatorConfig) -> Self {
        Self {
            min_text_chars: config.min_text_chars,
            min_send_interval: Duration::from_millis(config.min_send_interval_ms),
            duplicate_window: Duration::from_millis(config.duplicate_window_ms),
            last_sent: HashMap::new(),
        }
    }

    pub fn last_emission(&self, conversation_id: &str) -> Option<Emission> {
        self.last_sent.get(conversation_id).copied()
    }

    pub fn verdict(&self, conversation_id: &str, hash: u32, now: Instant) -> Verdict {
        let Some(last) = self.last_sent.get(conversation_id) else {
            return Verdict::Send;
        };
        let elapsed = now.saturating_duration_since(last.at);
        if last.hash == hash && elapsed < self.duplicate_window {
            Verdict::Duplicate
        } else if elapsed < self.min_send_interval {
            Verdict::Throttled
        } else {
            Verdict::Send
        }
    }

    /// Run one pass. Returns the payload to hand to the queue and records the
    /// emission, or `None` when the text is too short or the policy holds it back.
    pub fn aggregate(&mut self, page: &PageSnapshot, now: Instant) -> Option<AggregatePayload> {
        let conversation_id = conversation_id_from_path(&page.url_path)
            .unwrap_or_else(|| NO_CONVERSATION_ID.to_string());

        let parts = collect_assistant_texts(&page.assistant_messages);
        let full_text = normalize_text(&parts.join("\n\n"));
        if js_len(&full_text) < self.min_text_chars {
            return None;
        }

        let hash = djb2(&format!("{full_text}|{conversation_id}"));
        match self.verdict(&conversation_id, hash, now) {
            Verdict::Send => {}
            held => {
                debug!(conversation = %conversation_id, ?held, "aggregate held back");
                return None;
            }
        }

        let heuristics = match parts.last() {
            Some(last) => extract_heuristics(&normalize_text(last)),
            None => extract_heuristics(&full_text),
        };

        let payload = AggregatePayload {
            source: AGGREGATE_SOURCE.to_string(),
            conversation_id: conversation_id.clone(),
            heuristics: heuristics.to_block(),
            merchant_default: heuristics.merchant_default,
            price_text: heuristics.price_text,
            price_numeric: heuristics.price_numeric,
            free_delivery: heuristics.free_delivery,
            raw_chatgpt_text: full_text,
        };

        debug!(
            conversation = %conversation_id,
            chars = payload.raw_chatgpt_text.len(),
            "aggregate ready"
        );
        self.last_sent.insert(conversation_id, Emission { hash, at: now });
        Some(payload)
    }
}
