//! Message kinds exchanged over the local channels.
//!
//! `BackgroundMessage` travels from the page side to the forwarder process.
//! `BridgeMessage` crosses the window-scoped boundary between the page-context
//! interceptor and the privileged forwarder.

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BackgroundMessage {
    QueueIngest {
        #[serde(default)]
        payload: Value,
    },
    SaveEventLog {
        #[serde(default)]
        payload: Value,
    },
    Ping,
}

/// Replies to a [`BackgroundMessage`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BackgroundReply {
    Status {
        status: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timestamp: Option<i64>,
    },
    Ack {
        ok: bool,
    },
}

impl BackgroundReply {
    pub fn queued() -> Self {
        Self::Status { status: "queued".into(), timestamp: None }
    }

    pub fn pong(timestamp: i64) -> Self {
        Self::Status { status: "pong".into(), timestamp: Some(timestamp) }
    }

    pub fn ack(ok: bool) -> Self {
        Self::Ack { ok }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BridgeMessage {
    Ping,
    Pong {
        #[serde(default)]
        timestamp: i64,
    },
    QueueIngest {
        #[serde(default)]
        payload: Value,
    },
    Queued {
        ok: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    SaveEventLog {
        #[serde(default)]
        payload: Value,
    },
}

impl BridgeMessage {
    pub fn queued_ok() -> Self {
        Self::Queued { ok: true, error: None }
    }

    pub fn queued_err(error: impl Into<String>) -> Self {
        Self::Queued { ok: false, error: Some(error.into()) }
    }
}
