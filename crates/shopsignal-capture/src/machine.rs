//! Capture window state machine.
//!
//! `Idle -> Capturing -> (EntityMode overlapping) -> Flushed -> Idle`.
//! Idle is `session == None`. Deadlines use `tokio::time::Instant` so paused
//! test clocks drive expiry; the click time is kept as wall-clock time for the
//! emitted record.

use chrono::{DateTime, Utc};
use shopsignal_core::config::CaptureConfig;
use shopsignal_core::conversation_id_from_path;
use shopsignal_core::types::{EventLogRecord, PatchBatch, PatchOp, EVENT_LOG_SOURCE};
use shopsignal_patch::Document;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;
use uuid::Uuid;

use crate::click::ClickTarget;

/// One open capture window.
#[derive(Debug, Clone)]
pub struct CaptureSession {
    pub id: Uuid,
    pub clicked_at: DateTime<Utc>,
    pub expires_at: Instant,
    pub hint: String,
    pub conversation_id: Option<String>,
    pub collected: Vec<PatchBatch>,
    pub entity_mode_until: Option<Instant>,
    document: Document,
}

impl CaptureSession {
    /// State reconstructed from every batch seen in this window.
    pub fn document(&self) -> &Document {
        &self.document
    }

    pub fn in_entity_mode(&self, now: Instant) -> bool {
        self.entity_mode_until.is_some_and(|until| now < until)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ArmOutcome {
    /// A new window opened. An expired, not yet flushed predecessor is
    /// flushed on the way and handed back.
    Started {
        session_id: Uuid,
        superseded: Option<EventLogRecord>,
    },
    /// A window is already open; the click is ignored.
    AlreadyCapturing { session_id: Uuid },
    NotQualified,
}

pub struct CaptureMachine {
    window: Duration,
    entity_window: Duration,
    session: Option<CaptureSession>,
}

impl CaptureMachine {
    pub fn new(config: &CaptureConfig) -> Self {
        Self {
            window: config.window(),
            entity_window: config.entity_window(),
            session: None,
        }
    }

    /// Handle a click. Overlapping clicks are ignored while a window is open.
    pub fn arm(
        &mut self,
        target: &ClickTarget,
        page_path: &str,
        clicked_at: DateTime<Utc>,
        now: Instant,
    ) -> ArmOutcome {
        if !target.qualifies() {
            return ArmOutcome::NotQualified;
        }
        if let Some(active) = self.session.as_ref().filter(|s| now <= s.expires_at) {
            debug!(session = %active.id, "click ignored, capture already active");
            return ArmOutcome::AlreadyCapturing { session_id: active.id };
        }
        let superseded = self.flush();
        let session_id = self.start(target.hint(), conversation_id_from_path(page_path), clicked_at, now);
        ArmOutcome::Started { session_id, superseded }
    }

    /// Open a window unconditionally, discarding any current one.
    pub fn start(
        &mut self,
        hint: String,
        conversation_id: Option<String>,
        clicked_at: DateTime<Utc>,
        now: Instant,
    ) -> Uuid {
        let id = Uuid::new_v4();
        debug!(session = %id, hint = %hint, "capture armed");
        self.session = Some(CaptureSession {
            id,
            clicked_at,
            expires_at: now + self.window,
            hint,
            conversation_id,
            collected: Vec::new(),
            entity_mode_until: None,
            document: Document::new(),
        });
        id
    }

    pub fn session(&self) -> Option<&CaptureSession> {
        self.session.as_ref()
    }

    pub fn is_capturing(&self, now: Instant) -> bool {
        self.session.as_ref().is_some_and(|s| now <= s.expires_at)
    }

    /// The given session is still the open one and has not expired.
    pub fn is_live(&self, session_id: Uuid, now: Instant) -> bool {
        self.session
            .as_ref()
            .is_some_and(|s| s.id == session_id && now <= s.expires_at)
    }

    /// Feed one decoded frame. Returns how many operations were kept.
    pub fn observe_batch(&mut self, ops: Vec<PatchOp>, now: Instant) -> usize {
        let entity_window = self.entity_window;
        let Some(session) = self.session.as_mut().filter(|s| now <= s.expires_at) else {
            return 0;
        };

        session.document.apply_all(ops.iter());

        let saw_entity = ops.iter().any(PatchOp::is_entity_marker);
        if saw_entity {
            let until = now + entity_window;
            session.entity_mode_until = Some(session.entity_mode_until.map_or(until, |u| u.max(until)));
        }
        if !saw_entity && !session.in_entity_mode(now) {
            return 0;
        }

        let kept: Vec<PatchOp> = ops
            .into_iter()
            .filter(|op| op.is_entity_marker() || op.is_root_append() || op.is_data_remove())
            .collect();
        if kept.is_empty() {
            return 0;
        }
        let count = kept.len();
        session.collected.push(PatchBatch::new(kept));
        count
    }

    /// Close the open window, if any, and build its record.
    pub fn flush(&mut self) -> Option<EventLogRecord> {
        let session = self.session.take()?;
        debug!(
            session = %session.id,
            batches = session.collected.len(),
            "capture flushed"
        );
        Some(EventLogRecord {
            source: EVENT_LOG_SOURCE.to_string(),
            conversation_id: session.conversation_id,
            product_hint: session.hint,
            clicked_at: session.clicked_at,
            events: session.collected,
        })
    }

    /// Flush only if `session_id` is still the open window.
    pub fn flush_session(&mut self, session_id: Uuid) -> Option<EventLogRecord> {
        if self.session.as_ref().is_some_and(|s| s.id == session_id) {
            self.flush()
        } else {
            None
        }
    }
}
