use chrono::Utc;
use parking_lot::Mutex;
use serde_json::Value;
use shopsignal_core::config::CaptureConfig;
use shopsignal_core::sink::EventLogSink;
use shopsignal_core::types::{EventLogRecord, PatchOp};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::click::ClickTarget;
use crate::machine::{ArmOutcome, CaptureMachine, CaptureSession};

/// Async owner of the capture machine.
///
/// Arms sessions on clicks, runs the post-expiry flush timer, and hands
/// flushed records to the event-log sink. Records the sink does not
/// acknowledge stay in an outbox and are re-sent in order until it does.
/// The machine lock is never held across an await.
#[derive(Clone)]
pub struct CaptureController {
    machine: Arc<Mutex<CaptureMachine>>,
    sink: Arc<dyn EventLogSink>,
    flush_delay: Duration,
    outbox: Arc<Outbox>,
}

struct Outbox {
    pending: Mutex<VecDeque<Value>>,
    /// Serializes senders so the front record is never sent twice at once.
    sending: tokio::sync::Mutex<()>,
    retry: Mutex<Option<JoinHandle<()>>>,
    interval: Duration,
}

impl CaptureController {
    pub fn new(config: &CaptureConfig, sink: Arc<dyn EventLogSink>) -> Self {
        Self {
            machine: Arc::new(Mutex::new(CaptureMachine::new(config))),
            sink,
            flush_delay: config.flush_delay(),
            outbox: Arc::new(Outbox {
                pending: Mutex::new(VecDeque::new()),
                sending: tokio::sync::Mutex::new(()),
                retry: Mutex::new(None),
                interval: config.event_log_retry(),
            }),
        }
    }

    pub async fn on_click(&self, target: &ClickTarget, page_path: &str) -> ArmOutcome {
        let outcome = self.machine.lock().arm(target, page_path, Utc::now(), Instant::now());

        if let ArmOutcome::Started { session_id, superseded } = &outcome {
            if let Some(record) = superseded {
                self.emit(record).await;
            }
            self.schedule_flush(*session_id);
        }
        outcome
    }

    fn schedule_flush(&self, session_id: Uuid) {
        let this = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(this.flush_delay).await;
            this.flush_session(session_id).await;
        });
    }

    /// Open session id, if one is capturing.
    pub fn live_session(&self) -> Option<Uuid> {
        let machine = self.machine.lock();
        machine
            .session()
            .filter(|_| machine.is_capturing(Instant::now()))
            .map(|s| s.id)
    }

    pub fn is_live(&self, session_id: Uuid) -> bool {
        self.machine.lock().is_live(session_id, Instant::now())
    }

    /// Feed a decoded batch to `session_id`. Batches for any other session are dropped.
    pub fn observe(&self, session_id: Uuid, ops: Vec<PatchOp>) -> usize {
        let mut machine = self.machine.lock();
        let now = Instant::now();
        if !machine.is_live(session_id, now) {
            return 0;
        }
        machine.observe_batch(ops, now)
    }

    pub fn current_session(&self) -> Option<CaptureSession> {
        self.machine.lock().session().cloned()
    }

    /// Flush `session_id` if it is still open. Returns whether a record was emitted.
    pub async fn flush_session(&self, session_id: Uuid) -> bool {
        let record = self.machine.lock().flush_session(session_id);
        match record {
            Some(record) => {
                self.emit(&record).await;
                true
            }
            None => false,
        }
    }

    /// Flush whatever is open. No-op when idle.
    pub async fn flush_now(&self) -> bool {
        let record = self.machine.lock().flush();
        match record {
            Some(record) => {
                self.emit(&record).await;
                true
            }
            None => false,
        }
    }

    /// Event logs still waiting for an acknowledgment.
    pub fn pending_event_logs(&self) -> usize {
        self.outbox.pending.lock().len()
    }

    /// Re-send waiting event logs now, e.g. when the page becomes visible
    /// again. Returns how many were acknowledged.
    pub async fn retry_pending(&self) -> usize {
        let delivered = self.send_pending().await;
        if self.pending_event_logs() > 0 {
            self.schedule_retry();
        }
        delivered
    }

    async fn emit(&self, record: &EventLogRecord) {
        let value = match serde_json::to_value(record) {
            Ok(value) => value,
            Err(e) => {
                warn!(error = %e, "event log not serializable");
                return;
            }
        };
        self.outbox.pending.lock().push_back(value);
        self.retry_pending().await;
    }

    /// Send from the front of the outbox until the sink refuses one.
    async fn send_pending(&self) -> usize {
        let _sending = self.outbox.sending.lock().await;
        let mut delivered = 0;
        loop {
            let next = self.outbox.pending.lock().front().cloned();
            let Some(record) = next else {
                break;
            };
            if !self.sink.save(&record).await {
                warn!(
                    conversation = conversation_of(&record),
                    pending = self.pending_event_logs(),
                    "event log save failed, kept for retry"
                );
                break;
            }
            self.outbox.pending.lock().pop_front();
            delivered += 1;
            info!(
                conversation = conversation_of(&record),
                events = record.get("events").and_then(serde_json::Value::as_array).map_or(0, Vec::len),
                "event log saved"
            );
        }
        delivered
    }

    fn schedule_retry(&self) {
        let mut retry = self.outbox.retry.lock();
        if retry.is_some() {
            return;
        }
        let this = self.clone();
        *retry = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(this.outbox.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                this.send_pending().await;
                // Checked under the handle lock so a concurrent emit either
                // sees this task still registered or spawns a fresh one.
                let mut retry = this.outbox.retry.lock();
                if this.outbox.pending.lock().is_empty() {
                    *retry = None;
                    debug!("event log outbox drained");
                    break;
                }
            }
        }));
    }
}

fn conversation_of(record: &Value) -> &str {
    record.get("conversation_id").and_then(Value::as_str).unwrap_or("-")
}
