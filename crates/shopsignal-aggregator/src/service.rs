//! Debounced aggregation driven by page mutation notices.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use shopsignal_core::config::AggregatorConfig;
use shopsignal_core::sink::PayloadSink;
use shopsignal_core::types::AggregatePayload;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::aggregator::{Aggregator, PageSnapshot};

/// Reads the current page state on demand.
pub trait PageSource: Send + Sync {
    fn snapshot(&self) -> PageSnapshot;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MutationKind {
    ChildList,
    Attributes,
    CharacterData,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MutationNotice {
    pub kind: MutationKind,
    pub added_nodes: usize,
}

impl MutationNotice {
    pub fn child_list(added_nodes: usize) -> Self {
        Self { kind: MutationKind::ChildList, added_nodes }
    }

    pub fn adds_content(&self) -> bool {
        self.kind == MutationKind::ChildList && self.added_nodes > 0
    }
}

#[derive(Default)]
struct Pending {
    generation: u64,
    timer: Option<JoinHandle<()>>,
}

struct Inner {
    aggregator: Mutex<Aggregator>,
    pending: Mutex<Pending>,
    source: Arc<dyn PageSource>,
    sink: Arc<dyn PayloadSink>,
    debounce: Duration,
}

/// Restartable debounce in front of [`Aggregator`].
///
/// A notice that adds content cancels any unfired timer and arms a new one.
/// Once a timer fires, its pass runs to completion even if new notices arrive.
#[derive(Clone)]
pub struct AggregatorService {
    inner: Arc<Inner>,
}

impl AggregatorService {
    pub fn new(
        config: &AggregatorConfig,
        source: Arc<dyn PageSource>,
        sink: Arc<dyn PayloadSink>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                aggregator: Mutex::new(Aggregator::new(config)),
                pending: Mutex::new(Pending::default()),
                source,
                sink,
                debounce: config.debounce(),
            }),
        }
    }

    /// Schedule a pass if any notice added content. Returns whether one was scheduled.
    pub fn on_mutations(&self, notices: &[MutationNotice]) -> bool {
        if notices.iter().any(MutationNotice::adds_content) {
            self.schedule();
            true
        } else {
            false
        }
    }

    pub fn schedule(&self) {
        let mut pending = self.inner.pending.lock();
        pending.generation += 1;
        if let Some(timer) = pending.timer.take() {
            timer.abort();
        }

        let generation = pending.generation;
        let this = self.clone();
        pending.timer = Some(tokio::spawn(async move {
            tokio::time::sleep(this.inner.debounce).await;
            {
                let mut pending = this.inner.pending.lock();
                if pending.generation != generation {
                    return;
                }
                pending.timer = None;
            }
            this.run_pass().await;
        }));
    }

    /// A timer is armed and has not fired yet.
    pub fn is_pending(&self) -> bool {
        self.inner.pending.lock().timer.is_some()
    }

    /// Aggregate the current page now and submit the result, if any.
    pub async fn run_pass(&self) -> Option<AggregatePayload> {
        let page = self.inner.source.snapshot();
        let payload = self.inner.aggregator.lock().aggregate(&page, Instant::now())?;

        let value = match serde_json::to_value(&payload) {
            Ok(v) => v,
            Err(e) => {
                warn!(error = %e, "aggregate not serializable");
                return None;
            }
        };
        match self.inner.sink.submit(value).await {
            Ok(()) => debug!(conversation = %payload.conversation_id, "aggregate submitted"),
            Err(e) => warn!(conversation = %payload.conversation_id, error = %e, "aggregate submit failed"),
        }
        Some(payload)
    }
}
