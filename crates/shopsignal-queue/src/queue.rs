//! The persisted delivery queue.
//!
//! All reads and writes of the queued list go through one async mutex.
//! Network delivery runs outside it; each result is applied to the item with
//! the same id on a fresh read, so a concurrent enqueue is never lost and an
//! item is only ever removed by its own successful delivery.

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use shopsignal_core::config::QueueConfig;
use shopsignal_core::sink::PayloadSink;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, Notify};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::item::QueueItem;
use crate::store::KvStore;
use crate::transport::{DeliveryOutcome, Transport};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueOutcome {
    Queued(Uuid),
    /// An item with the same dedup key is already waiting.
    Duplicate,
}

/// Counts from one drain pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DrainReport {
    pub attempted: usize,
    pub delivered: usize,
    pub failed: usize,
    /// Items past the retry cap, skipped.
    pub parked: usize,
}

/// Once set, the in-memory list replaces the store for the rest of the process.
#[derive(Default)]
struct Backing {
    fallback: Option<Vec<QueueItem>>,
}

pub struct DeliveryQueue {
    store: Arc<dyn KvStore>,
    transport: Arc<dyn Transport>,
    key: String,
    max_retries: u32,
    backing: Mutex<Backing>,
    draining: Mutex<()>,
    degraded: AtomicBool,
    notify: Arc<Notify>,
}

impl DeliveryQueue {
    pub fn new(store: Arc<dyn KvStore>, transport: Arc<dyn Transport>, config: &QueueConfig) -> Self {
        Self {
            store,
            transport,
            key: config.queue_key.clone(),
            max_retries: config.max_retries,
            backing: Mutex::new(Backing::default()),
            draining: Mutex::new(()),
            degraded: AtomicBool::new(false),
            notify: Arc::new(Notify::new()),
        }
    }

    /// Write an empty list under the queue key if nothing is there yet.
    pub async fn init(&self) {
        let mut backing = self.backing.lock().await;
        if backing.fallback.is_some() {
            return;
        }
        match self.store.get(&self.key).await {
            Ok(Some(_)) => {}
            Ok(None) => self.persist(&mut backing, Vec::new()).await,
            Err(e) => self.degrade(&mut backing, Vec::new(), &e.to_string()),
        }
    }

    /// Woken after every successful enqueue.
    pub fn notifier(&self) -> Arc<Notify> {
        self.notify.clone()
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    pub fn is_degraded(&self) -> bool {
        self.degraded.load(Ordering::Relaxed)
    }

    pub async fn enqueue(&self, payload: Value) -> EnqueueOutcome {
        let item = QueueItem::new(payload);
        let id = item.id;
        {
            let mut backing = self.backing.lock().await;
            let mut items = self.load(&mut backing).await;
            if items.iter().any(|queued| queued.hash == item.hash) {
                debug!("duplicate payload suppressed");
                return EnqueueOutcome::Duplicate;
            }
            items.push(item);
            let len = items.len();
            self.persist(&mut backing, items).await;
            info!(len, "payload queued");
        }
        self.notify.notify_one();
        EnqueueOutcome::Queued(id)
    }

    /// Attempt every item under the retry cap once. Concurrent calls run one
    /// after the other.
    pub async fn drain(&self) -> DrainReport {
        let _draining = self.draining.lock().await;
        let snapshot = {
            let mut backing = self.backing.lock().await;
            self.load(&mut backing).await
        };

        let mut report = DrainReport::default();
        for item in snapshot {
            if item.is_parked(self.max_retries) {
                report.parked += 1;
                continue;
            }
            report.attempted += 1;

            let delivered = match self.transport.deliver(&item.payload).await {
                Ok(DeliveryOutcome::Delivered(status)) => {
                    debug!(id = %item.id, status, "payload delivered");
                    true
                }
                Ok(DeliveryOutcome::Rejected(status, body)) => {
                    warn!(id = %item.id, status, body = %body, "ingest rejected");
                    false
                }
                Err(e) => {
                    warn!(id = %item.id, error = %e, "ingest failed");
                    false
                }
            };

            let mut backing = self.backing.lock().await;
            let mut items = self.load(&mut backing).await;
            if delivered {
                items.retain(|queued| queued.id != item.id);
                report.delivered += 1;
            } else {
                if let Some(queued) = items.iter_mut().find(|queued| queued.id == item.id) {
                    queued.retries += 1;
                }
                report.failed += 1;
            }
            self.persist(&mut backing, items).await;
        }
        report
    }

    pub async fn items(&self) -> Vec<QueueItem> {
        let mut backing = self.backing.lock().await;
        self.load(&mut backing).await
    }

    pub async fn len(&self) -> usize {
        self.items().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Items whose retry budget is spent.
    pub async fn dead_letters(&self) -> Vec<QueueItem> {
        let max = self.max_retries;
        self.items()
            .await
            .into_iter()
            .filter(|item| item.is_parked(max))
            .collect()
    }

    /// Drop parked items. Returns how many were removed.
    pub async fn purge_dead_letters(&self) -> usize {
        let mut backing = self.backing.lock().await;
        let mut items = self.load(&mut backing).await;
        let before = items.len();
        items.retain(|item| !item.is_parked(self.max_retries));
        let purged = before - items.len();
        if purged > 0 {
            self.persist(&mut backing, items).await;
            info!(purged, "dead letters purged");
        }
        purged
    }

    async fn load(&self, backing: &mut Backing) -> Vec<QueueItem> {
        if let Some(items) = &backing.fallback {
            return items.clone();
        }
        let value = match self.store.get(&self.key).await {
            Ok(Some(value)) => value,
            Ok(None) => return Vec::new(),
            Err(e) => {
                self.degrade(backing, Vec::new(), &e.to_string());
                return Vec::new();
            }
        };
        match serde_json::from_value(value) {
            Ok(items) => items,
            Err(e) => {
                self.degrade(backing, Vec::new(), &e.to_string());
                Vec::new()
            }
        }
    }

    async fn persist(&self, backing: &mut Backing, items: Vec<QueueItem>) {
        if let Some(fallback) = backing.fallback.as_mut() {
            *fallback = items;
            return;
        }
        let value = match serde_json::to_value(&items) {
            Ok(value) => value,
            Err(e) => {
                self.degrade(backing, items, &e.to_string());
                return;
            }
        };
        if let Err(e) = self.store.set(&self.key, &value).await {
            self.degrade(backing, items, &e.to_string());
        }
    }

    fn degrade(&self, backing: &mut Backing, items: Vec<QueueItem>, reason: &str) {
        warn!(reason, "queue store unavailable, using in-memory queue");
        backing.fallback = Some(items);
        self.degraded.store(true, Ordering::Relaxed);
    }
}

#[async_trait]
impl PayloadSink for DeliveryQueue {
    async fn submit(&self, payload: Value) -> shopsignal_core::Result<()> {
        self.enqueue(payload).await;
        Ok(())
    }
}
