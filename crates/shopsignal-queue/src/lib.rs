//! Durable delivery of ingest payloads.
//!
//! Payloads are deduplicated, persisted in a key-value store under one key,
//! and drained to the ingest endpoint by a single [`QueueWorker`]. Failed
//! items are retried up to a cap and then parked in place.

pub mod error;
pub mod event_log;
pub mod item;
pub mod queue;
pub mod store;
pub mod transport;
pub mod worker;

pub use error::{StoreError, TransportError};
pub use event_log::HttpEventLogSink;
pub use item::{payload_hash, QueueItem, HASH_LEN};
pub use queue::{DeliveryQueue, DrainReport, EnqueueOutcome};
pub use store::{FileKvStore, KvStore, MemoryKvStore};
pub use transport::{DeliveryOutcome, HttpTransport, Transport};
pub use worker::{QueueWorker, WorkerHandle};
