//! Conversation aggregation: text cleanup, hashing, heuristic extraction and
//! the per-conversation emission policy, plus a debounced tokio service.

pub mod aggregator;
pub mod hash;
pub mod heuristics;
pub mod service;
pub mod text;

pub use aggregator::{Aggregator, Emission, PageSnapshot, Verdict};
pub use hash::djb2;
pub use heuristics::{extract_heuristics, parse_price, Heuristics};
pub use service::{AggregatorService, MutationKind, MutationNotice, PageSource};
pub use text::{clean_message, collect_assistant_texts, is_noise_line, js_len, normalize_text};
