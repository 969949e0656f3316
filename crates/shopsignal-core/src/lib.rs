//! Shared types, configuration and seams for the shopsignal pipeline.

pub mod config;
pub mod conversation;
pub mod error;
pub mod messages;
pub mod sink;
pub mod types;

pub use config::ShopSignalConfig;
pub use conversation::{conversation_id_from_path, NO_CONVERSATION_ID};
pub use error::{Result, ShopError};
pub use messages::{BackgroundMessage, BackgroundReply, BridgeMessage};
pub use sink::{EventLogSink, PayloadSink};
pub use types::*;
