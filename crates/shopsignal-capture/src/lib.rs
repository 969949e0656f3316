//! Scoped capture of product patches streamed after a carousel click.
//!
//! A qualifying click arms a time-boxed session. While it is open, responses
//! from the product-info endpoint are split into event frames, decoded, and
//! filtered through the entity-mode relevance rules. The session is flushed
//! exactly once, as one event-log record.

pub mod click;
pub mod controller;
pub mod frames;
pub mod machine;
pub mod reader;

pub use click::ClickTarget;
pub use controller::CaptureController;
pub use frames::{parse_frame, FrameDecoder, DONE_TOKEN};
pub use machine::{ArmOutcome, CaptureMachine, CaptureSession};
pub use reader::{is_product_info_url, ProductInfoTap, ReadEnd, TapOutcome};

#[cfg(test)]
mod tests;
