//! Tap on product-info responses.

use futures::{Stream, StreamExt};
use regex::Regex;
use std::fmt::Display;
use std::sync::LazyLock;
use tracing::{debug, warn};

use crate::controller::CaptureController;
use crate::frames::{parse_frame, FrameDecoder};

static RE_PRODUCT_INFO: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/backend-api/(?:lat|search)/product_info").unwrap());

pub fn is_product_info_url(url: &str) -> bool {
    RE_PRODUCT_INFO.is_match(url)
}

/// Why a read stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadEnd {
    Complete,
    SessionEnded,
    StreamError(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TapOutcome {
    NotMatched,
    NotCapturing,
    Read {
        frames: usize,
        batches: usize,
        kept: usize,
        end: ReadEnd,
    },
}

/// Reads matching response bodies into the open capture session.
#[derive(Clone)]
pub struct ProductInfoTap {
    controller: CaptureController,
}

impl ProductInfoTap {
    pub fn new(controller: CaptureController) -> Self {
        Self { controller }
    }

    /// Stream `body` into the capture session if `url` matches and a session is
    /// open. The session is flushed once the read ends, whichever way it ends.
    pub async fn tap<S, B, E>(&self, url: &str, body: S) -> TapOutcome
    where
        S: Stream<Item = Result<B, E>>,
        B: AsRef<[u8]>,
        E: Display,
    {
        if !is_product_info_url(url) {
            return TapOutcome::NotMatched;
        }
        let Some(session_id) = self.controller.live_session() else {
            return TapOutcome::NotCapturing;
        };

        let mut body = std::pin::pin!(body);
        let mut decoder = FrameDecoder::new();
        let (mut frames, mut batches, mut kept) = (0, 0, 0);
        let mut end = ReadEnd::Complete;

        while let Some(chunk) = body.next().await {
            let chunk = match chunk {
                Ok(chunk) => chunk,
                Err(e) => {
                    warn!(error = %e, "product_info stream failed");
                    end = ReadEnd::StreamError(e.to_string());
                    break;
                }
            };
            if !self.controller.is_live(session_id) {
                end = ReadEnd::SessionEnded;
                break;
            }
            for frame in decoder.push(chunk.as_ref()) {
                frames += 1;
                if let Some(ops) = parse_frame(&frame) {
                    batches += 1;
                    kept += self.controller.observe(session_id, ops);
                }
            }
        }

        debug!(session = %session_id, frames, batches, kept, ?end, "product_info read finished");
        self.controller.flush_session(session_id).await;
        TapOutcome::Read { frames, batches, kept, end }
    }
}
