//! Event-frame splitting for the product-info stream.

use serde_json::Value;
use shopsignal_core::types::PatchOp;
use tracing::trace;

/// Literal terminator sent as the last frame's data.
pub const DONE_TOKEN: &str = "[DONE]";

const FRAME_BOUNDARY: &str = "\n\n";
const DATA_FIELD: &str = "data:";

/// Incremental UTF-8 decoder that yields complete blank-line delimited frames.
///
/// A multi-byte character split across chunks is held until its tail arrives.
/// Invalid byte sequences decode as U+FFFD.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    undecoded: Vec<u8>,
    text: String,
    /// Offset in `text` before which no boundary can start.
    scanned: usize,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk and drain every frame it completes.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.undecoded.extend_from_slice(chunk);
        self.decode();

        let mut frames = Vec::new();
        let mut start = self.scanned;
        let mut consumed = 0;
        while let Some(rel) = self.text[start..].find(FRAME_BOUNDARY) {
            let pos = start + rel;
            frames.push(self.text[consumed..pos].to_string());
            consumed = pos + FRAME_BOUNDARY.len();
            start = consumed;
        }
        self.text.drain(..consumed);
        self.scanned = self.resume_point();
        frames
    }

    /// A boundary may straddle the end of the buffer, so the next scan backs
    /// up by one byte short of its length.
    fn resume_point(&self) -> usize {
        let mut at = self.text.len().saturating_sub(FRAME_BOUNDARY.len() - 1);
        while !self.text.is_char_boundary(at) {
            at -= 1;
        }
        at
    }

    /// Text received after the last complete frame.
    pub fn remainder(&self) -> &str {
        &self.text
    }

    fn decode(&mut self) {
        loop {
            match std::str::from_utf8(&self.undecoded) {
                Ok(s) => {
                    self.text.push_str(s);
                    self.undecoded.clear();
                    return;
                }
                Err(e) => {
                    let valid = e.valid_up_to();
                    self.text.push_str(&String::from_utf8_lossy(&self.undecoded[..valid]));
                    match e.error_len() {
                        // Incomplete sequence at the end: wait for more bytes.
                        None => {
                            self.undecoded.drain(..valid);
                            return;
                        }
                        Some(bad) => {
                            self.text.push(char::REPLACEMENT_CHARACTER);
                            self.undecoded.drain(..valid + bad);
                        }
                    }
                }
            }
        }
    }
}

/// Decode one frame into its patch operations.
///
/// Returns `None` for frames without data, the terminator, or data that is not
/// JSON. A `v` that is not an array yields an empty batch. Malformed entries
/// inside `v` are dropped.
pub fn parse_frame(frame: &str) -> Option<Vec<PatchOp>> {
    let line = frame.split('\n').find(|l| l.starts_with(DATA_FIELD))?;
    let data = line[DATA_FIELD.len()..].trim();
    if data.is_empty() || data == DONE_TOKEN {
        return None;
    }

    let parsed: Value = match serde_json::from_str(data) {
        Ok(v) => v,
        Err(e) => {
            trace!(error = %e, "dropping undecodable frame");
            return None;
        }
    };

    let ops = match parsed.get("v") {
        Some(Value::Array(raw)) => raw
            .iter()
            .filter_map(|entry| serde_json::from_value::<PatchOp>(entry.clone()).ok())
            .collect(),
        _ => Vec::new(),
    };
    Some(ops)
}
