//! Newline-delimited JSON framing

use crate::error::FrameError;
use crate::models::RawRecord;

/// Longest line accepted before the partial line is discarded
pub const DEFAULT_MAX_LINE_LEN: usize = 4096;

/// Characters of an offending line kept in error reports
const PREVIEW_LEN: usize = 64;

/// Incremental decoder from a byte stream to raw records.
///
/// Bytes may arrive in arbitrary chunks; a record is only produced once its
/// terminating newline has been seen. Bad lines are reported and dropped.
#[derive(Debug)]
pub struct FramedReader {
    pending: Vec<u8>,
    max_line_len: usize,
    /// Set while skipping the tail of an oversized line
    discarding: bool,
}

impl Default for FramedReader {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_LINE_LEN)
    }
}

impl FramedReader {
    pub fn new(max_line_len: usize) -> Self {
        Self {
            pending: Vec::new(),
            max_line_len,
            discarding: false,
        }
    }

    /// Bytes buffered waiting for a line terminator
    pub fn buffered(&self) -> usize {
        self.pending.len()
    }

    /// Drop any partial line, e.g. after the link was lost
    pub fn reset(&mut self) {
        self.pending.clear();
        self.discarding = false;
    }

    /// Feed a chunk and return every complete frame it finished
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<Result<RawRecord, FrameError>> {
        let mut frames = Vec::new();

        for &byte in bytes {
            if byte == b'\n' {
                if self.discarding {
                    self.discarding = false;
                    continue;
                }
                let line = std::mem::take(&mut self.pending);
                if let Some(frame) = decode_line(&line) {
                    frames.push(frame);
                }
                continue;
            }

            if self.discarding {
                continue;
            }

            self.pending.push(byte);
            if self.pending.len() > self.max_line_len {
                let len = self.pending.len();
                self.pending.clear();
                self.discarding = true;
                frames.push(Err(FrameError::Oversized {
                    len,
                    limit: self.max_line_len,
                }));
            }
        }

        frames
    }
}

/// Decode one complete line; blank lines yield nothing
fn decode_line(line: &[u8]) -> Option<Result<RawRecord, FrameError>> {
    let text = String::from_utf8_lossy(line);
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return None;
    }

    let result = match serde_json::from_str::<serde_json::Value>(trimmed) {
        Ok(serde_json::Value::Object(map)) => Ok(map),
        Ok(_) => Err(FrameError::NotAnObject {
            preview: preview(trimmed),
        }),
        Err(e) => Err(FrameError::Malformed {
            reason: e.to_string(),
            preview: preview(trimmed),
        }),
    };
    Some(result)
}

fn preview(line: &str) -> String {
    line.chars().take(PREVIEW_LEN).collect()
}
