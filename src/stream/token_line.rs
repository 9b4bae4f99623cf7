//! Incremental decoder for the upstream's legacy token-line envelope.
//!
//! The stream is newline-delimited text. Three line shapes matter:
//!
//! - `0:"<payload>"`: one answer fragment. The payload is taken verbatim
//!   between the fixed prefix and the closing quote; its internal escaping
//!   is not interpreted.
//! - `e:{...}` / `d:{...}`: completion metadata as JSON starting at the
//!   third character (`finishReason`, `usage`).
//!
//! Anything else decodes to [`UpstreamEvent::Unparsable`] and is never fatal.

use memchr::memchr_iter;

use super::UpstreamEvent;
use crate::protocol::upstream::TokenLineMetadata;

const CONTENT_PREFIX: &str = "0:\"";
const METADATA_PREFIXES: [&str; 2] = ["e:{", "d:{"];

/// Incremental token-line decoder.
///
/// Feed it raw text chunks (arriving at arbitrary byte boundaries) and it
/// yields events for every complete line; a trailing partial line stays
/// buffered until the newline that completes it arrives.
pub struct TokenLineDecoder {
    buffer: String,
    read_offset: usize,
}

impl TokenLineDecoder {
    #[must_use]
    pub fn new() -> Self {
        Self {
            buffer: String::new(),
            read_offset: 0,
        }
    }

    /// Feed raw text and append events for complete lines to `out`.
    pub fn feed(&mut self, chunk: &str, out: &mut Vec<UpstreamEvent>) {
        self.buffer.push_str(chunk);
        let mut processed_up_to = self.read_offset;
        let bytes = self.buffer.as_bytes();
        let scan_start = processed_up_to;
        for rel_pos in memchr_iter(b'\n', &bytes[scan_start..]) {
            let line_end = scan_start + rel_pos;
            let mut line = &self.buffer[processed_up_to..line_end];
            if let Some(stripped) = line.strip_suffix('\r') {
                line = stripped;
            }
            decode_line(line, out);
            processed_up_to = line_end + 1;
        }

        self.read_offset = processed_up_to;
        if self.read_offset == self.buffer.len() {
            self.buffer.clear();
            self.read_offset = 0;
            return;
        }
        let should_compact = self.read_offset > 0
            && (self.read_offset >= self.buffer.len() / 2 || self.read_offset >= 8 * 1024);
        if should_compact {
            self.buffer.drain(..self.read_offset);
            self.read_offset = 0;
        }
    }
}

impl Default for TokenLineDecoder {
    fn default() -> Self {
        Self::new()
    }
}

fn decode_line(line: &str, out: &mut Vec<UpstreamEvent>) {
    if line.is_empty() {
        return;
    }

    if let Some(rest) = line.strip_prefix(CONTENT_PREFIX) {
        if let Some(payload) = rest.strip_suffix('"') {
            out.push(UpstreamEvent::Content(payload.to_string()));
        } else {
            out.push(UpstreamEvent::Unparsable(line.to_string()));
        }
        return;
    }

    if METADATA_PREFIXES
        .iter()
        .any(|prefix| line.starts_with(prefix))
    {
        match serde_json::from_str::<TokenLineMetadata>(&line[2..]) {
            Ok(metadata) => out.push(UpstreamEvent::Completion {
                finish_reason: metadata.finish_reason,
                usage: metadata.usage,
            }),
            Err(e) => {
                tracing::debug!(error = %e, "malformed metadata line skipped");
                out.push(UpstreamEvent::Unparsable(line.to_string()));
            }
        }
        return;
    }

    out.push(UpstreamEvent::Unparsable(line.to_string()));
}
