//! Incremental decoder for the upstream's JSON-over-SSE envelope.
//!
//! The stream is composed of blocks separated by a blank line. A block is
//! significant only when its first non-empty line carries the `data:` field;
//! the remainder of that line is parsed as JSON. Content arrives under
//! `choices[0].delta.content` (or `choices[0].message.content`), completion
//! metadata under `choices[0].finish_reason` with an optional object-level
//! `usage`.

use memchr::memmem;
use std::sync::LazyLock;

use super::UpstreamEvent;
use crate::protocol::upstream::SsePayload;

const DATA_MARKER: &str = "data:";

/// Incremental JSON-SSE decoder.
///
/// Feed it raw text chunks (arriving at arbitrary byte boundaries) and it
/// yields events for every blank-line-terminated block; a trailing partial
/// block stays buffered until its separator arrives.
pub struct JsonSseDecoder {
    buffer: String,
    scan_from: usize,
}

impl JsonSseDecoder {
    #[must_use]
    pub fn new() -> Self {
        Self {
            buffer: String::new(),
            scan_from: 0,
        }
    }

    /// Feed raw text and append events for complete blocks to `out`.
    pub fn feed(&mut self, chunk: &str, out: &mut Vec<UpstreamEvent>) {
        self.buffer.push_str(chunk);
        while let Some((block_end, separator_len)) =
            find_block_separator(self.buffer.as_bytes(), self.scan_from)
        {
            decode_block(&self.buffer[..block_end], out);
            self.buffer.drain(..block_end + separator_len);
            self.scan_from = 0;
        }
        // Keep a small overlap so a separator split across chunk boundaries
        // is still found on the next feed.
        self.scan_from = self.buffer.len().saturating_sub(3);
    }
}

impl Default for JsonSseDecoder {
    fn default() -> Self {
        Self::new()
    }
}

#[inline]
fn find_block_separator(buffer: &[u8], scan_from: usize) -> Option<(usize, usize)> {
    static LF_LF_FINDER: LazyLock<memmem::Finder<'static>> =
        LazyLock::new(|| memmem::Finder::new(b"\n\n"));
    static CRLF_CRLF_FINDER: LazyLock<memmem::Finder<'static>> =
        LazyLock::new(|| memmem::Finder::new(b"\r\n\r\n"));

    let scan_from = scan_from.min(buffer.len());
    let haystack = &buffer[scan_from..];
    let lf_lf_pos = LF_LF_FINDER.find(haystack).map(|rel| scan_from + rel);
    let crlf_crlf_pos = CRLF_CRLF_FINDER.find(haystack).map(|rel| scan_from + rel);

    match (lf_lf_pos, crlf_crlf_pos) {
        (Some(lf_pos), Some(crlf_pos)) => {
            if lf_pos <= crlf_pos {
                Some((lf_pos, 2))
            } else {
                Some((crlf_pos, 4))
            }
        }
        (Some(lf_pos), None) => Some((lf_pos, 2)),
        (None, Some(crlf_pos)) => Some((crlf_pos, 4)),
        (None, None) => None,
    }
}

fn decode_block(block: &str, out: &mut Vec<UpstreamEvent>) {
    let Some(line) = block
        .lines()
        .map(|line| line.strip_suffix('\r').unwrap_or(line))
        .find(|line| !line.trim().is_empty())
    else {
        return;
    };

    // Blocks without the data field are insignificant, not malformed.
    let Some(payload) = line.strip_prefix(DATA_MARKER) else {
        return;
    };
    let payload = payload.trim();
    if payload.is_empty() || payload == "[DONE]" {
        return;
    }

    let parsed: SsePayload = match serde_json::from_str(payload) {
        Ok(parsed) => parsed,
        Err(e) => {
            tracing::debug!(error = %e, "malformed data block skipped");
            out.push(UpstreamEvent::Unparsable(block.to_string()));
            return;
        }
    };

    let usage = parsed.usage;
    let mut usage_emitted = false;
    if let Some(choice) = parsed.choices.first() {
        let content = choice
            .delta
            .as_ref()
            .and_then(|delta| delta.content.as_deref())
            .or_else(|| {
                choice
                    .message
                    .as_ref()
                    .and_then(|message| message.content.as_deref())
            });
        if let Some(text) = content {
            out.push(UpstreamEvent::Content(text.to_string()));
        }
        if let Some(reason) = &choice.finish_reason {
            out.push(UpstreamEvent::Completion {
                finish_reason: Some(reason.clone()),
                usage,
            });
            usage_emitted = true;
        }
    }
    if !usage_emitted {
        if let Some(usage) = usage {
            out.push(UpstreamEvent::Completion {
                finish_reason: None,
                usage: Some(usage),
            });
        }
    }
}
