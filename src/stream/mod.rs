pub mod aggregate;
pub mod relay;
pub mod sse;
pub mod token_line;

pub use aggregate::{aggregate_events, AggregatedCompletion};
pub use relay::ChunkRelay;
pub use sse::JsonSseDecoder;
pub use token_line::TokenLineDecoder;

use futures_util::Stream;
use smallvec::SmallVec;

use crate::config::WireFormat;
use crate::error::BridgeError;
use crate::protocol::upstream::UpstreamUsage;

/// One decoded event from the upstream stream, in strict arrival order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpstreamEvent {
    /// A fragment of answer text.
    Content(String),
    /// Completion metadata; later occurrences override earlier ones.
    Completion {
        finish_reason: Option<String>,
        usage: Option<UpstreamUsage>,
    },
    /// A unit that failed to decode. Never fatal; carried for logging only.
    Unparsable(String),
}

impl Default for UpstreamEvent {
    fn default() -> Self {
        UpstreamEvent::Unparsable(String::new())
    }
}

/// Incremental decoder over one of the two upstream envelopes.
///
/// Both variants share the same discipline: bytes arrive in arbitrary-sized
/// chunks, incomplete trailing units stay buffered until the next feed, and
/// a unit is never decoded from a boundary-truncated fragment. Whatever is
/// left in the buffer when the stream ends is dropped with the decoder.
pub enum UpstreamDecoder {
    TokenLine(TokenLineDecoder),
    JsonSse(JsonSseDecoder),
}

impl UpstreamDecoder {
    #[must_use]
    pub fn for_format(format: WireFormat) -> Self {
        match format {
            WireFormat::TokenLine => UpstreamDecoder::TokenLine(TokenLineDecoder::new()),
            WireFormat::JsonSse => UpstreamDecoder::JsonSse(JsonSseDecoder::new()),
        }
    }

    /// Feed raw text and append any complete events to `out`.
    pub fn feed(&mut self, chunk: &str, out: &mut Vec<UpstreamEvent>) {
        match self {
            UpstreamDecoder::TokenLine(decoder) => decoder.feed(chunk, out),
            UpstreamDecoder::JsonSse(decoder) => decoder.feed(chunk, out),
        }
    }
}

struct PendingEvents {
    events: SmallVec<[UpstreamEvent; 8]>,
    head: usize,
}

impl PendingEvents {
    #[inline]
    fn with_capacity(capacity: usize) -> Self {
        let mut events = SmallVec::new();
        events.reserve(capacity);
        Self { events, head: 0 }
    }

    #[inline]
    fn pop_front(&mut self) -> Option<UpstreamEvent> {
        if self.head >= self.events.len() {
            return None;
        }
        let event = std::mem::take(&mut self.events[self.head]);
        self.head += 1;
        if self.head == self.events.len() {
            self.events.clear();
            self.head = 0;
        }
        Some(event)
    }

    #[inline]
    fn extend_from_vec(&mut self, parsed: &mut Vec<UpstreamEvent>) {
        if parsed.is_empty() {
            return;
        }
        self.events.reserve(parsed.len());
        self.events.extend(parsed.drain(..));
    }
}

/// Turn an upstream byte stream into a lazy, ordered sequence of
/// [`UpstreamEvent`].
///
/// Bytes are decoded as UTF-8 (sequences split across chunk boundaries are
/// reassembled), fed through the chosen decoder, and complete events are
/// yielded one at a time. A transport read failure is surfaced as a single
/// terminal `Err` item; the sequence ends after it.
pub fn upstream_event_stream<S, E>(
    byte_stream: S,
    decoder: UpstreamDecoder,
) -> impl Stream<Item = Result<UpstreamEvent, BridgeError>> + Send
where
    S: Stream<Item = Result<bytes::Bytes, E>> + Send + 'static,
    E: std::fmt::Display + Send + 'static,
{
    use futures_util::StreamExt;

    futures_util::stream::unfold(
        (
            Box::pin(byte_stream),
            decoder,
            Vec::<u8>::new(),
            Vec::<UpstreamEvent>::with_capacity(8),
            PendingEvents::with_capacity(8),
            false,
        ),
        |(mut stream, mut decoder, mut remainder, mut parsed, mut pending, mut failed)| async move {
            loop {
                if let Some(event) = pending.pop_front() {
                    return Some((
                        Ok(event),
                        (stream, decoder, remainder, parsed, pending, failed),
                    ));
                }
                if failed {
                    return None;
                }

                let chunk = stream.as_mut().next().await?;
                let bytes = match chunk {
                    Ok(bytes) => bytes,
                    Err(e) => {
                        failed = true;
                        return Some((
                            Err(BridgeError::Transport(format!(
                                "upstream read failed: {e}"
                            ))),
                            (stream, decoder, remainder, parsed, pending, failed),
                        ));
                    }
                };

                if remainder.is_empty() {
                    match std::str::from_utf8(&bytes) {
                        Ok(text) => decoder.feed(text, &mut parsed),
                        Err(e) => {
                            let valid_up_to = e.valid_up_to();
                            // Safety: valid_up_to is guaranteed to be a valid UTF-8 boundary.
                            let text =
                                unsafe { std::str::from_utf8_unchecked(&bytes[..valid_up_to]) };
                            decoder.feed(text, &mut parsed);
                            remainder.extend_from_slice(&bytes[valid_up_to..]);
                        }
                    }
                } else {
                    remainder.extend_from_slice(&bytes);
                    match std::str::from_utf8(remainder.as_slice()) {
                        Ok(text) => {
                            decoder.feed(text, &mut parsed);
                            remainder.clear();
                        }
                        Err(e) => {
                            let valid_up_to = e.valid_up_to();
                            // Safety: valid_up_to is guaranteed to be a valid UTF-8 boundary.
                            let text = unsafe {
                                std::str::from_utf8_unchecked(&remainder[..valid_up_to])
                            };
                            decoder.feed(text, &mut parsed);
                            if valid_up_to > 0 {
                                let remain_len = remainder.len() - valid_up_to;
                                remainder.copy_within(valid_up_to.., 0);
                                remainder.truncate(remain_len);
                            }
                        }
                    }
                }
                pending.extend_from_vec(&mut parsed);
            }
        },
    )
}
