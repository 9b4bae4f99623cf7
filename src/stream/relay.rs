//! Translates upstream events into public streaming chunks as they arrive.
//!
//! The relay is strictly 1:1 with upstream arrival order: each event is
//! translated and handed to the output before the next one is requested.
//! The public stream opens with a synthetic role-announcement chunk and is
//! closed by the `[DONE]` sentinel exactly once on every exit path; once the
//! sentinel is out, the relay is closed and drops whatever else arrives.

use super::UpstreamEvent;
use crate::protocol::public::{
    content_chunk_frame, error_frame, finish_chunk_frame, role_chunk_frame, DONE_FRAME,
};
use crate::util::unix_now_secs;

pub struct ChunkRelay {
    id: String,
    model: String,
    created: u64,
    closed: bool,
}

impl ChunkRelay {
    #[must_use]
    pub fn new(id: String, model: String) -> Self {
        Self {
            id,
            model,
            created: unix_now_secs(),
            closed: false,
        }
    }

    /// The role-announcement chunk that must precede all other output.
    #[must_use]
    pub fn open_frame(&self) -> String {
        role_chunk_frame(&self.id, &self.model, self.created)
    }

    /// Translate one upstream event, appending zero or more frames to `out`.
    pub fn relay_event_into(&mut self, event: &UpstreamEvent, out: &mut Vec<String>) {
        if self.closed {
            return;
        }
        match event {
            UpstreamEvent::Content(text) => {
                out.push(content_chunk_frame(&self.id, &self.model, self.created, text));
            }
            UpstreamEvent::Completion {
                finish_reason: Some(reason),
                ..
            } => {
                out.push(finish_chunk_frame(
                    &self.id,
                    &self.model,
                    self.created,
                    reason,
                ));
                out.push(DONE_FRAME.to_owned());
                self.closed = true;
            }
            // Usage-only metadata has no public chunk representation.
            UpstreamEvent::Completion {
                finish_reason: None,
                ..
            } => {}
            UpstreamEvent::Unparsable(raw) => {
                tracing::debug!(unit = %raw, "skipping unparsable upstream unit");
            }
        }
    }

    /// Surface a transport failure, then close the stream.
    pub fn fail_into(&mut self, message: &str, out: &mut Vec<String>) {
        if self.closed {
            return;
        }
        out.push(error_frame(message));
        self.finalize_into(out);
    }

    /// Close the stream, emitting the sentinel if it has not gone out yet.
    pub fn finalize_into(&mut self, out: &mut Vec<String>) {
        if !self.closed {
            out.push(DONE_FRAME.to_owned());
            self.closed = true;
        }
    }
}
