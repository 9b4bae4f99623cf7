//! Folds a full upstream event sequence into one logical answer for
//! non-streaming callers.

use futures_util::{Stream, StreamExt};

use super::UpstreamEvent;
use crate::error::BridgeError;
use crate::protocol::public::TokenUsage;

/// The single logical result of draining one upstream stream.
#[derive(Debug, Clone)]
pub struct AggregatedCompletion {
    pub id: String,
    pub content: String,
    pub finish_reason: String,
    pub usage: TokenUsage,
}

/// Drain the event sequence to completion and fold it.
///
/// Content is the exact, order-preserving concatenation of every fragment.
/// Completion metadata overwrites earlier values, so the last occurrence
/// wins. A stream that ends without any completion metadata keeps the
/// `"stop"` default. A transport failure mid-drain is folded into a
/// well-formed result with `finish_reason = "error"` and the failure text as
/// the content, so the HTTP layer above never sees a raw stream failure on
/// this path.
pub async fn aggregate_events<S>(events: S, id: String) -> AggregatedCompletion
where
    S: Stream<Item = Result<UpstreamEvent, BridgeError>>,
{
    futures_util::pin_mut!(events);

    let mut content = String::new();
    let mut finish_reason = "stop".to_string();
    let mut usage = TokenUsage::default();

    while let Some(item) = events.next().await {
        match item {
            Ok(UpstreamEvent::Content(text)) => content.push_str(&text),
            Ok(UpstreamEvent::Completion {
                finish_reason: reason,
                usage: reported,
            }) => {
                if let Some(reason) = reason {
                    finish_reason = reason;
                }
                if let Some(reported) = reported {
                    usage = reported.into_public();
                }
            }
            Ok(UpstreamEvent::Unparsable(raw)) => {
                tracing::debug!(unit = %raw, "skipping unparsable upstream unit");
            }
            Err(e) => {
                tracing::warn!(error = %e, "upstream stream failed while aggregating");
                return AggregatedCompletion {
                    id,
                    content: format!("Upstream stream failed: {e}"),
                    finish_reason: "error".to_string(),
                    usage,
                };
            }
        }
    }

    AggregatedCompletion {
        id,
        content,
        finish_reason,
        usage,
    }
}
