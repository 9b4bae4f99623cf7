use std::time::Duration;

use crate::protocol::public::TokenUsage;

/// Log token accounting for one completed request.
pub fn log_request_usage(model: &str, finish_reason: &str, usage: &TokenUsage, elapsed: Duration) {
    tracing::info!(
        target: "chatbridge::usage",
        model,
        finish_reason,
        prompt_tokens = usage.prompt_tokens,
        completion_tokens = usage.completion_tokens,
        total_tokens = usage.total_tokens,
        elapsed_ms = elapsed.as_millis() as u64,
        "request complete"
    );
}
