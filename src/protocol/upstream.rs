//! Wire types for the upstream chat provider.
//!
//! The upstream request body is camelCase JSON; the two stream envelopes
//! disagree on field casing (the token-line metadata payloads are camelCase,
//! the JSON-SSE payloads snake_case), so the shared usage type accepts both
//! spellings via aliases.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::error::BridgeError;
use crate::protocol::public::{ChatCompletionRequest, ChatMessage, TokenUsage};

// ---------------------------------------------------------------------------
// Request encoding
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct UpstreamChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u64>,
}

/// Encode a public request as the upstream provider's JSON body.
///
/// The upstream call always streams; non-streaming public callers are served
/// by draining that stream.
///
/// # Errors
///
/// Returns [`BridgeError::InvalidRequest`] when the body cannot be serialized.
pub fn encode_upstream_request(request: &ChatCompletionRequest) -> Result<Bytes, BridgeError> {
    let body = UpstreamChatRequest {
        model: &request.model,
        messages: &request.messages,
        stream: true,
        temperature: request.temperature,
        max_tokens: request.max_tokens,
    };
    serde_json::to_vec(&body)
        .map(Bytes::from)
        .map_err(|e| BridgeError::InvalidRequest(format!("Failed to encode upstream body: {e}")))
}

// ---------------------------------------------------------------------------
// Stream payloads
// ---------------------------------------------------------------------------

/// Token counts as the upstream reports them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub struct UpstreamUsage {
    #[serde(default, alias = "promptTokens", alias = "prompt_tokens")]
    pub prompt_tokens: u64,
    #[serde(default, alias = "completionTokens", alias = "completion_tokens")]
    pub completion_tokens: u64,
    #[serde(default, alias = "totalTokens", alias = "total_tokens")]
    pub total_tokens: Option<u64>,
}

impl UpstreamUsage {
    /// Convert to the public shape, deriving the total when the upstream
    /// omitted it.
    #[must_use]
    pub fn into_public(self) -> TokenUsage {
        TokenUsage {
            prompt_tokens: self.prompt_tokens,
            completion_tokens: self.completion_tokens,
            total_tokens: self
                .total_tokens
                .unwrap_or(self.prompt_tokens + self.completion_tokens),
        }
    }
}

/// Payload of a token-line metadata line (`e:{...}` / `d:{...}`).
#[derive(Debug, Clone, Deserialize)]
pub struct TokenLineMetadata {
    #[serde(default, rename = "finishReason")]
    pub finish_reason: Option<String>,
    #[serde(default)]
    pub usage: Option<UpstreamUsage>,
}

/// Payload of a JSON-SSE `data:` block.
#[derive(Debug, Clone, Deserialize)]
pub struct SsePayload {
    #[serde(default)]
    pub choices: Vec<SseChoice>,
    #[serde(default)]
    pub usage: Option<UpstreamUsage>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SseChoice {
    #[serde(default)]
    pub delta: Option<SseContent>,
    #[serde(default)]
    pub message: Option<SseContent>,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SseContent {
    #[serde(default)]
    pub content: Option<String>,
}
