//! Wire types and frame encoders for the public chat-completion API.
//!
//! Non-streaming responses are serialized with serde; streaming chunk frames
//! are built with manual string pushing since they sit on the per-token hot
//! path.

use serde::{Deserialize, Serialize};

use crate::util::{push_json_string_escaped, push_u64_decimal};

pub const DONE_FRAME: &str = "data: [DONE]\n\n";

// ---------------------------------------------------------------------------
// Request
// ---------------------------------------------------------------------------

/// One message in the public conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

/// An inbound chat-completion request.
#[derive(Debug, Clone, Deserialize)]
pub struct ChatCompletionRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    #[serde(default)]
    pub stream: bool,
    #[serde(default)]
    pub temperature: Option<f64>,
    #[serde(default)]
    pub max_tokens: Option<u64>,
}

// ---------------------------------------------------------------------------
// Non-streaming response
// ---------------------------------------------------------------------------

/// Token accounting in the public shape.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TokenUsage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatChoice {
    pub index: u32,
    pub message: ChatMessage,
    pub finish_reason: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatCompletionResponse {
    pub id: String,
    pub object: &'static str,
    pub created: u64,
    pub model: String,
    pub choices: Vec<ChatChoice>,
    pub usage: TokenUsage,
}

/// Assemble a single-choice completion response body.
#[must_use]
pub fn completion_response(
    id: String,
    model: &str,
    created: u64,
    content: String,
    finish_reason: String,
    usage: TokenUsage,
) -> ChatCompletionResponse {
    ChatCompletionResponse {
        id,
        object: "chat.completion",
        created,
        model: model.to_string(),
        choices: vec![ChatChoice {
            index: 0,
            message: ChatMessage {
                role: "assistant".to_string(),
                content,
            },
            finish_reason,
        }],
        usage,
    }
}

// ---------------------------------------------------------------------------
// Streaming chunk frames
// ---------------------------------------------------------------------------

fn push_chunk_prefix(out: &mut String, id: &str, model: &str, created: u64) {
    out.push_str("data: {\"id\":");
    push_json_string_escaped(out, id);
    out.push_str(",\"object\":\"chat.completion.chunk\",\"created\":");
    push_u64_decimal(out, created);
    out.push_str(",\"model\":");
    push_json_string_escaped(out, model);
}

/// The synthetic chunk that opens every public stream.
#[must_use]
pub fn role_chunk_frame(id: &str, model: &str, created: u64) -> String {
    let mut out = String::with_capacity(144 + id.len() + model.len());
    push_chunk_prefix(&mut out, id, model, created);
    out.push_str(
        ",\"choices\":[{\"index\":0,\"delta\":{\"role\":\"assistant\"},\"finish_reason\":null}]}\n\n",
    );
    out
}

/// A chunk carrying one content fragment.
#[must_use]
pub fn content_chunk_frame(id: &str, model: &str, created: u64, text: &str) -> String {
    let mut out = String::with_capacity(144 + id.len() + model.len() + text.len());
    push_chunk_prefix(&mut out, id, model, created);
    out.push_str(",\"choices\":[{\"index\":0,\"delta\":{\"content\":");
    push_json_string_escaped(&mut out, text);
    out.push_str("},\"finish_reason\":null}]}\n\n");
    out
}

/// The chunk that announces the upstream-declared finish reason.
#[must_use]
pub fn finish_chunk_frame(id: &str, model: &str, created: u64, finish_reason: &str) -> String {
    let mut out = String::with_capacity(128 + id.len() + model.len() + finish_reason.len());
    push_chunk_prefix(&mut out, id, model, created);
    out.push_str(",\"choices\":[{\"index\":0,\"delta\":{},\"finish_reason\":");
    push_json_string_escaped(&mut out, finish_reason);
    out.push_str("}]}\n\n");
    out
}

/// An error frame for failures that occur after the stream has started.
#[must_use]
pub fn error_frame(message: &str) -> String {
    let mut out = String::with_capacity(40 + message.len());
    out.push_str("data: {\"error\":{\"message\":");
    push_json_string_escaped(&mut out, message);
    out.push_str("}}\n\n");
    out
}
