use std::collections::VecDeque;
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Instant;

use axum::extract::State;
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use futures_util::{Stream, StreamExt};
use http::HeaderMap;

use crate::error::BridgeError;
use crate::observability::usage::log_request_usage;
use crate::protocol::public::{completion_response, ChatCompletionRequest};
use crate::protocol::upstream::encode_upstream_request;
use crate::state::AppState;
use crate::stream::{
    aggregate_events, upstream_event_stream, ChunkRelay, UpstreamDecoder, UpstreamEvent,
};
use crate::util::unix_now_secs;

/// `POST /v1/chat/completions`.
pub async fn handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if let Err(err) = state.authenticate(&headers) {
        return err.into_response();
    }

    let request: ChatCompletionRequest = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(e) => {
            return BridgeError::InvalidRequest(format!("Failed to parse request body: {e}"))
                .into_response()
        }
    };

    match handle_chat(&state, request).await {
        Ok(response) => response,
        Err(err) => err.into_response(),
    }
}

async fn handle_chat(
    state: &Arc<AppState>,
    request: ChatCompletionRequest,
) -> Result<Response, BridgeError> {
    let started = Instant::now();
    let upstream_body = encode_upstream_request(&request)?;
    let api_key = state.pick_upstream_key();

    tracing::debug!(
        model = %request.model,
        stream = request.stream,
        wire_format = %state.config.upstream.wire_format,
        "forwarding chat request upstream"
    );

    let upstream_response = state
        .transport
        .send_stream(state.chat_url(), api_key, upstream_body)
        .await?;

    let status = upstream_response.status();
    if !status.is_success() {
        let body_bytes = upstream_response
            .bytes()
            .await
            .map_err(|e| BridgeError::Transport(format!("Failed to read error body: {e}")))?;
        return Err(BridgeError::Upstream {
            status: status.as_u16(),
            message: sanitize_upstream_error(&body_bytes),
        });
    }

    let decoder = UpstreamDecoder::for_format(state.config.upstream.wire_format);
    let events = upstream_event_stream(upstream_response.bytes_stream(), decoder);
    let response_id = state.next_response_id();

    if request.stream {
        return Ok(build_relay_response(events, response_id, &request.model));
    }

    let aggregated = aggregate_events(events, response_id).await;
    log_request_usage(
        &request.model,
        &aggregated.finish_reason,
        &aggregated.usage,
        started.elapsed(),
    );
    let body = completion_response(
        aggregated.id,
        &request.model,
        unix_now_secs(),
        aggregated.content,
        aggregated.finish_reason,
        aggregated.usage,
    );
    Ok((http::StatusCode::OK, axum::Json(body)).into_response())
}

/// Build the streaming response: one public chunk per upstream event, in
/// arrival order, opened by the role announcement and closed by the sentinel.
fn build_relay_response<S>(events: S, response_id: String, model: &str) -> Response
where
    S: Stream<Item = Result<UpstreamEvent, BridgeError>> + Send + 'static,
{
    let relay = ChunkRelay::new(response_id, model.to_string());

    let output_stream = futures_util::stream::unfold(
        (
            Box::pin(events),
            relay,
            VecDeque::<String>::new(),
            false,
            false,
        ),
        |(mut events, mut relay, mut pending, mut opened, mut finished)| async move {
            loop {
                if !opened {
                    opened = true;
                    let frame = relay.open_frame();
                    return Some((
                        Bytes::from(frame),
                        (events, relay, pending, opened, finished),
                    ));
                }
                if let Some(frame) = pending.pop_front() {
                    return Some((
                        Bytes::from(frame),
                        (events, relay, pending, opened, finished),
                    ));
                }
                if finished {
                    return None;
                }

                let mut frames = Vec::with_capacity(2);
                match events.as_mut().next().await {
                    Some(Ok(event)) => relay.relay_event_into(&event, &mut frames),
                    Some(Err(e)) => {
                        tracing::warn!(error = %e, "upstream stream failed while relaying");
                        relay.fail_into(&e.to_string(), &mut frames);
                        finished = true;
                    }
                    None => {
                        relay.finalize_into(&mut frames);
                        finished = true;
                    }
                }
                pending.extend(frames);
            }
        },
    );

    let body = axum::body::Body::from_stream(
        output_stream.map(Ok::<Bytes, Infallible>),
    );
    sse_ok_response(body)
}

#[inline]
fn sse_ok_response(body: axum::body::Body) -> Response {
    let mut response = Response::new(body);
    *response.status_mut() = http::StatusCode::OK;
    let headers = response.headers_mut();
    headers.insert(
        http::header::CONTENT_TYPE,
        http::HeaderValue::from_static("text/event-stream"),
    );
    headers.insert(
        http::header::CACHE_CONTROL,
        http::HeaderValue::from_static("no-cache"),
    );
    headers.insert(
        http::header::CONNECTION,
        http::HeaderValue::from_static("keep-alive"),
    );
    response
}

const UPSTREAM_ERROR_MAX_LEN: usize = 512;

/// Reduce an upstream error body to a loggable, client-safe message.
fn sanitize_upstream_error(body: &[u8]) -> String {
    if let Ok(json) = serde_json::from_slice::<serde_json::Value>(body) {
        if let Some(message) = json
            .pointer("/error/message")
            .or_else(|| json.pointer("/message"))
            .and_then(serde_json::Value::as_str)
        {
            return truncated(message);
        }
    }
    truncated(String::from_utf8_lossy(body).as_ref())
}

fn truncated(message: &str) -> String {
    if message.len() <= UPSTREAM_ERROR_MAX_LEN {
        return message.to_string();
    }
    let mut end = UPSTREAM_ERROR_MAX_LEN;
    while !message.is_char_boundary(end) {
        end -= 1;
    }
    message[..end].to_string()
}
