//! End-to-end tests: a full bridge instance forwarding to an in-process mock
//! upstream, exercised over real HTTP on ephemeral ports.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use axum::routing::post;
use axum::Router;
use bytes::Bytes;
use serde_json::{json, Value};

use chatbridge_rs::auth::build_allowed_key_set;
use chatbridge_rs::config::{
    AppConfig, ClientAuthConfig, FeaturesConfig, ServerConfig, UpstreamConfig, WireFormat,
};
use chatbridge_rs::router;
use chatbridge_rs::state::AppState;
use chatbridge_rs::transport::HttpTransport;

const TOKEN_LINE_BODY: &str = "0:\"Hello\"\n0:\" world\"\ne:{\"finishReason\":\"stop\",\"usage\":{\"promptTokens\":3,\"completionTokens\":2}}\n";

const JSON_SSE_BODY: &str = "data: {\"choices\":[{\"delta\":{\"content\":\"Hi\"}}]}\n\ndata: {\"choices\":[{\"finish_reason\":\"stop\"}]}\n\n";

async fn serve(app: Router) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("serve");
    });
    addr
}

fn bridge_config(
    upstream: SocketAddr,
    wire_format: WireFormat,
    allowed_keys: Vec<String>,
) -> AppConfig {
    AppConfig {
        server: ServerConfig::default(),
        upstream: UpstreamConfig {
            base_url: format!("http://{upstream}"),
            chat_path: "/api/chat".to_string(),
            api_keys: vec!["sk-upstream".to_string()],
            wire_format,
            models: vec!["answer-1".to_string()],
        },
        client_authentication: ClientAuthConfig { allowed_keys },
        features: FeaturesConfig::default(),
    }
}

async fn spawn_bridge(
    upstream: SocketAddr,
    wire_format: WireFormat,
    allowed_keys: Vec<String>,
) -> SocketAddr {
    let config = bridge_config(upstream, wire_format, allowed_keys);
    let transport = HttpTransport::new(&config.server).expect("transport");
    let allowed = build_allowed_key_set(&config);
    let state = Arc::new(AppState::new(config, transport, allowed));
    serve(router(state)).await
}

fn chat_body(stream: bool) -> Value {
    json!({
        "model": "answer-1",
        "messages": [{ "role": "user", "content": "hi" }],
        "stream": stream,
    })
}

#[tokio::test]
async fn non_streaming_request_aggregates_token_line_upstream() {
    let upstream = serve(Router::new().route("/api/chat", post(|| async { TOKEN_LINE_BODY }))).await;
    let bridge = spawn_bridge(upstream, WireFormat::TokenLine, vec![]).await;

    let response = reqwest::Client::new()
        .post(format!("http://{bridge}/v1/chat/completions"))
        .json(&chat_body(false))
        .send()
        .await
        .expect("request");
    assert_eq!(response.status(), 200);

    let body: Value = response.json().await.expect("json body");
    assert_eq!(body["object"], "chat.completion");
    assert!(body["id"]
        .as_str()
        .expect("id string")
        .starts_with("chatcmpl-"));
    assert_eq!(body["model"], "answer-1");
    assert_eq!(body["choices"][0]["message"]["role"], "assistant");
    assert_eq!(body["choices"][0]["message"]["content"], "Hello world");
    assert_eq!(body["choices"][0]["finish_reason"], "stop");
    assert_eq!(body["usage"]["prompt_tokens"], 3);
    assert_eq!(body["usage"]["completion_tokens"], 2);
    assert_eq!(body["usage"]["total_tokens"], 5);
}

#[tokio::test]
async fn streaming_request_relays_json_sse_upstream() {
    let upstream = serve(Router::new().route("/api/chat", post(|| async { JSON_SSE_BODY }))).await;
    let bridge = spawn_bridge(upstream, WireFormat::JsonSse, vec![]).await;

    let response = reqwest::Client::new()
        .post(format!("http://{bridge}/v1/chat/completions"))
        .json(&chat_body(true))
        .send()
        .await
        .expect("request");
    assert_eq!(response.status(), 200);
    assert_eq!(
        response
            .headers()
            .get(http::header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok()),
        Some("text/event-stream")
    );

    let text = response.text().await.expect("body");
    let frames: Vec<&str> = text.split_inclusive("\n\n").collect();
    assert_eq!(frames.len(), 4, "unexpected frames: {text}");

    let role: Value =
        serde_json::from_str(frames[0].trim_start_matches("data: ").trim()).expect("role chunk");
    assert_eq!(role["object"], "chat.completion.chunk");
    assert_eq!(role["choices"][0]["delta"]["role"], "assistant");

    let content: Value =
        serde_json::from_str(frames[1].trim_start_matches("data: ").trim()).expect("content chunk");
    assert_eq!(content["choices"][0]["delta"]["content"], "Hi");

    let finish: Value =
        serde_json::from_str(frames[2].trim_start_matches("data: ").trim()).expect("finish chunk");
    assert_eq!(finish["choices"][0]["finish_reason"], "stop");

    assert_eq!(frames[3], "data: [DONE]\n\n");
}

#[tokio::test]
async fn streaming_without_upstream_finish_still_terminates_once() {
    let upstream = serve(Router::new().route(
        "/api/chat",
        post(|| async { "data: {\"choices\":[{\"delta\":{\"content\":\"only\"}}]}\n\n" }),
    ))
    .await;
    let bridge = spawn_bridge(upstream, WireFormat::JsonSse, vec![]).await;

    let text = reqwest::Client::new()
        .post(format!("http://{bridge}/v1/chat/completions"))
        .json(&chat_body(true))
        .send()
        .await
        .expect("request")
        .text()
        .await
        .expect("body");

    assert!(text.ends_with("data: [DONE]\n\n"));
    assert_eq!(text.matches("data: [DONE]").count(), 1);
}

#[tokio::test]
async fn upstream_request_carries_camel_case_body_and_pool_credential() {
    let captured: Arc<Mutex<Option<(String, Value)>>> = Arc::new(Mutex::new(None));
    let sink = Arc::clone(&captured);

    let upstream = serve(Router::new().route(
        "/api/chat",
        post(move |headers: http::HeaderMap, body: Bytes| {
            let sink = Arc::clone(&sink);
            async move {
                let auth = headers
                    .get(http::header::AUTHORIZATION)
                    .and_then(|value| value.to_str().ok())
                    .unwrap_or("")
                    .to_string();
                let json: Value = serde_json::from_slice(&body).expect("upstream body json");
                *sink.lock().expect("lock") = Some((auth, json));
                TOKEN_LINE_BODY
            }
        }),
    ))
    .await;
    let bridge = spawn_bridge(upstream, WireFormat::TokenLine, vec![]).await;

    let request = json!({
        "model": "answer-1",
        "messages": [{ "role": "user", "content": "hi" }],
        "stream": false,
        "temperature": 0.5,
        "max_tokens": 64,
    });
    reqwest::Client::new()
        .post(format!("http://{bridge}/v1/chat/completions"))
        .json(&request)
        .send()
        .await
        .expect("request");

    let (auth, body) = captured.lock().expect("lock").clone().expect("captured");
    assert_eq!(auth, "Bearer sk-upstream");
    assert_eq!(body["model"], "answer-1");
    // The upstream call always streams, whatever the public caller asked for.
    assert_eq!(body["stream"], true);
    assert_eq!(body["maxTokens"], 64);
    assert_eq!(body["temperature"], 0.5);
    assert!(body.get("max_tokens").is_none());
}

#[tokio::test]
async fn client_without_valid_key_is_rejected() {
    let upstream = serve(Router::new().route("/api/chat", post(|| async { TOKEN_LINE_BODY }))).await;
    let bridge = spawn_bridge(
        upstream,
        WireFormat::TokenLine,
        vec!["client-key".to_string()],
    )
    .await;

    let response = reqwest::Client::new()
        .post(format!("http://{bridge}/v1/chat/completions"))
        .bearer_auth("wrong-key")
        .json(&chat_body(false))
        .send()
        .await
        .expect("request");
    assert_eq!(response.status(), 401);

    let body: Value = response.json().await.expect("json body");
    assert_eq!(body["error"]["type"], "authentication_error");
}

#[tokio::test]
async fn upstream_error_status_is_mapped_to_public_error_shape() {
    let upstream = serve(Router::new().route(
        "/api/chat",
        post(|| async {
            (
                http::StatusCode::TOO_MANY_REQUESTS,
                axum::Json(json!({ "error": { "message": "slow down" } })),
            )
        }),
    ))
    .await;
    let bridge = spawn_bridge(upstream, WireFormat::TokenLine, vec![]).await;

    let response = reqwest::Client::new()
        .post(format!("http://{bridge}/v1/chat/completions"))
        .json(&chat_body(false))
        .send()
        .await
        .expect("request");
    assert_eq!(response.status(), 429);

    let body: Value = response.json().await.expect("json body");
    assert_eq!(body["error"]["type"], "rate_limit_error");
    assert!(body["error"]["message"]
        .as_str()
        .expect("message")
        .contains("slow down"));
}

#[tokio::test]
async fn malformed_request_body_is_a_400() {
    let upstream = serve(Router::new().route("/api/chat", post(|| async { TOKEN_LINE_BODY }))).await;
    let bridge = spawn_bridge(upstream, WireFormat::TokenLine, vec![]).await;

    let response = reqwest::Client::new()
        .post(format!("http://{bridge}/v1/chat/completions"))
        .header(http::header::CONTENT_TYPE, "application/json")
        .body("{not json")
        .send()
        .await
        .expect("request");
    assert_eq!(response.status(), 400);
}

fn failing_body_upstream() -> Router {
    Router::new().route(
        "/api/chat",
        post(|| async {
            let chunks: Vec<Result<Bytes, std::io::Error>> = vec![
                Ok(Bytes::from_static(b"0:\"partial\"\n")),
                Err(std::io::Error::other("mid-stream failure")),
            ];
            axum::body::Body::from_stream(futures_util::stream::iter(chunks))
        }),
    )
}

#[tokio::test]
async fn mid_stream_transport_failure_yields_error_flavored_completion() {
    let upstream = serve(failing_body_upstream()).await;
    let bridge = spawn_bridge(upstream, WireFormat::TokenLine, vec![]).await;

    let response = reqwest::Client::new()
        .post(format!("http://{bridge}/v1/chat/completions"))
        .json(&chat_body(false))
        .send()
        .await
        .expect("request");
    // The aggregate path always answers with a well-formed completion.
    assert_eq!(response.status(), 200);

    let body: Value = response.json().await.expect("json body");
    assert_eq!(body["choices"][0]["finish_reason"], "error");
    assert!(body["choices"][0]["message"]["content"]
        .as_str()
        .expect("content")
        .contains("Upstream stream failed"));
}

#[tokio::test]
async fn mid_stream_transport_failure_still_closes_the_relay() {
    let upstream = serve(failing_body_upstream()).await;
    let bridge = spawn_bridge(upstream, WireFormat::TokenLine, vec![]).await;

    let text = reqwest::Client::new()
        .post(format!("http://{bridge}/v1/chat/completions"))
        .json(&chat_body(true))
        .send()
        .await
        .expect("request")
        .text()
        .await
        .expect("body");

    assert!(text.contains("\"content\":\"partial\""));
    assert!(text.contains("\"error\""));
    assert!(text.ends_with("data: [DONE]\n\n"));
    assert_eq!(text.matches("data: [DONE]").count(), 1);
}

#[tokio::test]
async fn models_endpoint_lists_configured_models() {
    let upstream = serve(Router::new()).await;
    let bridge = spawn_bridge(upstream, WireFormat::JsonSse, vec![]).await;

    let body: Value = reqwest::Client::new()
        .get(format!("http://{bridge}/v1/models"))
        .send()
        .await
        .expect("request")
        .json()
        .await
        .expect("json body");

    assert_eq!(body["object"], "list");
    assert_eq!(body["data"][0]["id"], "answer-1");
}
