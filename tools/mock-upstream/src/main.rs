//! Standalone mock of the upstream chat provider, for manual end-to-end
//! testing of the bridge. Speaks both stream envelopes.
//!
//! Environment:
//! - `MOCK_PORT`: listen port (default 19001)
//! - `MOCK_WIRE_FORMAT`: `token_line` or `json_sse` (default `json_sse`)
//! - `MOCK_DELAY_MS`: pause between units, to make streaming visible

use std::convert::Infallible;
use std::env;
use std::time::Duration;

use axum::routing::post;
use axum::Router;
use bytes::Bytes;

const DEFAULT_PORT: u16 = 19_001;

#[derive(Copy, Clone)]
enum WireFormat {
    TokenLine,
    JsonSse,
}

fn answer_units(format: WireFormat) -> Vec<String> {
    let tokens = ["The", " quick", " brown", " fox", " jumps", " over", " the", " lazy", " dog", "."];
    match format {
        WireFormat::TokenLine => {
            let mut units: Vec<String> = tokens
                .iter()
                .map(|token| format!("0:\"{token}\"\n"))
                .collect();
            units.push(
                "e:{\"finishReason\":\"stop\",\"usage\":{\"promptTokens\":12,\"completionTokens\":10}}\n"
                    .to_string(),
            );
            units
        }
        WireFormat::JsonSse => {
            let mut units: Vec<String> = tokens
                .iter()
                .map(|token| {
                    format!("data: {{\"choices\":[{{\"delta\":{{\"content\":\"{token}\"}}}}]}}\n\n")
                })
                .collect();
            units.push(
                "data: {\"choices\":[{\"finish_reason\":\"stop\"}],\"usage\":{\"prompt_tokens\":12,\"completion_tokens\":10}}\n\n"
                    .to_string(),
            );
            units
        }
    }
}

async fn chat_handler(format: WireFormat, delay: Duration) -> axum::response::Response {
    let units = answer_units(format);
    let body_stream = futures_util::stream::unfold(
        (units.into_iter(), delay, false),
        |(mut units, delay, mut started)| async move {
            let unit = units.next()?;
            if started && !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            started = true;
            Some((
                Ok::<Bytes, Infallible>(Bytes::from(unit)),
                (units, delay, started),
            ))
        },
    );

    let mut response = axum::response::Response::new(axum::body::Body::from_stream(body_stream));
    let content_type = match format {
        WireFormat::TokenLine => "text/plain; charset=utf-8",
        WireFormat::JsonSse => "text/event-stream",
    };
    response.headers_mut().insert(
        http::header::CONTENT_TYPE,
        http::HeaderValue::from_static(content_type),
    );
    response
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let port = env::var("MOCK_PORT")
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(DEFAULT_PORT);
    let format = match env::var("MOCK_WIRE_FORMAT").as_deref() {
        Ok("token_line") => WireFormat::TokenLine,
        _ => WireFormat::JsonSse,
    };
    let delay = Duration::from_millis(
        env::var("MOCK_DELAY_MS")
            .ok()
            .and_then(|value| value.parse::<u64>().ok())
            .unwrap_or(0),
    );

    let app = Router::new().route(
        "/api/chat",
        post(move || chat_handler(format, delay)),
    );

    let listener = tokio::net::TcpListener::bind(("127.0.0.1", port))
        .await
        .expect("bind mock upstream port");
    println!("mock upstream listening on 127.0.0.1:{port}");
    axum::serve(listener, app).await.expect("serve");
}
