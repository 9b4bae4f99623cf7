use std::sync::Arc;

use axum::extract::State;
use axum::response::{IntoResponse, Response};
use http::HeaderMap;

use crate::state::AppState;

/// `GET /v1/models` lists the configured models in public list shape.
pub async fn handler(State(state): State<Arc<AppState>>, headers: HeaderMap) -> Response {
    if let Err(err) = state.authenticate(&headers) {
        return err.into_response();
    }

    (
        http::StatusCode::OK,
        [(
            http::header::CONTENT_TYPE,
            http::HeaderValue::from_static("application/json"),
        )],
        axum::body::Body::from(state.models_response_body()),
    )
        .into_response()
}
