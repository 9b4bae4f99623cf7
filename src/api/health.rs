use std::sync::Arc;

use axum::extract::State;
use axum::response::Json;
use serde_json::{json, Value};

use crate::state::AppState;

/// Health check handler. Returns JSON with status and a config summary.
pub async fn handler(State(state): State<Arc<AppState>>) -> Json<Value> {
    let config = &state.config;
    Json(json!({
        "status": "chatbridge is running",
        "config": {
            "upstream_wire_format": config.upstream.wire_format.to_string(),
            "upstream_models_count": config.upstream.models.len(),
            "upstream_key_pool_size": config.upstream.api_keys.len(),
            "client_keys_count": config.client_authentication.allowed_keys.len(),
            "log_level": config.features.log_level,
        }
    }))
}
