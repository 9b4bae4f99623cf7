mod chat;
mod health;
mod models;

use std::sync::Arc;

use axum::routing::{get, post};

use crate::state::AppState;

/// Build the public router.
#[must_use]
pub fn router(state: Arc<AppState>) -> axum::Router {
    axum::Router::new()
        .route("/v1/chat/completions", post(chat::handler))
        .route("/v1/models", get(models::handler))
        .route("/health", get(health::handler))
        .with_state(state)
}
