use std::sync::atomic::AtomicU64;

use bytes::Bytes;

use crate::auth::{authenticate, AllowedClientKeys};
use crate::config::AppConfig;
use crate::error::BridgeError;
use crate::transport::HttpTransport;
use crate::util::{next_generated_id, unix_now_secs};

/// Shared application state accessible to all handlers.
pub struct AppState {
    pub config: AppConfig,
    pub transport: HttpTransport,
    allowed_client_keys: AllowedClientKeys,
    models_response_body: Bytes,
    chat_url: String,
    response_ids: AtomicU64,
}

impl AppState {
    #[must_use]
    pub fn new(
        config: AppConfig,
        transport: HttpTransport,
        allowed_client_keys: AllowedClientKeys,
    ) -> Self {
        let models_response_body = build_models_response_body(&config);
        let chat_url = format!(
            "{}{}",
            config.upstream.base_url.trim_end_matches('/'),
            config.upstream.chat_path
        );
        Self {
            config,
            transport,
            allowed_client_keys,
            models_response_body,
            chat_url,
            // Seeded from startup time so ids differ across restarts.
            response_ids: AtomicU64::new(unix_now_secs() << 20),
        }
    }

    /// Authenticate an inbound request using the prebuilt key index.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Auth`] when the API key is missing or invalid.
    pub fn authenticate(&self, headers: &http::HeaderMap) -> Result<(), BridgeError> {
        authenticate(headers, &self.allowed_client_keys)
    }

    /// Generate a fresh public response identifier.
    #[must_use]
    pub fn next_response_id(&self) -> String {
        next_generated_id("chatcmpl", &self.response_ids)
    }

    /// Pick one upstream credential, uniformly at random, from the pool.
    #[must_use]
    pub fn pick_upstream_key(&self) -> &str {
        let keys = &self.config.upstream.api_keys;
        &keys[fastrand::usize(..keys.len())]
    }

    /// The resolved upstream chat endpoint URL.
    #[must_use]
    pub fn chat_url(&self) -> &str {
        &self.chat_url
    }

    /// The prebuilt public model-listing body.
    #[must_use]
    pub fn models_response_body(&self) -> Bytes {
        self.models_response_body.clone()
    }
}

fn build_models_response_body(config: &AppConfig) -> Bytes {
    let created = unix_now_secs();
    let data: Vec<serde_json::Value> = config
        .upstream
        .models
        .iter()
        .map(|model| {
            serde_json::json!({
                "id": model,
                "object": "model",
                "created": created,
                "owned_by": "upstream",
            })
        })
        .collect();
    let body = serde_json::json!({ "object": "list", "data": data });
    Bytes::from(body.to_string())
}
