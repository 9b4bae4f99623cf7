use std::time::Duration;

use crate::config::ServerConfig;
use crate::error::BridgeError;

/// HTTP transport for the upstream provider.
///
/// Owns one pooled client; each request borrows a connection for the full
/// lifetime of its response stream and never shares it.
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    /// Create a transport with connection pooling and timeouts from the
    /// server config.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Transport`] when the client cannot be built.
    pub fn new(config: &ServerConfig) -> Result<Self, BridgeError> {
        let pool_idle_timeout = if config.http_pool_idle_timeout_secs == 0 {
            None
        } else {
            Some(Duration::from_secs(config.http_pool_idle_timeout_secs))
        };

        let client = reqwest::Client::builder()
            .pool_max_idle_per_host(config.http_pool_max_idle_per_host.max(1))
            .pool_idle_timeout(pool_idle_timeout)
            .tcp_nodelay(true)
            .connect_timeout(Duration::from_secs(5))
            .redirect(reqwest::redirect::Policy::none())
            .timeout(Duration::from_secs(config.timeout))
            .build()
            .map_err(|e| BridgeError::Transport(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self { client })
    }

    /// POST a JSON body and return the response with its body unconsumed,
    /// so callers can stream it.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Transport`] on connection or send failure.
    pub async fn send_stream(
        &self,
        url: &str,
        bearer: &str,
        body: bytes::Bytes,
    ) -> Result<reqwest::Response, BridgeError> {
        self.client
            .post(url)
            .header(http::header::AUTHORIZATION, format!("Bearer {bearer}"))
            .header(http::header::CONTENT_TYPE, "application/json")
            .header(http::header::ACCEPT, "text/event-stream")
            .body(body)
            .send()
            .await
            .map_err(|e| BridgeError::Transport(format!("Upstream request failed: {e}")))
    }
}
