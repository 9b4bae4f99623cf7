use std::collections::HashSet;

use crate::config::AppConfig;
use crate::error::BridgeError;

/// Prebuilt index of accepted client keys. An empty set disables the check.
#[derive(Debug, Default)]
pub struct AllowedClientKeys {
    keys: HashSet<String>,
}

/// Build the allowed-key index from config at startup.
#[must_use]
pub fn build_allowed_key_set(config: &AppConfig) -> AllowedClientKeys {
    AllowedClientKeys {
        keys: config
            .client_authentication
            .allowed_keys
            .iter()
            .filter(|key| !key.is_empty())
            .cloned()
            .collect(),
    }
}

/// Authenticate an inbound request from its `Authorization: Bearer` header.
///
/// # Errors
///
/// Returns [`BridgeError::Auth`] when a key is required but missing or not in
/// the allow-list.
pub fn authenticate(
    headers: &http::HeaderMap,
    allowed: &AllowedClientKeys,
) -> Result<(), BridgeError> {
    if allowed.keys.is_empty() {
        return Ok(());
    }

    let presented = headers
        .get(http::header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .unwrap_or("");

    if presented.is_empty() {
        return Err(BridgeError::Auth("Missing API key".to_string()));
    }
    if !allowed.keys.contains(presented) {
        return Err(BridgeError::Auth("Invalid API key".to_string()));
    }
    Ok(())
}
