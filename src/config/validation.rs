use super::{AppConfig, ConfigError};

/// Validate a parsed configuration before the server starts.
///
/// # Errors
///
/// Returns [`ConfigError::Validation`] describing the first problem found.
pub fn validate_config(config: &AppConfig) -> Result<(), ConfigError> {
    let upstream = &config.upstream;

    if upstream.base_url.trim().is_empty() {
        return Err(ConfigError::Validation(
            "upstream.base_url must not be empty".to_string(),
        ));
    }
    let parsed = url::Url::parse(&upstream.base_url).map_err(|e| {
        ConfigError::Validation(format!(
            "upstream.base_url '{}' is not a valid URL: {e}",
            upstream.base_url
        ))
    })?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(ConfigError::Validation(format!(
            "upstream.base_url scheme must be http or https, got '{}'",
            parsed.scheme()
        )));
    }

    if upstream.api_keys.is_empty() {
        return Err(ConfigError::Validation(
            "upstream.api_keys must contain at least one key".to_string(),
        ));
    }
    if upstream.api_keys.iter().any(|key| key.trim().is_empty()) {
        return Err(ConfigError::Validation(
            "upstream.api_keys must not contain empty keys".to_string(),
        ));
    }

    if !upstream.chat_path.starts_with('/') {
        return Err(ConfigError::Validation(format!(
            "upstream.chat_path must start with '/', got '{}'",
            upstream.chat_path
        )));
    }

    if config.server.timeout == 0 {
        return Err(ConfigError::Validation(
            "server.timeout must be greater than zero".to_string(),
        ));
    }

    Ok(())
}
