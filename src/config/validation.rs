//! Configuration validation.

use url::Url;

use super::{ConfigError, ServerConfig};

/// Run every check against a merged configuration.
pub(super) fn validate(config: &ServerConfig) -> Result<(), ConfigError> {
    validate_public_host(&config.public_host)?;
    validate_base_url(&config.openai_base_url)?;
    Ok(())
}

/// The public host is embedded into `wss://{host}/ws`, so it must be a bare
/// host name (optionally with port).
pub(super) fn validate_public_host(host: &str) -> Result<(), ConfigError> {
    let invalid = |reason: &str| ConfigError::Invalid {
        field: "public_host",
        reason: format!("'{host}': {reason}"),
    };

    if host.is_empty() {
        return Err(invalid("must not be empty"));
    }
    if host.contains("://") {
        return Err(invalid("must not include a scheme"));
    }
    if host.contains('/') {
        return Err(invalid("must not include a path"));
    }
    if host.chars().any(char::is_whitespace) {
        return Err(invalid("must not contain whitespace"));
    }
    Ok(())
}

pub(super) fn validate_base_url(base_url: &str) -> Result<(), ConfigError> {
    let url = Url::parse(base_url).map_err(|e| ConfigError::Invalid {
        field: "openai_base_url",
        reason: format!("'{base_url}': {e}"),
    })?;

    match url.scheme() {
        "http" | "https" => Ok(()),
        scheme => Err(ConfigError::Invalid {
            field: "openai_base_url",
            reason: format!("unsupported scheme '{scheme}'"),
        }),
    }
}
