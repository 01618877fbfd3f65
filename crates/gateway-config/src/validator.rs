use crate::types::{
    BackendConfig, GatewayConfig, TransportConfig, MAX_MAX_RETRIES, MAX_REQUEST_TIMEOUT_SECS,
    MIN_REQUEST_TIMEOUT_SECS,
};
use crate::{ConfigError, Result};
use std::collections::HashSet;

/// Backend identifiers are letter-led, alphanumeric/underscore/hyphen, max 64 chars.
/// `__` and `://` are reserved by the router's namespacing scheme and can never appear
/// in an identifier matching this pattern, so no extra check is needed for them.
fn is_valid_backend_id(id: &str) -> bool {
    if id.is_empty() || id.len() > 64 {
        return false;
    }
    let mut chars = id.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

fn is_valid_env_var_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Validate the whole gateway configuration at admission time. No part of this runs
/// again later: there is no hot-reload or file watching in this crate.
pub fn validate_config(config: &GatewayConfig) -> Result<()> {
    let mut seen = HashSet::new();
    for backend in &config.backends {
        validate_backend(backend)?;
        if !seen.insert(backend.id.clone()) {
            return Err(ConfigError::DuplicateBackendId(backend.id.clone()));
        }
    }
    Ok(())
}

pub fn validate_backend(backend: &BackendConfig) -> Result<()> {
    if !is_valid_backend_id(&backend.id) {
        return Err(ConfigError::InvalidBackendId(backend.id.clone()));
    }

    if backend.request_timeout_secs < MIN_REQUEST_TIMEOUT_SECS
        || backend.request_timeout_secs > MAX_REQUEST_TIMEOUT_SECS
    {
        return Err(ConfigError::RequestTimeoutOutOfBounds(
            backend.request_timeout_secs,
            backend.id.clone(),
            MIN_REQUEST_TIMEOUT_SECS,
            MAX_REQUEST_TIMEOUT_SECS,
        ));
    }

    if backend.max_retries > MAX_MAX_RETRIES {
        return Err(ConfigError::MaxRetriesOutOfBounds(
            backend.max_retries,
            backend.id.clone(),
            MAX_MAX_RETRIES,
        ));
    }

    if let TransportConfig::ChildProcess { env, .. } = &backend.transport {
        for (key, value) in env {
            if !is_valid_env_var_name(key) {
                return Err(ConfigError::InvalidEnvVarName(
                    key.clone(),
                    backend.id.clone(),
                ));
            }
            if value.len() > 10_000 {
                return Err(ConfigError::EnvVarTooLong(key.clone(), backend.id.clone()));
            }
        }
    }

    Ok(())
}
