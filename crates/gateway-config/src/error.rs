use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error reading {0}: {1}")]
    IoError(PathBuf, #[source] std::io::Error),

    #[error("parse error: {0}")]
    ParseError(String),

    #[error("duplicate backend id: {0}")]
    DuplicateBackendId(String),

    #[error("invalid backend id '{0}': must match ^[A-Za-z][A-Za-z0-9_-]{{0,63}}$")]
    InvalidBackendId(String),

    #[error("invalid environment variable name '{0}' for backend '{1}'")]
    InvalidEnvVarName(String, String),

    #[error("environment variable '{0}' for backend '{1}' exceeds 10000 characters")]
    EnvVarTooLong(String, String),

    #[error("request_timeout_secs {0} for backend '{1}' out of bounds [{2}, {3}]")]
    RequestTimeoutOutOfBounds(u64, String, u64, u64),

    #[error("max_retries {0} for backend '{1}' exceeds maximum {2}")]
    MaxRetriesOutOfBounds(u32, String, u32),
}

pub type Result<T> = std::result::Result<T, ConfigError>;
