use thiserror::Error;

use crate::sanitize::InvalidRelationType;

/// Top-level error type for kgraph domain validation and configuration.
#[derive(Error, Debug)]
pub enum KgError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error(transparent)]
    InvalidRelationType(#[from] InvalidRelationType),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<config::ConfigError> for KgError {
    fn from(e: config::ConfigError) -> Self {
        Self::Config(e.to_string())
    }
}
