//! Harness error type

use g42vb_core::provider::ProviderError;
use g42vb_provider::{ApiError, ConfigError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum HarnessError {
    #[error("{0} must be set for acceptance tests")]
    MissingEnv(&'static str),

    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("API error: {0}")]
    Api(#[from] ApiError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid test configuration: {0}")]
    InvalidConfig(String),

    #[error("Cannot resolve reference '{0}'")]
    UnresolvedReference(String),

    #[error("Check failed: {0}")]
    CheckFailed(String),

    #[error("{address}: imported attribute '{attribute}' is {got}, expected {expected}")]
    ImportMismatch {
        address: String,
        attribute: String,
        expected: String,
        got: String,
    },
}

impl HarnessError {
    pub fn check(message: impl Into<String>) -> Self {
        HarnessError::CheckFailed(message.into())
    }
}
