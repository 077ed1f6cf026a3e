//! Provider error types

use g42vb_core::provider::{ErrorKind, ProviderError};
use thiserror::Error;

/// Errors returned by the REST API client
#[derive(Error, Debug)]
pub enum ApiError {
    /// The API answered 404 for the requested object
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// The API answered with any other non-success status
    #[error("API error: {status} - {message}")]
    Rejected {
        status: u16,
        code: Option<String>,
        message: String,
    },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Failed to decode response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Invalid request URL: {0}")]
    Url(String),

    #[error("Timed out after {0} seconds waiting for {1}")]
    Timeout(u64, String),
}

impl ApiError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, ApiError::NotFound(_))
    }

    /// Whether the upstream message says the floating IP is not bound
    /// to the server, which disassociation treats like a 404
    pub fn is_not_associated(&self) -> bool {
        match self {
            ApiError::Rejected {
                status: 400 | 409,
                message,
                ..
            } => message.to_lowercase().contains("not associated"),
            _ => false,
        }
    }

    /// Wrap into a ProviderError, adding the operation as context
    pub fn into_provider_error(self, operation: &str) -> ProviderError {
        let kind = match &self {
            ApiError::NotFound(_) => ErrorKind::RemoteNotFound,
            ApiError::Rejected { .. } => ErrorKind::RemoteRejected,
            _ => ErrorKind::Internal,
        };
        ProviderError::new(format!("{}: {}", operation, self))
            .with_kind(kind)
            .with_cause(self)
    }
}

/// Errors raised while validating provider configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("region is required (set `region` or G42VB_REGION_NAME)")]
    MissingRegion,

    #[error(
        "credentials are required: set `access_key` and `secret_key`, or `token` (G42VB_ACCESS_KEY/G42VB_SECRET_KEY or G42VB_AUTH_TOKEN)"
    )]
    MissingCredentials,

    #[error("`access_key` and `secret_key` must be set together")]
    PartialAccessKey,

    #[error("unknown service '{0}' in endpoints")]
    UnknownService(String),

    #[error("invalid endpoint for {service}: {url}")]
    InvalidEndpoint { service: String, url: String },

    #[error("no project named '{0}' is visible to these credentials")]
    ProjectNotFound(String),

    #[error("failed to build HTTP client: {0}")]
    HttpClient(#[from] reqwest::Error),

    #[error("failed to resolve project: {0}")]
    ProjectLookup(#[source] ApiError),
}

impl From<ConfigError> for ProviderError {
    fn from(err: ConfigError) -> Self {
        ProviderError::configuration(err.to_string()).with_cause(err)
    }
}
