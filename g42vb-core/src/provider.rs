//! Provider - Trait abstracting resource operations
//!
//! A Provider maps the host's create/read/update/delete/import calls onto a
//! cloud API. Resource handlers never see the host protocol; they receive
//! `Resource` and `State` values and answer with `ProviderResult`s.

use std::future::Future;
use std::pin::Pin;

use crate::resource::{Resource, ResourceId, State};
use crate::schema::ResourceSchema;

/// Classification of provider failures, used by the host to decide how to
/// surface them
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Provider configuration is missing or malformed (region, credentials)
    ConfigurationInvalid,
    /// A composite identifier (usually an import string) could not be parsed
    MalformedIdentifier,
    /// The remote object does not exist
    RemoteNotFound,
    /// The remote API refused the request; the message is the upstream one
    RemoteRejected,
    /// The operation is not supported for this resource type
    Unsupported,
    /// Transport, decoding, or other unexpected failures
    Internal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::ConfigurationInvalid => "configuration_invalid",
            ErrorKind::MalformedIdentifier => "malformed_identifier",
            ErrorKind::RemoteNotFound => "remote_not_found",
            ErrorKind::RemoteRejected => "remote_rejected",
            ErrorKind::Unsupported => "unsupported",
            ErrorKind::Internal => "internal",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error type for Provider operations
#[derive(Debug)]
pub struct ProviderError {
    pub message: String,
    pub kind: ErrorKind,
    pub resource_id: Option<ResourceId>,
    pub cause: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl std::fmt::Display for ProviderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(ref id) = self.resource_id {
            write!(f, "[{}.{}] {}", id.resource_type, id.name, self.message)
        } else {
            write!(f, "{}", self.message)
        }
    }
}

impl std::error::Error for ProviderError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.cause
            .as_ref()
            .map(|e| e.as_ref() as &dyn std::error::Error)
    }
}

impl ProviderError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            kind: ErrorKind::Internal,
            resource_id: None,
            cause: None,
        }
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::new(message).with_kind(ErrorKind::ConfigurationInvalid)
    }

    pub fn unsupported(message: impl Into<String>) -> Self {
        Self::new(message).with_kind(ErrorKind::Unsupported)
    }

    pub fn with_kind(mut self, kind: ErrorKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn for_resource(mut self, id: ResourceId) -> Self {
        self.resource_id = Some(id);
        self
    }

    pub fn with_cause(mut self, cause: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.cause = Some(Box::new(cause));
        self
    }

    pub fn is_not_found(&self) -> bool {
        self.kind == ErrorKind::RemoteNotFound
    }
}

pub type ProviderResult<T> = Result<T, ProviderError>;

/// Return type for async operations
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Definition of resource or data source types that a Provider can handle
pub trait ResourceType: Send + Sync {
    /// Type name as used in configuration (e.g., "g42vbcloud_compute_eip_associate")
    fn name(&self) -> &'static str;

    /// Attribute schema for this type
    fn schema(&self) -> ResourceSchema {
        ResourceSchema::new(self.name())
    }
}

/// Main Provider trait
///
/// All operations are async and involve side effects on the remote system.
/// The host serializes operations on a single resource instance but may run
/// operations on different instances concurrently, so implementations must
/// only share immutable state.
pub trait Provider: Send + Sync {
    /// Name of this Provider (e.g., "g42vbcloud")
    fn name(&self) -> &'static str;

    /// List of resource types this Provider can manage
    fn resource_types(&self) -> Vec<Box<dyn ResourceType>>;

    /// List of data source types this Provider can read
    fn data_source_types(&self) -> Vec<Box<dyn ResourceType>> {
        Vec::new()
    }

    /// Get the current state of a resource
    ///
    /// Returns `State::not_found()` if the resource no longer exists, which
    /// tells the host to drop it from managed state.
    fn read(
        &self,
        id: &ResourceId,
        identifier: Option<&str>,
    ) -> BoxFuture<'_, ProviderResult<State>>;

    /// Create a resource
    ///
    /// Returns State with identifier set to the remote (or synthesized) ID
    fn create(&self, resource: &Resource) -> BoxFuture<'_, ProviderResult<State>>;

    /// Update a resource in place
    fn update(
        &self,
        id: &ResourceId,
        identifier: &str,
        from: &State,
        to: &Resource,
    ) -> BoxFuture<'_, ProviderResult<State>>;

    /// Delete a resource
    fn delete(&self, id: &ResourceId, identifier: &str) -> BoxFuture<'_, ProviderResult<()>>;

    /// Import an existing remote object given its external identifier
    ///
    /// The default reconstructs state with a plain read.
    fn import(&self, id: &ResourceId, import_id: &str) -> BoxFuture<'_, ProviderResult<State>> {
        self.read(id, Some(import_id))
    }

    /// Read a data source
    fn read_data_source(&self, resource: &Resource) -> BoxFuture<'_, ProviderResult<State>> {
        let id = resource.id.clone();
        Box::pin(async move {
            Err(
                ProviderError::unsupported(format!("Unknown data source: {}", id.resource_type))
                    .for_resource(id),
            )
        })
    }
}

/// Provider implementation for Box<dyn Provider>
/// This enables dynamic dispatch for Providers
impl Provider for Box<dyn Provider> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn resource_types(&self) -> Vec<Box<dyn ResourceType>> {
        (**self).resource_types()
    }

    fn data_source_types(&self) -> Vec<Box<dyn ResourceType>> {
        (**self).data_source_types()
    }

    fn read(
        &self,
        id: &ResourceId,
        identifier: Option<&str>,
    ) -> BoxFuture<'_, ProviderResult<State>> {
        (**self).read(id, identifier)
    }

    fn create(&self, resource: &Resource) -> BoxFuture<'_, ProviderResult<State>> {
        (**self).create(resource)
    }

    fn update(
        &self,
        id: &ResourceId,
        identifier: &str,
        from: &State,
        to: &Resource,
    ) -> BoxFuture<'_, ProviderResult<State>> {
        (**self).update(id, identifier, from, to)
    }

    fn delete(&self, id: &ResourceId, identifier: &str) -> BoxFuture<'_, ProviderResult<()>> {
        (**self).delete(id, identifier)
    }

    fn import(&self, id: &ResourceId, import_id: &str) -> BoxFuture<'_, ProviderResult<State>> {
        (**self).import(id, import_id)
    }

    fn read_data_source(&self, resource: &Resource) -> BoxFuture<'_, ProviderResult<State>> {
        (**self).read_data_source(resource)
    }
}
