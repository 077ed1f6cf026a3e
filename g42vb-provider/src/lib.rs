//! g42vbcloud provider
//!
//! Provider implementation for the g42vbcloud platform.
//!
//! ## Module Structure
//!
//! - `client` - Signed REST clients for the compute, VPC, DCS and IAM APIs
//! - `config` - Provider settings and the immutable `Config` built from them
//! - `resources` - Resource and data source types and their handlers
//! - `provider` - G42vbProvider implementation

pub mod client;
pub mod config;
pub mod error;
pub mod provider;
pub mod resources;

#[cfg(test)]
mod testing;

// Re-export main types
pub use config::{Config, ProviderSettings};
pub use error::{ApiError, ConfigError};
pub use provider::G42vbProvider;

use g42vb_core::provider::{BoxFuture, Provider, ProviderResult, ResourceType};
use g42vb_core::resource::{Resource, ResourceId, State};

use resources::{data_source_types, resource_types};

// =============================================================================
// Provider Trait Implementation
// =============================================================================

impl Provider for G42vbProvider {
    fn name(&self) -> &'static str {
        "g42vbcloud"
    }

    fn resource_types(&self) -> Vec<Box<dyn ResourceType>> {
        resource_types()
    }

    fn data_source_types(&self) -> Vec<Box<dyn ResourceType>> {
        data_source_types()
    }

    fn read(
        &self,
        id: &ResourceId,
        identifier: Option<&str>,
    ) -> BoxFuture<'_, ProviderResult<State>> {
        let id = id.clone();
        let identifier = identifier.map(|s| s.to_string());
        Box::pin(async move { self.read_resource(&id, identifier.as_deref()).await })
    }

    fn create(&self, resource: &Resource) -> BoxFuture<'_, ProviderResult<State>> {
        let resource = resource.clone();
        Box::pin(async move { self.create_resource(resource).await })
    }

    fn update(
        &self,
        id: &ResourceId,
        _identifier: &str,
        _from: &State,
        _to: &Resource,
    ) -> BoxFuture<'_, ProviderResult<State>> {
        let id = id.clone();
        Box::pin(async move { self.update_resource(&id).await })
    }

    fn delete(&self, id: &ResourceId, identifier: &str) -> BoxFuture<'_, ProviderResult<()>> {
        let id = id.clone();
        let identifier = identifier.to_string();
        Box::pin(async move { self.delete_resource(&id, &identifier).await })
    }

    fn import(&self, id: &ResourceId, import_id: &str) -> BoxFuture<'_, ProviderResult<State>> {
        let id = id.clone();
        let import_id = import_id.to_string();
        Box::pin(async move { self.import_resource(&id, &import_id).await })
    }

    fn read_data_source(&self, resource: &Resource) -> BoxFuture<'_, ProviderResult<State>> {
        let resource = resource.clone();
        Box::pin(async move { self.read_data_source_by_type(&resource).await })
    }
}
