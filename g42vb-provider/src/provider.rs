//! g42vbcloud provider implementation
//!
//! Holds the configured clients and dispatches each operation to the handler
//! for the resource or data source type.

use std::sync::Arc;

use g42vb_core::provider::{ProviderError, ProviderResult};
use g42vb_core::resource::{Resource, ResourceId, State};

use crate::client::{ComputeApi, DcsApi};
use crate::config::{Config, ProviderSettings};
use crate::error::ConfigError;
use crate::resources::{
    AVAILABILITY_ZONES, AvailabilityZonesDataSource, DCS_AZ, DcsAzDataSource, EIP_ASSOCIATE,
    EipAssociateHandler, schema_for, validate_resource,
};

/// g42vbcloud provider
pub struct G42vbProvider {
    config: Option<Arc<Config>>,
    compute: Arc<dyn ComputeApi>,
    dcs: Arc<dyn DcsApi>,
}

impl G42vbProvider {
    /// Validate settings and build clients for the configured region
    pub async fn configure(settings: &ProviderSettings) -> Result<Self, ConfigError> {
        let config = Arc::new(Config::build(settings).await?);
        let region = config.region();
        let compute = Arc::new(config.compute_client(region)?);
        let dcs = Arc::new(config.dcs_client(region)?);
        Ok(Self {
            config: Some(config),
            compute,
            dcs,
        })
    }

    /// Provider over arbitrary API implementations
    pub fn with_clients(compute: Arc<dyn ComputeApi>, dcs: Arc<dyn DcsApi>) -> Self {
        Self {
            config: None,
            compute,
            dcs,
        }
    }

    pub fn config(&self) -> Option<&Config> {
        self.config.as_deref()
    }

    /// Check attributes against the type's schema
    pub fn validate_resource(&self, resource: &Resource) -> ProviderResult<()> {
        validate_resource(resource)
    }

    fn eip_associate(&self) -> EipAssociateHandler {
        EipAssociateHandler::new(self.compute.clone())
    }

    // =========================================================================
    // Resource Operations
    // =========================================================================

    pub async fn read_resource(
        &self,
        id: &ResourceId,
        identifier: Option<&str>,
    ) -> ProviderResult<State> {
        match id.resource_type.as_str() {
            EIP_ASSOCIATE => self.eip_associate().read(id, identifier).await,
            _ => Err(unknown_type(id)),
        }
    }

    pub async fn create_resource(&self, resource: Resource) -> ProviderResult<State> {
        self.validate_resource(&resource)?;
        match resource.id.resource_type.as_str() {
            EIP_ASSOCIATE => self.eip_associate().create(&resource).await,
            _ => Err(unknown_type(&resource.id)),
        }
    }

    pub async fn update_resource(&self, id: &ResourceId) -> ProviderResult<State> {
        match id.resource_type.as_str() {
            EIP_ASSOCIATE => self.eip_associate().update(id),
            _ => Err(unknown_type(id)),
        }
    }

    pub async fn delete_resource(&self, id: &ResourceId, identifier: &str) -> ProviderResult<()> {
        match id.resource_type.as_str() {
            EIP_ASSOCIATE => self.eip_associate().delete(id, identifier).await,
            _ => Err(unknown_type(id)),
        }
    }

    pub async fn import_resource(&self, id: &ResourceId, import_id: &str) -> ProviderResult<State> {
        match id.resource_type.as_str() {
            EIP_ASSOCIATE => self.eip_associate().import(id, import_id).await,
            _ => Err(unknown_type(id)),
        }
    }

    pub async fn read_data_source_by_type(&self, resource: &Resource) -> ProviderResult<State> {
        let mut resource = resource.clone();
        if let Some(schema) = schema_for(&resource.id.resource_type) {
            schema.apply_defaults(&mut resource.attributes);
        }
        match resource.id.resource_type.as_str() {
            AVAILABILITY_ZONES => {
                AvailabilityZonesDataSource::new(self.compute.clone())
                    .read(&resource)
                    .await
            }
            DCS_AZ => DcsAzDataSource::new(self.dcs.clone()).read(&resource).await,
            _ => Err(ProviderError::unsupported(format!(
                "Unknown data source: {}",
                resource.id.resource_type
            ))
            .for_resource(resource.id.clone())),
        }
    }
}

fn unknown_type(id: &ResourceId) -> ProviderError {
    ProviderError::unsupported(format!("Unknown resource type: {}", id.resource_type))
        .for_resource(id.clone())
}
