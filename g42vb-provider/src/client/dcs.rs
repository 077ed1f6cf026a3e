//! Distributed Cache Service (DCS) client

use async_trait::async_trait;
use serde::Deserialize;

use super::ServiceClient;
use crate::error::ApiError;

/// Availability zone as seen by DCS
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DcsAvailabilityZone {
    pub id: String,
    pub code: String,
    pub name: String,
    pub port: String,
    #[serde(default)]
    pub resource_availability: String,
}

#[derive(Deserialize)]
struct ZoneList {
    #[serde(default)]
    available_zones: Vec<DcsAvailabilityZone>,
}

/// DCS operations the data sources depend on
#[async_trait]
pub trait DcsApi: Send + Sync {
    async fn list_availability_zones(&self) -> Result<Vec<DcsAvailabilityZone>, ApiError>;
}

/// DCS client
#[derive(Clone, Debug)]
pub struct DcsClient {
    client: ServiceClient,
}

impl DcsClient {
    pub fn new(client: ServiceClient) -> Self {
        Self { client }
    }

    pub fn service_client(&self) -> &ServiceClient {
        &self.client
    }
}

#[async_trait]
impl DcsApi for DcsClient {
    async fn list_availability_zones(&self) -> Result<Vec<DcsAvailabilityZone>, ApiError> {
        let list: ZoneList = self.client.get("availableZones").await?;
        Ok(list.available_zones)
    }
}
