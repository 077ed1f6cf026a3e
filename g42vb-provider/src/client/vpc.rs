//! VPC elastic IP client

use serde::{Deserialize, Serialize};

use super::{ServiceClient, path_segment};
use crate::error::ApiError;

/// An elastic (public) IP
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PublicIp {
    pub id: String,
    #[serde(default)]
    pub status: String,
    #[serde(rename = "public_ip_address", default)]
    pub address: String,
    #[serde(default)]
    pub port_id: Option<String>,
}

/// Request body for allocating an elastic IP
#[derive(Debug, Clone, Serialize)]
pub struct CreatePublicIpRequest {
    pub publicip: PublicIpSpec,
    pub bandwidth: BandwidthSpec,
}

#[derive(Debug, Clone, Serialize)]
pub struct PublicIpSpec {
    #[serde(rename = "type")]
    pub ip_type: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct BandwidthSpec {
    pub name: String,
    pub size: u32,
    pub share_type: String,
    pub charge_mode: String,
}

impl CreatePublicIpRequest {
    /// Dedicated BGP address with traffic-billed bandwidth
    pub fn bgp(bandwidth_name: impl Into<String>, size: u32) -> Self {
        Self {
            publicip: PublicIpSpec {
                ip_type: "5_bgp".to_string(),
            },
            bandwidth: BandwidthSpec {
                name: bandwidth_name.into(),
                size,
                share_type: "PER".to_string(),
                charge_mode: "traffic".to_string(),
            },
        }
    }
}

#[derive(Deserialize)]
struct PublicIpEnvelope {
    publicip: PublicIp,
}

/// VPC client
#[derive(Clone, Debug)]
pub struct VpcClient {
    client: ServiceClient,
}

impl VpcClient {
    pub fn new(client: ServiceClient) -> Self {
        Self { client }
    }

    pub fn service_client(&self) -> &ServiceClient {
        &self.client
    }

    pub async fn create_public_ip(
        &self,
        request: &CreatePublicIpRequest,
    ) -> Result<PublicIp, ApiError> {
        let envelope: PublicIpEnvelope = self.client.post("publicips", request).await?;
        Ok(envelope.publicip)
    }

    pub async fn get_public_ip(&self, id: &str) -> Result<PublicIp, ApiError> {
        let envelope: PublicIpEnvelope = self
            .client
            .get(&format!("publicips/{}", path_segment(id)?))
            .await?;
        Ok(envelope.publicip)
    }

    pub async fn delete_public_ip(&self, id: &str) -> Result<(), ApiError> {
        self.client
            .delete(&format!("publicips/{}", path_segment(id)?))
            .await
    }
}
