//! Infrastructure the tests attach associations to
//!
//! The elastic IP and the compute instance are built straight through the API
//! clients, outside the provider, and torn down after the test case whatever
//! its outcome.

use std::time::Duration;

use g42vb_provider::client::{
    AddressKind, ComputeApi, ComputeClient, CreatePublicIpRequest, CreateServerRequest,
    NetworkRef, SecurityGroupRef, VpcClient,
};

use crate::env::ComputeEnv;
use crate::error::HarnessError;

const SERVER_TIMEOUT: Duration = Duration::from_secs(600);
const BANDWIDTH_SIZE: u32 = 8;

/// An allocated elastic IP
#[derive(Debug, Clone, PartialEq)]
pub struct EipFixture {
    pub id: String,
    pub address: String,
}

/// A running compute instance
#[derive(Debug, Clone, PartialEq)]
pub struct ServerFixture {
    pub id: String,
    pub name: String,
    /// Primary private address
    pub fixed_ip: String,
}

enum Created {
    Eip(EipFixture),
    Server(ServerFixture),
}

/// Tracks what was created so it can be released in reverse order
pub struct Fixtures {
    compute: ComputeClient,
    vpc: VpcClient,
    created: Vec<Created>,
}

impl Fixtures {
    pub fn new(compute: ComputeClient, vpc: VpcClient) -> Self {
        Self {
            compute,
            vpc,
            created: Vec::new(),
        }
    }

    pub async fn eip(&mut self, name: &str) -> Result<EipFixture, HarnessError> {
        let eip = self
            .vpc
            .create_public_ip(&CreatePublicIpRequest::bgp(name, BANDWIDTH_SIZE))
            .await?;
        log::info!("allocated EIP {} ({})", eip.address, eip.id);

        let fixture = EipFixture {
            id: eip.id,
            address: eip.address,
        };
        self.created.push(Created::Eip(fixture.clone()));
        Ok(fixture)
    }

    /// Boot an instance in the first available zone and wait for `ACTIVE`
    pub async fn server(
        &mut self,
        name: &str,
        env: &ComputeEnv,
    ) -> Result<ServerFixture, HarnessError> {
        let zones = self.compute.list_availability_zones().await?;
        let zone = zones
            .into_iter()
            .find(|z| z.available)
            .ok_or_else(|| HarnessError::InvalidConfig("no availability zone is available".into()))?;

        let request = CreateServerRequest {
            name: name.to_string(),
            image_ref: env.image_id.clone(),
            flavor_ref: env.flavor_id.clone(),
            availability_zone: zone.name,
            networks: vec![NetworkRef {
                uuid: env.network_id.clone(),
            }],
            security_groups: vec![SecurityGroupRef {
                name: "default".to_string(),
            }],
        };
        let id = self.compute.create_server(&request).await?;
        log::info!("created server {} ({})", name, id);

        // Tracked before waiting so a failed boot is still cleaned up
        let mut fixture = ServerFixture {
            id: id.clone(),
            name: name.to_string(),
            fixed_ip: String::new(),
        };
        self.created.push(Created::Server(fixture.clone()));

        self.compute
            .wait_for_server_status(&id, "ACTIVE", SERVER_TIMEOUT)
            .await?;

        let server = self.compute.get_server(&id).await?;
        fixture.fixed_ip = if server.access_ipv4.is_empty() {
            server
                .addresses
                .values()
                .flatten()
                .find(|r| r.kind == AddressKind::Fixed)
                .map(|r| r.address.clone())
                .unwrap_or_default()
        } else {
            server.access_ipv4
        };
        if fixture.fixed_ip.is_empty() {
            return Err(HarnessError::InvalidConfig(format!(
                "server {} has no fixed address",
                id
            )));
        }
        Ok(fixture)
    }

    /// Release everything in reverse creation order.
    ///
    /// Every fixture is attempted; the first failure is returned.
    pub async fn destroy_all(&mut self) -> Result<(), HarnessError> {
        let mut first_error = None;
        while let Some(created) = self.created.pop() {
            let result = match &created {
                Created::Server(server) => self.destroy_server(&server.id).await,
                Created::Eip(eip) => self.destroy_eip(&eip.id).await,
            };
            if let Err(e) = result {
                log::error!("fixture teardown failed: {}", e);
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    async fn destroy_server(&self, id: &str) -> Result<(), HarnessError> {
        match self.compute.delete_server(id).await {
            Ok(()) => {}
            Err(e) if e.is_not_found() => return Ok(()),
            Err(e) => return Err(e.into()),
        }
        self.compute
            .wait_for_server_status(id, "DELETED", SERVER_TIMEOUT)
            .await?;
        log::info!("deleted server {}", id);
        Ok(())
    }

    async fn destroy_eip(&self, id: &str) -> Result<(), HarnessError> {
        match self.vpc.delete_public_ip(id).await {
            Ok(()) => {
                log::info!("released EIP {}", id);
                Ok(())
            }
            Err(e) if e.is_not_found() => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
