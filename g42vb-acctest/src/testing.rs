//! In-memory API doubles so the harness can drive the real provider in unit tests

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use g42vb_provider::ApiError;
use g42vb_provider::client::{
    AddressKind, AddressRecord, AvailabilityZone, ComputeApi, DcsApi, DcsAvailabilityZone, Server,
};

#[derive(Default)]
pub struct MemoryCompute {
    servers: Mutex<HashMap<String, Server>>,
    zones: Vec<AvailabilityZone>,
}

impl MemoryCompute {
    pub fn with(server: Server) -> Self {
        let compute = Self::default();
        compute.insert(server);
        compute
    }

    pub fn with_zones(mut self, zones: &[(&str, bool)]) -> Self {
        self.zones = zones
            .iter()
            .map(|(name, available)| AvailabilityZone {
                name: name.to_string(),
                available: *available,
            })
            .collect();
        self
    }

    pub fn insert(&self, server: Server) {
        self.servers
            .lock()
            .unwrap()
            .insert(server.id.clone(), server);
    }

    pub fn remove(&self, id: &str) {
        self.servers.lock().unwrap().remove(id);
    }

    /// Server with one fixed address per `(network, address)` pair
    pub fn server(id: &str, networks: &[(&str, &str)]) -> Server {
        Server {
            id: id.to_string(),
            status: "ACTIVE".to_string(),
            addresses: networks
                .iter()
                .map(|(network, fixed)| {
                    (
                        network.to_string(),
                        vec![AddressRecord::new(AddressKind::Fixed, *fixed)],
                    )
                })
                .collect(),
            ..Default::default()
        }
    }
}

#[async_trait]
impl ComputeApi for MemoryCompute {
    async fn get_server(&self, server_id: &str) -> Result<Server, ApiError> {
        self.servers
            .lock()
            .unwrap()
            .get(server_id)
            .cloned()
            .ok_or_else(|| ApiError::NotFound(format!("server {}", server_id)))
    }

    async fn associate_floating_ip(
        &self,
        server_id: &str,
        floating_ip: &str,
        fixed_ip: Option<&str>,
    ) -> Result<(), ApiError> {
        let mut servers = self.servers.lock().unwrap();
        let server = servers
            .get_mut(server_id)
            .ok_or_else(|| ApiError::NotFound(format!("server {}", server_id)))?;

        let network = server
            .addresses
            .iter()
            .find(|(_, records)| {
                fixed_ip.is_none_or(|fixed| {
                    records
                        .iter()
                        .any(|r| r.kind == AddressKind::Fixed && r.address == fixed)
                })
            })
            .map(|(network, _)| network.clone())
            .ok_or_else(|| ApiError::Rejected {
                status: 400,
                code: None,
                message: "fixed address not found on server".to_string(),
            })?;
        if let Some(records) = server.addresses.get_mut(&network) {
            records.push(AddressRecord::new(AddressKind::Floating, floating_ip));
        }
        Ok(())
    }

    async fn disassociate_floating_ip(
        &self,
        server_id: &str,
        floating_ip: &str,
    ) -> Result<(), ApiError> {
        let mut servers = self.servers.lock().unwrap();
        let server = servers
            .get_mut(server_id)
            .ok_or_else(|| ApiError::NotFound(format!("server {}", server_id)))?;

        let mut removed = false;
        for records in server.addresses.values_mut() {
            let before = records.len();
            records.retain(|r| !(r.kind == AddressKind::Floating && r.address == floating_ip));
            removed |= records.len() != before;
        }
        if removed {
            Ok(())
        } else {
            Err(ApiError::Rejected {
                status: 409,
                code: None,
                message: format!(
                    "Floating IP {} is not associated with instance {}",
                    floating_ip, server_id
                ),
            })
        }
    }

    async fn list_availability_zones(&self) -> Result<Vec<AvailabilityZone>, ApiError> {
        Ok(self.zones.clone())
    }
}

#[derive(Default)]
pub struct MemoryDcs {
    zones: Vec<DcsAvailabilityZone>,
}

impl MemoryDcs {
    pub fn with_zone(mut self, id: &str, code: &str, name: &str, port: &str) -> Self {
        self.zones.push(DcsAvailabilityZone {
            id: id.to_string(),
            code: code.to_string(),
            name: name.to_string(),
            port: port.to_string(),
            resource_availability: "true".to_string(),
        });
        self
    }
}

#[async_trait]
impl DcsApi for MemoryDcs {
    async fn list_availability_zones(&self) -> Result<Vec<DcsAvailabilityZone>, ApiError> {
        Ok(self.zones.clone())
    }
}
