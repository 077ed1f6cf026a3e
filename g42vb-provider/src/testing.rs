//! In-memory fakes of the API seams for handler tests

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::client::{
    AddressKind, AddressRecord, AvailabilityZone, ComputeApi, DcsApi, DcsAvailabilityZone, Server,
};
use crate::error::ApiError;

/// Compute fake holding servers by ID
#[derive(Default)]
pub struct FakeCompute {
    pub servers: Mutex<HashMap<String, Server>>,
    pub zones: Vec<AvailabilityZone>,
    /// Error returned by the next associate call
    pub associate_error: Mutex<Option<ApiError>>,
    /// Error returned by the next disassociate call
    pub disassociate_error: Mutex<Option<ApiError>>,
    /// Error returned by the next get_server call
    pub get_error: Mutex<Option<ApiError>>,
    pub calls: Mutex<Vec<String>>,
}

impl FakeCompute {
    pub fn with_server(self, id: &str, network: &str, fixed_ip: &str) -> Self {
        let server = Server {
            id: id.to_string(),
            name: format!("server-{}", id),
            status: "ACTIVE".to_string(),
            addresses: [(
                network.to_string(),
                vec![AddressRecord::new(AddressKind::Fixed, fixed_ip)],
            )]
            .into_iter()
            .collect(),
            ..Default::default()
        };
        self.servers
            .lock()
            .unwrap()
            .insert(id.to_string(), server);
        self
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

    pub fn fail_next_associate(&self, err: ApiError) {
        *self.associate_error.lock().unwrap() = Some(err);
    }

    pub fn fail_next_disassociate(&self, err: ApiError) {
        *self.disassociate_error.lock().unwrap() = Some(err);
    }

    pub fn fail_next_get(&self, err: ApiError) {
        *self.get_error.lock().unwrap() = Some(err);
    }

    pub fn remove_server(&self, id: &str) {
        self.servers.lock().unwrap().remove(id);
    }

    /// Drop every floating entry for `address` without going through the API
    pub fn detach_out_of_band(&self, address: &str) {
        for server in self.servers.lock().unwrap().values_mut() {
            for records in server.addresses.values_mut() {
                records.retain(|r| !(r.kind == AddressKind::Floating && r.address == address));
            }
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ComputeApi for FakeCompute {
    async fn get_server(&self, server_id: &str) -> Result<Server, ApiError> {
        self.calls.lock().unwrap().push(format!("get {}", server_id));
        if let Some(err) = self.get_error.lock().unwrap().take() {
            return Err(err);
        }
        self.servers
            .lock()
            .unwrap()
            .get(server_id)
            .cloned()
            .ok_or_else(|| ApiError::NotFound(format!("servers/{}", server_id)))
    }

    async fn associate_floating_ip(
        &self,
        server_id: &str,
        floating_ip: &str,
        fixed_ip: Option<&str>,
    ) -> Result<(), ApiError> {
        self.calls.lock().unwrap().push(format!(
            "associate {} {} {}",
            server_id,
            floating_ip,
            fixed_ip.unwrap_or("-")
        ));
        if let Some(err) = self.associate_error.lock().unwrap().take() {
            return Err(err);
        }

        let mut servers = self.servers.lock().unwrap();
        let server = servers
            .get_mut(server_id)
            .ok_or_else(|| ApiError::NotFound(format!("servers/{}", server_id)))?;
        let network = server
            .addresses
            .iter()
            .find(|(_, records)| {
                records.iter().any(|r| {
                    r.kind == AddressKind::Fixed && fixed_ip.is_none_or(|ip| ip == r.address)
                })
            })
            .map(|(network, _)| network.clone())
            .ok_or_else(|| ApiError::Rejected {
                status: 400,
                code: None,
                message: "No fixed address matches".to_string(),
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
        self.calls
            .lock()
            .unwrap()
            .push(format!("disassociate {} {}", server_id, floating_ip));
        if let Some(err) = self.disassociate_error.lock().unwrap().take() {
            return Err(err);
        }

        let mut servers = self.servers.lock().unwrap();
        let server = servers
            .get_mut(server_id)
            .ok_or_else(|| ApiError::NotFound(format!("servers/{}", server_id)))?;
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

/// DCS fake returning a fixed zone list
#[derive(Default)]
pub struct FakeDcs {
    pub zones: Vec<DcsAvailabilityZone>,
}

impl FakeDcs {
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
impl DcsApi for FakeDcs {
    async fn list_availability_zones(&self) -> Result<Vec<DcsAvailabilityZone>, ApiError> {
        Ok(self.zones.clone())
    }
}
