//! Assertions run after each configuration step and after destroy

use std::sync::Arc;

use async_trait::async_trait;
use g42vb_core::identifier::AssociationId;
use g42vb_provider::client::{AddressKind, ComputeApi};
use g42vb_provider::resources::EIP_ASSOCIATE;

use crate::error::HarnessError;
use crate::state::StateFile;

#[async_trait]
pub trait Check: Send + Sync {
    async fn check(&self, state: &StateFile) -> Result<(), HarnessError>;
}

/// The attribute is present and non-empty
pub struct AttrSet {
    pub address: String,
    pub attribute: String,
}

pub fn attr_set(address: &str, attribute: &str) -> Box<dyn Check> {
    Box::new(AttrSet {
        address: address.to_string(),
        attribute: attribute.to_string(),
    })
}

#[async_trait]
impl Check for AttrSet {
    async fn check(&self, state: &StateFile) -> Result<(), HarnessError> {
        let entry = state
            .find(&self.address)
            .ok_or_else(|| HarnessError::check(format!("Not found: {}", self.address)))?;
        match entry.attribute_text(&self.attribute) {
            Some(value) if !value.is_empty() => Ok(()),
            _ => Err(HarnessError::check(format!(
                "{}: attribute '{}' expected to be set",
                self.address, self.attribute
            ))),
        }
    }
}

/// The attribute has exactly this value
pub struct AttrEquals {
    pub address: String,
    pub attribute: String,
    pub expected: String,
}

pub fn attr_equals(address: &str, attribute: &str, expected: &str) -> Box<dyn Check> {
    Box::new(AttrEquals {
        address: address.to_string(),
        attribute: attribute.to_string(),
        expected: expected.to_string(),
    })
}

#[async_trait]
impl Check for AttrEquals {
    async fn check(&self, state: &StateFile) -> Result<(), HarnessError> {
        let entry = state
            .find(&self.address)
            .ok_or_else(|| HarnessError::check(format!("Not found: {}", self.address)))?;
        let got = entry.attribute_text(&self.attribute);
        if got.as_deref() == Some(self.expected.as_str()) {
            Ok(())
        } else {
            Err(HarnessError::check(format!(
                "{}: attribute '{}' expected {:?}, got {:?}",
                self.address, self.attribute, self.expected, got
            )))
        }
    }
}

/// The entry has a non-empty identifier
pub fn id_set(address: &str) -> Box<dyn Check> {
    attr_set(address, "id")
}

fn association_of(state: &StateFile, address: &str) -> Result<AssociationId, HarnessError> {
    let entry = state
        .find(address)
        .ok_or_else(|| HarnessError::check(format!("Not found: {}", address)))?;
    let id = entry
        .id
        .as_deref()
        .ok_or_else(|| HarnessError::check(format!("{}: no ID is set", address)))?;
    Ok(id.parse()?)
}

/// The association's public IP shows up as a `floating` entry on the
/// instance's `network`-th network (1-based, networks ordered by name)
pub struct EipAssociated {
    pub compute: Arc<dyn ComputeApi>,
    pub address: String,
    pub network: usize,
}

#[async_trait]
impl Check for EipAssociated {
    async fn check(&self, state: &StateFile) -> Result<(), HarnessError> {
        let association = association_of(state, &self.address)?;
        let server = self.compute.get_server(&association.instance_id).await?;

        let attached = server
            .addresses
            .values()
            .nth(self.network.saturating_sub(1))
            .is_some_and(|records| {
                records
                    .iter()
                    .any(|r| r.kind == AddressKind::Floating && r.address == association.public_ip)
            });
        if attached {
            Ok(())
        } else {
            Err(HarnessError::check(format!(
                "EIP {} was not attached to instance {}",
                association.public_ip, association.instance_id
            )))
        }
    }
}

/// The floating entry sits on the same network as the pinned fixed address
pub struct FixedIpTargeted {
    pub compute: Arc<dyn ComputeApi>,
    pub address: String,
}

#[async_trait]
impl Check for FixedIpTargeted {
    async fn check(&self, state: &StateFile) -> Result<(), HarnessError> {
        let association = association_of(state, &self.address)?;
        let fixed_ip = association.fixed_ip.as_deref().ok_or_else(|| {
            HarnessError::check(format!("{}: association is not pinned to a fixed IP", self.address))
        })?;
        let server = self.compute.get_server(&association.instance_id).await?;

        let targeted = server.addresses.values().any(|records| {
            records
                .iter()
                .any(|r| r.kind == AddressKind::Fixed && r.address == fixed_ip)
                && records
                    .iter()
                    .any(|r| r.kind == AddressKind::Floating && r.address == association.public_ip)
        });
        if targeted {
            Ok(())
        } else {
            Err(HarnessError::check(format!(
                "EIP {} is not bound next to fixed address {} on instance {}",
                association.public_ip, fixed_ip, association.instance_id
            )))
        }
    }
}

/// After destroy, no association in state is still visible on its instance.
///
/// A missing instance counts as destroyed. Entries typed `fixed` count as
/// still attached, matching how reads detect an association.
pub struct EipAssociateDestroyed {
    pub compute: Arc<dyn ComputeApi>,
}

#[async_trait]
impl Check for EipAssociateDestroyed {
    async fn check(&self, state: &StateFile) -> Result<(), HarnessError> {
        for entry in state.managed_of_type(EIP_ASSOCIATE) {
            let Some(id) = entry.id.as_deref() else {
                continue;
            };
            let association: AssociationId = id.parse()?;

            let server = match self.compute.get_server(&association.instance_id).await {
                Ok(server) => server,
                Err(e) if e.is_not_found() => continue,
                Err(e) => return Err(e.into()),
            };
            if server.find_association(&association.public_ip).is_some() {
                return Err(HarnessError::check(format!(
                    "EIP {} is still attached to instance {}",
                    association.public_ip, association.instance_id
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{Mode, ResourceState};
    use crate::testing::MemoryCompute;
    use g42vb_provider::client::{AddressRecord, Server};
    use serde_json::json;

    fn state_with_association(id: &str) -> StateFile {
        let mut state = StateFile::new();
        let mut attributes = serde_json::Map::new();
        attributes.insert("public_ip".into(), json!("80.158.1.2"));
        state.upsert(ResourceState {
            mode: Mode::Managed,
            resource_type: EIP_ASSOCIATE.into(),
            name: "test".into(),
            id: Some(id.into()),
            attributes,
        });
        state
    }

    fn server(records: &[(&str, AddressKind, &str)]) -> Server {
        let mut server = Server {
            id: "srv-1".into(),
            ..Default::default()
        };
        for (network, kind, addr) in records {
            server
                .addresses
                .entry(network.to_string())
                .or_default()
                .push(AddressRecord::new(*kind, *addr));
        }
        server
    }

    #[tokio::test]
    async fn attribute_checks() {
        let state = state_with_association("80.158.1.2/srv-1/");
        let address = "g42vbcloud_compute_eip_associate.test";

        attr_set(address, "public_ip").check(&state).await.unwrap();
        id_set(address).check(&state).await.unwrap();
        attr_equals(address, "public_ip", "80.158.1.2").check(&state).await.unwrap();
        assert!(attr_set(address, "fixed_ip").check(&state).await.is_err());
        assert!(attr_equals(address, "public_ip", "1.1.1.1").check(&state).await.is_err());
    }

    #[tokio::test]
    async fn associated_requires_floating_entry_on_nth_network() {
        let state = state_with_association("80.158.1.2/srv-1/");
        let compute = Arc::new(MemoryCompute::with(server(&[
            ("net-a", AddressKind::Fixed, "192.168.0.10"),
            ("net-a", AddressKind::Floating, "80.158.1.2"),
        ])));

        let first = EipAssociated {
            compute: compute.clone(),
            address: "g42vbcloud_compute_eip_associate.test".into(),
            network: 1,
        };
        first.check(&state).await.unwrap();

        let second = EipAssociated {
            compute,
            address: "g42vbcloud_compute_eip_associate.test".into(),
            network: 2,
        };
        assert!(second.check(&state).await.is_err());
    }

    #[tokio::test]
    async fn fixed_ip_targeting() {
        let state = state_with_association("80.158.1.2/srv-1/192.168.0.10");
        let compute = Arc::new(MemoryCompute::with(server(&[
            ("net-a", AddressKind::Fixed, "192.168.0.10"),
            ("net-a", AddressKind::Floating, "80.158.1.2"),
            ("net-b", AddressKind::Fixed, "10.0.0.4"),
        ])));
        FixedIpTargeted {
            compute,
            address: "g42vbcloud_compute_eip_associate.test".into(),
        }
        .check(&state)
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn destroyed_passes_when_instance_is_gone() {
        let state = state_with_association("80.158.1.2/srv-1/");
        let check = EipAssociateDestroyed {
            compute: Arc::new(MemoryCompute::default()),
        };
        check.check(&state).await.unwrap();
    }

    #[tokio::test]
    async fn destroyed_fails_while_address_is_listed() {
        let state = state_with_association("80.158.1.2/srv-1/");
        for kind in [AddressKind::Floating, AddressKind::Fixed] {
            let check = EipAssociateDestroyed {
                compute: Arc::new(MemoryCompute::with(server(&[("net-a", kind, "80.158.1.2")]))),
            };
            let err = check.check(&state).await.unwrap_err();
            assert!(err.to_string().contains("still attached"));
        }

        let check = EipAssociateDestroyed {
            compute: Arc::new(MemoryCompute::with(server(&[(
                "net-a",
                AddressKind::Fixed,
                "192.168.0.10",
            )]))),
        };
        check.check(&state).await.unwrap();
    }
}
