//! Floating IP association resource
//!
//! The association has no remote ID of its own. Its identity is the
//! composite `public_ip/instance_id/fixed_ip`, and its presence is derived
//! from the instance's address list.

use std::collections::HashMap;
use std::sync::Arc;

use g42vb_core::identifier::AssociationId;
use g42vb_core::provider::{ErrorKind, ProviderError, ProviderResult};
use g42vb_core::resource::{Resource, ResourceId, State, Value};

use crate::client::ComputeApi;

/// Handler for `g42vbcloud_compute_eip_associate`
pub struct EipAssociateHandler {
    compute: Arc<dyn ComputeApi>,
}

impl EipAssociateHandler {
    pub fn new(compute: Arc<dyn ComputeApi>) -> Self {
        Self { compute }
    }

    pub async fn create(&self, resource: &Resource) -> ProviderResult<State> {
        let id = &resource.id;
        let required = |key: &str| {
            resource.get_str(key).ok_or_else(|| {
                ProviderError::new(format!("{} is required", key))
                    .with_kind(ErrorKind::ConfigurationInvalid)
                    .for_resource(id.clone())
            })
        };
        let public_ip = required("public_ip")?;
        let instance_id = required("instance_id")?;
        let fixed_ip = resource.get_str("fixed_ip");

        log::info!(
            "Associating floating IP {} with instance {}",
            public_ip,
            instance_id
        );
        self.compute
            .associate_floating_ip(instance_id, public_ip, fixed_ip)
            .await
            .map_err(|e| {
                // A missing instance or address is the platform refusing the request
                let missing = e.is_not_found();
                let err = e.into_provider_error("Error associating floating IP");
                let err = if missing {
                    err.with_kind(ErrorKind::RemoteRejected)
                } else {
                    err
                };
                err.for_resource(id.clone())
            })?;

        let association =
            AssociationId::new(public_ip, instance_id, fixed_ip.map(str::to_string));
        let identifier = association.to_string();
        log::debug!("Created association {}", identifier);

        // The association exists remotely from here on, so its identity is
        // returned even when the read back fails
        match self.read(id, Some(identifier.as_str())).await {
            Ok(state) if state.exists => return Ok(state),
            Ok(_) => log::debug!(
                "Association {} not yet visible, using configured values",
                identifier
            ),
            Err(e) => log::warn!(
                "Reading association {} after create failed, using configured values: {}",
                identifier,
                e
            ),
        }
        Ok(State::existing(id.clone(), association_attributes(&association, &identifier))
            .with_identifier(identifier))
    }

    pub async fn read(&self, id: &ResourceId, identifier: Option<&str>) -> ProviderResult<State> {
        let Some(identifier) = identifier else {
            return Ok(State::not_found(id.clone()));
        };
        let association = parse_association(id, identifier)?;

        let server = match self.compute.get_server(&association.instance_id).await {
            Ok(server) => server,
            Err(e) if e.is_not_found() => {
                log::warn!(
                    "Instance {} not found, removing {} from state",
                    association.instance_id,
                    id
                );
                return Ok(State::not_found(id.clone()));
            }
            Err(e) => {
                return Err(e
                    .into_provider_error("Error retrieving instance")
                    .for_resource(id.clone()));
            }
        };

        let Some((network, _)) = server.find_association(&association.public_ip) else {
            log::warn!(
                "Floating IP {} is not associated with instance {}, removing {} from state",
                association.public_ip,
                association.instance_id,
                id
            );
            return Ok(State::not_found(id.clone()));
        };

        // The identity keeps only a pinned fixed IP, never a discovered one
        let identifier = association.to_string();
        let fixed_ip = association
            .fixed_ip
            .clone()
            .or_else(|| server.fixed_address_on(network).map(str::to_string));
        let refreshed = AssociationId {
            fixed_ip,
            ..association
        };

        Ok(State::existing(id.clone(), association_attributes(&refreshed, &identifier))
            .with_identifier(identifier))
    }

    pub async fn delete(&self, id: &ResourceId, identifier: &str) -> ProviderResult<()> {
        let association = parse_association(id, identifier)?;

        log::info!(
            "Disassociating floating IP {} from instance {}",
            association.public_ip,
            association.instance_id
        );
        match self
            .compute
            .disassociate_floating_ip(&association.instance_id, &association.public_ip)
            .await
        {
            Ok(()) => Ok(()),
            Err(e) if e.is_not_found() || e.is_not_associated() => {
                log::debug!("Association {} already gone: {}", identifier, e);
                Ok(())
            }
            Err(e) => Err(e
                .into_provider_error("Error disassociating floating IP")
                .for_resource(id.clone())),
        }
    }

    /// Read by import ID; a missing association is an error rather than drift
    pub async fn import(&self, id: &ResourceId, import_id: &str) -> ProviderResult<State> {
        let state = self.read(id, Some(import_id)).await?;
        if !state.exists {
            return Err(ProviderError::new(format!(
                "Cannot import non-existent remote object '{}'",
                import_id
            ))
            .with_kind(ErrorKind::RemoteNotFound)
            .for_resource(id.clone()));
        }
        Ok(state)
    }

    pub fn update(&self, id: &ResourceId) -> ProviderResult<State> {
        Err(ProviderError::unsupported(
            "Floating IP associations cannot be updated in place; every attribute forces replacement",
        )
        .for_resource(id.clone()))
    }
}

/// Decode an identifier, requiring the public IP and instance fields
fn parse_association(id: &ResourceId, identifier: &str) -> ProviderResult<AssociationId> {
    let association: AssociationId =
        identifier.parse().map_err(|e: ProviderError| e.for_resource(id.clone()))?;
    if association.public_ip.is_empty() || association.instance_id.is_empty() {
        return Err(ProviderError::new(format!(
            "Unable to determine floating ip association ID from '{}': public IP and instance ID must not be empty",
            identifier
        ))
        .with_kind(ErrorKind::MalformedIdentifier)
        .for_resource(id.clone()));
    }
    Ok(association)
}

fn association_attributes(association: &AssociationId, identifier: &str) -> HashMap<String, Value> {
    let mut attributes = HashMap::new();
    attributes.insert("id".to_string(), Value::from(identifier));
    attributes.insert(
        "public_ip".to_string(),
        Value::from(association.public_ip.as_str()),
    );
    attributes.insert(
        "instance_id".to_string(),
        Value::from(association.instance_id.as_str()),
    );
    if let Some(fixed_ip) = &association.fixed_ip {
        attributes.insert("fixed_ip".to_string(), Value::from(fixed_ip.as_str()));
    }
    attributes
}
