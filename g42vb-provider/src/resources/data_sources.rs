//! Read-only data sources

use std::collections::HashMap;
use std::sync::Arc;

use g42vb_core::provider::{ErrorKind, ProviderError, ProviderResult};
use g42vb_core::resource::{Resource, State, Value};
use sha2::{Digest, Sha256};

use crate::client::{ComputeApi, DcsApi, DcsAvailabilityZone};

/// `g42vbcloud_availability_zones`: names of the compute zones in a given state
pub struct AvailabilityZonesDataSource {
    compute: Arc<dyn ComputeApi>,
}

impl AvailabilityZonesDataSource {
    pub fn new(compute: Arc<dyn ComputeApi>) -> Self {
        Self { compute }
    }

    pub async fn read(&self, resource: &Resource) -> ProviderResult<State> {
        let state = resource.get_str("state").unwrap_or("available");
        let want_available = match state {
            "available" => true,
            "unavailable" => false,
            other => {
                return Err(ProviderError::new(format!(
                    "state must be 'available' or 'unavailable', got '{}'",
                    other
                ))
                .with_kind(ErrorKind::ConfigurationInvalid)
                .for_resource(resource.id.clone()));
            }
        };

        let zones = self.compute.list_availability_zones().await.map_err(|e| {
            e.into_provider_error("Error retrieving availability zones")
                .for_resource(resource.id.clone())
        })?;

        let mut names: Vec<String> = zones
            .into_iter()
            .filter(|z| z.available == want_available)
            .map(|z| z.name)
            .collect();
        names.sort();
        log::debug!("{} availability zones in state {}", names.len(), state);

        let id = hex::encode(Sha256::digest(names.join(",").as_bytes()));
        let mut attributes = HashMap::new();
        attributes.insert("id".to_string(), Value::String(id.clone()));
        attributes.insert("state".to_string(), Value::from(state));
        attributes.insert(
            "names".to_string(),
            Value::List(names.into_iter().map(Value::String).collect()),
        );

        Ok(State::existing(resource.id.clone(), attributes).with_identifier(id))
    }
}

/// `g42vbcloud_dcs_az`: exactly one DCS zone matching the given filters
pub struct DcsAzDataSource {
    dcs: Arc<dyn DcsApi>,
}

impl DcsAzDataSource {
    pub fn new(dcs: Arc<dyn DcsApi>) -> Self {
        Self { dcs }
    }

    pub async fn read(&self, resource: &Resource) -> ProviderResult<State> {
        let zones = self.dcs.list_availability_zones().await.map_err(|e| {
            e.into_provider_error("Error retrieving DCS availability zones")
                .for_resource(resource.id.clone())
        })?;

        let code = resource.get_str("code");
        let name = resource.get_str("name");
        let port = resource.get_str("port");
        let matches: Vec<&DcsAvailabilityZone> = zones
            .iter()
            .filter(|z| {
                filter_matches(code, &z.code)
                    && filter_matches(name, &z.name)
                    && filter_matches(port, &z.port)
            })
            .collect();

        let zone = match matches.as_slice() {
            [zone] => *zone,
            [] => {
                return Err(ProviderError::new(
                    "Your query returned no results. Please change your search criteria and try again.",
                )
                .with_kind(ErrorKind::RemoteNotFound)
                .for_resource(resource.id.clone()));
            }
            _ => {
                return Err(ProviderError::new(format!(
                    "Your query returned {} results. Please try a more specific search criteria.",
                    matches.len()
                ))
                .with_kind(ErrorKind::ConfigurationInvalid)
                .for_resource(resource.id.clone()));
            }
        };
        log::debug!("Selected DCS availability zone {} ({})", zone.code, zone.id);

        let mut attributes = HashMap::new();
        attributes.insert("id".to_string(), Value::from(zone.id.as_str()));
        attributes.insert("code".to_string(), Value::from(zone.code.as_str()));
        attributes.insert("name".to_string(), Value::from(zone.name.as_str()));
        attributes.insert("port".to_string(), Value::from(zone.port.as_str()));

        Ok(State::existing(resource.id.clone(), attributes).with_identifier(zone.id.clone()))
    }
}

/// An unset filter matches everything
fn filter_matches(filter: Option<&str>, value: &str) -> bool {
    filter.is_none_or(|f| f == value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeCompute, FakeDcs};

    fn names(state: &State) -> Vec<String> {
        match state.attributes.get("names") {
            Some(Value::List(items)) => items
                .iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect(),
            other => panic!("unexpected names: {:?}", other),
        }
    }

    #[tokio::test]
    async fn availability_zones_are_sorted_and_filtered() {
        let compute = FakeCompute::default().with_zones(&[
            ("ae-ad-1c", true),
            ("ae-ad-1a", true),
            ("ae-ad-1b", false),
        ]);
        let source = AvailabilityZonesDataSource::new(Arc::new(compute));

        let available = source
            .read(&Resource::new("g42vbcloud_availability_zones", "all"))
            .await
            .unwrap();
        assert_eq!(names(&available), vec!["ae-ad-1a", "ae-ad-1c"]);
        assert_eq!(available.get_str("state"), Some("available"));
        assert_eq!(available.identifier.as_ref().map(String::len), Some(64));

        let unavailable = source
            .read(
                &Resource::new("g42vbcloud_availability_zones", "down")
                    .with_attribute("state", Value::from("unavailable")),
            )
            .await
            .unwrap();
        assert_eq!(names(&unavailable), vec!["ae-ad-1b"]);
        assert_ne!(available.identifier, unavailable.identifier);
    }

    #[tokio::test]
    async fn availability_zones_reject_unknown_state() {
        let source = AvailabilityZonesDataSource::new(Arc::new(FakeCompute::default()));
        let err = source
            .read(
                &Resource::new("g42vbcloud_availability_zones", "x")
                    .with_attribute("state", Value::from("degraded")),
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::ConfigurationInvalid);
    }

    fn dcs() -> DcsAzDataSource {
        DcsAzDataSource::new(Arc::new(
            FakeDcs::default()
                .with_zone("az-1", "ae-ad-1a", "AZ1", "8002")
                .with_zone("az-2", "ae-ad-1b", "AZ2", "8002"),
        ))
    }

    #[tokio::test]
    async fn dcs_az_selects_single_match() {
        let state = dcs()
            .read(&Resource::new("g42vbcloud_dcs_az", "az1").with_attribute("code", Value::from("ae-ad-1a")))
            .await
            .unwrap();
        assert_eq!(state.get_str("id"), Some("az-1"));
        assert_eq!(state.get_str("name"), Some("AZ1"));
        assert_eq!(state.get_str("port"), Some("8002"));
        assert_eq!(state.identifier.as_deref(), Some("az-1"));
    }

    #[tokio::test]
    async fn dcs_az_requires_exactly_one_match() {
        let err = dcs()
            .read(&Resource::new("g42vbcloud_dcs_az", "any").with_attribute("port", Value::from("8002")))
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::ConfigurationInvalid);

        let err = dcs()
            .read(&Resource::new("g42vbcloud_dcs_az", "none").with_attribute("code", Value::from("xx-1a")))
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::RemoteNotFound);
    }

    #[tokio::test]
    async fn dcs_az_filters_combine() {
        let state = dcs()
            .read(
                &Resource::new("g42vbcloud_dcs_az", "az2")
                    .with_attribute("port", Value::from("8002"))
                    .with_attribute("name", Value::from("AZ2")),
            )
            .await
            .unwrap();
        assert_eq!(state.get_str("code"), Some("ae-ad-1b"));
    }
}
