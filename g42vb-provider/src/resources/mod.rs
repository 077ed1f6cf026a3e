//! Resource and data source type definitions
//!
//! Each type is a unit struct implementing `ResourceType`; the schema is the
//! single source of truth used by validation and by `get_schema`.

pub mod data_sources;
pub mod eip_associate;

use g42vb_core::provider::{ErrorKind, ProviderError, ProviderResult, ResourceType};
use g42vb_core::resource::{Resource, Value};
use g42vb_core::schema::{AttributeSchema, AttributeType, ResourceSchema, types};

pub use data_sources::{AvailabilityZonesDataSource, DcsAzDataSource};
pub use eip_associate::EipAssociateHandler;

pub const EIP_ASSOCIATE: &str = "g42vbcloud_compute_eip_associate";
pub const AVAILABILITY_ZONES: &str = "g42vbcloud_availability_zones";
pub const DCS_AZ: &str = "g42vbcloud_dcs_az";

macro_rules! define_resource_type {
    ($name:ident, $type_name:expr, $schema:expr) => {
        pub struct $name;
        impl ResourceType for $name {
            fn name(&self) -> &'static str {
                $type_name
            }
            fn schema(&self) -> ResourceSchema {
                $schema
            }
        }
    };
}

define_resource_type!(EipAssociateType, EIP_ASSOCIATE, eip_associate_schema());
define_resource_type!(
    AvailabilityZonesType,
    AVAILABILITY_ZONES,
    availability_zones_schema()
);
define_resource_type!(DcsAzType, DCS_AZ, dcs_az_schema());

/// Returns all resource types supported by this provider
pub fn resource_types() -> Vec<Box<dyn ResourceType>> {
    vec![Box::new(EipAssociateType)]
}

/// Returns all data source types supported by this provider
pub fn data_source_types() -> Vec<Box<dyn ResourceType>> {
    vec![Box::new(AvailabilityZonesType), Box::new(DcsAzType)]
}

fn eip_associate_schema() -> ResourceSchema {
    ResourceSchema::new(EIP_ASSOCIATE)
        .with_description("Associates an elastic IP with a compute instance")
        .attribute(
            AttributeSchema::new("public_ip", types::ipv4_address())
                .required()
                .force_new()
                .with_description("Elastic IP address to associate"),
        )
        .attribute(
            AttributeSchema::new("instance_id", types::non_empty_string())
                .required()
                .force_new()
                .with_description("ID of the compute instance"),
        )
        .attribute(
            AttributeSchema::new("fixed_ip", types::ipv4_address())
                .optional_computed()
                .force_new()
                .with_description("Private address on the instance to bind to"),
        )
        .attribute(AttributeSchema::new("id", AttributeType::String).computed())
}

fn availability_zones_schema() -> ResourceSchema {
    ResourceSchema::new(AVAILABILITY_ZONES)
        .with_description("Lists the compute availability zones of the region")
        .attribute(
            AttributeSchema::new(
                "state",
                AttributeType::Enum(vec!["available".to_string(), "unavailable".to_string()]),
            )
            .with_default(Value::from("available")),
        )
        .attribute(
            AttributeSchema::new("names", AttributeType::List(Box::new(AttributeType::String)))
                .computed(),
        )
        .attribute(AttributeSchema::new("id", AttributeType::String).computed())
}

fn dcs_az_schema() -> ResourceSchema {
    ResourceSchema::new(DCS_AZ)
        .with_description("Looks up one availability zone as seen by DCS")
        .attribute(AttributeSchema::new("code", AttributeType::String).optional_computed())
        .attribute(AttributeSchema::new("name", AttributeType::String).optional_computed())
        .attribute(AttributeSchema::new("port", AttributeType::String).optional_computed())
        .attribute(AttributeSchema::new("id", AttributeType::String).computed())
}

/// Schema for a resource or data source type name
pub fn schema_for(type_name: &str) -> Option<ResourceSchema> {
    resource_types()
        .into_iter()
        .chain(data_source_types())
        .find(|t| t.name() == type_name)
        .map(|t| t.schema())
}

/// Check a resource's attributes against the schema of its type
pub fn validate_resource(resource: &Resource) -> ProviderResult<()> {
    let schema = schema_for(&resource.id.resource_type).ok_or_else(|| {
        ProviderError::unsupported(format!("Unknown resource type: {}", resource.id.resource_type))
            .for_resource(resource.id.clone())
    })?;
    schema.validate(&resource.attributes).map_err(|errors| {
        let messages: Vec<String> = errors.iter().map(ToString::to_string).collect();
        ProviderError::new(messages.join("; "))
            .with_kind(ErrorKind::ConfigurationInvalid)
            .for_resource(resource.id.clone())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn association_schema_is_force_new() {
        let schema = schema_for(EIP_ASSOCIATE).unwrap();
        assert!(schema.is_immutable());
        assert!(schema.attributes["public_ip"].required);
        assert!(schema.attributes["instance_id"].required);
        assert!(!schema.attributes["fixed_ip"].required);
        assert!(schema.attributes["fixed_ip"].computed);
    }

    #[test]
    fn association_rejects_invalid_public_ip() {
        let schema = schema_for(EIP_ASSOCIATE).unwrap();
        let mut attrs = HashMap::new();
        attrs.insert("public_ip".to_string(), Value::from("not-an-ip"));
        attrs.insert("instance_id".to_string(), Value::from("srv-1"));
        assert!(schema.validate(&attrs).is_err());

        attrs.insert("public_ip".to_string(), Value::from("80.158.1.2"));
        assert!(schema.validate(&attrs).is_ok());
    }

    #[test]
    fn availability_zones_state_defaults_to_available() {
        let schema = schema_for(AVAILABILITY_ZONES).unwrap();
        let mut attrs = HashMap::new();
        schema.apply_defaults(&mut attrs);
        assert_eq!(attrs.get("state"), Some(&Value::from("available")));
    }

    #[test]
    fn registry_lists_every_type() {
        let names: Vec<_> = resource_types()
            .iter()
            .chain(data_source_types().iter())
            .map(|t| t.name())
            .collect();
        assert_eq!(names, vec![EIP_ASSOCIATE, AVAILABILITY_ZONES, DCS_AZ]);
        assert!(schema_for("g42vbcloud_vpc").is_none());
    }
}
