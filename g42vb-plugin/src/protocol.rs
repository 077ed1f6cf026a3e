//! Wire types of the stdio plugin protocol
//!
//! One JSON object per line in each direction. Requests carry an `id` that
//! is echoed back so the host can match responses to in-flight calls.

use std::collections::HashMap;

use g42vb_core::provider::{ErrorKind, ProviderError};
use g42vb_core::resource::{self, Resource, ResourceId, State, Value};
use g42vb_provider::ProviderSettings;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;

/// Line printed once on startup before any response
pub const HANDSHAKE: &str = "G42VB_PLUGIN|1|stdio";

#[derive(Debug, Deserialize)]
pub struct Request {
    #[serde(default)]
    pub id: serde_json::Value,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

#[derive(Debug, Serialize)]
pub struct Response {
    pub id: serde_json::Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct ErrorBody {
    pub kind: String,
    pub message: String,
}

impl Response {
    pub fn ok(id: serde_json::Value, result: serde_json::Value) -> Self {
        Self {
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn err(id: serde_json::Value, error: &ProviderError) -> Self {
        Self {
            id,
            result: None,
            error: Some(ErrorBody {
                kind: error.kind.as_str().to_string(),
                message: error.to_string(),
            }),
        }
    }
}

/// A resource or data source instance as sent by the host
#[derive(Debug, Deserialize)]
pub struct ResourcePayload {
    #[serde(rename = "type")]
    pub resource_type: String,
    pub name: String,
    #[serde(default = "empty_object")]
    pub attributes: serde_json::Value,
}

#[derive(Debug, Deserialize)]
pub struct InstanceRef {
    #[serde(rename = "type")]
    pub resource_type: String,
    pub name: String,
    #[serde(default)]
    pub id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdatePayload {
    #[serde(rename = "type")]
    pub resource_type: String,
    pub name: String,
    pub id: String,
    #[serde(default = "empty_object")]
    pub prior: serde_json::Value,
    #[serde(default = "empty_object")]
    pub attributes: serde_json::Value,
}

fn empty_object() -> serde_json::Value {
    json!({})
}

/// A decoded request
#[derive(Debug)]
pub enum Call {
    GetSchema,
    Configure(ProviderSettings),
    ValidateResource(Resource),
    Create(Resource),
    Read(ResourceId, Option<String>),
    Update {
        id: ResourceId,
        identifier: String,
        prior: State,
        desired: Resource,
    },
    Delete(ResourceId, String),
    Import(ResourceId, String),
    ReadDataSource(Resource),
    Stop,
}

impl Call {
    pub fn decode(method: &str, params: serde_json::Value) -> Result<Call, ProviderError> {
        let call = match method {
            "get_schema" => Call::GetSchema,
            "configure" => Call::Configure(params_as(method, normalize_null(params))?),
            "validate_resource" => Call::ValidateResource(resource_from(method, params, false)?),
            "create" => Call::Create(resource_from(method, params, false)?),
            "read" => {
                let r: InstanceRef = params_as(method, params)?;
                Call::Read(ResourceId::new(r.resource_type, r.name), r.id)
            }
            "update" => {
                let p: UpdatePayload = params_as(method, params)?;
                let id = ResourceId::new(p.resource_type, p.name);
                let prior = State::existing(id.clone(), attributes(method, &p.prior)?)
                    .with_identifier(p.id.clone());
                let desired = Resource {
                    id: id.clone(),
                    attributes: attributes(method, &p.attributes)?,
                    read_only: false,
                };
                Call::Update {
                    id,
                    identifier: p.id,
                    prior,
                    desired,
                }
            }
            "delete" | "import" => {
                let r: InstanceRef = params_as(method, params)?;
                let identifier = r.id.ok_or_else(|| invalid_params(method, "missing field `id`"))?;
                let id = ResourceId::new(r.resource_type, r.name);
                if method == "delete" {
                    Call::Delete(id, identifier)
                } else {
                    Call::Import(id, identifier)
                }
            }
            "read_data_source" => Call::ReadDataSource(resource_from(method, params, true)?),
            "stop" => Call::Stop,
            other => {
                return Err(ProviderError::unsupported(format!("Unknown method: {}", other)));
            }
        };
        Ok(call)
    }
}

fn normalize_null(params: serde_json::Value) -> serde_json::Value {
    if params.is_null() { empty_object() } else { params }
}

fn params_as<T: DeserializeOwned>(method: &str, params: serde_json::Value) -> Result<T, ProviderError> {
    serde_json::from_value(params).map_err(|e| invalid_params(method, &e.to_string()))
}

fn attributes(method: &str, value: &serde_json::Value) -> Result<HashMap<String, Value>, ProviderError> {
    resource::attributes_from_json(value).map_err(|e| invalid_params(method, &e))
}

fn resource_from(method: &str, params: serde_json::Value, read_only: bool) -> Result<Resource, ProviderError> {
    let payload: ResourcePayload = params_as(method, params)?;
    Ok(Resource {
        id: ResourceId::new(payload.resource_type, payload.name),
        attributes: attributes(method, &payload.attributes)?,
        read_only,
    })
}

fn invalid_params(method: &str, detail: &str) -> ProviderError {
    ProviderError::new(format!("Invalid params for {}: {}", method, detail))
        .with_kind(ErrorKind::ConfigurationInvalid)
}

/// Encode a state for the host; missing resources are `{"exists": false}`
pub fn state_to_json(state: &State) -> serde_json::Value {
    if !state.exists {
        return json!({ "exists": false });
    }
    json!({
        "exists": true,
        "id": state.identifier,
        "attributes": resource::attributes_to_json(&state.attributes),
    })
}
