//! Generated test configuration
//!
//! Test configurations are written in Terraform's JSON syntax:
//!
//! ```json
//! {
//!   "data": {"g42vbcloud_availability_zones": {"test": {}}},
//!   "resource": {"g42vbcloud_compute_eip_associate": {"test": {"public_ip": "..."}}}
//! }
//! ```
//!
//! String values may reference other blocks with `${TYPE.NAME.ATTR}` or
//! `${data.TYPE.NAME.ATTR}`, where `ATTR` may carry a list index (`names[0]`).
//! A string that is exactly one reference takes the referenced value as is;
//! references embedded in longer strings are spliced in as text.

use serde_json::{Map, Value, json};

use crate::error::HarnessError;
use crate::state::{Mode, StateFile};

/// One `resource` or `data` block
#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    pub mode: Mode,
    pub resource_type: String,
    pub name: String,
    pub attributes: Map<String, Value>,
}

impl Block {
    pub fn address(&self) -> String {
        match self.mode {
            Mode::Managed => format!("{}.{}", self.resource_type, self.name),
            Mode::Data => format!("data.{}.{}", self.resource_type, self.name),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConfigText {
    pub blocks: Vec<Block>,
}

impl ConfigText {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn resource(self, resource_type: &str, name: &str, attributes: Value) -> Self {
        self.block(Mode::Managed, resource_type, name, attributes)
    }

    pub fn data(self, resource_type: &str, name: &str, attributes: Value) -> Self {
        self.block(Mode::Data, resource_type, name, attributes)
    }

    fn block(mut self, mode: Mode, resource_type: &str, name: &str, attributes: Value) -> Self {
        let attributes = match attributes {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        self.blocks.push(Block {
            mode,
            resource_type: resource_type.to_string(),
            name: name.to_string(),
            attributes,
        });
        self
    }

    /// Append another configuration's blocks, like concatenating files
    pub fn extend(mut self, other: ConfigText) -> Self {
        self.blocks.extend(other.blocks);
        self
    }

    pub fn render(&self) -> String {
        let mut root = json!({});
        for block in &self.blocks {
            let section = match block.mode {
                Mode::Managed => "resource",
                Mode::Data => "data",
            };
            root[section][&block.resource_type][&block.name] =
                Value::Object(block.attributes.clone());
        }
        // Rendering a `Value` cannot fail
        serde_json::to_string_pretty(&root).unwrap_or_default()
    }

    pub fn parse(text: &str) -> Result<Self, HarnessError> {
        let root: Value = serde_json::from_str(text)?;
        let root = root
            .as_object()
            .ok_or_else(|| HarnessError::InvalidConfig("top level must be an object".into()))?;

        let mut config = ConfigText::new();
        for (section, types) in root {
            let mode = match section.as_str() {
                "resource" => Mode::Managed,
                "data" => Mode::Data,
                other => {
                    return Err(HarnessError::InvalidConfig(format!(
                        "unsupported top-level key '{}'",
                        other
                    )));
                }
            };
            for (resource_type, instances) in as_object(types, section)? {
                for (name, attributes) in as_object(instances, resource_type)? {
                    as_object(attributes, name)?;
                    config = config.block(mode, resource_type, name, attributes.clone());
                }
            }
        }
        Ok(config)
    }
}

fn as_object<'a>(value: &'a Value, context: &str) -> Result<&'a Map<String, Value>, HarnessError> {
    value
        .as_object()
        .ok_or_else(|| HarnessError::InvalidConfig(format!("'{}' must be an object", context)))
}

/// Replace every reference in `attributes` with its value from `state`
pub fn resolve_attributes(
    attributes: &Map<String, Value>,
    state: &StateFile,
) -> Result<Map<String, Value>, HarnessError> {
    attributes
        .iter()
        .map(|(k, v)| Ok((k.clone(), resolve_value(v, state)?)))
        .collect()
}

fn resolve_value(value: &Value, state: &StateFile) -> Result<Value, HarnessError> {
    match value {
        Value::String(s) => resolve_string(s, state),
        Value::Array(items) => items
            .iter()
            .map(|v| resolve_value(v, state))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array),
        Value::Object(map) => resolve_attributes(map, state).map(Value::Object),
        other => Ok(other.clone()),
    }
}

fn resolve_string(s: &str, state: &StateFile) -> Result<Value, HarnessError> {
    if let Some(reference) = s.strip_prefix("${").and_then(|r| r.strip_suffix('}'))
        && !reference.contains("${")
    {
        return lookup(reference, state);
    }

    let mut out = String::new();
    let mut rest = s;
    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let end = after
            .find('}')
            .ok_or_else(|| HarnessError::InvalidConfig(format!("unterminated reference in '{}'", s)))?;
        match lookup(&after[..end], state)? {
            Value::String(text) => out.push_str(&text),
            other => out.push_str(&other.to_string()),
        }
        rest = &after[end + 1..];
    }
    out.push_str(rest);
    Ok(Value::String(out))
}

fn lookup(reference: &str, state: &StateFile) -> Result<Value, HarnessError> {
    let unresolved = || HarnessError::UnresolvedReference(reference.to_string());
    let parts: Vec<&str> = reference.splitn(4, '.').collect();
    let (address, attribute) = match parts.as_slice() {
        ["data", resource_type, name, attribute] => {
            (format!("data.{}.{}", resource_type, name), *attribute)
        }
        [resource_type, name, attribute] if *resource_type != "data" => {
            (format!("{}.{}", resource_type, name), *attribute)
        }
        _ => return Err(unresolved()),
    };

    let entry = state.find(&address).ok_or_else(unresolved)?;
    if attribute == "id" && !entry.attributes.contains_key("id") {
        return entry.id.clone().map(Value::String).ok_or_else(unresolved);
    }
    entry.attribute(attribute).cloned().ok_or_else(unresolved)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::ResourceState;

    fn state() -> StateFile {
        let mut state = StateFile::new();
        let mut attributes = Map::new();
        attributes.insert("names".into(), json!(["ae-ad-1a", "ae-ad-1b"]));
        state.upsert(ResourceState {
            mode: Mode::Data,
            resource_type: "g42vbcloud_availability_zones".into(),
            name: "test".into(),
            id: Some("zones".into()),
            attributes,
        });
        state
    }

    #[test]
    fn render_then_parse() {
        let config = ConfigText::new()
            .data("g42vbcloud_availability_zones", "test", json!({}))
            .data(
                "g42vbcloud_dcs_az",
                "az1",
                json!({"code": "${data.g42vbcloud_availability_zones.test.names[0]}"}),
            );
        let parsed = ConfigText::parse(&config.render()).unwrap();
        assert_eq!(parsed.blocks.len(), 2);
        assert!(parsed.blocks.iter().any(|b| b.address() == "data.g42vbcloud_dcs_az.az1"));
    }

    #[test]
    fn parse_rejects_unknown_sections() {
        let err = ConfigText::parse(r#"{"provider": {}}"#).unwrap_err();
        assert!(matches!(err, HarnessError::InvalidConfig(_)));
    }

    #[test]
    fn whole_reference_keeps_value() {
        let attrs: Map<String, Value> = serde_json::from_value(json!({
            "code": "${data.g42vbcloud_availability_zones.test.names[1]}",
            "all": "${data.g42vbcloud_availability_zones.test.names}",
            "label": "zone-${data.g42vbcloud_availability_zones.test.names[0]}",
            "id": "${data.g42vbcloud_availability_zones.test.id}",
        }))
        .unwrap();
        let resolved = resolve_attributes(&attrs, &state()).unwrap();
        assert_eq!(resolved["code"], json!("ae-ad-1b"));
        assert_eq!(resolved["all"], json!(["ae-ad-1a", "ae-ad-1b"]));
        assert_eq!(resolved["label"], json!("zone-ae-ad-1a"));
        assert_eq!(resolved["id"], json!("zones"));
    }

    #[test]
    fn missing_reference_is_unresolved() {
        let attrs: Map<String, Value> =
            serde_json::from_value(json!({"code": "${data.g42vbcloud_dcs_az.az1.code}"})).unwrap();
        let err = resolve_attributes(&attrs, &state()).unwrap_err();
        assert!(matches!(err, HarnessError::UnresolvedReference(r) if r == "data.g42vbcloud_dcs_az.az1.code"));
    }
}
