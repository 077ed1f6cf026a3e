//! State recorded by the harness between test steps

use std::path::Path;

use chrono::{DateTime, Utc};
use g42vb_core::resource::{self, ResourceId, State};
use serde::{Deserialize, Serialize};

use crate::error::HarnessError;

/// Whether an entry is a managed resource or a data source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Managed,
    Data,
}

/// The state file written to the test working directory after each step
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateFile {
    pub version: u32,
    /// Incremented on every write
    pub serial: u64,
    pub lineage: String,
    pub updated_at: DateTime<Utc>,
    pub resources: Vec<ResourceState>,
}

impl StateFile {
    pub const CURRENT_VERSION: u32 = 1;

    pub fn new() -> Self {
        Self {
            version: Self::CURRENT_VERSION,
            serial: 0,
            lineage: uuid::Uuid::new_v4().to_string(),
            updated_at: Utc::now(),
            resources: Vec::new(),
        }
    }

    pub fn increment_serial(&mut self) {
        self.serial += 1;
        self.updated_at = Utc::now();
    }

    /// Find an entry by address, `type.name` or `data.type.name`
    pub fn find(&self, address: &str) -> Option<&ResourceState> {
        self.resources.iter().find(|r| r.address() == address)
    }

    /// Add or replace an entry, keeping its original position
    pub fn upsert(&mut self, entry: ResourceState) {
        match self
            .resources
            .iter_mut()
            .find(|r| r.address() == entry.address())
        {
            Some(existing) => *existing = entry,
            None => self.resources.push(entry),
        }
    }

    pub fn remove(&mut self, address: &str) -> Option<ResourceState> {
        let pos = self.resources.iter().position(|r| r.address() == address)?;
        Some(self.resources.remove(pos))
    }

    /// Managed resources of one type
    pub fn managed_of_type<'a>(
        &'a self,
        resource_type: &'a str,
    ) -> impl Iterator<Item = &'a ResourceState> + 'a {
        self.resources
            .iter()
            .filter(move |r| r.mode == Mode::Managed && r.resource_type == resource_type)
    }

    pub fn save(&mut self, path: &Path) -> Result<(), HarnessError> {
        self.increment_serial();
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self, HarnessError> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }
}

impl Default for StateFile {
    fn default() -> Self {
        Self::new()
    }
}

/// State of one resource or data source
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResourceState {
    pub mode: Mode,
    pub resource_type: String,
    pub name: String,
    /// Remote or composite identifier
    pub id: Option<String>,
    pub attributes: serde_json::Map<String, serde_json::Value>,
}

impl ResourceState {
    pub fn from_state(mode: Mode, state: &State) -> Self {
        let attributes = match resource::attributes_to_json(&state.attributes) {
            serde_json::Value::Object(map) => map,
            _ => serde_json::Map::new(),
        };
        Self {
            mode,
            resource_type: state.id.resource_type.clone(),
            name: state.id.name.clone(),
            id: state.identifier.clone(),
            attributes,
        }
    }

    pub fn resource_id(&self) -> ResourceId {
        ResourceId::new(&self.resource_type, &self.name)
    }

    pub fn address(&self) -> String {
        match self.mode {
            Mode::Managed => format!("{}.{}", self.resource_type, self.name),
            Mode::Data => format!("data.{}.{}", self.resource_type, self.name),
        }
    }

    /// Attribute by path: `names`, `names[0]`, or `id` for the identifier
    pub fn attribute(&self, path: &str) -> Option<&serde_json::Value> {
        let (name, index) = split_index(path);
        let value = self.attributes.get(name)?;
        match index {
            Some(i) => value.as_array()?.get(i),
            None => Some(value),
        }
    }

    /// Attribute rendered as text, the way checks compare values
    pub fn attribute_text(&self, path: &str) -> Option<String> {
        if path == "id" && !self.attributes.contains_key("id") {
            return self.id.clone();
        }
        match self.attribute(path)? {
            serde_json::Value::String(s) => Some(s.clone()),
            serde_json::Value::Null => None,
            other => Some(other.to_string()),
        }
    }
}

fn split_index(path: &str) -> (&str, Option<usize>) {
    if let Some(open) = path.find('[')
        && let Some(inner) = path[open + 1..].strip_suffix(']')
        && let Ok(index) = inner.parse()
    {
        return (&path[..open], Some(index));
    }
    (path, None)
}
