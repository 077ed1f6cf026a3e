//! In-process test runner
//!
//! A `TestCase` is a sequence of steps applied against one provider. Each
//! configuration step reconciles the recorded state with the step's blocks,
//! refreshes every managed resource and then runs its checks. After the last
//! step (or the first failure) everything in state is destroyed, and the
//! destroy check runs against the state as it was just before destroy.

use std::collections::HashSet;
use std::path::PathBuf;

use g42vb_core::provider::Provider;
use g42vb_core::resource::{Resource, State, attributes_from_json};
use serde_json::Value;

use crate::checks::Check;
use crate::config::{Block, ConfigText, resolve_attributes};
use crate::error::HarnessError;
use crate::state::{Mode, ResourceState, StateFile};

/// Name of the state file written to the working directory
pub const STATE_FILE: &str = "terraform.tfstate.json";

pub enum TestStep {
    /// Apply a configuration, then run the checks
    Config {
        config: ConfigText,
        checks: Vec<Box<dyn Check>>,
    },
    /// Import the resource at `address` by its recorded ID and compare the
    /// imported attributes with state, skipping `ignore`
    ImportVerify {
        address: String,
        ignore: Vec<String>,
    },
}

impl TestStep {
    pub fn config(config: ConfigText, checks: Vec<Box<dyn Check>>) -> Self {
        TestStep::Config { config, checks }
    }

    pub fn import_verify(address: &str, ignore: &[&str]) -> Self {
        TestStep::ImportVerify {
            address: address.to_string(),
            ignore: ignore.iter().map(|s| s.to_string()).collect(),
        }
    }
}

#[derive(Default)]
pub struct TestCase {
    steps: Vec<TestStep>,
    check_destroy: Option<Box<dyn Check>>,
}

impl TestCase {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn step(mut self, step: TestStep) -> Self {
        self.steps.push(step);
        self
    }

    pub fn check_destroy(mut self, check: Box<dyn Check>) -> Self {
        self.check_destroy = Some(check);
        self
    }

    pub async fn run(&self, provider: &dyn Provider) -> Result<(), HarnessError> {
        let workdir = tempfile::tempdir()?;
        let mut runner = Runner {
            provider,
            state: StateFile::new(),
            state_path: workdir.path().join(STATE_FILE),
        };

        let mut outcome = Ok(());
        for (i, step) in self.steps.iter().enumerate() {
            log::info!("step {}/{}", i + 1, self.steps.len());
            if let Err(e) = runner.run_step(step).await {
                log::error!("step {} failed: {}", i + 1, e);
                outcome = Err(e);
                break;
            }
        }

        let snapshot = runner.state.clone();
        let destroyed = runner.destroy().await;
        outcome?;
        destroyed?;

        if let Some(check) = &self.check_destroy {
            check.check(&snapshot).await?;
        }
        Ok(())
    }
}

struct Runner<'a> {
    provider: &'a dyn Provider,
    state: StateFile,
    state_path: PathBuf,
}

impl Runner<'_> {
    async fn run_step(&mut self, step: &TestStep) -> Result<(), HarnessError> {
        match step {
            TestStep::Config { config, checks } => {
                self.apply(config).await?;
                self.refresh(config).await?;
                self.state.save(&self.state_path)?;
                for check in checks {
                    check.check(&self.state).await?;
                }
                Ok(())
            }
            TestStep::ImportVerify { address, ignore } => self.import_verify(address, ignore).await,
        }
    }

    async fn apply(&mut self, config: &ConfigText) -> Result<(), HarnessError> {
        // Entries the new configuration no longer declares
        let declared: HashSet<String> = config.blocks.iter().map(Block::address).collect();
        let orphans: Vec<ResourceState> = self
            .state
            .resources
            .iter()
            .filter(|r| !declared.contains(&r.address()))
            .cloned()
            .collect();
        for orphan in orphans.iter().rev() {
            self.destroy_entry(orphan).await?;
            self.state.remove(&orphan.address());
        }

        // Blocks whose references are not in state yet wait for a later pass
        let mut pending: Vec<&Block> = config.blocks.iter().collect();
        while !pending.is_empty() {
            let before = pending.len();
            let mut deferred = Vec::new();
            let mut unresolved = None;
            for block in pending {
                match resolve_attributes(&block.attributes, &self.state) {
                    Ok(attributes) => self.apply_block(block, attributes).await?,
                    Err(HarnessError::UnresolvedReference(reference)) => {
                        unresolved = Some(reference);
                        deferred.push(block);
                    }
                    Err(e) => return Err(e),
                }
            }
            if deferred.len() == before
                && let Some(reference) = unresolved
            {
                return Err(HarnessError::UnresolvedReference(reference));
            }
            pending = deferred;
        }
        Ok(())
    }

    async fn apply_block(
        &mut self,
        block: &Block,
        attributes: serde_json::Map<String, Value>,
    ) -> Result<(), HarnessError> {
        let address = block.address();
        let mut resource = Resource::new(&block.resource_type, &block.name)
            .with_read_only(block.mode == Mode::Data);
        resource.attributes =
            attributes_from_json(&Value::Object(attributes)).map_err(HarnessError::InvalidConfig)?;

        let state = match block.mode {
            Mode::Data => self.provider.read_data_source(&resource).await?,
            Mode::Managed => self.apply_managed(&address, &resource).await?,
        };
        if !state.exists {
            return Err(HarnessError::check(format!(
                "{}: not found after apply",
                address
            )));
        }
        self.state.upsert(ResourceState::from_state(block.mode, &state));
        Ok(())
    }

    async fn apply_managed(
        &self,
        address: &str,
        resource: &Resource,
    ) -> Result<State, HarnessError> {
        let Some(identifier) = self.state.find(address).and_then(|e| e.id.clone()) else {
            log::info!("{}: creating", address);
            return Ok(self.provider.create(resource).await?);
        };

        let current = self.provider.read(&resource.id, Some(identifier.as_str())).await?;
        if !current.exists {
            log::warn!("{}: no longer exists, creating", address);
            return Ok(self.provider.create(resource).await?);
        }

        let changed: Vec<&str> = resource
            .attributes
            .iter()
            .filter(|(k, v)| current.attributes.get(*k) != Some(*v))
            .map(|(k, _)| k.as_str())
            .collect();
        if changed.is_empty() {
            return Ok(current);
        }

        if self.forces_replacement(&resource.id.resource_type, &changed) {
            log::info!("{}: replacing ({})", address, changed.join(", "));
            self.provider.delete(&resource.id, &identifier).await?;
            Ok(self.provider.create(resource).await?)
        } else {
            log::info!("{}: updating ({})", address, changed.join(", "));
            Ok(self
                .provider
                .update(&resource.id, &identifier, &current, resource)
                .await?)
        }
    }

    fn forces_replacement(&self, resource_type: &str, changed: &[&str]) -> bool {
        self.provider
            .resource_types()
            .into_iter()
            .find(|t| t.name() == resource_type)
            .is_some_and(|t| {
                let schema = t.schema();
                changed
                    .iter()
                    .any(|k| schema.attributes.get(*k).is_some_and(|a| a.force_new))
            })
    }

    /// Re-read every managed resource the configuration declares
    async fn refresh(&mut self, config: &ConfigText) -> Result<(), HarnessError> {
        for block in config.blocks.iter().filter(|b| b.mode == Mode::Managed) {
            let address = block.address();
            let Some(entry) = self.state.find(&address).cloned() else {
                continue;
            };
            let state = self
                .provider
                .read(&entry.resource_id(), entry.id.as_deref())
                .await?;
            if !state.exists {
                return Err(HarnessError::check(format!(
                    "{}: disappeared after apply, the plan is not empty",
                    address
                )));
            }
            self.state
                .upsert(ResourceState::from_state(Mode::Managed, &state));
        }
        Ok(())
    }

    async fn import_verify(&self, address: &str, ignore: &[String]) -> Result<(), HarnessError> {
        let entry = self
            .state
            .find(address)
            .filter(|e| e.mode == Mode::Managed)
            .ok_or_else(|| HarnessError::check(format!("Not found: {}", address)))?;
        let import_id = entry
            .id
            .as_deref()
            .ok_or_else(|| HarnessError::check(format!("{}: no ID to import", address)))?;

        log::info!("{}: importing {}", address, import_id);
        let imported = self.provider.import(&entry.resource_id(), import_id).await?;
        if !imported.exists {
            return Err(HarnessError::check(format!(
                "{}: import of '{}' returned nothing",
                address, import_id
            )));
        }
        let imported = ResourceState::from_state(Mode::Managed, &imported);

        if imported.id != entry.id {
            return Err(HarnessError::ImportMismatch {
                address: address.to_string(),
                attribute: "id".to_string(),
                expected: import_id.to_string(),
                got: imported.id.unwrap_or_default(),
            });
        }
        for (attribute, expected) in &entry.attributes {
            if ignore.contains(attribute) {
                continue;
            }
            let got = imported.attributes.get(attribute);
            if got != Some(expected) {
                return Err(HarnessError::ImportMismatch {
                    address: address.to_string(),
                    attribute: attribute.clone(),
                    expected: expected.to_string(),
                    got: got.map_or_else(|| "<unset>".to_string(), Value::to_string),
                });
            }
        }
        Ok(())
    }

    /// Destroy everything in reverse order, attempting every entry
    async fn destroy(&mut self) -> Result<(), HarnessError> {
        let mut first_error = None;
        let entries: Vec<ResourceState> = self.state.resources.iter().rev().cloned().collect();
        for entry in &entries {
            if let Err(e) = self.destroy_entry(entry).await {
                log::error!("{}: destroy failed: {}", entry.address(), e);
                first_error.get_or_insert(e);
                continue;
            }
            self.state.remove(&entry.address());
        }
        self.state.save(&self.state_path)?;
        first_error.map_or(Ok(()), Err)
    }

    async fn destroy_entry(&self, entry: &ResourceState) -> Result<(), HarnessError> {
        if entry.mode == Mode::Data {
            return Ok(());
        }
        let Some(identifier) = entry.id.as_deref() else {
            return Ok(());
        };
        log::info!("{}: destroying", entry.address());
        self.provider
            .delete(&entry.resource_id(), identifier)
            .await?;
        Ok(())
    }
}
