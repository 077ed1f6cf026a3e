//! Acceptance test harness for the g42vbcloud provider
//!
//! Drives the provider in-process against the real cloud: pre-checks the
//! environment, builds fixtures through the API clients, applies generated
//! configuration step by step, and checks the remote side after each step
//! and after destroy.
//!
//! Acceptance tests only run when `TF_ACC` is set.

pub mod checks;
pub mod config;
pub mod env;
pub mod error;
pub mod fixtures;
pub mod harness;
pub mod state;

#[cfg(test)]
mod testing;

use std::sync::Arc;

use g42vb_provider::client::{ComputeApi, ComputeClient, VpcClient};
use g42vb_provider::{G42vbProvider, ProviderSettings};

pub use checks::Check;
pub use config::ConfigText;
pub use env::{AccEnv, ComputeEnv, random_name};
pub use error::HarnessError;
pub use fixtures::Fixtures;
pub use harness::{TestCase, TestStep};
pub use state::StateFile;

/// A configured provider plus the clients fixtures and checks talk through
pub struct AccContext {
    pub env: AccEnv,
    pub provider: G42vbProvider,
    pub compute: ComputeClient,
    pub vpc: VpcClient,
}

impl AccContext {
    /// Configure the provider for the pre-checked region, with credentials
    /// and the remaining settings taken from the environment
    pub async fn connect(env: AccEnv) -> Result<Self, HarnessError> {
        let settings = ProviderSettings {
            region: Some(env.region.clone()),
            ..Default::default()
        }
        .with_env_fallbacks();

        let provider = G42vbProvider::configure(&settings).await?;
        let config = provider
            .config()
            .ok_or_else(|| HarnessError::InvalidConfig("provider is not configured".into()))?;
        let compute = config.compute_client(&env.region)?;
        let vpc = config.vpc_client(&env.region)?;
        log::info!(
            "acceptance tests running in {} (project {})",
            env.region,
            config.project_id()
        );

        Ok(Self {
            env,
            provider,
            compute,
            vpc,
        })
    }

    pub fn fixtures(&self) -> Fixtures {
        Fixtures::new(self.compute.clone(), self.vpc.clone())
    }

    pub fn compute_api(&self) -> Arc<dyn ComputeApi> {
        Arc::new(self.compute.clone())
    }
}
