//! Provider configuration
//!
//! `ProviderSettings` is what the host sends with `configure`, merged with
//! environment-variable fallbacks. `Config::build` validates it, resolves the
//! project, and constructs one `ServiceClient` per service for the region.
//! The resulting `Config` is immutable and shared by every handler.

use std::collections::HashMap;
use std::sync::Arc;

use g42vb_core::resource::Value;
use g42vb_core::schema::{AttributeSchema, AttributeType, ResourceSchema};
use reqwest::Url;
use serde::Deserialize;

use crate::client::signer::Signer;
use crate::client::{
    ComputeClient, Credentials, DcsClient, IamClient, Service, ServiceClient, VpcClient,
};
use crate::error::ConfigError;

/// Default cloud domain used to build service endpoints
pub const DEFAULT_CLOUD: &str = "g42cloud.com";

/// Environment variables consulted when a setting is not given explicitly
pub mod env {
    pub const REGION: &str = "G42VB_REGION_NAME";
    pub const ACCESS_KEY: &str = "G42VB_ACCESS_KEY";
    pub const SECRET_KEY: &str = "G42VB_SECRET_KEY";
    pub const AUTH_TOKEN: &str = "G42VB_AUTH_TOKEN";
    pub const PROJECT_ID: &str = "G42VB_PROJECT_ID";
    pub const CLOUD: &str = "G42VB_CLOUD";
    pub const INSECURE: &str = "G42VB_INSECURE";
}

/// Raw provider settings as received from the host
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProviderSettings {
    pub region: Option<String>,
    pub access_key: Option<String>,
    pub secret_key: Option<String>,
    pub token: Option<String>,
    pub project_id: Option<String>,
    pub cloud: Option<String>,
    /// Endpoint root overrides keyed by service ("compute", "vpc", "dcs", "iam")
    pub endpoints: HashMap<String, String>,
    pub insecure: Option<bool>,
}

impl ProviderSettings {
    /// Settings taken from the environment only
    pub fn from_env() -> Self {
        Self::default().with_env_fallbacks()
    }

    pub fn with_env_fallbacks(self) -> Self {
        self.with_fallbacks(|key| std::env::var(key).ok())
    }

    /// Fill unset fields from `lookup`; explicit values always win
    pub fn with_fallbacks(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        fill(&mut self.region, || get(env::REGION));
        fill(&mut self.access_key, || get(env::ACCESS_KEY));
        fill(&mut self.secret_key, || get(env::SECRET_KEY));
        fill(&mut self.token, || get(env::AUTH_TOKEN));
        fill(&mut self.project_id, || get(env::PROJECT_ID));
        fill(&mut self.cloud, || get(env::CLOUD));
        if self.insecure.is_none() {
            self.insecure = get(env::INSECURE).map(|v| matches!(v.as_str(), "1" | "true"));
        }
        self
    }

    /// Schema of the provider block, served through `get_schema`
    pub fn schema() -> ResourceSchema {
        ResourceSchema::new("provider")
            .with_description("g42vbcloud provider configuration")
            .attribute(
                AttributeSchema::new("region", AttributeType::String)
                    .with_description("Region to operate in (G42VB_REGION_NAME)"),
            )
            .attribute(
                AttributeSchema::new("access_key", AttributeType::String)
                    .with_description("Access key ID (G42VB_ACCESS_KEY)"),
            )
            .attribute(
                AttributeSchema::new("secret_key", AttributeType::String)
                    .with_description("Secret access key (G42VB_SECRET_KEY)"),
            )
            .attribute(
                AttributeSchema::new("token", AttributeType::String)
                    .with_description("IAM token, instead of an access key (G42VB_AUTH_TOKEN)"),
            )
            .attribute(
                AttributeSchema::new("project_id", AttributeType::String)
                    .with_description("Project ID; looked up by region name when unset"),
            )
            .attribute(
                AttributeSchema::new("cloud", AttributeType::String)
                    .with_default(Value::from(DEFAULT_CLOUD))
                    .with_description("Cloud domain used to build endpoints"),
            )
            .attribute(
                AttributeSchema::new("endpoints", AttributeType::Map(Box::new(AttributeType::String)))
                    .with_description("Endpoint root overrides keyed by service"),
            )
            .attribute(AttributeSchema::new("insecure", AttributeType::Bool))
    }
}

fn fill(slot: &mut Option<String>, fallback: impl FnOnce() -> Option<String>) {
    let unset = slot.as_deref().is_none_or(|v| v.trim().is_empty());
    if unset {
        *slot = fallback();
    }
}

/// Settings after validation, before any network call
#[derive(Debug)]
struct Resolved {
    region: String,
    cloud: String,
    credentials: Credentials,
    project_id: Option<String>,
    endpoints: HashMap<Service, String>,
    insecure: bool,
}

fn resolve(settings: &ProviderSettings) -> Result<Resolved, ConfigError> {
    let non_empty = |v: &Option<String>| v.as_deref().map(str::trim).filter(|v| !v.is_empty()).map(str::to_string);

    let region = non_empty(&settings.region).ok_or(ConfigError::MissingRegion)?;

    let credentials = match (
        non_empty(&settings.access_key),
        non_empty(&settings.secret_key),
        non_empty(&settings.token),
    ) {
        (Some(ak), Some(sk), _) => Credentials::AkSk(Signer::new(ak, sk)),
        (Some(_), None, _) | (None, Some(_), _) => return Err(ConfigError::PartialAccessKey),
        (None, None, Some(token)) => Credentials::Token(token),
        (None, None, None) => return Err(ConfigError::MissingCredentials),
    };

    let mut endpoints = HashMap::new();
    for (key, url) in &settings.endpoints {
        let service =
            Service::from_key(key).ok_or_else(|| ConfigError::UnknownService(key.clone()))?;
        let valid = Url::parse(url)
            .map(|u| matches!(u.scheme(), "http" | "https"))
            .unwrap_or(false);
        if !valid {
            return Err(ConfigError::InvalidEndpoint {
                service: key.clone(),
                url: url.clone(),
            });
        }
        endpoints.insert(service, url.clone());
    }

    Ok(Resolved {
        region,
        cloud: non_empty(&settings.cloud).unwrap_or_else(|| DEFAULT_CLOUD.to_string()),
        credentials,
        project_id: non_empty(&settings.project_id),
        endpoints,
        insecure: settings.insecure.unwrap_or(false),
    })
}

/// Validated, immutable provider configuration
#[derive(Debug)]
pub struct Config {
    region: String,
    cloud: String,
    project_id: String,
    endpoints: HashMap<Service, String>,
    credentials: Arc<Credentials>,
    http: reqwest::Client,
    clients: HashMap<Service, ServiceClient>,
}

impl Config {
    /// Check settings without touching the network
    pub fn validate(settings: &ProviderSettings) -> Result<(), ConfigError> {
        resolve(settings).map(|_| ())
    }

    /// Validate settings, resolve the project and build the service clients
    pub async fn build(settings: &ProviderSettings) -> Result<Self, ConfigError> {
        let resolved = resolve(settings)?;

        let http = reqwest::Client::builder()
            .user_agent(concat!("terraform-provider-g42vbcloud/", env!("CARGO_PKG_VERSION")))
            .danger_accept_invalid_certs(resolved.insecure)
            .build()?;
        let credentials = Arc::new(resolved.credentials);

        let endpoint_for = |service: Service| {
            resolved
                .endpoints
                .get(&service)
                .cloned()
                .unwrap_or_else(|| service.default_endpoint(&resolved.region, &resolved.cloud))
        };

        let project_id = match resolved.project_id {
            Some(id) => id,
            None => {
                let iam = ServiceClient::new(
                    http.clone(),
                    credentials.clone(),
                    Service::Iam,
                    &resolved.region,
                    &endpoint_for(Service::Iam),
                    None,
                )
                .map_err(ConfigError::ProjectLookup)?;
                IamClient::new(iam)
                    .project_id_for_region(&resolved.region)
                    .await
                    .map_err(ConfigError::ProjectLookup)?
                    .ok_or_else(|| ConfigError::ProjectNotFound(resolved.region.clone()))?
            }
        };

        let mut clients = HashMap::new();
        for service in Service::ALL {
            let endpoint = endpoint_for(service);
            let client = ServiceClient::new(
                http.clone(),
                credentials.clone(),
                service,
                &resolved.region,
                &endpoint,
                Some(&project_id),
            )
            .map_err(|_| ConfigError::InvalidEndpoint {
                service: service.key().to_string(),
                url: endpoint.clone(),
            })?;
            clients.insert(service, client);
        }

        log::info!(
            "configured provider for region {} (project {})",
            resolved.region,
            project_id
        );

        Ok(Self {
            region: resolved.region,
            cloud: resolved.cloud,
            project_id,
            endpoints: resolved.endpoints,
            credentials,
            http,
            clients,
        })
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    pub fn cloud(&self) -> &str {
        &self.cloud
    }

    pub fn project_id(&self) -> &str {
        &self.project_id
    }

    /// Client for `service` in `region`.
    ///
    /// The configured region is served from the clients built at configure
    /// time. Other regions share the credentials but only work for services
    /// whose paths do not embed the project (DCS, IAM).
    pub fn service_client(&self, service: Service, region: &str) -> Result<ServiceClient, ConfigError> {
        if region == self.region
            && let Some(client) = self.clients.get(&service)
        {
            return Ok(client.clone());
        }

        if matches!(service, Service::Compute | Service::Vpc) {
            return Err(ConfigError::ProjectNotFound(region.to_string()));
        }

        let endpoint = self
            .endpoints
            .get(&service)
            .cloned()
            .unwrap_or_else(|| service.default_endpoint(region, &self.cloud));
        ServiceClient::new(
            self.http.clone(),
            self.credentials.clone(),
            service,
            region,
            &endpoint,
            None,
        )
        .map_err(|_| ConfigError::InvalidEndpoint {
            service: service.key().to_string(),
            url: endpoint,
        })
    }

    pub fn compute_client(&self, region: &str) -> Result<ComputeClient, ConfigError> {
        self.service_client(Service::Compute, region)
            .map(ComputeClient::new)
    }

    pub fn vpc_client(&self, region: &str) -> Result<VpcClient, ConfigError> {
        self.service_client(Service::Vpc, region).map(VpcClient::new)
    }

    pub fn dcs_client(&self, region: &str) -> Result<DcsClient, ConfigError> {
        self.service_client(Service::Dcs, region).map(DcsClient::new)
    }
}
