//! IAM client, used only to resolve the project ID of a region

use serde::Deserialize;

use super::ServiceClient;
use crate::error::ApiError;

#[derive(Debug, Clone, Deserialize)]
struct Project {
    id: String,
    name: String,
}

#[derive(Deserialize)]
struct ProjectList {
    #[serde(default)]
    projects: Vec<Project>,
}

/// IAM client
#[derive(Clone, Debug)]
pub struct IamClient {
    client: ServiceClient,
}

impl IamClient {
    pub fn new(client: ServiceClient) -> Self {
        Self { client }
    }

    /// Find the project named after the region; `None` when there is none
    pub async fn project_id_for_region(&self, region: &str) -> Result<Option<String>, ApiError> {
        let list: ProjectList = self
            .client
            .get(&format!("projects?name={}", urlencoding::encode(region)))
            .await?;
        Ok(list
            .projects
            .into_iter()
            .find(|p| p.name == region)
            .map(|p| p.id))
    }
}
