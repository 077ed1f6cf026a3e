//! Environment pre-checks for acceptance tests

use crate::error::HarnessError;

pub const TF_ACC: &str = "TF_ACC";
pub const REGION: &str = "G42VB_REGION_NAME";
pub const IMAGE_ID: &str = "G42VB_IMAGE_ID";
pub const FLAVOR_ID: &str = "G42VB_FLAVOR_ID";
pub const NETWORK_ID: &str = "G42VB_NETWORK_ID";

/// Settings every acceptance test needs
#[derive(Debug, Clone, PartialEq)]
pub struct AccEnv {
    pub region: String,
}

/// Extra settings for tests that boot a compute instance
#[derive(Debug, Clone, PartialEq)]
pub struct ComputeEnv {
    pub image_id: String,
    pub flavor_id: String,
    pub network_id: String,
}

impl AccEnv {
    /// `Ok(None)` when acceptance tests are not enabled.
    ///
    /// Once `TF_ACC` is set, a missing region is a hard failure rather than
    /// a skip.
    pub fn pre_check() -> Result<Option<Self>, HarnessError> {
        Self::pre_check_with(|key| std::env::var(key).ok())
    }

    pub fn pre_check_with(
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Option<Self>, HarnessError> {
        if non_empty(lookup(TF_ACC)).is_none() {
            log::info!("{} not set, skipping acceptance test", TF_ACC);
            return Ok(None);
        }
        let region = non_empty(lookup(REGION)).ok_or(HarnessError::MissingEnv(REGION))?;
        Ok(Some(Self { region }))
    }
}

impl ComputeEnv {
    pub fn from_env() -> Result<Self, HarnessError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, HarnessError> {
        let get = |key: &'static str| non_empty(lookup(key)).ok_or(HarnessError::MissingEnv(key));
        Ok(Self {
            image_id: get(IMAGE_ID)?,
            flavor_id: get(FLAVOR_ID)?,
            network_id: get(NETWORK_ID)?,
        })
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// Random resource name, `tf-acc-test-xxxxx`
pub fn random_name() -> String {
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    format!("tf-acc-test-{}", &suffix[..5])
}
