//! REST API client
//!
//! A `ServiceClient` is bound to one service endpoint in one region and
//! carries the provider credentials. Typed clients (`ComputeClient`,
//! `VpcClient`, `DcsClient`, `IamClient`) wrap it with the handful of calls
//! the provider consumes.
//!
//! HTTP 404 becomes `ApiError::NotFound`; every other non-2xx status becomes
//! `ApiError::Rejected` carrying the upstream message. Nothing is retried here.

pub mod compute;
pub mod dcs;
pub mod iam;
pub mod signer;
pub mod vpc;

use std::fmt;
use std::sync::Arc;

use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::{Method, Url};
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::ApiError;
use signer::Signer;

pub use compute::{
    AddressKind, AddressRecord, AvailabilityZone, ComputeApi, ComputeClient, CreateServerRequest,
    NetworkRef, SecurityGroupRef, Server,
};
pub use dcs::{DcsApi, DcsAvailabilityZone, DcsClient};
pub use iam::IamClient;
pub use vpc::{CreatePublicIpRequest, PublicIp, VpcClient};

/// Cloud services the provider talks to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Service {
    Compute,
    Vpc,
    Dcs,
    Iam,
}

impl Service {
    pub const ALL: [Service; 4] = [Service::Compute, Service::Vpc, Service::Dcs, Service::Iam];

    /// Key used in the `endpoints` configuration map
    pub fn key(&self) -> &'static str {
        match self {
            Service::Compute => "compute",
            Service::Vpc => "vpc",
            Service::Dcs => "dcs",
            Service::Iam => "iam",
        }
    }

    /// Host prefix in the default endpoint `https://{prefix}.{region}.{cloud}`
    fn host_prefix(&self) -> &'static str {
        match self {
            Service::Compute => "ecs",
            Service::Vpc => "vpc",
            Service::Dcs => "dcs",
            Service::Iam => "iam",
        }
    }

    /// Versioned path appended to the endpoint root
    fn version_path(&self, project_id: Option<&str>) -> String {
        match (self, project_id) {
            (Service::Compute, Some(project)) => format!("v2.1/{}", project),
            (Service::Vpc, Some(project)) => format!("v1/{}", project),
            (Service::Compute, None) => "v2.1".to_string(),
            (Service::Vpc, None) => "v1".to_string(),
            (Service::Dcs, _) => "v1.0".to_string(),
            (Service::Iam, _) => "v3".to_string(),
        }
    }

    pub fn from_key(key: &str) -> Option<Service> {
        Service::ALL.into_iter().find(|s| s.key() == key)
    }

    /// Default endpoint root for a region and cloud domain
    pub fn default_endpoint(&self, region: &str, cloud: &str) -> String {
        format!("https://{}.{}.{}", self.host_prefix(), region, cloud)
    }
}

impl fmt::Display for Service {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// How requests are authenticated
#[derive(Clone)]
pub enum Credentials {
    /// Access key / secret key, signed per request
    AkSk(Signer),
    /// Pre-issued IAM token
    Token(String),
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Credentials::AkSk(signer) => f.debug_tuple("AkSk").field(signer).finish(),
            Credentials::Token(_) => f.write_str("Token(..)"),
        }
    }
}

/// HTTP client bound to one service endpoint
#[derive(Clone, Debug)]
pub struct ServiceClient {
    http: reqwest::Client,
    credentials: Arc<Credentials>,
    service: Service,
    region: String,
    /// Always ends with '/', so relative joins keep the version path
    base_url: Url,
}

impl ServiceClient {
    pub fn new(
        http: reqwest::Client,
        credentials: Arc<Credentials>,
        service: Service,
        region: impl Into<String>,
        endpoint_root: &str,
        project_id: Option<&str>,
    ) -> Result<Self, ApiError> {
        let base = format!(
            "{}/{}/",
            endpoint_root.trim_end_matches('/'),
            service.version_path(project_id)
        );
        let base_url =
            Url::parse(&base).map_err(|e| ApiError::Url(format!("{}: {}", base, e)))?;
        Ok(Self {
            http,
            credentials,
            service,
            region: region.into(),
            base_url,
        })
    }

    pub fn service(&self) -> Service {
        self.service
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Resolve a path relative to the service base URL
    pub fn url(&self, path: &str) -> Result<Url, ApiError> {
        self.base_url
            .join(path.trim_start_matches('/'))
            .map_err(|e| ApiError::Url(format!("{}: {}", path, e)))
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        let body = self.send(Method::GET, path, None).await?;
        Ok(serde_json::from_slice(&body)?)
    }

    pub async fn post<B: Serialize, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        let payload = serde_json::to_vec(body)?;
        let body = self.send(Method::POST, path, Some(payload)).await?;
        Ok(serde_json::from_slice(&body)?)
    }

    /// POST whose response body is ignored (server actions answer 202 with no content)
    pub async fn post_action<B: Serialize>(&self, path: &str, body: &B) -> Result<(), ApiError> {
        let payload = serde_json::to_vec(body)?;
        self.send(Method::POST, path, Some(payload)).await?;
        Ok(())
    }

    pub async fn delete(&self, path: &str) -> Result<(), ApiError> {
        self.send(Method::DELETE, path, None).await?;
        Ok(())
    }

    async fn send(
        &self,
        method: Method,
        path: &str,
        body: Option<Vec<u8>>,
    ) -> Result<Vec<u8>, ApiError> {
        let url = self.url(path)?;
        log::debug!("{} {} {}", self.service, method, url);

        let payload = body.unwrap_or_default();
        let mut request = self
            .http
            .request(method.clone(), url.clone())
            .header(ACCEPT, "application/json");

        match self.credentials.as_ref() {
            Credentials::AkSk(aksk) => {
                let signature = aksk.sign(method.as_str(), &url, &payload, chrono::Utc::now());
                request = request
                    .header(signer::HEADER_DATE, signature.date)
                    .header(signer::HEADER_AUTHORIZATION, signature.authorization);
            }
            Credentials::Token(token) => {
                request = request.header("X-Auth-Token", token);
            }
        }

        if !payload.is_empty() {
            request = request.header(CONTENT_TYPE, "application/json").body(payload);
        }

        let response = request.send().await?;
        let status = response.status();
        let bytes = response.bytes().await?.to_vec();

        if status.is_success() {
            return Ok(bytes);
        }

        log::debug!("{} {} {} -> {}", self.service, method, url, status);
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(ApiError::NotFound(format!("{} {}", method, url.path())));
        }

        let (code, message) = parse_error_body(&bytes);
        Err(ApiError::Rejected {
            status: status.as_u16(),
            code,
            message: message.unwrap_or_else(|| {
                status
                    .canonical_reason()
                    .unwrap_or("unknown error")
                    .to_string()
            }),
        })
    }
}

/// Percent-encode one caller-supplied path segment.
///
/// Empty, `.` and `..` segments are refused since they would change the
/// request target once the path is joined.
pub fn path_segment(value: &str) -> Result<String, ApiError> {
    if matches!(value, "" | "." | "..") {
        return Err(ApiError::Url(format!("invalid path segment '{}'", value)));
    }
    Ok(urlencoding::encode(value).into_owned())
}

/// Extract `(code, message)` from the error bodies the platform returns.
///
/// Three shapes are seen: `{"error_code": .., "error_msg": ..}`,
/// `{"error": {"code": .., "message": ..}}` and the compute style
/// `{"badRequest": {"code": 400, "message": ..}}` keyed by fault name.
fn parse_error_body(bytes: &[u8]) -> (Option<String>, Option<String>) {
    let Ok(value) = serde_json::from_slice::<serde_json::Value>(bytes) else {
        let text = String::from_utf8_lossy(bytes).trim().to_string();
        return (None, (!text.is_empty()).then_some(text));
    };

    let as_string = |v: &serde_json::Value| match v {
        serde_json::Value::String(s) => Some(s.clone()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    };

    if let Some(msg) = value.get("error_msg").and_then(as_string) {
        return (value.get("error_code").and_then(as_string), Some(msg));
    }

    if let Some(obj) = value.as_object()
        && obj.len() == 1
        && let Some((_, fault)) = obj.iter().next()
        && let Some(msg) = fault.get("message").and_then(as_string)
    {
        return (fault.get("code").and_then(as_string), Some(msg));
    }

    (None, None)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(root: &str, service: Service, project: Option<&str>) -> ServiceClient {
        ServiceClient::new(
            reqwest::Client::new(),
            Arc::new(Credentials::Token("t".to_string())),
            service,
            "ae-ad-1",
            root,
            project,
        )
        .unwrap()
    }

    #[test]
    fn default_endpoints() {
        assert_eq!(
            Service::Compute.default_endpoint("ae-ad-1", "g42cloud.com"),
            "https://ecs.ae-ad-1.g42cloud.com"
        );
        assert_eq!(
            Service::Dcs.default_endpoint("ae-ad-1", "g42cloud.com"),
            "https://dcs.ae-ad-1.g42cloud.com"
        );
    }

    #[test]
    fn path_segments_are_encoded() {
        assert_eq!(path_segment("3f6c9d21").unwrap(), "3f6c9d21");
        assert_eq!(path_segment("a?b#c/d").unwrap(), "a%3Fb%23c%2Fd");
        for bad in ["", ".", ".."] {
            assert!(matches!(path_segment(bad), Err(ApiError::Url(_))));
        }

        let compute = client("https://ecs.ae-ad-1.g42cloud.com/", Service::Compute, Some("p1"));
        let path = format!("servers/{}", path_segment("x?y").unwrap());
        assert_eq!(
            compute.url(&path).unwrap().as_str(),
            "https://ecs.ae-ad-1.g42cloud.com/v2.1/p1/servers/x%3Fy"
        );
    }

    #[test]
    fn urls_keep_version_and_project() {
        let compute = client("https://ecs.ae-ad-1.g42cloud.com/", Service::Compute, Some("p1"));
        assert_eq!(
            compute.url("servers/abc").unwrap().as_str(),
            "https://ecs.ae-ad-1.g42cloud.com/v2.1/p1/servers/abc"
        );
        assert_eq!(
            compute.url("/servers/abc/action").unwrap().as_str(),
            "https://ecs.ae-ad-1.g42cloud.com/v2.1/p1/servers/abc/action"
        );

        let dcs = client("http://127.0.0.1:9000", Service::Dcs, Some("p1"));
        assert_eq!(
            dcs.url("availableZones").unwrap().as_str(),
            "http://127.0.0.1:9000/v1.0/availableZones"
        );
    }

    #[test]
    fn service_keys_round_trip() {
        for service in Service::ALL {
            assert_eq!(Service::from_key(service.key()), Some(service));
        }
        assert_eq!(Service::from_key("rds"), None);
    }

    #[test]
    fn parse_error_bodies() {
        assert_eq!(
            parse_error_body(br#"{"error_code":"VPC.0101","error_msg":"eip busy"}"#),
            (Some("VPC.0101".to_string()), Some("eip busy".to_string()))
        );
        assert_eq!(
            parse_error_body(br#"{"badRequest":{"code":400,"message":"No nw_info cache"}}"#),
            (Some("400".to_string()), Some("No nw_info cache".to_string()))
        );
        assert_eq!(
            parse_error_body(b"upstream timeout"),
            (None, Some("upstream timeout".to_string()))
        );
        assert_eq!(parse_error_body(b""), (None, None));
    }

    #[test]
    fn token_is_not_debug_printed() {
        let creds = Credentials::Token("secret-token".to_string());
        assert_eq!(format!("{:?}", creds), "Token(..)");
    }
}
