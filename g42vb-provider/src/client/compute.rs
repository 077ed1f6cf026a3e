//! Compute (ECS, nova-compatible v2.1) client

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::{ServiceClient, path_segment};
use crate::error::ApiError;

/// Discriminator of an address entry on a server
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AddressKind {
    /// Private address intrinsic to the server's network attachment
    Fixed,
    /// Public address attached independently of the server lifecycle
    Floating,
    #[default]
    #[serde(other)]
    Unknown,
}

/// One address entry of a server on one network
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressRecord {
    #[serde(rename = "OS-EXT-IPS:type", default)]
    pub kind: AddressKind,
    #[serde(rename = "addr")]
    pub address: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<u8>,
    #[serde(
        rename = "OS-EXT-IPS-MAC:mac_addr",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub mac_addr: Option<String>,
}

impl AddressRecord {
    pub fn new(kind: AddressKind, address: impl Into<String>) -> Self {
        Self {
            kind,
            address: address.into(),
            version: None,
            mac_addr: None,
        }
    }

    /// Whether this entry shows `public_ip` bound to the server.
    ///
    /// Entries typed `fixed` are accepted as well as `floating`. That
    /// conflation is long-standing behaviour of this resource and is kept
    /// for compatibility with existing state.
    pub fn marks_association(&self, public_ip: &str) -> bool {
        matches!(self.kind, AddressKind::Floating | AddressKind::Fixed)
            && self.address == public_ip
    }
}

/// A compute instance as returned by `GET /servers/{id}`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Server {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub status: String,
    #[serde(rename = "accessIPv4", default)]
    pub access_ipv4: String,
    /// Addresses keyed by network name
    #[serde(default)]
    pub addresses: BTreeMap<String, Vec<AddressRecord>>,
}

impl Server {
    /// Find the network carrying `public_ip` as an associated address
    pub fn find_association(&self, public_ip: &str) -> Option<(&str, &AddressRecord)> {
        self.addresses.iter().find_map(|(network, records)| {
            records
                .iter()
                .find(|r| r.marks_association(public_ip))
                .map(|r| (network.as_str(), r))
        })
    }

    /// First fixed address on a network
    pub fn fixed_address_on(&self, network: &str) -> Option<&str> {
        self.addresses
            .get(network)?
            .iter()
            .find(|r| r.kind == AddressKind::Fixed)
            .map(|r| r.address.as_str())
    }
}

#[derive(Deserialize)]
struct ServerEnvelope {
    server: Server,
}

/// Compute availability zone
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AvailabilityZone {
    pub name: String,
    pub available: bool,
}

#[derive(Deserialize)]
struct ZoneList {
    #[serde(rename = "availabilityZoneInfo", default)]
    zones: Vec<ZoneInfo>,
}

#[derive(Deserialize)]
struct ZoneInfo {
    #[serde(rename = "zoneName")]
    name: String,
    #[serde(rename = "zoneState", default)]
    state: ZoneState,
}

#[derive(Deserialize, Default)]
struct ZoneState {
    #[serde(default)]
    available: bool,
}

/// Request body fields for creating a server
#[derive(Debug, Clone, Serialize)]
pub struct CreateServerRequest {
    pub name: String,
    #[serde(rename = "imageRef")]
    pub image_ref: String,
    #[serde(rename = "flavorRef")]
    pub flavor_ref: String,
    pub availability_zone: String,
    pub networks: Vec<NetworkRef>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub security_groups: Vec<SecurityGroupRef>,
}

#[derive(Debug, Clone, Serialize)]
pub struct NetworkRef {
    pub uuid: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SecurityGroupRef {
    pub name: String,
}

#[derive(Deserialize)]
struct CreatedServer {
    server: CreatedServerId,
}

#[derive(Deserialize)]
struct CreatedServerId {
    id: String,
}

/// Compute operations the resource handlers depend on
#[async_trait]
pub trait ComputeApi: Send + Sync {
    async fn get_server(&self, server_id: &str) -> Result<Server, ApiError>;

    async fn associate_floating_ip(
        &self,
        server_id: &str,
        floating_ip: &str,
        fixed_ip: Option<&str>,
    ) -> Result<(), ApiError>;

    async fn disassociate_floating_ip(
        &self,
        server_id: &str,
        floating_ip: &str,
    ) -> Result<(), ApiError>;

    async fn list_availability_zones(&self) -> Result<Vec<AvailabilityZone>, ApiError>;
}

/// Compute client
#[derive(Clone, Debug)]
pub struct ComputeClient {
    client: ServiceClient,
    poll_interval: Duration,
}

impl ComputeClient {
    pub fn new(client: ServiceClient) -> Self {
        Self {
            client,
            poll_interval: Duration::from_secs(5),
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn service_client(&self) -> &ServiceClient {
        &self.client
    }

    /// Create a server, returning its ID. The server is still building.
    pub async fn create_server(&self, request: &CreateServerRequest) -> Result<String, ApiError> {
        let created: CreatedServer = self
            .client
            .post("servers", &json!({ "server": request }))
            .await?;
        Ok(created.server.id)
    }

    pub async fn delete_server(&self, server_id: &str) -> Result<(), ApiError> {
        self.client
            .delete(&format!("servers/{}", path_segment(server_id)?))
            .await
    }

    /// Poll until the server reaches `target` status.
    ///
    /// `"DELETED"` is satisfied by a 404. An `ERROR` status fails immediately.
    pub async fn wait_for_server_status(
        &self,
        server_id: &str,
        target: &str,
        timeout: Duration,
    ) -> Result<(), ApiError> {
        let max_attempts = (timeout.as_millis() / self.poll_interval.as_millis().max(1)).max(1);

        for _ in 0..max_attempts {
            match self.get_server(server_id).await {
                Ok(server) if server.status.eq_ignore_ascii_case(target) => return Ok(()),
                Ok(server) if server.status.eq_ignore_ascii_case("ERROR") => {
                    return Err(ApiError::Rejected {
                        status: 500,
                        code: None,
                        message: format!("server {} entered ERROR status", server_id),
                    });
                }
                Ok(server) => {
                    log::debug!(
                        "server {} is {}, waiting for {}",
                        server_id,
                        server.status,
                        target
                    );
                }
                Err(e) if e.is_not_found() && target.eq_ignore_ascii_case("DELETED") => {
                    return Ok(());
                }
                Err(e) => return Err(e),
            }
            tokio::time::sleep(self.poll_interval).await;
        }

        Err(ApiError::Timeout(
            timeout.as_secs(),
            format!("server {} to become {}", server_id, target),
        ))
    }
}

#[async_trait]
impl ComputeApi for ComputeClient {
    async fn get_server(&self, server_id: &str) -> Result<Server, ApiError> {
        let envelope: ServerEnvelope = self
            .client
            .get(&format!("servers/{}", path_segment(server_id)?))
            .await?;
        Ok(envelope.server)
    }

    async fn associate_floating_ip(
        &self,
        server_id: &str,
        floating_ip: &str,
        fixed_ip: Option<&str>,
    ) -> Result<(), ApiError> {
        let mut action = json!({ "address": floating_ip });
        if let Some(fixed) = fixed_ip {
            action["fixed_address"] = json!(fixed);
        }
        self.client
            .post_action(
                &format!("servers/{}/action", path_segment(server_id)?),
                &json!({ "addFloatingIp": action }),
            )
            .await
    }

    async fn disassociate_floating_ip(
        &self,
        server_id: &str,
        floating_ip: &str,
    ) -> Result<(), ApiError> {
        self.client
            .post_action(
                &format!("servers/{}/action", path_segment(server_id)?),
                &json!({ "removeFloatingIp": { "address": floating_ip } }),
            )
            .await
    }

    async fn list_availability_zones(&self) -> Result<Vec<AvailabilityZone>, ApiError> {
        let list: ZoneList = self.client.get("os-availability-zone").await?;
        Ok(list
            .zones
            .into_iter()
            .map(|z| AvailabilityZone {
                name: z.name,
                available: z.state.available,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{Credentials, Service};
    use std::sync::Arc;
    use wiremock::matchers::{body_json, header, header_exists, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn compute_client(server: &MockServer) -> ComputeClient {
        let client = ServiceClient::new(
            reqwest::Client::new(),
            Arc::new(Credentials::Token("tok".to_string())),
            Service::Compute,
            "ae-ad-1",
            &server.uri(),
            Some("proj"),
        )
        .unwrap();
        ComputeClient::new(client).with_poll_interval(Duration::from_millis(10))
    }

    fn server_body(status: &str) -> serde_json::Value {
        json!({
            "server": {
                "id": "srv-1",
                "name": "tf-acc-test",
                "status": status,
                "accessIPv4": "192.168.0.10",
                "addresses": {
                    "subnet-a": [
                        {"addr": "192.168.0.10", "version": 4, "OS-EXT-IPS:type": "fixed",
                         "OS-EXT-IPS-MAC:mac_addr": "fa:16:3e:00:00:01"},
                        {"addr": "80.158.1.2", "version": 4, "OS-EXT-IPS:type": "floating"}
                    ]
                }
            }
        })
    }

    #[test]
    fn address_kinds_deserialize_strictly() {
        let records: Vec<AddressRecord> = serde_json::from_value(json!([
            {"addr": "10.0.0.1", "OS-EXT-IPS:type": "fixed"},
            {"addr": "80.0.0.1", "OS-EXT-IPS:type": "floating"},
            {"addr": "fe80::1", "OS-EXT-IPS:type": "ipv6-ll"},
            {"addr": "10.0.0.2"}
        ]))
        .unwrap();
        let kinds: Vec<AddressKind> = records.iter().map(|r| r.kind).collect();
        assert_eq!(
            kinds,
            vec![
                AddressKind::Fixed,
                AddressKind::Floating,
                AddressKind::Unknown,
                AddressKind::Unknown
            ]
        );
    }

    #[test]
    fn marks_association_accepts_floating_and_fixed() {
        assert!(AddressRecord::new(AddressKind::Floating, "80.0.0.1").marks_association("80.0.0.1"));
        assert!(AddressRecord::new(AddressKind::Fixed, "80.0.0.1").marks_association("80.0.0.1"));
        assert!(!AddressRecord::new(AddressKind::Unknown, "80.0.0.1").marks_association("80.0.0.1"));
        assert!(!AddressRecord::new(AddressKind::Floating, "80.0.0.2").marks_association("80.0.0.1"));
    }

    #[test]
    fn find_association_and_fixed_address() {
        let server: Server = serde_json::from_value(server_body("ACTIVE")["server"].clone()).unwrap();
        let (network, record) = server.find_association("80.158.1.2").unwrap();
        assert_eq!(network, "subnet-a");
        assert_eq!(record.kind, AddressKind::Floating);
        assert_eq!(server.fixed_address_on(network), Some("192.168.0.10"));
        assert!(server.find_association("80.158.9.9").is_none());
    }

    #[tokio::test]
    async fn get_server_decodes_addresses() {
        let mock = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v2.1/proj/servers/srv-1"))
            .and(header("X-Auth-Token", "tok"))
            .respond_with(ResponseTemplate::new(200).set_body_json(server_body("ACTIVE")))
            .mount(&mock)
            .await;

        let server = compute_client(&mock).get_server("srv-1").await.unwrap();
        assert_eq!(server.status, "ACTIVE");
        assert_eq!(server.access_ipv4, "192.168.0.10");
        assert_eq!(server.addresses["subnet-a"].len(), 2);
    }

    #[tokio::test]
    async fn get_missing_server_is_not_found() {
        let mock = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v2.1/proj/servers/gone"))
            .respond_with(ResponseTemplate::new(404).set_body_json(
                json!({"itemNotFound": {"code": 404, "message": "Instance gone could not be found."}}),
            ))
            .mount(&mock)
            .await;

        let err = compute_client(&mock).get_server("gone").await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn associate_sends_fixed_address_when_pinned() {
        let mock = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v2.1/proj/servers/srv-1/action"))
            .and(header_exists("content-type"))
            .and(body_json(json!({
                "addFloatingIp": {"address": "80.158.1.2", "fixed_address": "192.168.0.10"}
            })))
            .respond_with(ResponseTemplate::new(202))
            .expect(1)
            .mount(&mock)
            .await;

        compute_client(&mock)
            .associate_floating_ip("srv-1", "80.158.1.2", Some("192.168.0.10"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn associate_rejection_carries_upstream_message() {
        let mock = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v2.1/proj/servers/srv-1/action"))
            .and(body_json(json!({"addFloatingIp": {"address": "80.158.1.2"}})))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "badRequest": {"code": 400, "message": "floating ip 80.158.1.2 is already associated"}
            })))
            .mount(&mock)
            .await;

        let err = compute_client(&mock)
            .associate_floating_ip("srv-1", "80.158.1.2", None)
            .await
            .unwrap_err();
        match err {
            ApiError::Rejected {
                status, message, ..
            } => {
                assert_eq!(status, 400);
                assert_eq!(message, "floating ip 80.158.1.2 is already associated");
            }
            other => panic!("expected Rejected, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn disassociate_posts_remove_action() {
        let mock = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v2.1/proj/servers/srv-1/action"))
            .and(body_json(json!({"removeFloatingIp": {"address": "80.158.1.2"}})))
            .respond_with(ResponseTemplate::new(202))
            .expect(1)
            .mount(&mock)
            .await;

        compute_client(&mock)
            .disassociate_floating_ip("srv-1", "80.158.1.2")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn list_zones() {
        let mock = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v2.1/proj/os-availability-zone"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "availabilityZoneInfo": [
                    {"zoneName": "ae-ad-1b", "zoneState": {"available": true}, "hosts": null},
                    {"zoneName": "ae-ad-1a", "zoneState": {"available": false}, "hosts": null}
                ]
            })))
            .mount(&mock)
            .await;

        let zones = compute_client(&mock).list_availability_zones().await.unwrap();
        assert_eq!(zones.len(), 2);
        assert_eq!(zones[0].name, "ae-ad-1b");
        assert!(zones[0].available);
        assert!(!zones[1].available);
    }

    #[tokio::test]
    async fn create_server_and_wait_until_active() {
        let mock = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v2.1/proj/servers"))
            .respond_with(
                ResponseTemplate::new(202).set_body_json(json!({"server": {"id": "srv-1"}})),
            )
            .mount(&mock)
            .await;
        Mock::given(method("GET"))
            .and(path("/v2.1/proj/servers/srv-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(server_body("BUILD")))
            .up_to_n_times(2)
            .mount(&mock)
            .await;
        Mock::given(method("GET"))
            .and(path("/v2.1/proj/servers/srv-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(server_body("ACTIVE")))
            .mount(&mock)
            .await;

        let client = compute_client(&mock);
        let id = client
            .create_server(&CreateServerRequest {
                name: "tf-acc-test".to_string(),
                image_ref: "img".to_string(),
                flavor_ref: "s3.small.1".to_string(),
                availability_zone: "ae-ad-1a".to_string(),
                networks: vec![NetworkRef {
                    uuid: "net".to_string(),
                }],
                security_groups: vec![],
            })
            .await
            .unwrap();
        assert_eq!(id, "srv-1");

        client
            .wait_for_server_status(&id, "ACTIVE", Duration::from_secs(5))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn wait_for_deleted_accepts_not_found() {
        let mock = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v2.1/proj/servers/srv-1"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&mock)
            .await;

        compute_client(&mock)
            .wait_for_server_status("srv-1", "DELETED", Duration::from_secs(1))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn wait_times_out() {
        let mock = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v2.1/proj/servers/srv-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(server_body("BUILD")))
            .mount(&mock)
            .await;

        let err = compute_client(&mock)
            .wait_for_server_status("srv-1", "ACTIVE", Duration::from_millis(50))
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Timeout(..)));
    }
}
