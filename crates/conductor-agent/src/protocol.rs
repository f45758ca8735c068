use std::sync::Arc;

use chrono::Utc;
use conductor_config::ConductorConfig;
use conductor_domain::{Node, NodeId, PowerState, ProvisionState};
use conductor_driver::DriverCatalog;
use conductor_store::StateStore;
use serde::Serialize;
use serde_json::Value;
use tracing::{info, warn};

use crate::client::AgentClient;
use crate::error::AgentError;
use crate::inventory::{self, extract_port_map, LookupPayload};
use crate::network::NetworkProvisioner;
use crate::signed_url::{build_signed_url, ObjectLocation};

#[derive(Debug, Serialize)]
pub struct LookupResponse {
    pub heartbeat_timeout: u64,
    pub node: Node,
}

/// The unauthenticated `lookup` and authenticated `heartbeat` endpoints the
/// in-band agent speaks to (spec.md §4.6). Distinct from `conductor-core`'s
/// `Conductor`: this protocol advances the deploy/tear-down state machine on
/// its own short-lived reservation, mirroring a conductor's dispatch without
/// going through its worker pool — the agent, not an API caller, drives the
/// timing of these calls.
pub struct AgentProtocol {
    store: Arc<dyn StateStore>,
    drivers: Arc<DriverCatalog>,
    network: Arc<dyn NetworkProvisioner>,
    agent_client: AgentClient,
    config: Arc<ConductorConfig>,
    /// Identity written into `reservation` while this protocol holds a
    /// node's lock; conventionally the owning conductor's hostname.
    hostname: String,
}

impl AgentProtocol {
    pub fn new(
        store: Arc<dyn StateStore>,
        drivers: Arc<DriverCatalog>,
        network: Arc<dyn NetworkProvisioner>,
        config: Arc<ConductorConfig>,
        hostname: impl Into<String>,
    ) -> Self {
        AgentProtocol {
            agent_client: AgentClient::new(config.agent_api_version.clone()),
            store,
            drivers,
            network,
            config,
            hostname: hostname.into(),
        }
    }

    /// Unauthenticated: a booting agent announces its hardware inventory
    /// and asks which node it is.
    pub async fn lookup(&self, body: &Value) -> Result<LookupResponse, AgentError> {
        let payload = LookupPayload::new(body);
        let macs = payload.mac_addresses()?;

        let ports = self.store.find_ports_by_macs(&macs).await?;
        if ports.is_empty() {
            return Err(AgentError::NodeNotFound(
                "no port matches any MAC in the lookup payload".to_string(),
            ));
        }
        let mut node_ids: Vec<_> = ports.iter().map(|p| p.node_id).collect();
        node_ids.sort();
        node_ids.dedup();
        if node_ids.len() > 1 {
            return Err(AgentError::NodeNotFound(
                "matched ports belong to more than one node".to_string(),
            ));
        }

        let mut node = self
            .store
            .get_node_by_row_id(node_ids[0])
            .await?
            .ok_or_else(|| AgentError::NodeNotFound(node_ids[0].to_string()))?;

        let wrapped = serde_json::json!({ "hardware": payload.inventory() });
        let flattened = inventory::flatten(&wrapped);
        for (path, value) in flattened {
            node.extra.insert(path, value);
        }
        node.updated_at = Some(Utc::now());
        self.store.write_node(node.clone()).await?;

        info!(node = %node.uuid, "agent lookup resolved");
        Ok(LookupResponse {
            heartbeat_timeout: self.config.heartbeat_timeout.as_secs(),
            node,
        })
    }

    /// Authenticated by node UUID. Records the agent's liveness, then
    /// advances whichever deploy/tear-down phase is in flight.
    pub async fn heartbeat(&self, node_uuid: NodeId, agent_url: String) -> Result<(), AgentError> {
        let mut node = self.store.acquire_exclusive(node_uuid, &self.hostname).await?;

        let result = self.advance(&mut node, &agent_url).await;

        match &result {
            Ok(()) => {}
            Err(e) => {
                warn!(node = %node.uuid, error = %e, "agent heartbeat branch failed");
                node.provision_state = ProvisionState::DeployFail;
                node.target_provision_state = None;
                node.last_error = Some(e.to_string());
                if let Some(driver) = self.drivers.get(&node.driver).ok() {
                    let _ = driver.set_power_state(&node, PowerState::Off).await;
                }
            }
        }

        node.updated_at = Some(Utc::now());
        let write_result = self.store.write_node(node.clone()).await;
        self.store.release(node_uuid, &self.hostname).await?;
        write_result?;
        result
    }

    async fn advance(&self, node: &mut Node, agent_url: &str) -> Result<(), AgentError> {
        node.driver_info.insert("agent_url".to_string(), Value::String(agent_url.to_string()));
        node.driver_info.insert(
            "agent_last_heartbeat".to_string(),
            Value::String(Utc::now().to_rfc3339()),
        );

        let driver = self.drivers.get(&node.driver)?;

        match node.provision_state {
            ProvisionState::DeployWait => {
                let image_info = self.build_image_info(node)?;
                let configdrive = node
                    .instance_info
                    .get("configdrive")
                    .cloned()
                    .unwrap_or(Value::Null);
                self.agent_client
                    .prepare_image(agent_url, image_info, configdrive)
                    .await?;
                node.provision_state = ProvisionState::Deploying;
            }
            ProvisionState::Deploying => {
                if self.agent_client.deploy_is_done(agent_url).await? {
                    let port_map = extract_port_map(&node.extra)?;
                    driver.set_power_state(node, PowerState::Off).await?;
                    self.network.remove_provisioning_network(node, &port_map).await?;
                    self.network.configure_instance_networks(node, &port_map).await?;
                    driver.set_boot_device(node, "disk").await?;
                    driver.set_power_state(node, PowerState::On).await?;
                    node.power_state = PowerState::On;
                    node.provision_state = ProvisionState::Active;
                    node.target_provision_state = None;
                }
                // Not done yet: nothing to advance, just recorded the heartbeat.
            }
            ProvisionState::Deleting => {
                let port_map = extract_port_map(&node.extra).unwrap_or_default();
                self.agent_client.clean_up(agent_url).await?;
                self.network.deconfigure_instance_networks(node, &port_map).await?;
                node.provision_state = ProvisionState::NoState;
                node.target_provision_state = None;
                node.instance_uuid = None;
                node.instance_info.clear();
            }
            _ => {
                // A heartbeat outside deploywait/deploying/deleting carries
                // no state transition — just the liveness update above.
            }
        }
        Ok(())
    }

    fn build_image_info(&self, node: &Node) -> Result<Value, AgentError> {
        let image_source = node
            .instance_info
            .get("image_source")
            .and_then(Value::as_str)
            .ok_or_else(|| AgentError::ImageNotFound("instance_info.image_source is not set".into()))?;

        let url = match ObjectLocation::parse_backend_url(image_source) {
            Ok((scheme_host, location)) => build_signed_url(
                &scheme_host,
                &location,
                Utc::now(),
                chrono::Duration::from_std(self.config.swift_temp_url_duration)
                    .unwrap_or(chrono::Duration::seconds(1200)),
                self.config.swift_temp_url_key.as_deref(),
                &self.config.swift_temp_url_methods,
            )?,
            // Not a direct backend URL (e.g. already an http(s) image service URL): pass through.
            Err(_) => image_source.to_string(),
        };

        let mut info = serde_json::Map::new();
        info.insert(
            "id".to_string(),
            node.instance_uuid
                .map(|u| Value::String(u.to_string()))
                .unwrap_or(Value::Null),
        );
        info.insert("urls".to_string(), Value::Array(vec![Value::String(url)]));
        if let Some(checksum) = node.instance_info.get("image_checksum") {
            info.insert("checksum".to_string(), checksum.clone());
        }
        Ok(Value::Object(info))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use conductor_domain::{MacAddress, Port, PortId};
    use conductor_driver::FakeDriver;
    use conductor_store::InMemoryStore;

    fn test_protocol() -> (AgentProtocol, Arc<InMemoryStore>) {
        let store = Arc::new(InMemoryStore::new());
        let mut catalog = DriverCatalog::new();
        catalog.register(Arc::new(FakeDriver::new()));
        let config = Arc::new(
            ConductorConfig::from_raw(&conductor_config::RawConfig::from_map(Default::default()))
                .unwrap(),
        );
        let protocol = AgentProtocol::new(
            store.clone(),
            Arc::new(catalog),
            Arc::new(crate::network::NoopNetworkProvisioner),
            config,
            "conductor-test".to_string(),
        );
        (protocol, store)
    }

    #[tokio::test]
    async fn lookup_with_no_matching_port_is_not_found() {
        let (protocol, _store) = test_protocol();
        let body = serde_json::json!({"interfaces": [{"mac_address": "aa:bb:cc:dd:ee:ff"}]});
        let result = protocol.lookup(&body).await;
        assert!(matches!(result, Err(AgentError::NodeNotFound(_))));
    }

    #[tokio::test]
    async fn lookup_v2_flattens_inventory_into_extra() {
        let (protocol, store) = test_protocol();
        let node = store.create_node(Node::new("fake")).await.unwrap();
        let mac = MacAddress::parse("AA:BB:CC:DD:EE:FF").unwrap();
        store
            .create_port(Port {
                id: PortId(uuid::Uuid::new_v4()),
                node_id: node.id,
                address: mac,
                extra: Default::default(),
            })
            .await
            .unwrap();

        let body = serde_json::json!({
            "version": "2",
            "inventory": {"interfaces": [{"mac_address": "AA:BB:CC:DD:EE:FF", "name": "eth0"}]}
        });
        let response = protocol.lookup(&body).await.unwrap();
        assert_eq!(response.node.uuid, node.uuid);
        assert_eq!(
            response.node.extra.get("hardware/interfaces/0/mac_address").unwrap(),
            "aa:bb:cc:dd:ee:ff"
        );
    }

    #[tokio::test]
    async fn heartbeat_on_unreserved_node_records_agent_url() {
        let (protocol, store) = test_protocol();
        let node = store.create_node(Node::new("fake")).await.unwrap();

        protocol
            .heartbeat(node.uuid, "http://agent.example:9999".to_string())
            .await
            .unwrap();

        let fetched = store.get_node(node.uuid).await.unwrap().unwrap();
        assert_eq!(
            fetched.driver_info.get("agent_url").unwrap(),
            "http://agent.example:9999"
        );
        assert!(fetched.reservation.is_none());
    }

    #[tokio::test]
    async fn heartbeat_advances_deploying_to_active_and_sets_boot_device() {
        use wiremock::matchers::{method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/commands"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "commands": [{"command_name": "prepare_image", "command_status": "SUCCEEDED", "command_error": null}]
            })))
            .mount(&server)
            .await;

        let (protocol, store) = test_protocol();
        let mut node = Node::new("fake");
        node.provision_state = ProvisionState::Deploying;
        node.extra.insert("hardware/interfaces/0/switch_chassis_id".to_string(), serde_json::json!("chassis-1"));
        node.extra.insert("hardware/interfaces/0/switch_port_id".to_string(), serde_json::json!("port-1"));
        let node = store.create_node(node).await.unwrap();

        protocol.heartbeat(node.uuid, server.uri()).await.unwrap();

        let fetched = store.get_node(node.uuid).await.unwrap().unwrap();
        assert_eq!(fetched.provision_state, ProvisionState::Active);
        assert!(fetched.target_provision_state.is_none());
        assert_eq!(fetched.power_state, PowerState::On);
    }
}
