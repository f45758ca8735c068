use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};

use chrono::Utc;
use conductor_agent::NetworkProvisioner;
use conductor_domain::{Attrs, Node, NodeId, Port, PowerState, ProvisionState};
use conductor_driver::{tftp, ConsoleInfo, DeployOutcome, DriverCatalog, InterfaceValidation, TearDownOutcome};
use conductor_ring::DriverRegistry;
use conductor_config::ConductorConfig;
use conductor_store::StateStore;
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::error::ConductorError;
use crate::pool::WorkerPool;
use crate::task::TaskManager;

/// Owns dispatch for one conductor process: validates preconditions,
/// acquires tasks, spawns workers, and runs the periodic loops (spec.md
/// §2, §4.5). Constructed once at process start with an explicit context
/// (repository, driver catalog, configuration) — no global mutable state.
pub struct Conductor {
    store: Arc<dyn StateStore>,
    drivers: Arc<DriverCatalog>,
    config: Arc<ConductorConfig>,
    pool: Arc<WorkerPool>,
    tasks: TaskManager,
    /// External network-provider collaborator (spec.md §4.7), consulted
    /// by `update_port` when a port's MAC address changes.
    network: Arc<dyn NetworkProvisioner>,
    hostname: String,
    /// Non-default `conductor_group`s this process serves; a node whose
    /// `conductor_group` isn't in this set is never considered mapped
    /// here, regardless of what the ring says (spec_full.md §4.5).
    conductor_groups: Vec<String>,
    ring: RwLock<DriverRegistry>,
    /// Per-node consecutive drive-to-recorded-state failures, consulted
    /// only by the power sync loop. Process-local and reset on restart —
    /// exactly the "stateless conductor restart" model spec.md §1 assumes.
    power_retry_counts: Mutex<HashMap<NodeId, u32>>,
}

impl Conductor {
    pub fn new(
        store: Arc<dyn StateStore>,
        drivers: Arc<DriverCatalog>,
        config: Arc<ConductorConfig>,
        network: Arc<dyn NetworkProvisioner>,
        hostname: impl Into<String>,
        conductor_groups: Vec<String>,
    ) -> Self {
        let hostname = hostname.into();
        let pool = Arc::new(WorkerPool::new(config.rpc_thread_pool_size));
        let tasks = TaskManager::new(store.clone(), drivers.clone(), hostname.clone());
        Conductor {
            store,
            drivers,
            config,
            pool,
            tasks,
            network,
            hostname,
            conductor_groups,
            ring: RwLock::new(DriverRegistry::default()),
            power_retry_counts: Mutex::new(HashMap::new()),
        }
    }

    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    fn serves_group(&self, node: &Node) -> bool {
        self.conductor_groups.iter().any(|g| g == &node.conductor_group)
    }

    /// Whether `node` is mapped to this conductor: its `conductor_group`
    /// must be one this process serves, and this host must be first in
    /// the driver-scoped ring for the node's UUID.
    pub(crate) async fn is_mapped(&self, node: &Node) -> Result<bool, ConductorError> {
        if !self.serves_group(node) {
            return Ok(false);
        }
        let registry = self.ring.read().await;
        let now = Utc::now();
        Ok(registry.is_mapped_to(
            &self.hostname,
            &node.uuid.to_string(),
            &node.driver,
            now,
            chrono::Duration::from_std(self.config.heartbeat_timeout)
                .unwrap_or_else(|_| chrono::Duration::seconds(60)),
        )?)
    }

    // ── node CRUD (REST surface, spec.md §6) ────────────────────────────

    pub async fn get_node(&self, node_uuid: NodeId) -> Result<Node, ConductorError> {
        self.store
            .get_node(node_uuid)
            .await?
            .ok_or_else(|| ConductorError::NodeNotFound(node_uuid.to_string()))
    }

    pub async fn list_nodes(&self) -> Result<Vec<Node>, ConductorError> {
        Ok(self.store.list_nodes().await?)
    }

    pub async fn create_node(&self, node: Node) -> Result<Node, ConductorError> {
        self.drivers.get(&node.driver)?;
        Ok(self.store.create_node(node).await?)
    }

    // ── update_node ──────────────────────────────────────────────────────

    pub async fn update_node(&self, updated: Node) -> Result<Node, ConductorError> {
        let mut task = self.tasks.acquire_exclusive(updated.uuid).await?;
        match self.apply_update(&mut task.node, &updated).await {
            Ok(()) => {
                let node = task.node.clone();
                let write_result = self.store.write_node(node.clone()).await;
                task.release().await?;
                write_result?;
                Ok(node)
            }
            Err(e) => {
                task.release().await.ok();
                Err(e)
            }
        }
    }

    async fn apply_update(&self, current: &mut Node, updated: &Node) -> Result<(), ConductorError> {
        if current.target_provision_state.is_some() || current.target_power_state.is_some() {
            return Err(ConductorError::NodeLocked {
                node: current.uuid.to_string(),
                holder: "transition-in-progress".to_string(),
            });
        }
        if updated.instance_uuid != current.instance_uuid
            && !matches!(current.power_state, PowerState::Off | PowerState::NoState)
        {
            return Err(ConductorError::NodeInWrongPowerState);
        }
        if updated.driver != current.driver {
            // Reroute: the new driver name must resolve before we commit to it.
            self.drivers.get(&updated.driver)?;
        }
        current.driver = updated.driver.clone();
        current.name = updated.name.clone();
        current.instance_uuid = updated.instance_uuid;
        current.instance_info = updated.instance_info.clone();
        current.extra = updated.extra.clone();
        current.properties = updated.properties.clone();
        current.conductor_group = updated.conductor_group.clone();
        current.updated_at = Some(Utc::now());
        Ok(())
    }

    // ── power ────────────────────────────────────────────────────────────

    pub async fn change_node_power_state(
        &self,
        node_uuid: NodeId,
        target: PowerState,
    ) -> Result<(), ConductorError> {
        if !matches!(target, PowerState::On | PowerState::Off | PowerState::Reboot) {
            return Err(ConductorError::InvalidParameterValue(format!(
                "power target must be on/off/reboot, got {target}"
            )));
        }

        let mut task = self.tasks.acquire_exclusive(node_uuid).await?;
        task.node.target_power_state = Some(target);
        task.node.updated_at = Some(Utc::now());
        if let Err(e) = self.store.write_node(task.node.clone()).await {
            task.release().await.ok();
            return Err(e.into());
        }

        let store = self.store.clone();
        self.pool
            .spawn_task(task, move |mut task| async move {
                let result = task.driver.set_power_state(&task.node, target).await;
                match result {
                    Ok(observed) => {
                        task.node.power_state = observed;
                        task.node.target_power_state = None;
                        task.node.last_error = None;
                    }
                    Err(e) => {
                        task.node.target_power_state = None;
                        task.node.last_error = Some(e.to_string());
                    }
                }
                task.node.updated_at = Some(Utc::now());
                let node = task.node.clone();
                if let Err(e) = store.write_node(node).await {
                    warn!(error = %e, "failed to persist power worker result");
                }
                if let Err(e) = task.release().await {
                    warn!(error = %e, "failed to release task after power worker");
                }
            })
            .await
    }

    // ── vendor passthru ──────────────────────────────────────────────────

    pub async fn vendor_passthru(
        &self,
        node_uuid: NodeId,
        method: String,
        info: Attrs,
    ) -> Result<(), ConductorError> {
        let task = self.tasks.acquire_exclusive(node_uuid).await?;
        if !task.driver.supports_vendor() {
            task.release().await.ok();
            return Err(ConductorError::UnsupportedDriverExtension(method));
        }

        let store = self.store.clone();
        self.pool
            .spawn_task(task, move |mut task| async move {
                if let Err(e) = task.driver.vendor_passthru(&task.node, &method, &info).await {
                    task.node.last_error = Some(e.to_string());
                    task.node.updated_at = Some(Utc::now());
                    let node = task.node.clone();
                    if let Err(e) = store.write_node(node).await {
                        warn!(error = %e, "failed to persist vendor_passthru failure");
                    }
                }
                if let Err(e) = task.release().await {
                    warn!(error = %e, "failed to release task after vendor_passthru");
                }
            })
            .await
    }

    pub async fn driver_vendor_passthru(
        &self,
        driver: &str,
        method: &str,
        info: &Attrs,
    ) -> Result<Value, ConductorError> {
        let bound = self.drivers.get(driver)?;
        Ok(bound.driver_vendor_passthru(method, info).await?)
    }

    // ── deploy / tear down ───────────────────────────────────────────────

    pub async fn do_node_deploy(&self, node_uuid: NodeId) -> Result<(), ConductorError> {
        let mut task = self.tasks.acquire_exclusive(node_uuid).await?;

        // NoValidHost surfaces unchanged — the node never reached an
        // in-progress deploy state, so there is nothing to fail out of.
        match self.is_mapped(&task.node).await {
            Ok(true) => {}
            Ok(false) => {
                task.release().await.ok();
                return Err(ConductorError::NoValidHost);
            }
            Err(e) => {
                task.release().await.ok();
                return Err(e);
            }
        }

        if task.node.maintenance {
            task.release().await.ok();
            return Err(ConductorError::NodeInMaintenance);
        }
        if !task.node.provision_state.can_deploy() {
            task.release().await.ok();
            return Err(ConductorError::InstanceDeployFailure(format!(
                "cannot deploy from provision_state={}",
                task.node.provision_state
            )));
        }
        if let Err(e) = task.driver.validate_deploy(&task.node).await {
            task.release().await.ok();
            return Err(e.into());
        }

        let ports = self.store.list_ports_by_node(task.node.uuid).await.unwrap_or_default();
        let macs: Vec<_> = ports.into_iter().map(|p| p.address).collect();
        let token = uuid::Uuid::new_v4().to_string();
        let boot_config = format!(
            "# boot config for {}\nimage={}\n",
            task.node.uuid,
            task.node.instance_info.get("image_source").and_then(|v| v.as_str()).unwrap_or("")
        );
        if let Err(e) = tftp::write_boot_config(
            Path::new(&self.config.tftp_root),
            task.node.uuid.0,
            &macs,
            &boot_config,
            &token,
        ) {
            task.release().await.ok();
            return Err(ConductorError::InstanceDeployFailure(format!(
                "failed to write tftp boot config: {e}"
            )));
        }

        task.node.provision_state = ProvisionState::Deploying;
        task.node.target_provision_state = Some(ProvisionState::Active);
        task.node.provision_updated_at = Some(Utc::now());
        task.node.last_error = None;
        if let Err(e) = self.store.write_node(task.node.clone()).await {
            task.release().await.ok();
            return Err(e.into());
        }

        let store = self.store.clone();
        self.pool
            .spawn_task(task, move |mut task| async move {
                match task.driver.deploy(&task.node).await {
                    Ok(DeployOutcome::Active) => {
                        task.node.provision_state = ProvisionState::Active;
                        task.node.target_provision_state = None;
                    }
                    Ok(DeployOutcome::DeployWait) => {
                        task.node.provision_state = ProvisionState::DeployWait;
                    }
                    Err(e) => {
                        task.node.provision_state = ProvisionState::DeployFail;
                        task.node.target_provision_state = None;
                        task.node.last_error = Some(e.to_string());
                    }
                }
                task.node.provision_updated_at = Some(Utc::now());
                task.node.updated_at = Some(Utc::now());
                let node = task.node.clone();
                if let Err(e) = store.write_node(node).await {
                    warn!(error = %e, "failed to persist deploy worker result");
                }
                if let Err(e) = task.release().await {
                    warn!(error = %e, "failed to release task after deploy worker");
                }
            })
            .await
    }

    pub async fn do_node_tear_down(&self, node_uuid: NodeId) -> Result<(), ConductorError> {
        let mut task = self.tasks.acquire_exclusive(node_uuid).await?;
        if !task.node.provision_state.can_tear_down() {
            task.release().await.ok();
            return Err(ConductorError::InstanceDeployFailure(format!(
                "cannot tear down from provision_state={}",
                task.node.provision_state
            )));
        }

        task.node.provision_state = ProvisionState::Deleting;
        task.node.target_provision_state = Some(ProvisionState::NoState);
        task.node.provision_updated_at = Some(Utc::now());
        if let Err(e) = self.store.write_node(task.node.clone()).await {
            task.release().await.ok();
            return Err(e.into());
        }

        let store = self.store.clone();
        let tftp_root = self.config.tftp_root.clone();
        self.pool
            .spawn_task(task, move |mut task| async move {
                match task.driver.tear_down(&task.node).await {
                    Ok(TearDownOutcome::Deleted) => {
                        task.node.provision_state = ProvisionState::NoState;
                        task.node.target_provision_state = None;
                        task.node.instance_uuid = None;
                        task.node.instance_info.clear();

                        let ports = store.list_ports_by_node(task.node.uuid).await.unwrap_or_default();
                        let macs: Vec<_> = ports.into_iter().map(|p| p.address).collect();
                        if let Err(e) = tftp::clean_up(Path::new(&tftp_root), task.node.uuid.0, &macs) {
                            warn!(node = %task.node.uuid, error = %e, "failed to clean up tftp layout after tear down");
                        }
                    }
                    Ok(TearDownOutcome::Deleting) => {
                        task.node.provision_state = ProvisionState::Deleting;
                    }
                    Err(e) => {
                        task.node.provision_state = ProvisionState::DeleteFail;
                        task.node.target_provision_state = None;
                        task.node.last_error = Some(e.to_string());
                    }
                }
                task.node.provision_updated_at = Some(Utc::now());
                task.node.updated_at = Some(Utc::now());
                let node = task.node.clone();
                if let Err(e) = store.write_node(node).await {
                    warn!(error = %e, "failed to persist tear_down worker result");
                }
                if let Err(e) = task.release().await {
                    warn!(error = %e, "failed to release task after tear_down worker");
                }
            })
            .await
    }

    // ── validation / maintenance / destroy ──────────────────────────────

    pub async fn validate_driver_interfaces(
        &self,
        node_uuid: NodeId,
    ) -> Result<Vec<(String, InterfaceValidation)>, ConductorError> {
        let task = self.tasks.acquire_shared(node_uuid).await?;
        Ok(task.driver.validate_interfaces(&task.node).await)
    }

    pub async fn change_node_maintenance_mode(
        &self,
        node_uuid: NodeId,
        enabled: bool,
    ) -> Result<(), ConductorError> {
        let mut task = self.tasks.acquire_exclusive(node_uuid).await?;
        if task.node.maintenance == enabled {
            task.release().await.ok();
            return Err(ConductorError::NodeMaintenanceFailure);
        }
        task.node.maintenance = enabled;
        task.node.updated_at = Some(Utc::now());
        let node = task.node.clone();
        let write_result = self.store.write_node(node).await;
        task.release().await?;
        write_result?;
        Ok(())
    }

    pub async fn destroy_node(&self, node_uuid: NodeId) -> Result<(), ConductorError> {
        let task = self.tasks.acquire_exclusive(node_uuid).await?;
        if task.node.instance_uuid.is_some() {
            task.release().await.ok();
            return Err(ConductorError::NodeAssociated);
        }
        if !matches!(task.node.power_state, PowerState::Off | PowerState::NoState) {
            task.release().await.ok();
            return Err(ConductorError::NodeInWrongPowerState);
        }

        let uuid = task.node.uuid;
        task.release().await?;

        let ports = self.store.list_ports_by_node(uuid).await.unwrap_or_default();
        let macs: Vec<_> = ports.iter().map(|p| p.address.clone()).collect();
        for port in ports {
            if let Err(e) = self.store.delete_port(port.id).await {
                warn!(port = %port.id, error = %e, "failed to delete port during node destroy");
            }
        }
        if let Err(e) = tftp::clean_up(Path::new(&self.config.tftp_root), uuid.0, &macs) {
            warn!(node = %uuid, error = %e, "failed to clean up tftp layout during node destroy");
        }
        self.store.delete_node(uuid).await?;
        Ok(())
    }

    // ── console ──────────────────────────────────────────────────────────

    pub async fn get_console_information(&self, node_uuid: NodeId) -> Result<ConsoleInfo, ConductorError> {
        let task = self.tasks.acquire_shared(node_uuid).await?;
        if !task.driver.supports_console() {
            return Err(ConductorError::UnsupportedDriverExtension("console".to_string()));
        }
        if !task.node.console_enabled {
            return Err(ConductorError::NodeConsoleNotEnabled);
        }
        Ok(task.driver.get_console_information(&task.node).await?)
    }

    pub async fn set_console_mode(&self, node_uuid: NodeId, enabled: bool) -> Result<(), ConductorError> {
        let mut task = self.tasks.acquire_exclusive(node_uuid).await?;
        if !task.driver.supports_console() {
            task.release().await.ok();
            return Err(ConductorError::UnsupportedDriverExtension("console".to_string()));
        }
        if task.node.console_enabled == enabled {
            info!(node = %task.node.uuid, enabled, "console already in requested mode, no-op");
            task.release().await.ok();
            return Ok(());
        }

        let store = self.store.clone();
        self.pool
            .spawn_task(task, move |mut task| async move {
                match task.driver.set_console_mode(&task.node, enabled).await {
                    Ok(()) => task.node.console_enabled = enabled,
                    Err(e) => task.node.last_error = Some(e.to_string()),
                }
                task.node.updated_at = Some(Utc::now());
                let node = task.node.clone();
                if let Err(e) = store.write_node(node).await {
                    warn!(error = %e, "failed to persist console worker result");
                }
                if let Err(e) = task.release().await {
                    warn!(error = %e, "failed to release task after console worker");
                }
            })
            .await
    }

    // ── ports ────────────────────────────────────────────────────────────

    pub async fn update_port(&self, port: Port) -> Result<Port, ConductorError> {
        let existing = self
            .store
            .get_port(port.id)
            .await?
            .ok_or_else(|| ConductorError::NodeNotFound(port.id.to_string()))?;
        let node = self
            .store
            .get_node_by_row_id(port.node_id)
            .await?
            .ok_or_else(|| ConductorError::NodeNotFound(port.node_id.to_string()))?;

        let task = self.tasks.acquire_exclusive(node.uuid).await?;
        let mac_changed = existing.address != port.address;
        let vif_port_id = existing.vif_port_id().map(|s| s.to_string());

        let result = self.store.upsert_port(port.clone()).await;
        task.release().await?;
        result?;

        if mac_changed {
            if let Some(vif_port_id) = vif_port_id {
                self.network
                    .update_port_address(&node, &vif_port_id, &port.address)
                    .await
                    .map_err(|e| ConductorError::FailedToUpdateMacOnPort(e.to_string()))?;
            } else if node.instance_uuid.is_some() {
                warn!(
                    port = %port.id,
                    instance = %node.instance_uuid.unwrap(),
                    "no VIF found for instance port when attempting to update MAC address"
                );
            }
        }
        Ok(port)
    }

    // ── periodic loop bodies (driven from loops.rs) ─────────────────────

    /// One iteration of the power-sync loop's per-node body (spec.md
    /// §4.5 #2). Drives hardware toward the recorded state, or accepts
    /// the observed state as truth, depending on
    /// `force_power_state_during_sync`; falls back to maintenance mode
    /// after `power_state_sync_max_retries` failed drive attempts.
    pub(crate) async fn sync_node_power(&self, node_uuid: NodeId) -> Result<(), ConductorError> {
        let mut task = self.tasks.acquire_exclusive(node_uuid).await?;

        let observed = match task.driver.get_power_state(&task.node).await {
            Ok(p) => p,
            Err(e) => {
                task.release().await.ok();
                return Err(e.into());
            }
        };

        if task.node.power_state == PowerState::NoState {
            task.node.power_state = observed;
            self.reset_power_retry(node_uuid);
        } else if observed == task.node.power_state {
            self.reset_power_retry(node_uuid);
        } else if !self.config.force_power_state_during_sync {
            task.node.power_state = observed;
            self.reset_power_retry(node_uuid);
        } else {
            let target = task.node.power_state;
            if let Err(e) = task.driver.set_power_state(&task.node, target).await {
                debug!(node = %node_uuid, error = %e, "power sync: drive attempt failed");
            }
            let retries = self.bump_power_retry(node_uuid);
            if retries >= self.config.power_state_sync_max_retries {
                task.node.maintenance = true;
                task.node.last_error = Some(format!(
                    "power state sync exceeded {} retries, forcing maintenance",
                    self.config.power_state_sync_max_retries
                ));
                task.node.power_state = observed;
                self.reset_power_retry(node_uuid);
            }
        }

        task.node.updated_at = Some(Utc::now());
        let node = task.node.clone();
        let write_result = self.store.write_node(node).await;
        task.release().await?;
        write_result?;
        Ok(())
    }

    fn reset_power_retry(&self, node_uuid: NodeId) {
        self.power_retry_counts.lock().unwrap().remove(&node_uuid);
    }

    fn bump_power_retry(&self, node_uuid: NodeId) -> u32 {
        let mut counts = self.power_retry_counts.lock().unwrap();
        let counter = counts.entry(node_uuid).or_insert(0);
        *counter += 1;
        *counter
    }

    /// One iteration of the deploy-timeout sweep's per-node body
    /// (spec.md §4.5 #3).
    pub(crate) async fn fail_timed_out_deploy(&self, node_uuid: NodeId) -> Result<(), ConductorError> {
        let mut task = self.tasks.acquire_exclusive(node_uuid).await?;
        if task.node.provision_state != ProvisionState::DeployWait {
            // Raced with a heartbeat that already advanced the node past
            // deploywait; nothing to time out.
            task.release().await.ok();
            return Ok(());
        }

        task.node.provision_state = ProvisionState::DeployFail;
        task.node.target_provision_state = None;
        task.node.last_error = Some("Timeout reached while waiting for deploy callback".to_string());
        task.node.provision_updated_at = Some(Utc::now());
        task.node.updated_at = Some(Utc::now());
        if let Err(e) = self.store.write_node(task.node.clone()).await {
            task.release().await.ok();
            return Err(e.into());
        }

        self.pool
            .spawn_task(task, move |task| async move {
                if let Err(e) = task.driver.clean_up(&task.node).await {
                    warn!(node = %task.node.uuid, error = %e, "deploy-timeout sweep: clean_up failed");
                }
                if let Err(e) = task.release().await {
                    warn!(error = %e, "failed to release task after deploy-timeout clean_up");
                }
            })
            .await
    }

    pub(crate) fn store(&self) -> &Arc<dyn StateStore> {
        &self.store
    }

    pub(crate) fn drivers(&self) -> &Arc<DriverCatalog> {
        &self.drivers
    }

    pub(crate) fn config(&self) -> &Arc<ConductorConfig> {
        &self.config
    }

    pub(crate) fn pool(&self) -> &Arc<WorkerPool> {
        &self.pool
    }

    pub(crate) fn ring(&self) -> &RwLock<DriverRegistry> {
        &self.ring
    }

    pub(crate) fn conductor_groups(&self) -> &[String] {
        &self.conductor_groups
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use conductor_agent::NoopNetworkProvisioner;
    use conductor_config::RawConfig;
    use conductor_driver::FakeDriver;
    use conductor_store::InMemoryStore;
    use std::collections::HashMap;
    use std::time::Duration as StdDuration;
    use tokio::time::sleep;

    fn test_conductor() -> (Conductor, Arc<InMemoryStore>) {
        let store = Arc::new(InMemoryStore::new());
        let mut catalog = DriverCatalog::new();
        catalog.register(Arc::new(FakeDriver::new()));
        let config = Arc::new(ConductorConfig::from_raw(&RawConfig::from_map(HashMap::new())).unwrap());
        let conductor = Conductor::new(
            store.clone(),
            Arc::new(catalog),
            config,
            Arc::new(NoopNetworkProvisioner),
            "conductor-a",
            vec![String::new()],
        );
        (conductor, store)
    }

    fn test_conductor_with_tftp_root(root: &std::path::Path) -> (Conductor, Arc<InMemoryStore>) {
        let store = Arc::new(InMemoryStore::new());
        let mut catalog = DriverCatalog::new();
        catalog.register(Arc::new(FakeDriver::new()));
        let mut vars = HashMap::new();
        vars.insert("tftp_root".to_string(), root.to_string_lossy().to_string());
        let config = Arc::new(ConductorConfig::from_raw(&RawConfig::from_map(vars)).unwrap());
        let conductor = Conductor::new(
            store.clone(),
            Arc::new(catalog),
            config,
            Arc::new(NoopNetworkProvisioner),
            "conductor-a",
            vec![String::new()],
        );
        (conductor, store)
    }

    async fn map_to_self(conductor: &Conductor) {
        let mut ring = conductor.ring.write().await;
        *ring = DriverRegistry::new(vec![conductor_domain::ConductorRegistration {
            hostname: conductor.hostname.clone(),
            drivers: vec!["fake".to_string()],
            last_heartbeat_at: Utc::now(),
        }]);
    }

    #[tokio::test]
    async fn power_toggle_happy_path() {
        let (conductor, store) = test_conductor();
        let mut node = Node::new("fake");
        node.power_state = PowerState::Off;
        let node = store.create_node(node).await.unwrap();

        conductor
            .change_node_power_state(node.uuid, PowerState::On)
            .await
            .unwrap();
        sleep(StdDuration::from_millis(20)).await;

        let fetched = store.get_node(node.uuid).await.unwrap().unwrap();
        assert_eq!(fetched.power_state, PowerState::On);
        assert!(fetched.target_power_state.is_none());
        assert!(fetched.last_error.is_none());
        assert!(fetched.reservation.is_none());
    }

    #[tokio::test]
    async fn deploy_from_active_is_conflict() {
        let (conductor, store) = test_conductor();
        map_to_self(&conductor).await;
        let mut node = Node::new("fake");
        node.provision_state = ProvisionState::Active;
        let node = store.create_node(node).await.unwrap();

        let result = conductor.do_node_deploy(node.uuid).await;
        assert!(matches!(result, Err(ConductorError::InstanceDeployFailure(_))));

        let fetched = store.get_node(node.uuid).await.unwrap().unwrap();
        assert!(fetched.last_error.is_none());
        assert_eq!(fetched.provision_state, ProvisionState::Active);
    }

    #[tokio::test]
    async fn deploy_unmapped_node_surfaces_no_valid_host() {
        let (conductor, store) = test_conductor();
        let node = store.create_node(Node::new("fake")).await.unwrap();
        let result = conductor.do_node_deploy(node.uuid).await;
        assert!(matches!(result, Err(ConductorError::NoValidHost)));

        let fetched = store.get_node(node.uuid).await.unwrap().unwrap();
        assert_eq!(fetched.provision_state, ProvisionState::NoState);
    }

    #[tokio::test]
    async fn concurrent_exclusive_acquire_only_one_succeeds() {
        let (conductor, store) = test_conductor();
        let node = store.create_node(Node::new("fake")).await.unwrap();

        let first = conductor.tasks.acquire_exclusive(node.uuid).await;
        assert!(first.is_ok());
        let second = conductor.tasks.acquire_exclusive(node.uuid).await;
        assert!(matches!(second, Err(ConductorError::NodeLocked { .. })));

        first.unwrap().release().await.unwrap();
        let third = conductor.tasks.acquire_exclusive(node.uuid).await;
        assert!(third.is_ok());
    }

    #[tokio::test]
    async fn maintenance_mode_is_idempotent() {
        let (conductor, store) = test_conductor();
        let node = store.create_node(Node::new("fake")).await.unwrap();

        conductor.change_node_maintenance_mode(node.uuid, true).await.unwrap();
        let result = conductor.change_node_maintenance_mode(node.uuid, true).await;
        assert!(matches!(result, Err(ConductorError::NodeMaintenanceFailure)));
    }

    #[tokio::test]
    async fn create_node_rejects_unknown_driver() {
        let (conductor, _store) = test_conductor();
        let result = conductor.create_node(Node::new("does-not-exist")).await;
        assert!(matches!(result, Err(ConductorError::DriverNotFound(_))));
    }

    #[tokio::test]
    async fn destroy_requires_unassociated_and_powered_off() {
        let (conductor, store) = test_conductor();
        let mut node = Node::new("fake");
        node.instance_uuid = Some(uuid::Uuid::new_v4());
        let node = store.create_node(node).await.unwrap();

        let result = conductor.destroy_node(node.uuid).await;
        assert!(matches!(result, Err(ConductorError::NodeAssociated)));
    }

    #[tokio::test]
    async fn deploy_writes_tftp_boot_config_and_tear_down_cleans_it_up() {
        let tmp = tempfile::tempdir().unwrap();
        let (conductor, store) = test_conductor_with_tftp_root(tmp.path());
        map_to_self(&conductor).await;

        let node = store.create_node(Node::new("fake")).await.unwrap();
        let port = conductor_domain::Port {
            id: conductor_domain::PortId(uuid::Uuid::new_v4()),
            node_id: node.id,
            address: conductor_domain::MacAddress::parse("aa:bb:cc:dd:ee:ff").unwrap(),
            extra: Default::default(),
        };
        store.upsert_port(port).await.unwrap();

        conductor.do_node_deploy(node.uuid).await.unwrap();
        sleep(StdDuration::from_millis(20)).await;

        let config_path = conductor_driver::tftp::boot_config_path(tmp.path(), node.uuid.0);
        let token_path = conductor_driver::tftp::token_path(tmp.path(), node.uuid.0);
        assert!(config_path.exists());
        assert!(token_path.exists());

        let fetched = store.get_node(node.uuid).await.unwrap().unwrap();
        assert_eq!(fetched.provision_state, ProvisionState::Active);

        // move to a tear-downable power state and deploy state so tear_down is accepted.
        conductor.change_node_power_state(node.uuid, PowerState::Off).await.unwrap();
        sleep(StdDuration::from_millis(20)).await;

        conductor.do_node_tear_down(node.uuid).await.unwrap();
        sleep(StdDuration::from_millis(20)).await;

        assert!(!config_path.exists());
        assert!(!token_path.exists());
    }

    /// A `NetworkProvisioner` whose `update_port_address` always fails,
    /// used to exercise `update_port`'s `FailedToUpdateMacOnPort` path.
    struct FailingNetworkProvisioner;

    #[async_trait::async_trait]
    impl conductor_agent::NetworkProvisioner for FailingNetworkProvisioner {
        async fn add_provisioning_network(
            &self,
            _node: &Node,
            _port_map: &[conductor_agent::PortMapEntry],
        ) -> Result<(), conductor_agent::AgentError> {
            Ok(())
        }

        async fn remove_provisioning_network(
            &self,
            _node: &Node,
            _port_map: &[conductor_agent::PortMapEntry],
        ) -> Result<(), conductor_agent::AgentError> {
            Ok(())
        }

        async fn configure_instance_networks(
            &self,
            _node: &Node,
            _port_map: &[conductor_agent::PortMapEntry],
        ) -> Result<(), conductor_agent::AgentError> {
            Ok(())
        }

        async fn deconfigure_instance_networks(
            &self,
            _node: &Node,
            _port_map: &[conductor_agent::PortMapEntry],
        ) -> Result<(), conductor_agent::AgentError> {
            Ok(())
        }

        async fn update_port_address(
            &self,
            _node: &Node,
            _vif_port_id: &str,
            _address: &conductor_domain::MacAddress,
        ) -> Result<(), conductor_agent::AgentError> {
            Err(conductor_agent::AgentError::NetworkError("neutron unreachable".to_string()))
        }
    }

    #[tokio::test]
    async fn update_port_mac_change_with_vif_binding_updates_network() {
        let store = Arc::new(InMemoryStore::new());
        let mut catalog = DriverCatalog::new();
        catalog.register(Arc::new(FakeDriver::new()));
        let config = Arc::new(ConductorConfig::from_raw(&RawConfig::from_map(HashMap::new())).unwrap());
        let conductor = Conductor::new(
            store.clone(),
            Arc::new(catalog),
            config,
            Arc::new(NoopNetworkProvisioner),
            "conductor-a",
            vec![String::new()],
        );

        let node = store.create_node(Node::new("fake")).await.unwrap();
        let mut extra = conductor_domain::Attrs::new();
        extra.insert("vif_port_id".to_string(), serde_json::json!("vif-1"));
        let port = conductor_domain::Port {
            id: conductor_domain::PortId(uuid::Uuid::new_v4()),
            node_id: node.id,
            address: conductor_domain::MacAddress::parse("aa:bb:cc:dd:ee:ff").unwrap(),
            extra,
        };
        let port = store.create_port(port).await.unwrap();

        let mut updated = port.clone();
        updated.address = conductor_domain::MacAddress::parse("11:22:33:44:55:66").unwrap();
        conductor.update_port(updated).await.unwrap();
    }

    #[tokio::test]
    async fn update_port_mac_change_surfaces_failed_to_update_mac_on_port() {
        let store = Arc::new(InMemoryStore::new());
        let mut catalog = DriverCatalog::new();
        catalog.register(Arc::new(FakeDriver::new()));
        let config = Arc::new(ConductorConfig::from_raw(&RawConfig::from_map(HashMap::new())).unwrap());
        let conductor = Conductor::new(
            store.clone(),
            Arc::new(catalog),
            config,
            Arc::new(FailingNetworkProvisioner),
            "conductor-a",
            vec![String::new()],
        );

        let node = store.create_node(Node::new("fake")).await.unwrap();
        let mut extra = conductor_domain::Attrs::new();
        extra.insert("vif_port_id".to_string(), serde_json::json!("vif-1"));
        let port = conductor_domain::Port {
            id: conductor_domain::PortId(uuid::Uuid::new_v4()),
            node_id: node.id,
            address: conductor_domain::MacAddress::parse("aa:bb:cc:dd:ee:ff").unwrap(),
            extra,
        };
        let port = store.create_port(port).await.unwrap();

        let mut updated = port.clone();
        updated.address = conductor_domain::MacAddress::parse("11:22:33:44:55:66").unwrap();
        let result = conductor.update_port(updated).await;
        assert!(matches!(result, Err(ConductorError::FailedToUpdateMacOnPort(_))));
    }
}
