use async_trait::async_trait;
use conductor_domain::{Attrs, Node, PowerState};
use serde_json::Value;

use crate::error::DriverError;

/// What a driver's `deploy` call returned: either it finished synchronously,
/// or the conductor should wait for an agent callback before marking the
/// node `active`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeployOutcome {
    Active,
    DeployWait,
}

/// What a driver's `tear_down` call returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TearDownOutcome {
    Deleted,
    Deleting,
}

/// Console connection info returned by `get_console_information`.
#[derive(Debug, Clone)]
pub struct ConsoleInfo {
    pub console_type: String,
    pub url: String,
}

/// Result of validating one of a driver's interfaces
/// (`validate_driver_interfaces`, spec §4.5).
#[derive(Debug, Clone)]
pub struct InterfaceValidation {
    pub result: bool,
    pub reason: Option<String>,
}

impl InterfaceValidation {
    pub fn ok() -> Self {
        InterfaceValidation { result: true, reason: None }
    }

    pub fn failed(reason: impl Into<String>) -> Self {
        InterfaceValidation { result: false, reason: Some(reason.into()) }
    }
}

/// A pluggable hardware driver: power, deploy, console, vendor, and
/// management interfaces bound to a single `driver` name. Every method
/// receives the node it operates on; drivers are stateless with respect to
/// node identity (all state lives in the repository).
#[async_trait]
pub trait Driver: Send + Sync + 'static {
    fn name(&self) -> &'static str;

    // ── Power interface ──────────────────────────────────────────────────
    async fn get_power_state(&self, node: &Node) -> Result<PowerState, DriverError>;
    async fn set_power_state(
        &self,
        node: &Node,
        target: PowerState,
    ) -> Result<PowerState, DriverError>;

    // ── Deploy interface ─────────────────────────────────────────────────
    async fn validate_deploy(&self, node: &Node) -> Result<(), DriverError>;
    async fn deploy(&self, node: &Node) -> Result<DeployOutcome, DriverError>;
    async fn tear_down(&self, node: &Node) -> Result<TearDownOutcome, DriverError>;
    /// Invoked by the deploy-timeout sweep and on any teardown path;
    /// idempotent, safe to call on a node that was never deployed.
    async fn clean_up(&self, node: &Node) -> Result<(), DriverError>;

    // ── Console interface (optional) ────────────────────────────────────
    fn supports_console(&self) -> bool {
        false
    }

    async fn get_console_information(&self, _node: &Node) -> Result<ConsoleInfo, DriverError> {
        Err(DriverError::Unsupported("console".to_string()))
    }

    async fn set_console_mode(&self, _node: &Node, _enabled: bool) -> Result<(), DriverError> {
        Err(DriverError::Unsupported("console".to_string()))
    }

    // ── Management interface (optional) ─────────────────────────────────
    fn supports_management(&self) -> bool {
        false
    }

    async fn get_boot_device(&self, _node: &Node) -> Result<String, DriverError> {
        Err(DriverError::Unsupported("management".to_string()))
    }

    /// Set the device the node will boot from next (e.g. `"disk"`,
    /// `"pxe"`). Called by the agent deploy handshake once the instance
    /// network is attached, before the final power-on (spec.md §4.6).
    async fn set_boot_device(&self, _node: &Node, _device: &str) -> Result<(), DriverError> {
        Err(DriverError::Unsupported("management".to_string()))
    }

    // ── Vendor passthru (optional) ──────────────────────────────────────
    fn supports_vendor(&self) -> bool {
        false
    }

    async fn vendor_passthru(
        &self,
        _node: &Node,
        method: &str,
        _info: &Attrs,
    ) -> Result<Value, DriverError> {
        Err(DriverError::Unsupported(method.to_string()))
    }

    /// A node-less vendor method, invoked on any live conductor holding
    /// this driver (spec §4.5 `driver_vendor_passthru`).
    async fn driver_vendor_passthru(
        &self,
        method: &str,
        _info: &Attrs,
    ) -> Result<Value, DriverError> {
        Err(DriverError::Unsupported(method.to_string()))
    }

    // ── Interface validation ────────────────────────────────────────────
    /// Validate every core/standard interface this driver exposes for
    /// `node`, keyed by interface name. Backs `validate_driver_interfaces`
    /// and the `GET /nodes/{uuid}/validate` endpoint verbatim.
    async fn validate_interfaces(&self, node: &Node) -> Vec<(String, InterfaceValidation)> {
        let power = self
            .get_power_state(node)
            .await
            .map(|_| InterfaceValidation::ok())
            .unwrap_or_else(|e| InterfaceValidation::failed(e.to_string()));
        let deploy = self
            .validate_deploy(node)
            .await
            .map(|_| InterfaceValidation::ok())
            .unwrap_or_else(|e| InterfaceValidation::failed(e.to_string()));
        vec![("power".to_string(), power), ("deploy".to_string(), deploy)]
    }
}
