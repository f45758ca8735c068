use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::DomainError;

// ── Identifiers ────────────────────────────────────────────────────────────

/// Stable UUID identifying a node, independent of its row id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub Uuid);

impl NodeId {
    pub fn new() -> Self {
        NodeId(Uuid::new_v4())
    }
}

impl Default for NodeId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Integer row id, stable for the lifetime of a node's storage row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeRowId(pub i64);

impl fmt::Display for NodeRowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PortId(pub Uuid);

impl fmt::Display for PortId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A normalized MAC address, always lowercase colon form (`aa:bb:cc:dd:ee:ff`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MacAddress(String);

impl MacAddress {
    /// Parse and normalize a MAC address from any common separator/case form.
    pub fn parse(raw: &str) -> Result<Self, DomainError> {
        let cleaned: String = raw
            .trim()
            .to_lowercase()
            .replace('-', ":")
            .replace('.', ":");
        let parts: Vec<&str> = cleaned.split(':').collect();
        let valid = parts.len() == 6
            && parts
                .iter()
                .all(|p| p.len() == 2 && p.chars().all(|c| c.is_ascii_hexdigit()));
        if !valid {
            return Err(DomainError::InvalidMac(raw.to_string()));
        }
        Ok(MacAddress(parts.join(":")))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MacAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ── Enumerations ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PowerState {
    On,
    Off,
    Reboot,
    #[serde(rename = "nostate")]
    NoState,
    Error,
}

impl fmt::Display for PowerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PowerState::On => "on",
            PowerState::Off => "off",
            PowerState::Reboot => "reboot",
            PowerState::NoState => "nostate",
            PowerState::Error => "error",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProvisionState {
    #[serde(rename = "nostate")]
    NoState,
    Deploying,
    #[serde(rename = "deploywait")]
    DeployWait,
    Active,
    #[serde(rename = "deployfail")]
    DeployFail,
    #[serde(rename = "deletefail")]
    DeleteFail,
    Deleting,
    Deleted,
    Error,
}

impl fmt::Display for ProvisionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ProvisionState::NoState => "nostate",
            ProvisionState::Deploying => "deploying",
            ProvisionState::DeployWait => "deploywait",
            ProvisionState::Active => "active",
            ProvisionState::DeployFail => "deployfail",
            ProvisionState::DeleteFail => "deletefail",
            ProvisionState::Deleting => "deleting",
            ProvisionState::Deleted => "deleted",
            ProvisionState::Error => "error",
        };
        write!(f, "{}", s)
    }
}

impl ProvisionState {
    /// Whether `deploy` may be requested from this state.
    pub fn can_deploy(&self) -> bool {
        matches!(self, ProvisionState::NoState)
    }

    /// Whether `tear_down` may be requested from this state.
    pub fn can_tear_down(&self) -> bool {
        matches!(
            self,
            ProvisionState::Active
                | ProvisionState::DeployFail
                | ProvisionState::Error
                | ProvisionState::DeployWait
        )
    }

    /// Terminal states carry no in-flight target.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ProvisionState::NoState | ProvisionState::Active | ProvisionState::Error
        )
    }
}

/// A requested provision-state transition, as accepted at the API edge
/// (`PUT /nodes/{uuid}/states/provision`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProvisionTarget {
    Deploy,
    TearDown,
}

// ── Node ───────────────────────────────────────────────────────────────────

pub type Attrs = HashMap<String, Value>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeRowId,
    pub uuid: NodeId,
    pub name: Option<String>,
    pub driver: String,

    pub power_state: PowerState,
    pub target_power_state: Option<PowerState>,

    pub provision_state: ProvisionState,
    pub target_provision_state: Option<ProvisionState>,
    pub provision_updated_at: Option<DateTime<Utc>>,

    pub last_error: Option<String>,
    pub maintenance: bool,
    pub reservation: Option<String>,
    pub console_enabled: bool,

    /// Non-default narrows ring membership to conductors serving this group.
    pub conductor_group: String,

    pub instance_uuid: Option<Uuid>,
    #[serde(default)]
    pub instance_info: Attrs,
    #[serde(default)]
    pub driver_info: Attrs,
    #[serde(default)]
    pub extra: Attrs,
    #[serde(default)]
    pub properties: Attrs,

    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Node {
    pub fn new(driver: impl Into<String>) -> Self {
        let now = Utc::now();
        Node {
            id: NodeRowId(0),
            uuid: NodeId::new(),
            name: None,
            driver: driver.into(),
            power_state: PowerState::NoState,
            target_power_state: None,
            provision_state: ProvisionState::NoState,
            target_provision_state: None,
            provision_updated_at: None,
            last_error: None,
            maintenance: false,
            reservation: None,
            console_enabled: false,
            conductor_group: String::new(),
            instance_uuid: None,
            instance_info: Attrs::new(),
            driver_info: Attrs::new(),
            extra: Attrs::new(),
            properties: Attrs::new(),
            created_at: now,
            updated_at: None,
        }
    }

    /// §3 invariant: destroyable only when unassociated and powered off.
    pub fn is_destroyable(&self) -> bool {
        self.instance_uuid.is_none()
            && matches!(self.power_state, PowerState::Off | PowerState::NoState)
    }
}

// ── Port ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Port {
    pub id: PortId,
    pub node_id: NodeRowId,
    pub address: MacAddress,
    #[serde(default)]
    pub extra: Attrs,
}

impl Port {
    /// The external network-provider port id, if this port has been wired.
    pub fn vif_port_id(&self) -> Option<&str> {
        self.extra.get("vif_port_id").and_then(|v| v.as_str())
    }
}

// ── ConductorRegistration ────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConductorRegistration {
    pub hostname: String,
    pub drivers: Vec<String>,
    pub last_heartbeat_at: DateTime<Utc>,
}

impl ConductorRegistration {
    pub fn is_live(&self, now: DateTime<Utc>, heartbeat_timeout: chrono::Duration) -> bool {
        now - self.last_heartbeat_at < heartbeat_timeout
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mac_normalizes_dashes_and_case() {
        let mac = MacAddress::parse("AA-BB-CC-DD-EE-FF").unwrap();
        assert_eq!(mac.as_str(), "aa:bb:cc:dd:ee:ff");
    }

    #[test]
    fn mac_rejects_short_address() {
        assert!(MacAddress::parse("aa:bb:cc").is_err());
    }

    #[test]
    fn mac_rejects_non_hex() {
        assert!(MacAddress::parse("zz:bb:cc:dd:ee:ff").is_err());
    }

    #[test]
    fn provision_state_deploy_gate() {
        assert!(ProvisionState::NoState.can_deploy());
        assert!(!ProvisionState::Active.can_deploy());
    }

    #[test]
    fn provision_state_tear_down_gate() {
        assert!(ProvisionState::Active.can_tear_down());
        assert!(ProvisionState::DeployFail.can_tear_down());
        assert!(ProvisionState::DeployWait.can_tear_down());
        assert!(!ProvisionState::Deploying.can_tear_down());
        assert!(!ProvisionState::NoState.can_tear_down());
    }

    #[test]
    fn node_destroyable_only_when_unassociated_and_off() {
        let mut n = Node::new("fake");
        n.power_state = PowerState::Off;
        assert!(n.is_destroyable());
        n.instance_uuid = Some(Uuid::new_v4());
        assert!(!n.is_destroyable());
    }
}
