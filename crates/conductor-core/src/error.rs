use thiserror::Error;

/// Aggregate error composing `StoreError` / `DriverError` / `RingError` /
/// `DomainError` / `AgentError`, mapped by `conductor-api` to REST status
/// codes.
#[derive(Debug, Error)]
pub enum ConductorError {
    #[error("node not found: {0}")]
    NodeNotFound(String),

    #[error("node {node} is locked by {holder}")]
    NodeLocked { node: String, holder: String },

    #[error("node is associated with an instance")]
    NodeAssociated,

    #[error("node is in the wrong power state for this operation")]
    NodeInWrongPowerState,

    #[error("node is in maintenance mode")]
    NodeInMaintenance,

    #[error("node is already in the requested maintenance mode")]
    NodeMaintenanceFailure,

    #[error("node console is not enabled")]
    NodeConsoleNotEnabled,

    #[error("invalid parameter: {0}")]
    InvalidParameterValue(String),

    #[error("invalid state requested: {from} -> {to}")]
    InvalidStateRequested { from: String, to: String },

    #[error("no driver registered for: {0}")]
    DriverNotFound(String),

    #[error("no valid host available in ring")]
    NoValidHost,

    #[error("driver extension not supported: {0}")]
    UnsupportedDriverExtension(String),

    #[error("no free conductor worker available")]
    NoFreeConductorWorker,

    #[error("instance deploy failed: {0}")]
    InstanceDeployFailure(String),

    #[error("patch error: {0}")]
    PatchError(String),

    #[error("failed to update MAC on port: {0}")]
    FailedToUpdateMacOnPort(String),

    #[error("failed to update DHCP options on port: {0}")]
    FailedToUpdateDhcpOptOnPort(String),

    #[error("no valid port maps for node")]
    NoValidPortmaps,

    #[error("network error: {0}")]
    NetworkError(String),

    #[error("image not found: {0}")]
    ImageNotFound(String),

    #[error("image unacceptable: {0}")]
    ImageUnacceptable(String),

    #[error("invalid MAC address: {0}")]
    InvalidMac(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<conductor_store::StoreError> for ConductorError {
    fn from(e: conductor_store::StoreError) -> Self {
        match e {
            conductor_store::StoreError::NodeNotFound(id) => ConductorError::NodeNotFound(id),
            conductor_store::StoreError::PortNotFound(id) => ConductorError::NodeNotFound(id),
            conductor_store::StoreError::NodeLocked { node, holder } => {
                ConductorError::NodeLocked { node, holder }
            }
            other => ConductorError::Internal(other.to_string()),
        }
    }
}

impl From<conductor_driver::DriverError> for ConductorError {
    fn from(e: conductor_driver::DriverError) -> Self {
        match e {
            conductor_driver::DriverError::DriverNotFound(name) => ConductorError::DriverNotFound(name),
            conductor_driver::DriverError::Unsupported(what) => {
                ConductorError::UnsupportedDriverExtension(what)
            }
            conductor_driver::DriverError::DeployFailed(msg) => ConductorError::InstanceDeployFailure(msg),
            conductor_driver::DriverError::TearDownFailed(msg) => ConductorError::InstanceDeployFailure(msg),
            conductor_driver::DriverError::PowerFailure(msg) => ConductorError::Internal(msg),
            conductor_driver::DriverError::Internal(msg) => ConductorError::Internal(msg),
        }
    }
}

impl From<conductor_ring::RingError> for ConductorError {
    fn from(_: conductor_ring::RingError) -> Self {
        ConductorError::NoValidHost
    }
}

impl From<conductor_domain::DomainError> for ConductorError {
    fn from(e: conductor_domain::DomainError) -> Self {
        match e {
            conductor_domain::DomainError::InvalidMac(m) => ConductorError::InvalidMac(m),
            conductor_domain::DomainError::InvalidProvisionTransition { from, to } => {
                ConductorError::InvalidStateRequested { from, to }
            }
            conductor_domain::DomainError::InvalidPowerState(m) => ConductorError::InvalidParameterValue(m),
            conductor_domain::DomainError::InvalidParameterValue(m) => ConductorError::InvalidParameterValue(m),
        }
    }
}

impl From<conductor_agent::AgentError> for ConductorError {
    fn from(e: conductor_agent::AgentError) -> Self {
        match e {
            conductor_agent::AgentError::NodeNotFound(id) => ConductorError::NodeNotFound(id),
            conductor_agent::AgentError::InvalidParameterValue(m) => {
                ConductorError::InvalidParameterValue(m)
            }
            conductor_agent::AgentError::InvalidMac(m) => ConductorError::InvalidMac(m),
            conductor_agent::AgentError::NoValidPortmaps => ConductorError::NoValidPortmaps,
            conductor_agent::AgentError::NetworkError(m) => ConductorError::NetworkError(m),
            conductor_agent::AgentError::ImageNotFound(m) => ConductorError::ImageNotFound(m),
            conductor_agent::AgentError::ImageUnacceptable(m) => ConductorError::ImageUnacceptable(m),
            conductor_agent::AgentError::Store(e) => e.into(),
            conductor_agent::AgentError::Driver(e) => e.into(),
            conductor_agent::AgentError::Domain(e) => e.into(),
            conductor_agent::AgentError::AgentRpc(m) => ConductorError::NetworkError(m),
        }
    }
}
