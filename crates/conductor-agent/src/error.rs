use thiserror::Error;

#[derive(Debug, Error)]
pub enum AgentError {
    #[error("node not found: {0}")]
    NodeNotFound(String),

    #[error("invalid parameter: {0}")]
    InvalidParameterValue(String),

    #[error("invalid MAC address: {0}")]
    InvalidMac(String),

    #[error("no port map available for node")]
    NoValidPortmaps,

    #[error("network operation failed: {0}")]
    NetworkError(String),

    #[error("image not found: {0}")]
    ImageNotFound(String),

    #[error("image unacceptable: {0}")]
    ImageUnacceptable(String),

    #[error(transparent)]
    Store(#[from] conductor_store::StoreError),

    #[error(transparent)]
    Driver(#[from] conductor_driver::DriverError),

    #[error(transparent)]
    Domain(#[from] conductor_domain::DomainError),

    #[error("agent RPC failed: {0}")]
    AgentRpc(String),
}
