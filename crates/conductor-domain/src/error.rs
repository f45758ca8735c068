use thiserror::Error;

#[derive(Debug, Error)]
pub enum DomainError {
    #[error("invalid MAC address: {0}")]
    InvalidMac(String),

    #[error("invalid provision state transition: {from} -> {to}")]
    InvalidProvisionTransition { from: String, to: String },

    #[error("invalid power state requested: {0}")]
    InvalidPowerState(String),

    #[error("invalid parameter: {0}")]
    InvalidParameterValue(String),
}
