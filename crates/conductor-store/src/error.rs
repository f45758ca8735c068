use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("node not found: {0}")]
    NodeNotFound(String),

    #[error("port not found: {0}")]
    PortNotFound(String),

    /// A node row is already held under an exclusive reservation.
    #[error("node {node} is locked by {holder}")]
    NodeLocked { node: String, holder: String },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("internal store error: {0}")]
    Internal(String),
}
