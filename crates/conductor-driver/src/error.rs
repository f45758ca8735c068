use thiserror::Error;

#[derive(Debug, Error)]
pub enum DriverError {
    #[error("deploy failed: {0}")]
    DeployFailed(String),

    #[error("tear down failed: {0}")]
    TearDownFailed(String),

    #[error("power operation failed: {0}")]
    PowerFailure(String),

    #[error("operation not supported by driver: {0}")]
    Unsupported(String),

    #[error("no driver registered for: {0}")]
    DriverNotFound(String),

    #[error("internal driver error: {0}")]
    Internal(String),
}
