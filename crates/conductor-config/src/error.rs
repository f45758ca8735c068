use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {var}: {message}")]
    Invalid { var: String, message: String },

    #[error("missing required variable: {0}")]
    Missing(String),
}
