use thiserror::Error;

#[derive(Debug, Error)]
pub enum RingError {
    #[error("no valid host available in ring")]
    NoValidHost,
}
