mod error;
mod membership;
mod ring;

pub use error::RingError;
pub use membership::DriverRegistry;
pub use ring::{HashRing, REPLICAS_PER_HOST};
