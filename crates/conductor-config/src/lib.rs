mod loader;
mod raw;
pub mod error;

pub use error::ConfigError;
pub use loader::ConductorConfig;
pub use raw::RawConfig;
