pub mod client;
pub mod error;
pub mod inventory;
pub mod network;
pub mod protocol;
pub mod signed_url;

pub use client::{AgentClient, CommandState, CommandStatus};
pub use error::AgentError;
pub use inventory::{extract_port_map, flatten, unflatten, LookupPayload, PortMapEntry};
pub use network::{NetworkProvisioner, NoopNetworkProvisioner};
pub use protocol::{AgentProtocol, LookupResponse};
pub use signed_url::{build_signed_url, ObjectLocation};
