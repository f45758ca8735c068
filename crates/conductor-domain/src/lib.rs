pub mod error;
pub mod types;

pub use error::DomainError;
pub use types::{
    Attrs, ConductorRegistration, MacAddress, Node, NodeId, NodeRowId, Port, PortId, PowerState,
    ProvisionState, ProvisionTarget,
};
