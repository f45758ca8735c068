use async_trait::async_trait;
use conductor_domain::{MacAddress, Node};

use crate::error::AgentError;
use crate::inventory::PortMapEntry;

/// Abstract DHCP/port-mapping collaborator used by agent-driven deploys.
/// Each operation consumes the port map derived from the node's flattened
/// inventory (spec.md §4.7); transport-level failures surface as
/// `NetworkError` and leave the node's provision state untouched for retry.
#[async_trait]
pub trait NetworkProvisioner: Send + Sync + 'static {
    async fn add_provisioning_network(
        &self,
        node: &Node,
        port_map: &[PortMapEntry],
    ) -> Result<(), AgentError>;

    async fn remove_provisioning_network(
        &self,
        node: &Node,
        port_map: &[PortMapEntry],
    ) -> Result<(), AgentError>;

    async fn configure_instance_networks(
        &self,
        node: &Node,
        port_map: &[PortMapEntry],
    ) -> Result<(), AgentError>;

    async fn deconfigure_instance_networks(
        &self,
        node: &Node,
        port_map: &[PortMapEntry],
    ) -> Result<(), AgentError>;

    /// Update the external network-provider record for a port whose MAC
    /// address changed, keyed by its `vif_port_id` binding (spec.md §4.5
    /// `update_port`). Failure here is what `FailedToUpdateMacOnPort`
    /// reports to the caller.
    async fn update_port_address(
        &self,
        node: &Node,
        vif_port_id: &str,
        address: &MacAddress,
    ) -> Result<(), AgentError>;
}

/// A no-op provisioner used by tests and the `driver=fake` fixture. Every
/// call succeeds without touching any external system.
#[derive(Debug, Default)]
pub struct NoopNetworkProvisioner;

#[async_trait]
impl NetworkProvisioner for NoopNetworkProvisioner {
    async fn add_provisioning_network(
        &self,
        _node: &Node,
        _port_map: &[PortMapEntry],
    ) -> Result<(), AgentError> {
        Ok(())
    }

    async fn remove_provisioning_network(
        &self,
        _node: &Node,
        _port_map: &[PortMapEntry],
    ) -> Result<(), AgentError> {
        Ok(())
    }

    async fn configure_instance_networks(
        &self,
        _node: &Node,
        _port_map: &[PortMapEntry],
    ) -> Result<(), AgentError> {
        Ok(())
    }

    async fn deconfigure_instance_networks(
        &self,
        _node: &Node,
        _port_map: &[PortMapEntry],
    ) -> Result<(), AgentError> {
        Ok(())
    }

    async fn update_port_address(
        &self,
        _node: &Node,
        _vif_port_id: &str,
        _address: &MacAddress,
    ) -> Result<(), AgentError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn noop_provisioner_accepts_every_call() {
        let provisioner = NoopNetworkProvisioner;
        let node = Node::new("fake");
        let mac = MacAddress::parse("aa:bb:cc:dd:ee:ff").unwrap();

        provisioner.add_provisioning_network(&node, &[]).await.unwrap();
        provisioner.remove_provisioning_network(&node, &[]).await.unwrap();
        provisioner.configure_instance_networks(&node, &[]).await.unwrap();
        provisioner.deconfigure_instance_networks(&node, &[]).await.unwrap();
        provisioner.update_port_address(&node, "vif-1", &mac).await.unwrap();
    }
}
