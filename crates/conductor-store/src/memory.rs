use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use conductor_domain::{ConductorRegistration, MacAddress, Node, NodeId, NodeRowId, Port, PortId};
use tokio::sync::RwLock;

use crate::error::StoreError;
use crate::store::StateStore;

#[derive(Debug, Default)]
struct Inner {
    nodes: HashMap<NodeId, Node>,
    ports: HashMap<PortId, Port>,
    registrations: HashMap<String, ConductorRegistration>,
    next_row_id: i64,
}

/// In-memory implementation of [`StateStore`]. All data is lost on process
/// exit. Used by the worker-pool and periodic-loop tests, and as the
/// backing store for `FakeDriver`-based integration tests.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    inner: Arc<RwLock<Inner>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StateStore for InMemoryStore {
    async fn get_node(&self, uuid: NodeId) -> Result<Option<Node>, StoreError> {
        let guard = self.inner.read().await;
        Ok(guard.nodes.get(&uuid).cloned())
    }

    async fn get_node_by_row_id(&self, id: NodeRowId) -> Result<Option<Node>, StoreError> {
        let guard = self.inner.read().await;
        Ok(guard.nodes.values().find(|n| n.id == id).cloned())
    }

    async fn list_nodes(&self) -> Result<Vec<Node>, StoreError> {
        let guard = self.inner.read().await;
        Ok(guard.nodes.values().cloned().collect())
    }

    async fn create_node(&self, mut node: Node) -> Result<Node, StoreError> {
        let mut guard = self.inner.write().await;
        guard.next_row_id += 1;
        node.id = NodeRowId(guard.next_row_id);
        guard.nodes.insert(node.uuid, node.clone());
        Ok(node)
    }

    async fn delete_node(&self, uuid: NodeId) -> Result<(), StoreError> {
        let mut guard = self.inner.write().await;
        guard.nodes.remove(&uuid);
        Ok(())
    }

    async fn write_node(&self, node: Node) -> Result<(), StoreError> {
        let mut guard = self.inner.write().await;
        if !guard.nodes.contains_key(&node.uuid) {
            return Err(StoreError::NodeNotFound(node.uuid.to_string()));
        }
        guard.nodes.insert(node.uuid, node);
        Ok(())
    }

    async fn acquire_exclusive(&self, uuid: NodeId, holder: &str) -> Result<Node, StoreError> {
        let mut guard = self.inner.write().await;
        let node = guard
            .nodes
            .get_mut(&uuid)
            .ok_or_else(|| StoreError::NodeNotFound(uuid.to_string()))?;
        if let Some(existing) = &node.reservation {
            return Err(StoreError::NodeLocked {
                node: uuid.to_string(),
                holder: existing.clone(),
            });
        }
        node.reservation = Some(holder.to_string());
        Ok(node.clone())
    }

    async fn release(&self, uuid: NodeId, holder: &str) -> Result<(), StoreError> {
        let mut guard = self.inner.write().await;
        if let Some(node) = guard.nodes.get_mut(&uuid) {
            if node.reservation.as_deref() == Some(holder) {
                node.reservation = None;
            }
        }
        Ok(())
    }

    async fn get_port(&self, id: PortId) -> Result<Option<Port>, StoreError> {
        let guard = self.inner.read().await;
        Ok(guard.ports.get(&id).cloned())
    }

    async fn list_ports_by_node(&self, node_uuid: NodeId) -> Result<Vec<Port>, StoreError> {
        let guard = self.inner.read().await;
        let node_row_id = guard
            .nodes
            .get(&node_uuid)
            .map(|n| n.id)
            .ok_or_else(|| StoreError::NodeNotFound(node_uuid.to_string()))?;
        Ok(guard
            .ports
            .values()
            .filter(|p| p.node_id == node_row_id)
            .cloned()
            .collect())
    }

    async fn find_ports_by_macs(&self, macs: &[MacAddress]) -> Result<Vec<Port>, StoreError> {
        let guard = self.inner.read().await;
        Ok(guard
            .ports
            .values()
            .filter(|p| macs.contains(&p.address))
            .cloned()
            .collect())
    }

    async fn create_port(&self, port: Port) -> Result<Port, StoreError> {
        let mut guard = self.inner.write().await;
        guard.ports.insert(port.id, port.clone());
        Ok(port)
    }

    async fn upsert_port(&self, port: Port) -> Result<(), StoreError> {
        let mut guard = self.inner.write().await;
        guard.ports.insert(port.id, port);
        Ok(())
    }

    async fn delete_port(&self, id: PortId) -> Result<(), StoreError> {
        let mut guard = self.inner.write().await;
        guard.ports.remove(&id);
        Ok(())
    }

    async fn upsert_registration(&self, registration: ConductorRegistration) -> Result<(), StoreError> {
        let mut guard = self.inner.write().await;
        guard
            .registrations
            .insert(registration.hostname.clone(), registration);
        Ok(())
    }

    async fn list_registrations(&self) -> Result<Vec<ConductorRegistration>, StoreError> {
        let guard = self.inner.read().await;
        Ok(guard.registrations.values().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use conductor_domain::PowerState;

    #[tokio::test]
    async fn create_then_get_round_trips() {
        let store = InMemoryStore::new();
        let node = store.create_node(Node::new("fake")).await.unwrap();
        let fetched = store.get_node(node.uuid).await.unwrap().unwrap();
        assert_eq!(fetched.uuid, node.uuid);
        assert_eq!(fetched.id, node.id);
    }

    #[tokio::test]
    async fn second_exclusive_acquire_fails_locked() {
        let store = InMemoryStore::new();
        let node = store.create_node(Node::new("fake")).await.unwrap();

        store.acquire_exclusive(node.uuid, "host-a").await.unwrap();
        let result = store.acquire_exclusive(node.uuid, "host-b").await;
        assert!(matches!(result, Err(StoreError::NodeLocked { .. })));
    }

    #[tokio::test]
    async fn release_by_non_holder_is_a_no_op() {
        let store = InMemoryStore::new();
        let node = store.create_node(Node::new("fake")).await.unwrap();
        store.acquire_exclusive(node.uuid, "host-a").await.unwrap();

        store.release(node.uuid, "host-b").await.unwrap();
        let fetched = store.get_node(node.uuid).await.unwrap().unwrap();
        assert_eq!(fetched.reservation.as_deref(), Some("host-a"));

        store.release(node.uuid, "host-a").await.unwrap();
        let fetched = store.get_node(node.uuid).await.unwrap().unwrap();
        assert!(fetched.reservation.is_none());
    }

    #[tokio::test]
    async fn reacquire_by_same_holder_also_fails_locked() {
        let store = InMemoryStore::new();
        let node = store.create_node(Node::new("fake")).await.unwrap();
        store.acquire_exclusive(node.uuid, "host-a").await.unwrap();
        let reacquired = store.acquire_exclusive(node.uuid, "host-a").await;
        assert!(matches!(reacquired, Err(StoreError::NodeLocked { .. })));
    }

    #[tokio::test]
    async fn find_ports_by_macs_matches_normalized_address() {
        let store = InMemoryStore::new();
        let node = store.create_node(Node::new("fake")).await.unwrap();
        let mac = MacAddress::parse("AA:BB:CC:DD:EE:FF").unwrap();
        store
            .create_port(Port {
                id: PortId(uuid::Uuid::new_v4()),
                node_id: node.id,
                address: mac.clone(),
                extra: Default::default(),
            })
            .await
            .unwrap();

        let found = store.find_ports_by_macs(&[mac]).await.unwrap();
        assert_eq!(found.len(), 1);
    }

    #[tokio::test]
    async fn write_node_persists_power_state() {
        let store = InMemoryStore::new();
        let mut node = store.create_node(Node::new("fake")).await.unwrap();
        node.power_state = PowerState::On;
        store.write_node(node.clone()).await.unwrap();

        let fetched = store.get_node(node.uuid).await.unwrap().unwrap();
        assert_eq!(fetched.power_state, PowerState::On);
    }
}
