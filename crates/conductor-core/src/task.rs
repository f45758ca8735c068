use std::sync::Arc;

use conductor_domain::{Node, NodeId};
use conductor_driver::{Driver, DriverCatalog};
use conductor_store::StateStore;
use tracing::warn;

use crate::error::ConductorError;

/// A resolved node snapshot bound to its driver, held for the duration of
/// one operation (spec.md §4.3). An exclusive task clears its reservation
/// on every exit path — normal return, error, or hand-off to a worker —
/// via [`Task::release`]; a task dropped without an explicit release still
/// clears the reservation, but logs a warning, since that path means a
/// caller forgot the hand-off discipline.
pub struct Task {
    pub node: Node,
    pub driver: Arc<dyn Driver>,
    exclusive: bool,
    released: bool,
    store: Arc<dyn StateStore>,
    holder: String,
}

impl Task {
    /// Release the reservation this task holds, if exclusive. Idempotent:
    /// safe to call once and then let the `Task` drop.
    pub async fn release(mut self) -> Result<(), ConductorError> {
        self.released = true;
        if self.exclusive {
            self.store.release(self.node.uuid, &self.holder).await?;
        }
        Ok(())
    }
}

impl Drop for Task {
    fn drop(&mut self) {
        if self.exclusive && !self.released {
            let store = self.store.clone();
            let uuid = self.node.uuid;
            let holder = self.holder.clone();
            tokio::spawn(async move {
                if let Err(e) = store.release(uuid, &holder).await {
                    warn!(%uuid, error = %e, "failed to release task reservation on drop");
                }
            });
        }
    }
}

/// Acquires [`Task`]s, resolving a node snapshot and its bound driver
/// under either an exclusive reservation or a plain shared read.
pub struct TaskManager {
    store: Arc<dyn StateStore>,
    drivers: Arc<DriverCatalog>,
    hostname: String,
}

impl TaskManager {
    pub fn new(store: Arc<dyn StateStore>, drivers: Arc<DriverCatalog>, hostname: impl Into<String>) -> Self {
        TaskManager {
            store,
            drivers,
            hostname: hostname.into(),
        }
    }

    /// Shared acquisition: resolve the node and driver without reserving.
    pub async fn acquire_shared(&self, node_uuid: NodeId) -> Result<Task, ConductorError> {
        let node = self
            .store
            .get_node(node_uuid)
            .await?
            .ok_or_else(|| ConductorError::NodeNotFound(node_uuid.to_string()))?;
        self.bind(node, false)
    }

    /// Exclusive acquisition: fails with `NodeLocked` if another holder's
    /// reservation is already set.
    pub async fn acquire_exclusive(&self, node_uuid: NodeId) -> Result<Task, ConductorError> {
        let node = self.store.acquire_exclusive(node_uuid, &self.hostname).await?;
        match self.bind(node, true) {
            Ok(task) => Ok(task),
            Err(e) => {
                // Binding failed after the reservation was already written —
                // clear it immediately rather than leaving a dangling lock.
                let _ = self.store.release(node_uuid, &self.hostname).await;
                Err(e)
            }
        }
    }

    fn bind(&self, node: Node, exclusive: bool) -> Result<Task, ConductorError> {
        let driver = self.drivers.get(&node.driver)?;
        Ok(Task {
            node,
            driver,
            exclusive,
            released: false,
            store: self.store.clone(),
            holder: self.hostname.clone(),
        })
    }
}
