use async_trait::async_trait;
use conductor_domain::{ConductorRegistration, MacAddress, Node, NodeId, NodeRowId, Port, PortId};

use crate::error::StoreError;

/// The repository: durable storage of nodes, ports, and conductor
/// registrations, with row-level reservation for nodes.
///
/// The repository is the single source of truth; process-local caches
/// (ring membership, driver catalog) are rebuilt from it. No conductor
/// writes a node row without first holding its reservation via
/// [`StateStore::acquire_exclusive`].
#[async_trait]
pub trait StateStore: Send + Sync + 'static {
    // ── Nodes ────────────────────────────────────────────────────────────
    async fn get_node(&self, uuid: NodeId) -> Result<Option<Node>, StoreError>;

    /// Resolve by the stable row id — the API surface and port lookups
    /// accept either identifier form (spec.md §4.5).
    async fn get_node_by_row_id(&self, id: NodeRowId) -> Result<Option<Node>, StoreError>;
    async fn list_nodes(&self) -> Result<Vec<Node>, StoreError>;
    async fn create_node(&self, node: Node) -> Result<Node, StoreError>;
    async fn delete_node(&self, uuid: NodeId) -> Result<(), StoreError>;

    /// Overwrite the full node row. Callers outside a held reservation may
    /// only use this for fields not protected by the reservation (the
    /// caller is trusted to respect that split; `conductor-core` enforces
    /// it at the `Task` boundary).
    async fn write_node(&self, node: Node) -> Result<(), StoreError>;

    /// Atomically write `holder` into `reservation` if and only if it is
    /// currently unset. Fails with `StoreError::NodeLocked` otherwise.
    async fn acquire_exclusive(&self, uuid: NodeId, holder: &str) -> Result<Node, StoreError>;

    /// Clear `reservation` if it is currently held by `holder`. A release
    /// by a non-holder (or of an already-unreserved node) is a no-op, not
    /// an error — every release path (success, failure, pool saturation)
    /// must be able to call this unconditionally.
    async fn release(&self, uuid: NodeId, holder: &str) -> Result<(), StoreError>;

    // ── Ports ────────────────────────────────────────────────────────────
    async fn get_port(&self, id: PortId) -> Result<Option<Port>, StoreError>;
    async fn list_ports_by_node(&self, node_uuid: NodeId) -> Result<Vec<Port>, StoreError>;
    async fn find_ports_by_macs(&self, macs: &[MacAddress]) -> Result<Vec<Port>, StoreError>;
    async fn create_port(&self, port: Port) -> Result<Port, StoreError>;
    async fn upsert_port(&self, port: Port) -> Result<(), StoreError>;
    async fn delete_port(&self, id: PortId) -> Result<(), StoreError>;

    // ── Conductor registrations ─────────────────────────────────────────
    async fn upsert_registration(&self, registration: ConductorRegistration) -> Result<(), StoreError>;
    async fn list_registrations(&self) -> Result<Vec<ConductorRegistration>, StoreError>;
}
