use std::sync::Arc;

use chrono::Utc;
use conductor_domain::{ConductorRegistration, ProvisionState};
use conductor_ring::DriverRegistry;
use tokio::task::JoinSet;
use tokio::time::interval;
use tracing::warn;

use crate::conductor::Conductor;
use crate::error::ConductorError;

impl Conductor {
    /// Spawn the three periodic loops (spec.md §4.5) as independent tasks.
    /// Each runs for the lifetime of the returned `JoinSet`; dropping or
    /// aborting it stops the loops.
    pub fn run_periodic_loops(self: &Arc<Self>) -> JoinSet<()> {
        let mut set = JoinSet::new();
        set.spawn(heartbeat_loop(self.clone()));
        set.spawn(power_sync_loop(self.clone()));
        set.spawn(deploy_timeout_sweep_loop(self.clone()));
        set
    }
}

/// Benign, expected races every loop must swallow rather than treat as a
/// loop-fatal error (spec.md §4.5 closing line).
fn is_benign_skip(e: &ConductorError) -> bool {
    matches!(e, ConductorError::NodeNotFound(_) | ConductorError::NodeLocked { .. })
}

async fn heartbeat_loop(conductor: Arc<Conductor>) {
    let mut ticker = interval(conductor.config().heartbeat_interval);
    loop {
        ticker.tick().await;

        let registration = ConductorRegistration {
            hostname: conductor.hostname().to_string(),
            drivers: conductor.drivers().driver_names(),
            last_heartbeat_at: Utc::now(),
        };
        if let Err(e) = conductor.store().upsert_registration(registration).await {
            warn!(error = %e, "heartbeat: failed to write conductor registration");
            continue;
        }

        match conductor.store().list_registrations().await {
            Ok(registrations) => {
                let mut ring = conductor.ring().write().await;
                *ring = DriverRegistry::new(registrations);
            }
            Err(e) => warn!(error = %e, "heartbeat: failed to rebuild ring membership"),
        }
    }
}

async fn power_sync_loop(conductor: Arc<Conductor>) {
    let mut ticker = interval(conductor.config().sync_power_state_interval);
    loop {
        ticker.tick().await;

        let nodes = match conductor.store().list_nodes().await {
            Ok(nodes) => nodes,
            Err(e) => {
                warn!(error = %e, "power sync: failed to list nodes");
                continue;
            }
        };

        for node in nodes {
            if node.reservation.is_some() || node.maintenance {
                continue;
            }
            if node.provision_state == ProvisionState::DeployWait {
                continue;
            }
            match conductor.is_mapped(&node).await {
                Ok(true) => {}
                Ok(false) => continue,
                Err(_) => continue,
            }

            if let Err(e) = conductor.sync_node_power(node.uuid).await {
                if !is_benign_skip(&e) {
                    warn!(node = %node.uuid, error = %e, "power sync: unexpected error");
                }
            }
        }
    }
}

async fn deploy_timeout_sweep_loop(conductor: Arc<Conductor>) {
    let mut ticker = interval(conductor.config().check_provision_state_interval);
    loop {
        ticker.tick().await;

        // Boundary behavior (spec.md §8): a zero timeout means the sweep
        // never fires, not that everything is immediately overdue.
        if conductor.config().deploy_callback_timeout.is_zero() {
            continue;
        }

        let nodes = match conductor.store().list_nodes().await {
            Ok(nodes) => nodes,
            Err(e) => {
                warn!(error = %e, "deploy sweep: failed to list nodes");
                continue;
            }
        };

        let timeout = chrono::Duration::from_std(conductor.config().deploy_callback_timeout)
            .unwrap_or_else(|_| chrono::Duration::seconds(1800));
        let now = Utc::now();

        for node in nodes {
            if node.reservation.is_some() || node.maintenance {
                continue;
            }
            if node.provision_state != ProvisionState::DeployWait {
                continue;
            }
            let Some(updated_at) = node.provision_updated_at else {
                continue;
            };
            if now - updated_at < timeout {
                continue;
            }
            match conductor.is_mapped(&node).await {
                Ok(true) => {}
                Ok(false) => continue,
                Err(_) => continue,
            }

            if let Err(e) = conductor.fail_timed_out_deploy(node.uuid).await {
                if !is_benign_skip(&e) {
                    warn!(node = %node.uuid, error = %e, "deploy sweep: unexpected error");
                }
            }
        }
    }
}
