use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use conductor_domain::{Node, PowerState};
use tracing::debug;

use crate::driver::{ConsoleInfo, DeployOutcome, Driver, TearDownOutcome};
use crate::error::DriverError;

/// Deterministic, no-I/O driver used by tests and the `driver=fake` fixture
/// throughout the conductor's testable-property scenarios.
///
/// Tracks per-node observed power state in memory so repeated
/// `set_power_state`/`get_power_state` calls behave consistently across a
/// single process lifetime, without touching any real hardware.
#[derive(Debug, Default)]
pub struct FakeDriver {
    power: Mutex<HashMap<String, PowerState>>,
}

impl FakeDriver {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Driver for FakeDriver {
    fn name(&self) -> &'static str {
        "fake"
    }

    async fn get_power_state(&self, node: &Node) -> Result<PowerState, DriverError> {
        let power = self.power.lock().unwrap();
        Ok(power
            .get(&node.uuid.to_string())
            .copied()
            .unwrap_or(node.power_state))
    }

    async fn set_power_state(
        &self,
        node: &Node,
        target: PowerState,
    ) -> Result<PowerState, DriverError> {
        debug!(node = %node.uuid, ?target, "FakeDriver: set_power_state");
        let mut power = self.power.lock().unwrap();
        power.insert(node.uuid.to_string(), target);
        Ok(target)
    }

    async fn validate_deploy(&self, _node: &Node) -> Result<(), DriverError> {
        Ok(())
    }

    async fn deploy(&self, node: &Node) -> Result<DeployOutcome, DriverError> {
        debug!(node = %node.uuid, "FakeDriver: deploy");
        Ok(DeployOutcome::DeployWait)
    }

    async fn tear_down(&self, node: &Node) -> Result<TearDownOutcome, DriverError> {
        debug!(node = %node.uuid, "FakeDriver: tear_down");
        Ok(TearDownOutcome::Deleted)
    }

    async fn clean_up(&self, node: &Node) -> Result<(), DriverError> {
        debug!(node = %node.uuid, "FakeDriver: clean_up");
        Ok(())
    }

    fn supports_console(&self) -> bool {
        true
    }

    async fn get_console_information(&self, _node: &Node) -> Result<ConsoleInfo, DriverError> {
        Ok(ConsoleInfo {
            console_type: "fake".to_string(),
            url: "fake://console".to_string(),
        })
    }

    async fn set_console_mode(&self, _node: &Node, _enabled: bool) -> Result<(), DriverError> {
        Ok(())
    }

    fn supports_management(&self) -> bool {
        true
    }

    async fn get_boot_device(&self, _node: &Node) -> Result<String, DriverError> {
        Ok("disk".to_string())
    }

    async fn set_boot_device(&self, node: &Node, device: &str) -> Result<(), DriverError> {
        debug!(node = %node.uuid, device, "FakeDriver: set_boot_device");
        Ok(())
    }
}
