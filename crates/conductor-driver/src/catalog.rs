use std::collections::HashMap;
use std::sync::Arc;

use crate::driver::Driver;
use crate::error::DriverError;

/// Resolves a node's `driver` name string to a bound driver instance.
///
/// Distinct from `conductor_ring::DriverRegistry`, which tracks which
/// *conductors* advertise a driver name for ring membership; this catalog
/// answers "what object implements this name on this process".
#[derive(Clone, Default)]
pub struct DriverCatalog {
    drivers: HashMap<String, Arc<dyn Driver>>,
}

impl DriverCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, driver: Arc<dyn Driver>) -> &mut Self {
        self.drivers.insert(driver.name().to_string(), driver);
        self
    }

    pub fn get(&self, name: &str) -> Result<Arc<dyn Driver>, DriverError> {
        self.drivers
            .get(name)
            .cloned()
            .ok_or_else(|| DriverError::DriverNotFound(name.to_string()))
    }

    /// Every driver name this catalog can resolve, used to populate a
    /// conductor's own `ConductorRegistration.drivers`.
    pub fn driver_names(&self) -> Vec<String> {
        self.drivers.keys().cloned().collect()
    }
}

impl std::fmt::Debug for DriverCatalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DriverCatalog")
            .field("drivers", &self.driver_names())
            .finish()
    }
}
