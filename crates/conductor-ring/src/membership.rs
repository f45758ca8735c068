use chrono::{DateTime, Duration, Utc};
use conductor_domain::ConductorRegistration;

use crate::error::RingError;
use crate::ring::HashRing;

/// Tracks live conductor registrations and rebuilds rings from them on
/// demand. A conductor is considered live iff
/// `now - last_heartbeat_at < heartbeat_timeout`; stale registrations are
/// filtered out of every ring rebuild, never explicitly removed.
#[derive(Debug, Clone, Default)]
pub struct DriverRegistry {
    conductors: Vec<ConductorRegistration>,
}

impl DriverRegistry {
    pub fn new(conductors: Vec<ConductorRegistration>) -> Self {
        DriverRegistry { conductors }
    }

    pub fn conductors(&self) -> &[ConductorRegistration] {
        &self.conductors
    }

    fn live<'a>(
        &'a self,
        now: DateTime<Utc>,
        heartbeat_timeout: Duration,
    ) -> impl Iterator<Item = &'a ConductorRegistration> {
        self.conductors
            .iter()
            .filter(move |c| c.is_live(now, heartbeat_timeout))
    }

    /// Build a ring over every live conductor advertising `driver`.
    pub fn ring_for(
        &self,
        driver: &str,
        now: DateTime<Utc>,
        heartbeat_timeout: Duration,
    ) -> HashRing {
        let hosts = self
            .live(now, heartbeat_timeout)
            .filter(|c| c.drivers.iter().any(|d| d == driver))
            .map(|c| c.hostname.clone());
        HashRing::new(hosts)
    }

    /// Whether `node_key` (the node UUID) is mapped to `host` for `driver`
    /// — i.e. `host` is the first owner in the ring restricted to
    /// conductors advertising `driver`.
    pub fn is_mapped_to(
        &self,
        host: &str,
        node_key: &str,
        driver: &str,
        now: DateTime<Utc>,
        heartbeat_timeout: Duration,
    ) -> Result<bool, RingError> {
        let ring = self.ring_for(driver, now, heartbeat_timeout);
        Ok(ring.primary(node_key)? == host)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registration(hostname: &str, drivers: &[&str], last_heartbeat_at: DateTime<Utc>) -> ConductorRegistration {
        ConductorRegistration {
            hostname: hostname.to_string(),
            drivers: drivers.iter().map(|s| s.to_string()).collect(),
            last_heartbeat_at,
        }
    }

    #[test]
    fn ring_excludes_conductors_without_the_driver() {
        let now = Utc::now();
        let registry = DriverRegistry::new(vec![
            registration("a", &["fake"], now),
            registration("b", &["other"], now),
        ]);
        let ring = registry.ring_for("fake", now, Duration::seconds(60));
        assert_eq!(ring.primary("node-1").unwrap(), "a");
    }

    #[test]
    fn stale_conductor_is_excluded() {
        let now = Utc::now();
        let stale = now - Duration::seconds(120);
        let registry = DriverRegistry::new(vec![
            registration("a", &["fake"], stale),
            registration("b", &["fake"], now),
        ]);
        let ring = registry.ring_for("fake", now, Duration::seconds(60));
        assert_eq!(ring.primary("node-1").unwrap(), "b");
    }

    #[test]
    fn no_live_conductor_fails_mapping_check() {
        let now = Utc::now();
        let registry = DriverRegistry::new(vec![]);
        let result = registry.is_mapped_to("a", "node-1", "fake", now, Duration::seconds(60));
        assert!(matches!(result, Err(RingError::NoValidHost)));
    }
}
