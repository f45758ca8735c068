use std::collections::HashMap;
use std::env;

/// Permissive snapshot of the process environment: every variable we
/// recognize, read once as a raw string (or absent). Parsing and defaulting
/// happens in `loader`; this module never fails.
#[derive(Debug, Default, Clone)]
pub struct RawConfig {
    vars: HashMap<String, String>,
}

impl RawConfig {
    pub const PREFIX: &'static str = "CONDUCTOR_";

    /// Snapshot every `CONDUCTOR_*` variable currently set in the process
    /// environment.
    pub fn from_env() -> Self {
        let vars = env::vars()
            .filter_map(|(k, v)| {
                k.strip_prefix(Self::PREFIX)
                    .map(|name| (name.to_ascii_lowercase(), v))
            })
            .collect();
        RawConfig { vars }
    }

    /// Build a `RawConfig` from an explicit map, bypassing the process
    /// environment entirely. Keys are the unprefixed, lowercase variable
    /// names (e.g. `"heartbeat_interval"`).
    pub fn from_map(vars: HashMap<String, String>) -> Self {
        RawConfig { vars }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(|s| s.as_str())
    }
}
