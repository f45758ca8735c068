use std::time::Duration;

use tracing::debug;
use uuid::Uuid;

use crate::error::ConfigError;
use crate::raw::RawConfig;

/// Fully parsed, validated conductor configuration. Read-only after
/// construction — every field named by the environment/configuration list
/// is represented, defaulted where the default is unambiguous and required
/// (no default) where it is not.
#[derive(Debug, Clone)]
pub struct ConductorConfig {
    pub heartbeat_interval: Duration,
    pub heartbeat_timeout: Duration,
    pub sync_power_state_interval: Duration,
    pub check_provision_state_interval: Duration,
    pub deploy_callback_timeout: Duration,
    pub force_power_state_during_sync: bool,
    pub power_state_sync_max_retries: u32,

    pub rpc_thread_pool_size: usize,

    pub tftp_root: String,
    pub tftp_server: String,
    pub pxe_bootfile_name: String,

    pub image_cache_size_mb: u64,
    pub image_cache_ttl: Duration,

    pub swift_temp_url_key: Option<String>,
    pub swift_temp_url_duration: Duration,
    pub swift_temp_url_methods: Vec<String>,

    pub provisioning_network_uuid: Option<Uuid>,
    pub agent_api_version: String,
    pub api_url: String,
}

impl ConductorConfig {
    /// Load from the process environment, applying `CONDUCTOR_` prefixed
    /// variables over the defaults below.
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_raw(&RawConfig::from_env())
    }

    pub fn from_raw(raw: &RawConfig) -> Result<Self, ConfigError> {
        let cfg = ConductorConfig {
            heartbeat_interval: duration_secs(raw, "heartbeat_interval", 10)?,
            heartbeat_timeout: duration_secs(raw, "heartbeat_timeout", 60)?,
            sync_power_state_interval: duration_secs(raw, "sync_power_state_interval", 60)?,
            check_provision_state_interval: duration_secs(
                raw,
                "check_provision_state_interval",
                60,
            )?,
            deploy_callback_timeout: duration_secs(raw, "deploy_callback_timeout", 1800)?,
            force_power_state_during_sync: boolean(raw, "force_power_state_during_sync", false)?,
            power_state_sync_max_retries: number(raw, "power_state_sync_max_retries", 3)?,

            rpc_thread_pool_size: number(raw, "rpc_thread_pool_size", 128)?,

            tftp_root: string(raw, "tftp_root", "/tftpboot"),
            tftp_server: string(raw, "tftp_server", "0.0.0.0"),
            pxe_bootfile_name: string(raw, "pxe_bootfile_name", "pxelinux.0"),

            image_cache_size_mb: number(raw, "image_cache_size", 20480)?,
            image_cache_ttl: duration_secs(raw, "image_cache_ttl", 86400)?,

            swift_temp_url_key: raw.get("swift_temp_url_key").map(|s| s.to_string()),
            swift_temp_url_duration: duration_secs(raw, "swift_temp_url_duration", 1200)?,
            swift_temp_url_methods: list(raw, "swift_temp_url_methods", &["GET"]),

            provisioning_network_uuid: optional_uuid(raw, "provisioning_network_uuid")?,
            agent_api_version: string(raw, "agent_api_version", "v1"),
            api_url: string(raw, "api_url", "http://localhost:6385"),
        };

        debug!(
            rpc_thread_pool_size = cfg.rpc_thread_pool_size,
            tftp_root = %cfg.tftp_root,
            "conductor configuration loaded"
        );
        Ok(cfg)
    }
}

fn string(raw: &RawConfig, key: &str, default: &str) -> String {
    raw.get(key).unwrap_or(default).to_string()
}

fn list(raw: &RawConfig, key: &str, default: &[&str]) -> Vec<String> {
    match raw.get(key) {
        Some(v) => v
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect(),
        None => default.iter().map(|s| s.to_string()).collect(),
    }
}

fn boolean(raw: &RawConfig, key: &str, default: bool) -> Result<bool, ConfigError> {
    match raw.get(key) {
        None => Ok(default),
        Some(v) => match v.to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            other => Err(ConfigError::Invalid {
                var: key.to_string(),
                message: format!("'{}' is not a recognized boolean", other),
            }),
        },
    }
}

fn number<T>(raw: &RawConfig, key: &str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
{
    match raw.get(key) {
        None => Ok(default),
        Some(v) => v.parse::<T>().map_err(|_| ConfigError::Invalid {
            var: key.to_string(),
            message: format!("'{}' is not a valid integer", v),
        }),
    }
}

fn duration_secs(raw: &RawConfig, key: &str, default_secs: u64) -> Result<Duration, ConfigError> {
    let secs: u64 = number(raw, key, default_secs)?;
    Ok(Duration::from_secs(secs))
}

fn optional_uuid(raw: &RawConfig, key: &str) -> Result<Option<Uuid>, ConfigError> {
    match raw.get(key) {
        None => Ok(None),
        Some(v) if v.is_empty() => Ok(None),
        Some(v) => Uuid::parse_str(v)
            .map(Some)
            .map_err(|_| ConfigError::Invalid {
                var: key.to_string(),
                message: format!("'{}' is not a valid UUID", v),
            }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn defaults_apply_when_env_empty() {
        let raw = RawConfig::from_map(HashMap::new());
        let cfg = ConductorConfig::from_raw(&raw).unwrap();
        assert_eq!(cfg.heartbeat_interval, Duration::from_secs(10));
        assert_eq!(cfg.rpc_thread_pool_size, 128);
        assert_eq!(cfg.swift_temp_url_methods, vec!["GET".to_string()]);
        assert!(cfg.provisioning_network_uuid.is_none());
    }

    #[test]
    fn overrides_are_parsed() {
        let mut vars = HashMap::new();
        vars.insert("heartbeat_interval".to_string(), "5".to_string());
        vars.insert(
            "swift_temp_url_methods".to_string(),
            "GET,PUT".to_string(),
        );
        vars.insert(
            "force_power_state_during_sync".to_string(),
            "true".to_string(),
        );
        let raw = RawConfig::from_map(vars);
        let cfg = ConductorConfig::from_raw(&raw).unwrap();
        assert_eq!(cfg.heartbeat_interval, Duration::from_secs(5));
        assert_eq!(
            cfg.swift_temp_url_methods,
            vec!["GET".to_string(), "PUT".to_string()]
        );
        assert!(cfg.force_power_state_during_sync);
    }

    #[test]
    fn invalid_integer_is_rejected() {
        let mut vars = HashMap::new();
        vars.insert("rpc_thread_pool_size".to_string(), "not-a-number".to_string());
        let raw = RawConfig::from_map(vars);
        assert!(ConductorConfig::from_raw(&raw).is_err());
    }

    #[test]
    fn invalid_uuid_is_rejected() {
        let mut vars = HashMap::new();
        vars.insert(
            "provisioning_network_uuid".to_string(),
            "not-a-uuid".to_string(),
        );
        let raw = RawConfig::from_map(vars);
        assert!(ConductorConfig::from_raw(&raw).is_err());
    }
}
