//! Load [`BaseConfig`] from CRDBASE_* environment variables (a `.env` file is honoured).

use crate::config::types::{BaseConfig, GroupVersion, DEFAULT_MAX_WAIT, DEFAULT_POLL_INTERVAL, DEFAULT_VERSION};
use crate::config::validate;
use crate::error::ConfigError;
use std::time::Duration;

pub const ENV_GROUP: &str = "CRDBASE_GROUP";
pub const ENV_VERSION: &str = "CRDBASE_VERSION";
pub const ENV_NAMESPACE: &str = "CRDBASE_NAMESPACE";
pub const ENV_SERVICE_ACCOUNT: &str = "CRDBASE_SERVICE_ACCOUNT";
pub const ENV_POLL_INTERVAL_MS: &str = "CRDBASE_POLL_INTERVAL_MS";
pub const ENV_MAX_WAIT_MS: &str = "CRDBASE_MAX_WAIT_MS";

impl BaseConfig {
    /// Read and validate configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        load_from_env()
    }
}

pub fn load_from_env() -> Result<BaseConfig, ConfigError> {
    load_with(|key| dotenvy::var(key).ok())
}

/// Build config from any key lookup. Blank values count as unset.
pub fn load_with<F>(lookup: F) -> Result<BaseConfig, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

    let group = get(ENV_GROUP).ok_or(ConfigError::Missing(ENV_GROUP))?;
    let version = get(ENV_VERSION).unwrap_or_else(|| DEFAULT_VERSION.to_string());
    let namespace = get(ENV_NAMESPACE).ok_or(ConfigError::Missing(ENV_NAMESPACE))?;
    let service_account = get(ENV_SERVICE_ACCOUNT).unwrap_or_else(|| namespace.clone());
    let poll_interval = millis(ENV_POLL_INTERVAL_MS, get(ENV_POLL_INTERVAL_MS))?.unwrap_or(DEFAULT_POLL_INTERVAL);
    let max_wait = millis(ENV_MAX_WAIT_MS, get(ENV_MAX_WAIT_MS))?.unwrap_or(DEFAULT_MAX_WAIT);

    let config = BaseConfig::new(GroupVersion::new(group, version), namespace, service_account)
        .with_readiness(poll_interval, max_wait);
    validate(&config)?;
    Ok(config)
}

fn millis(key: &str, raw: Option<String>) -> Result<Option<Duration>, ConfigError> {
    raw.map(|v| {
        v.parse::<u64>()
            .map(Duration::from_millis)
            .map_err(|e| ConfigError::Load(format!("{}: {}", key, e)))
    })
    .transpose()
}
