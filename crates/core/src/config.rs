//! Operator configuration, read once at startup from `ETHEREAL_*` variables.

use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

pub const DEFAULT_NAMESPACE: &str = "default";
pub const DEFAULT_IMAGE: &str = "sunday-app:latest";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProbeSettings {
    pub path: String,
    pub port: i32,
    pub initial_delay_secs: i32,
    pub period_secs: i32,
}

impl Default for ProbeSettings {
    fn default() -> Self {
        Self { path: "/health".into(), port: 8080, initial_delay_secs: 5, period_secs: 10 }
    }
}

/// Host directory mounted into every instance for payload data.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StorageSettings {
    pub volume_name: String,
    pub host_path: String,
    pub mount_path: String,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self { volume_name: "sunday-storage".into(), host_path: "/tmp/sunday-storage".into(), mount_path: "/data".into() }
    }
}

/// Fixed shape of every instance the operator creates.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct InstanceTemplate {
    pub container_name: String,
    pub image_pull_policy: String,
    pub app_label: String,
    pub probe: ProbeSettings,
    pub storage: Option<StorageSettings>,
}

impl Default for InstanceTemplate {
    fn default() -> Self {
        Self {
            container_name: "main-container".into(),
            image_pull_policy: "Never".into(),
            app_label: "sunday-app".into(),
            probe: ProbeSettings::default(),
            storage: Some(StorageSettings::default()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct OperatorConfig {
    pub namespace: String,
    pub interval: Duration,
    /// Delay after a cycle that could not list records.
    pub backoff: Duration,
    pub default_image: String,
    pub template: InstanceTemplate,
}

impl Default for OperatorConfig {
    fn default() -> Self {
        Self {
            namespace: DEFAULT_NAMESPACE.into(),
            interval: Duration::from_secs(5),
            backoff: Duration::from_secs(15),
            default_image: DEFAULT_IMAGE.into(),
            template: InstanceTemplate::default(),
        }
    }
}

impl OperatorConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup; unset or unparsable values keep defaults.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut cfg = Self::default();
        if let Some(ns) = lookup("ETHEREAL_NAMESPACE").filter(|s| !s.is_empty()) {
            cfg.namespace = ns;
        }
        if let Some(secs) = parse_var::<u64, _>(&lookup, "ETHEREAL_INTERVAL_SECS") {
            cfg.interval = Duration::from_secs(secs.max(1));
        }
        if let Some(secs) = parse_var::<u64, _>(&lookup, "ETHEREAL_BACKOFF_SECS") {
            cfg.backoff = Duration::from_secs(secs.max(1));
        }
        if let Some(img) = lookup("ETHEREAL_DEFAULT_IMAGE").filter(|s| !s.trim().is_empty()) {
            cfg.default_image = img;
        }
        if let Some(policy) = lookup("ETHEREAL_PULL_POLICY").filter(|s| !s.is_empty()) {
            cfg.template.image_pull_policy = policy;
        }
        if let Some(path) = lookup("ETHEREAL_STORAGE_PATH") {
            cfg.template.storage = if path.is_empty() {
                None
            } else {
                Some(StorageSettings { host_path: path, ..StorageSettings::default() })
            };
        }
        cfg
    }
}

fn parse_var<T, F>(lookup: &F, key: &str) -> Option<T>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    let raw = lookup(key)?;
    match raw.trim().parse::<T>() {
        Ok(v) => Some(v),
        Err(_) => {
            warn!(key, value = %raw, "ignoring unparsable config value");
            None
        }
    }
}
