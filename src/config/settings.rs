use anyhow::{Context, Result};
use serde::Deserialize;
use std::time::Duration;

/// One outbound notification hook.
#[derive(Debug, Clone, Deserialize)]
pub struct HookSettings {
    /// Webhook URL; receives `{"text": "..."}` as JSON.
    pub url: String,
    /// Allow-list of lifecycle event names forwarded to this hook.
    #[serde(default = "default_hook_events")]
    pub events: Vec<String>,
}

/// Immutable runtime configuration.
///
/// Constructed once at startup (file, then CLI overrides applied by the
/// binary) and passed by `Arc` into the registry and every listener. Nothing
/// in the core reads mutable global state.
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    /// Heartbeat listener endpoint specs (`udp://`, `tcp://`, `unix://`).
    #[serde(default)]
    pub listen: Vec<String>,

    /// Dashboard bind URL, e.g. `http://0.0.0.0:30826?status`.
    #[serde(default)]
    pub web: Option<String>,

    /// Outbound notification hooks.
    #[serde(default)]
    pub hooks: Vec<HookSettings>,

    /// Max heartbeat silence before a node is marked inactive.
    #[serde(default = "default_active_ttl_ms")]
    pub active_ttl_ms: u64,

    /// Additional silence, once inactive, before the record is removed.
    #[serde(default = "default_retire_ttl_ms")]
    pub retire_ttl_ms: u64,

    /// Sweep period. Defaults to half the active TTL.
    #[serde(default)]
    pub sweep_interval_ms: Option<u64>,

    #[serde(default)]
    pub debug: bool,
}

fn default_active_ttl_ms() -> u64 {
    60_000
}

fn default_retire_ttl_ms() -> u64 {
    240_000
}

fn default_hook_events() -> Vec<String> {
    vec![
        "register".to_string(),
        "active".to_string(),
        "inactive".to_string(),
        "reset".to_string(),
        "retire".to_string(),
    ]
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            listen: Vec::new(),
            web: None,
            hooks: Vec::new(),
            active_ttl_ms: default_active_ttl_ms(),
            retire_ttl_ms: default_retire_ttl_ms(),
            sweep_interval_ms: None,
            debug: false,
        }
    }
}

impl Settings {
    /// Loads settings from a JSON file, or returns defaults when no path is
    /// given.
    pub fn load(path: Option<&str>) -> Result<Self> {
        match path {
            Some(path) => {
                let raw = std::fs::read_to_string(path)
                    .with_context(|| format!("could not read config file {}", path))?;
                let settings: Settings = serde_json::from_str(&raw)
                    .with_context(|| format!("could not parse config file {}", path))?;
                Ok(settings)
            }
            None => Ok(Settings::default()),
        }
    }

    pub fn active_ttl(&self) -> Duration {
        Duration::from_millis(self.active_ttl_ms)
    }

    pub fn retire_ttl(&self) -> Duration {
        Duration::from_millis(self.retire_ttl_ms)
    }

    /// Sweep period: configured value, otherwise `active_ttl / 2`, never
    /// below 1 ms.
    pub fn sweep_interval(&self) -> Duration {
        let ms = self
            .sweep_interval_ms
            .unwrap_or(self.active_ttl_ms / 2)
            .max(1);
        Duration::from_millis(ms)
    }

    /// Whether the web URL carries the `status` option, which gates the
    /// `/nodes.json` snapshot route.
    pub fn web_status_enabled(&self) -> bool {
        let Some(web) = &self.web else {
            return false;
        };

        match url::Url::parse(web) {
            Ok(parsed) => parsed
                .query_pairs()
                .any(|(key, _)| key == "status"),
            Err(_) => false,
        }
    }
}
