//! Service configuration

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::time::Duration;

/// Service settings, read from `kube-monitor.{toml,json,yaml}` and
/// `MONITOR_*` environment variables
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    /// API server port
    #[serde(default = "default_api_port")]
    pub api_port: u16,

    /// Path of the JSON file describing the monitored clusters
    #[serde(default = "default_monitoring_config")]
    pub monitoring_config: String,

    /// Global switch for cluster event watchers
    #[serde(default = "default_true")]
    pub watchers_enabled: bool,

    #[serde(default = "default_maintenance_interval")]
    pub maintenance_interval_secs: u64,

    /// Full watcher rebuild interval; must stay below the token lifetime
    #[serde(default = "default_watcher_refresh")]
    pub watcher_refresh_secs: u64,

    #[serde(default = "default_watcher_initial_delay")]
    pub watcher_initial_delay_secs: u64,

    /// Bound for every outbound call (gcloud, API server, webhooks)
    #[serde(default = "default_io_timeout")]
    pub io_timeout_secs: u64,

    #[serde(default = "default_dedup_window")]
    pub dedup_window_secs: u64,

    #[serde(default = "default_dedup_sweep")]
    pub dedup_sweep_secs: u64,

    /// How long a detected rollout suppresses drift alarms
    #[serde(default = "default_deployment_window")]
    pub deployment_window_secs: u64,

    #[serde(default = "default_gcloud_binary")]
    pub gcloud_binary: String,

    /// Instance name reported in structured logs
    #[serde(default = "default_instance")]
    pub instance: String,
}

fn default_api_port() -> u16 {
    8080
}

fn default_monitoring_config() -> String {
    "monitoring-config.json".to_string()
}

fn default_true() -> bool {
    true
}

fn default_maintenance_interval() -> u64 {
    10
}

fn default_watcher_refresh() -> u64 {
    55 * 60
}

fn default_watcher_initial_delay() -> u64 {
    5
}

fn default_io_timeout() -> u64 {
    30
}

fn default_dedup_window() -> u64 {
    5 * 60
}

fn default_dedup_sweep() -> u64 {
    60 * 60
}

fn default_deployment_window() -> u64 {
    3 * 60
}

fn default_gcloud_binary() -> String {
    "gcloud".to_string()
}

fn default_instance() -> String {
    std::env::var("HOSTNAME").unwrap_or_else(|_| "kube-monitor".to_string())
}

impl ServiceConfig {
    /// Load configuration from the optional config file and environment
    pub fn load() -> Result<Self> {
        Self::load_from(config::File::with_name("kube-monitor").required(false))
    }

    /// Load with an explicit file source; environment still overrides it
    pub fn load_from<S>(file: S) -> Result<Self>
    where
        S: config::Source + Send + Sync + 'static,
    {
        let config = config::Config::builder()
            .add_source(file)
            .add_source(config::Environment::with_prefix("MONITOR").try_parsing(true))
            .build()
            .context("failed to read service configuration")?;

        let settings: Self = config
            .try_deserialize()
            .context("invalid service configuration")?;
        settings.validate()?;
        Ok(settings)
    }

    /// Periodic drivers cannot tick at a zero interval, and a zero I/O
    /// bound would time out every outbound call
    fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("maintenance_interval_secs", self.maintenance_interval_secs),
            ("watcher_refresh_secs", self.watcher_refresh_secs),
            ("dedup_sweep_secs", self.dedup_sweep_secs),
            ("io_timeout_secs", self.io_timeout_secs),
        ] {
            if value == 0 {
                bail!("invalid service configuration: {} must be greater than zero", name);
            }
        }
        Ok(())
    }

    pub fn maintenance_interval(&self) -> Duration {
        Duration::from_secs(self.maintenance_interval_secs)
    }

    pub fn watcher_refresh(&self) -> Duration {
        Duration::from_secs(self.watcher_refresh_secs)
    }

    pub fn watcher_initial_delay(&self) -> Duration {
        Duration::from_secs(self.watcher_initial_delay_secs)
    }

    pub fn io_timeout(&self) -> Duration {
        Duration::from_secs(self.io_timeout_secs)
    }

    pub fn dedup_window(&self) -> Duration {
        Duration::from_secs(self.dedup_window_secs)
    }

    pub fn dedup_sweep(&self) -> Duration {
        Duration::from_secs(self.dedup_sweep_secs)
    }

    pub fn deployment_window(&self) -> Duration {
        Duration::from_secs(self.deployment_window_secs)
    }
}
