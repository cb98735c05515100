//! Monitoring configuration: the static set of watched clusters
//!
//! The file format mirrors the JSON document operators already maintain,
//! so keys are kebab-case. Disabled clusters are removed at load time and
//! never reach the core.

use crate::error::{MonitorError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

/// Root monitoring configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MonitoringConfig {
    #[serde(default)]
    pub clusters: Vec<ClusterDescriptor>,
    #[serde(default, rename = "slack-webhooks")]
    pub slack_webhooks: Vec<WebhookConfig>,
}

/// Identity, alerting switches and expected workloads of one cluster
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterDescriptor {
    pub project: String,
    pub name: String,
    pub zone: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub events: EventConfig,
    #[serde(default)]
    pub notifications: NotificationConfig,
    #[serde(default, rename = "expected-workloads")]
    pub expected_workloads: ExpectedWorkloads,
}

impl ClusterDescriptor {
    /// Whether this descriptor identifies the given project/cluster pair
    pub fn matches(&self, project: &str, cluster: &str) -> bool {
        self.project == project && self.name == cluster
    }

    /// True if the workload name is listed as an expected Deployment or StatefulSet
    pub fn expects(&self, kind: WorkloadKind, name: &str) -> bool {
        self.expected_workloads
            .names(kind)
            .iter()
            .any(|expected| expected == name)
    }
}

/// Event watching switches
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EventConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub types: EventTypes,
}

/// Per-category alert switches
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct EventTypes {
    #[serde(default, rename = "readiness-probe")]
    pub readiness_probe: bool,
    #[serde(default, rename = "liveness-probe")]
    pub liveness_probe: bool,
    #[serde(default, rename = "oom-kill")]
    pub oom_kill: bool,
}

/// Notification routing per category
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NotificationConfig {
    #[serde(default)]
    pub events: NotificationBinding,
    #[serde(default)]
    pub deployments: NotificationBinding,
    #[serde(default)]
    pub maintenance: NotificationBinding,
}

/// Enablement flag and destination for one notification category
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NotificationBinding {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default, rename = "slack-webhook")]
    pub slack_webhook: Option<String>,
}

/// Workloads that must exist and be fully ready
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExpectedWorkloads {
    #[serde(default)]
    pub deployments: Vec<String>,
    #[serde(default, rename = "stateful-sets")]
    pub stateful_sets: Vec<String>,
}

impl ExpectedWorkloads {
    pub fn names(&self, kind: WorkloadKind) -> &[String] {
        match kind {
            WorkloadKind::Deployment => &self.deployments,
            WorkloadKind::StatefulSet => &self.stateful_sets,
        }
    }
}

/// Named chat webhook destination
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookConfig {
    pub name: String,
    pub url: String,
}

/// Workload kinds the monitor understands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WorkloadKind {
    Deployment,
    StatefulSet,
}

impl WorkloadKind {
    pub const ALL: [WorkloadKind; 2] = [WorkloadKind::StatefulSet, WorkloadKind::Deployment];
}

impl std::fmt::Display for WorkloadKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WorkloadKind::Deployment => write!(f, "Deployment"),
            WorkloadKind::StatefulSet => write!(f, "StatefulSet"),
        }
    }
}

fn default_true() -> bool {
    true
}

impl MonitoringConfig {
    /// Load the configuration from a JSON file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            MonitorError::config(format!("failed to read {}: {}", path.display(), e))
        })?;
        Self::from_json(&content)
    }

    /// Parse, drop disabled clusters and validate webhook references
    pub fn from_json(content: &str) -> Result<Self> {
        let mut config: MonitoringConfig = serde_json::from_str(content)
            .map_err(|e| MonitorError::config(format!("invalid monitoring config: {}", e)))?;

        config.clusters.retain(|cluster| {
            if !cluster.enabled {
                info!(
                    project = %cluster.project,
                    cluster = %cluster.name,
                    "Cluster disabled via configuration"
                );
            }
            cluster.enabled
        });

        config.validate()?;
        info!(clusters = config.clusters.len(), "Loaded cluster config");
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        for cluster in &self.clusters {
            let bindings = [
                ("events", &cluster.notifications.events),
                ("deployments", &cluster.notifications.deployments),
                ("maintenance", &cluster.notifications.maintenance),
            ];
            for (category, binding) in bindings {
                if !binding.enabled {
                    continue;
                }
                let webhook = binding.slack_webhook.as_deref().ok_or_else(|| {
                    MonitorError::config(format!(
                        "{}/{}: {} notifications enabled without a slack-webhook",
                        cluster.project, cluster.name, category
                    ))
                })?;
                if self.webhook_url(webhook).is_none() {
                    return Err(MonitorError::config(format!(
                        "{}/{}: unknown webhook {}",
                        cluster.project, cluster.name, webhook
                    )));
                }
            }
        }
        Ok(())
    }

    /// Find the descriptor for a project/cluster pair
    pub fn find_cluster(&self, project: &str, cluster: &str) -> Result<&ClusterDescriptor> {
        self.clusters
            .iter()
            .find(|c| c.matches(project, cluster))
            .ok_or_else(|| MonitorError::unknown_cluster(project, cluster))
    }

    /// Resolve a webhook name to its URL
    pub fn webhook_url(&self, name: &str) -> Option<&str> {
        self.slack_webhooks
            .iter()
            .find(|w| w.name == name)
            .map(|w| w.url.as_str())
    }

    /// Clusters with event watching turned on
    pub fn watched_clusters(&self) -> impl Iterator<Item = &ClusterDescriptor> {
        self.clusters.iter().filter(|c| c.events.enabled)
    }
}
