//! Core data models for the cluster monitor

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Request to pause workloads for a planned maintenance window
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MaintenanceRequest {
    pub project: String,
    pub cluster: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    #[serde(default)]
    pub workloads_to_scale: Vec<String>,
}

impl MaintenanceRequest {
    pub fn includes(&self, workload: &str) -> bool {
        self.workloads_to_scale.iter().any(|w| w == workload)
    }
}

/// Lifecycle of a maintenance window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MaintenanceStatus {
    NotStarted,
    Started,
    Ended,
    Error,
}

impl MaintenanceStatus {
    /// Ended and Error absorb every later tick
    pub fn is_terminal(&self) -> bool {
        matches!(self, MaintenanceStatus::Ended | MaintenanceStatus::Error)
    }
}

impl std::fmt::Display for MaintenanceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MaintenanceStatus::NotStarted => write!(f, "NOT_STARTED"),
            MaintenanceStatus::Started => write!(f, "STARTED"),
            MaintenanceStatus::Ended => write!(f, "ENDED"),
            MaintenanceStatus::Error => write!(f, "ERROR"),
        }
    }
}

/// One scheduled maintenance and the replica counts it must restore
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MaintenanceState {
    pub maintenance_request: MaintenanceRequest,
    pub maintenance_status: MaintenanceStatus,
    pub original_replica_counts: BTreeMap<String, i32>,
}

impl MaintenanceState {
    pub fn new(request: MaintenanceRequest) -> Self {
        Self {
            maintenance_request: request,
            maintenance_status: MaintenanceStatus::NotStarted,
            original_replica_counts: BTreeMap::new(),
        }
    }

    /// Whether the next transition is due at `now`
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        match self.maintenance_status {
            MaintenanceStatus::NotStarted => now >= self.maintenance_request.start_time,
            MaintenanceStatus::Started => now >= self.maintenance_request.end_time,
            MaintenanceStatus::Ended | MaintenanceStatus::Error => false,
        }
    }
}

/// A workload believed to be rolling out
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectedDeployment {
    pub project: String,
    pub cluster: String,
    pub workload_name: String,
    pub expiration: DateTime<Utc>,
}

impl DetectedDeployment {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expiration
    }

    pub fn matches(&self, project: &str, cluster: &str) -> bool {
        self.project == project && self.cluster == cluster
    }
}

/// Health verdict for one cluster
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ClusterHealth {
    Ok,
    Degraded,
    Down,
}

/// Point-in-time reconciliation result
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterStatus {
    pub project: String,
    pub cluster: String,
    pub state: ClusterHealth,
    pub issues: Vec<String>,
    pub deployments_active: Vec<String>,
}

impl ClusterStatus {
    pub fn down(project: &str, cluster: &str) -> Self {
        Self {
            project: project.to_string(),
            cluster: cluster.to_string(),
            state: ClusterHealth::Down,
            issues: Vec::new(),
            deployments_active: Vec::new(),
        }
    }
}
