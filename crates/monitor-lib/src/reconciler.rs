//! Point-in-time drift check for one cluster
//!
//! Compares the expected workload set of a cluster against what the API
//! server reports. Only readiness parity and existence are checked, by
//! name and across all namespaces.

use crate::cluster::ClusterConnector;
use crate::config::{MonitoringConfig, WorkloadKind};
use crate::error::Result;
use crate::models::{ClusterHealth, ClusterStatus};
use crate::observability::MonitorMetrics;
use crate::tracker::DeploymentTracker;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

/// Computes [`ClusterStatus`] verdicts on demand
pub struct DriftReconciler {
    config: Arc<MonitoringConfig>,
    tracker: Arc<DeploymentTracker>,
    connector: Arc<ClusterConnector>,
    metrics: MonitorMetrics,
}

impl DriftReconciler {
    pub fn new(
        config: Arc<MonitoringConfig>,
        tracker: Arc<DeploymentTracker>,
        connector: Arc<ClusterConnector>,
    ) -> Self {
        Self {
            config,
            tracker,
            connector,
            metrics: MonitorMetrics::new(),
        }
    }

    /// Current status of a configured cluster
    ///
    /// Fails with `UnknownCluster` for unconfigured clusters and with a
    /// client error if listing fails; an unreachable cluster is reported
    /// as DOWN rather than an error.
    pub async fn status(&self, project: &str, cluster: &str) -> Result<ClusterStatus> {
        info!(project = %project, cluster = %cluster, "Getting cluster status");
        let started = Instant::now();

        let descriptor = self.config.find_cluster(project, cluster)?;
        let deploying = self.tracker.active(project, cluster).await;

        let client = match self.connector.connect(descriptor).await {
            Ok(client) => client,
            Err(e) if e.is_unreachable() => {
                warn!(project = %project, cluster = %cluster, error = %e, "Cluster is down");
                return Ok(ClusterStatus::down(project, cluster));
            }
            Err(e) => return Err(e),
        };

        let suppressed: HashSet<&str> = deploying.iter().map(String::as_str).collect();
        let mut issues = Vec::new();
        let mut missing = Vec::new();

        let listed = async {
            for kind in WorkloadKind::ALL {
                let workloads = client.list_workloads(kind).await?;
                let observed: HashSet<&str> = workloads.iter().map(|w| w.name.as_str()).collect();

                for workload in &workloads {
                    if workload.ready_replicas != workload.desired_replicas
                        && !suppressed.contains(workload.name.as_str())
                        && descriptor.expects(kind, &workload.name)
                    {
                        issues.push(format!(
                            "{} {} expected {} replicas, but only {} ready",
                            kind, workload.name, workload.desired_replicas, workload.ready_replicas
                        ));
                    }
                }

                // Missing workloads are reported even while a rollout is tracked
                for expected in descriptor.expected_workloads.names(kind) {
                    if !observed.contains(expected.as_str()) {
                        missing.push(format!(
                            "{} {} not found in cluster {}",
                            kind, expected, cluster
                        ));
                    }
                }
            }
            Ok::<(), crate::error::MonitorError>(())
        }
        .await;
        client.close();
        listed?;

        issues.extend(missing);
        let state = if issues.is_empty() {
            ClusterHealth::Ok
        } else {
            ClusterHealth::Degraded
        };

        self.metrics
            .observe_status_latency(started.elapsed().as_secs_f64());

        Ok(ClusterStatus {
            project: project.to_string(),
            cluster: cluster.to_string(),
            state,
            issues,
            deployments_active: deploying,
        })
    }
}
