//! Scheduled maintenance windows
//!
//! A request scales the named workloads to zero at its start time and
//! restores the ready-replica counts recorded at that moment once its end
//! time passes. Transitions are triggered by a periodic scan, so the scan
//! interval bounds how late a window can start or end.

use crate::cluster::ClusterConnector;
use crate::config::{MonitoringConfig, WorkloadKind};
use crate::error::{MonitorError, Result};
use crate::health::{components, HealthRegistry};
use crate::models::{MaintenanceRequest, MaintenanceState, MaintenanceStatus};
use crate::notify::NotificationService;
use crate::observability::{MonitorMetrics, StructuredLogger};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, Mutex};
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

/// Default scan interval (10 seconds)
pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_secs(10);

/// Outcome of one scan over all maintenance states
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    /// States whose transition was due
    pub due: usize,
    pub advanced: usize,
    /// Left unchanged because the cluster could not be reached
    pub deferred: usize,
    pub failed: usize,
}

enum TaskOutcome {
    Advanced,
    Deferred(MonitorError),
}

/// Owns every maintenance state and drives its transitions
pub struct MaintenanceOrchestrator {
    config: Arc<MonitoringConfig>,
    connector: Arc<ClusterConnector>,
    notifications: NotificationService,
    states: Mutex<Vec<MaintenanceState>>,
    /// Serializes scans so a state is never processed twice at once
    tick_lock: Mutex<()>,
    metrics: MonitorMetrics,
    logger: StructuredLogger,
}

impl MaintenanceOrchestrator {
    pub fn new(
        config: Arc<MonitoringConfig>,
        connector: Arc<ClusterConnector>,
        notifications: NotificationService,
    ) -> Self {
        Self {
            config,
            connector,
            notifications,
            states: Mutex::new(Vec::new()),
            tick_lock: Mutex::new(()),
            metrics: MonitorMetrics::new(),
            logger: StructuredLogger::new("kube-monitor"),
        }
    }

    pub fn with_logger(mut self, logger: StructuredLogger) -> Self {
        self.logger = logger;
        self
    }

    /// Accept a request; it runs on the first scan at or after its start time
    pub async fn schedule(&self, request: MaintenanceRequest) -> Result<MaintenanceState> {
        self.config.find_cluster(&request.project, &request.cluster)?;
        if request.end_time < request.start_time {
            return Err(MonitorError::invalid_request(format!(
                "end time {} is before start time {}",
                request.end_time.to_rfc3339(),
                request.start_time.to_rfc3339()
            )));
        }

        let state = MaintenanceState::new(request);
        self.states.lock().await.push(state.clone());

        info!(
            project = %state.maintenance_request.project,
            cluster = %state.maintenance_request.cluster,
            start = %state.maintenance_request.start_time,
            end = %state.maintenance_request.end_time,
            workloads = ?state.maintenance_request.workloads_to_scale,
            "Scheduled maintenance"
        );
        self.notifications
            .notify_maintenance_scheduled(&state.maintenance_request)
            .await;

        Ok(state)
    }

    /// Snapshot of every state, terminal ones included
    pub async fn states(&self) -> Vec<MaintenanceState> {
        self.states.lock().await.clone()
    }

    /// Run every due transition once
    ///
    /// States are processed one after another; a failure only affects
    /// the state it happened on.
    pub async fn tick(&self) -> TickReport {
        let _scan = self.tick_lock.lock().await;
        let now = Utc::now();

        let due: Vec<(usize, MaintenanceState)> = self
            .states
            .lock()
            .await
            .iter()
            .enumerate()
            .filter(|(_, state)| state.is_due(now))
            .map(|(index, state)| (index, state.clone()))
            .collect();

        let mut report = TickReport {
            due: due.len(),
            ..Default::default()
        };

        for (index, mut state) in due {
            let previous = state.maintenance_status;
            let project = state.maintenance_request.project.clone();
            let cluster = state.maintenance_request.cluster.clone();
            info!(project = %project, cluster = %cluster, status = %previous, "Running maintenance task");

            match self.run_task(&mut state).await {
                Ok(TaskOutcome::Advanced) => {
                    report.advanced += 1;
                    self.metrics
                        .inc_maintenance_transition(&state.maintenance_status.to_string());
                    self.logger.log_maintenance_transition(
                        &project,
                        &cluster,
                        &previous.to_string(),
                        &state.maintenance_status.to_string(),
                    );
                    self.notifications.notify_maintenance_update(&state).await;
                }
                Ok(TaskOutcome::Deferred(e)) => {
                    report.deferred += 1;
                    warn!(
                        project = %project,
                        cluster = %cluster,
                        error = %e,
                        "Could not reach cluster, retrying maintenance on next scan"
                    );
                }
                Err(e) => {
                    report.failed += 1;
                    error!(project = %project, cluster = %cluster, error = %e, "Exception while executing maintenance");
                    state.maintenance_status = MaintenanceStatus::Error;
                    self.metrics.inc_maintenance_failures();
                    self.metrics
                        .inc_maintenance_transition(&MaintenanceStatus::Error.to_string());
                    self.notifications
                        .notify_maintenance_failed(&state, &e.to_string())
                        .await;
                }
            }

            // States are append-only, so the index is still valid
            if let Some(slot) = self.states.lock().await.get_mut(index) {
                *slot = state;
            }
        }

        report
    }

    async fn run_task(&self, state: &mut MaintenanceState) -> Result<TaskOutcome> {
        let request = state.maintenance_request.clone();
        let descriptor = self.config.find_cluster(&request.project, &request.cluster)?;

        let client = match self.connector.connect(descriptor).await {
            Ok(client) => client,
            Err(e) => return Ok(TaskOutcome::Deferred(e)),
        };

        let scaled = self.scale_workloads(client.as_ref(), state).await;
        client.close();
        scaled?;

        state.maintenance_status = match state.maintenance_status {
            MaintenanceStatus::NotStarted => MaintenanceStatus::Started,
            MaintenanceStatus::Started => MaintenanceStatus::Ended,
            other => other,
        };
        Ok(TaskOutcome::Advanced)
    }

    async fn scale_workloads(
        &self,
        client: &dyn crate::cluster::ClusterClient,
        state: &mut MaintenanceState,
    ) -> Result<()> {
        let lifecycle = state.maintenance_status;

        for kind in WorkloadKind::ALL {
            for workload in client.list_workloads(kind).await? {
                debug!(
                    kind = %kind,
                    name = %workload.name,
                    namespace = %workload.namespace,
                    ready = workload.ready_replicas,
                    expected = workload.desired_replicas,
                    "Found workload"
                );
                if !state.maintenance_request.includes(&workload.name) {
                    continue;
                }

                match lifecycle {
                    MaintenanceStatus::NotStarted => {
                        state
                            .original_replica_counts
                            .insert(workload.name.clone(), workload.ready_replicas);
                        client
                            .scale(kind, &workload.namespace, &workload.name, 0)
                            .await?;
                    }
                    MaintenanceStatus::Started => {
                        let Some(&replicas) = state.original_replica_counts.get(&workload.name)
                        else {
                            debug!(name = %workload.name, "No saved replica count, leaving as is");
                            continue;
                        };
                        client
                            .scale(kind, &workload.namespace, &workload.name, replicas)
                            .await?;
                    }
                    MaintenanceStatus::Ended | MaintenanceStatus::Error => {}
                }
            }
        }

        Ok(())
    }

    /// Scan on a fixed delay until shutdown
    pub async fn run(
        &self,
        interval: Duration,
        health: HealthRegistry,
        mut shutdown: broadcast::Receiver<()>,
    ) {
        info!(interval_secs = interval.as_secs(), "Starting maintenance scheduler");

        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let report = self.tick().await;
                    if report.due > 0 {
                        debug!(?report, "Maintenance scan complete");
                    }
                    health
                        .record_pass(
                            components::MAINTENANCE,
                            report.failed + report.deferred,
                            report.due,
                        )
                        .await;
                }
                _ = shutdown.recv() => {
                    info!("Shutting down maintenance scheduler");
                    break;
                }
            }
        }
    }
}
