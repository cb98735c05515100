//! Watcher registry and periodic refresh sweep

use super::{ClusterWatcher, WatchContext};
use crate::config::MonitoringConfig;
use crate::health::{components, HealthRegistry};
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{info, warn};

/// Credentials expire after an hour; rebuild subscriptions before that
pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(55 * 60);

pub const DEFAULT_INITIAL_DELAY: Duration = Duration::from_secs(5);

/// Outcome of one sweep
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RefreshReport {
    pub created: usize,
    pub restarted: usize,
    pub failed: usize,
}

impl RefreshReport {
    pub fn total(&self) -> usize {
        self.created + self.restarted
    }
}

/// Keeps one watcher per watched cluster
pub struct WatchEngine {
    config: Arc<MonitoringConfig>,
    ctx: Arc<WatchContext>,
    enabled: bool,
    watchers: DashMap<(String, String), Arc<ClusterWatcher>>,
}

impl WatchEngine {
    pub fn new(config: Arc<MonitoringConfig>, ctx: Arc<WatchContext>, enabled: bool) -> Self {
        Self {
            config,
            ctx,
            enabled,
            watchers: DashMap::new(),
        }
    }

    /// Create missing watchers and restart existing ones
    ///
    /// A cluster that fails to connect keeps its (idle) watcher so the
    /// next sweep retries it.
    pub async fn refresh_all(&self) -> RefreshReport {
        let mut report = RefreshReport::default();
        if !self.enabled {
            return report;
        }

        for descriptor in self.config.watched_clusters() {
            let key = (descriptor.project.clone(), descriptor.name.clone());
            let existing = self.watchers.get(&key).map(|w| w.value().clone());

            let watcher = match existing {
                Some(watcher) => {
                    self.ctx
                        .logger
                        .log_watcher_restart(&descriptor.project, &descriptor.name);
                    watcher.close().await;
                    report.restarted += 1;
                    watcher
                }
                None => {
                    let watcher =
                        Arc::new(ClusterWatcher::new(descriptor.clone(), self.ctx.clone()));
                    self.watchers.insert(key, watcher.clone());
                    report.created += 1;
                    watcher
                }
            };

            if let Err(e) = watcher.init().await {
                report.failed += 1;
                warn!(
                    project = %descriptor.project,
                    cluster = %descriptor.name,
                    error = %e,
                    "Could not init watcher"
                );
            }
        }

        self.ctx.metrics.set_active_watchers(self.active_count().await as i64);
        report
    }

    /// Watchers with a live subscription
    pub async fn active_count(&self) -> usize {
        let watchers: Vec<Arc<ClusterWatcher>> =
            self.watchers.iter().map(|w| w.value().clone()).collect();

        let mut active = 0;
        for watcher in watchers {
            if watcher.is_running().await {
                active += 1;
            }
        }
        active
    }

    pub fn watcher_count(&self) -> usize {
        self.watchers.len()
    }

    /// Close every watcher
    pub async fn close_all(&self) {
        let watchers: Vec<Arc<ClusterWatcher>> =
            self.watchers.iter().map(|w| w.value().clone()).collect();
        for watcher in watchers {
            watcher.close().await;
        }
        self.ctx.metrics.set_active_watchers(0);
    }

    /// Sweep at a fixed rate after an initial delay until shutdown
    pub async fn run(
        &self,
        initial_delay: Duration,
        interval: Duration,
        health: HealthRegistry,
        mut shutdown: broadcast::Receiver<()>,
    ) {
        if !self.enabled {
            info!("Event watchers disabled via configuration");
            return;
        }

        info!(
            initial_delay_secs = initial_delay.as_secs(),
            interval_secs = interval.as_secs(),
            "Starting watcher refresh loop"
        );

        let mut ticker = tokio::time::interval_at(Instant::now() + initial_delay, interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let report = self.refresh_all().await;
                    info!(
                        created = report.created,
                        restarted = report.restarted,
                        failed = report.failed,
                        "Watcher refresh complete"
                    );
                    health
                        .record_pass(components::WATCHERS, report.failed, report.total())
                        .await;
                }
                _ = shutdown.recv() => {
                    info!("Shutting down watchers");
                    self.close_all().await;
                    break;
                }
            }
        }
    }
}
