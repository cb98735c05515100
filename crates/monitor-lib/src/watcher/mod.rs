//! Cluster event watching
//!
//! One long-lived subscription per watched cluster. Events become
//! rollout signals for the [`DeploymentTracker`] or alerts for the
//! notifier. Stale subscriptions reconnect in place; the engine also
//! rebuilds every subscription on a fixed interval so credentials are
//! refreshed before they expire.

mod classify;
mod cluster_watcher;
mod engine;

pub use classify::{classify, AlertSignal, EventAction};
pub use cluster_watcher::ClusterWatcher;
pub use engine::{RefreshReport, WatchEngine, DEFAULT_INITIAL_DELAY, DEFAULT_REFRESH_INTERVAL};

use crate::cache::EventCache;
use crate::cluster::ClusterConnector;
use crate::notify::NotificationService;
use crate::observability::{MonitorMetrics, StructuredLogger};
use crate::tracker::DeploymentTracker;
use std::sync::Arc;

/// Collaborators shared by every watcher
pub struct WatchContext {
    pub(crate) connector: Arc<ClusterConnector>,
    pub(crate) tracker: Arc<DeploymentTracker>,
    pub(crate) notifications: NotificationService,
    pub(crate) cache: Arc<EventCache>,
    pub(crate) metrics: MonitorMetrics,
    pub(crate) logger: StructuredLogger,
}

impl WatchContext {
    pub fn new(
        connector: Arc<ClusterConnector>,
        tracker: Arc<DeploymentTracker>,
        notifications: NotificationService,
        cache: Arc<EventCache>,
        logger: StructuredLogger,
    ) -> Self {
        Self {
            connector,
            tracker,
            notifications,
            cache,
            metrics: MonitorMetrics::new(),
            logger,
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::cluster::test_support::{FakeCluster, FakeCredentials, FakeFactory};
    use crate::config::test_support::{descriptor, monitoring_config};
    use crate::config::MonitoringConfig;
    use crate::notify::test_support::RecordingNotifier;
    use std::time::Duration;

    pub struct Fixture {
        pub ctx: Arc<WatchContext>,
        pub config: Arc<MonitoringConfig>,
        pub factory: Arc<FakeFactory>,
        pub credentials: Arc<FakeCredentials>,
        pub notifier: Arc<RecordingNotifier>,
    }

    impl Fixture {
        pub fn new(clusters: Vec<Arc<FakeCluster>>) -> Self {
            Self::with_credentials(clusters, Arc::new(FakeCredentials::default()))
        }

        pub fn with_credentials(
            clusters: Vec<Arc<FakeCluster>>,
            credentials: Arc<FakeCredentials>,
        ) -> Self {
            let config = Arc::new(monitoring_config(vec![
                descriptor("shop", "prod"),
                descriptor("shop", "staging"),
            ]));
            let notifier = Arc::new(RecordingNotifier::default());
            let notifications = NotificationService::new(config.clone(), notifier.clone());
            let factory = Arc::new(FakeFactory::new(clusters));
            let connector = Arc::new(ClusterConnector::new(
                credentials.clone(),
                factory.clone(),
                Duration::from_secs(5),
            ));
            let tracker = Arc::new(DeploymentTracker::new(notifications.clone()));

            let ctx = Arc::new(WatchContext::new(
                connector,
                tracker,
                notifications,
                Arc::new(EventCache::new()),
                StructuredLogger::new("test"),
            ));

            Self {
                ctx,
                config,
                factory,
                credentials,
                notifier,
            }
        }
    }

    /// Context backed by a single idle fake cluster
    pub fn context() -> (Arc<WatchContext>, Fixture) {
        let fx = Fixture::new(vec![Arc::new(FakeCluster::default())]);
        (fx.ctx.clone(), fx)
    }
}
