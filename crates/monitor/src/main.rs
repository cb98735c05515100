//! kube-monitor - fleet monitor for GKE clusters
//!
//! Watches cluster events, suppresses drift alarms during rollouts,
//! reports workload drift on demand and runs scheduled maintenance
//! windows.

use anyhow::{Context, Result};
use kube_monitor::{api, config::ServiceConfig};
use monitor_lib::{
    health::{components, HealthRegistry},
    ClusterConnector, DeploymentTracker, DriftReconciler, EventCache, GcloudCredentials,
    KubeClientFactory, MaintenanceOrchestrator, MonitoringConfig, NotificationService,
    StructuredLogger, SlackNotifier, WatchContext, WatchEngine,
};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const MONITOR_VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and env filter
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    info!("Starting kube-monitor");

    let settings = ServiceConfig::load()?;
    let monitoring = Arc::new(
        MonitoringConfig::load(Path::new(&settings.monitoring_config))
            .with_context(|| format!("loading {}", settings.monitoring_config))?,
    );

    let logger = StructuredLogger::new(&settings.instance);
    logger.log_startup(MONITOR_VERSION, monitoring.clusters.len());

    let health_registry = HealthRegistry::new();
    health_registry.register(components::WATCHERS).await;
    health_registry.register(components::MAINTENANCE).await;
    health_registry.register(components::API).await;

    // Shared core
    let notifier = Arc::new(SlackNotifier::new(&monitoring, settings.io_timeout())?);
    let notifications = NotificationService::new(monitoring.clone(), notifier);
    let cache = Arc::new(EventCache::new().with_window(settings.dedup_window()));
    let tracker = Arc::new(
        DeploymentTracker::new(notifications.clone())
            .with_suppression(settings.deployment_window()),
    );
    let connector = Arc::new(ClusterConnector::new(
        Arc::new(GcloudCredentials::new(&settings.gcloud_binary)),
        Arc::new(KubeClientFactory::new(settings.io_timeout(), settings.io_timeout())),
        settings.io_timeout(),
    ));

    let maintenance = Arc::new(
        MaintenanceOrchestrator::new(monitoring.clone(), connector.clone(), notifications.clone())
            .with_logger(logger.clone()),
    );
    let reconciler = Arc::new(DriftReconciler::new(
        monitoring.clone(),
        tracker.clone(),
        connector.clone(),
    ));
    let engine = Arc::new(WatchEngine::new(
        monitoring.clone(),
        Arc::new(WatchContext::new(
            connector,
            tracker.clone(),
            notifications,
            cache.clone(),
            logger.clone(),
        )),
        settings.watchers_enabled,
    ));

    let (shutdown_tx, _) = broadcast::channel::<()>(1);

    let maintenance_handle = {
        let maintenance = maintenance.clone();
        let health = health_registry.clone();
        let shutdown = shutdown_tx.subscribe();
        let interval = settings.maintenance_interval();
        tokio::spawn(async move { maintenance.run(interval, health, shutdown).await })
    };

    let engine_handle = {
        let engine = engine.clone();
        let health = health_registry.clone();
        let shutdown = shutdown_tx.subscribe();
        let (delay, interval) = (settings.watcher_initial_delay(), settings.watcher_refresh());
        tokio::spawn(async move { engine.run(delay, interval, health, shutdown).await })
    };

    let sweeper_handle = {
        let cache = cache.clone();
        let shutdown = shutdown_tx.subscribe();
        let interval = settings.dedup_sweep();
        tokio::spawn(async move { cache.run_sweeper(interval, shutdown).await })
    };

    let app_state = Arc::new(api::AppState {
        health_registry: health_registry.clone(),
        config: monitoring.clone(),
        reconciler,
        tracker,
        maintenance,
    });

    // Start health, metrics and control API
    let api_handle = {
        let health = health_registry.clone();
        let port = settings.api_port;
        tokio::spawn(async move {
            if let Err(e) = api::serve(port, app_state).await {
                error!(error = %e, "API server stopped");
                health.set_unhealthy(components::API, e.to_string()).await;
            }
        })
    };

    health_registry.set_ready(true).await;

    tokio::signal::ctrl_c().await?;
    logger.log_shutdown("SIGINT received");

    // Receivers may already be gone if a driver exited early
    let _ = shutdown_tx.send(());
    for handle in [maintenance_handle, engine_handle, sweeper_handle] {
        if let Err(e) = handle.await {
            error!(error = %e, "Background task failed");
        }
    }
    engine.close_all().await;
    api_handle.abort();

    info!("Shutdown complete");
    Ok(())
}
