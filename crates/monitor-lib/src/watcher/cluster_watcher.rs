//! Event subscription for a single cluster

use super::classify::{classify, EventAction};
use super::WatchContext;
use crate::cluster::{ClusterClient, ClusterEvent, EventStream};
use crate::config::ClusterDescriptor;
use crate::error::{MonitorError, Result};
use chrono::{DateTime, SubsecRound, Utc};
use futures::StreamExt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

static NEXT_WATCHER_ID: AtomicU64 = AtomicU64::new(1);

/// Client currently backing the subscription; replaced on reconnect
///
/// Once released, clients handed to the slot are closed on arrival, so a
/// task racing its own shutdown cannot leak a connection.
#[derive(Default)]
struct ClientSlot {
    inner: std::sync::Mutex<SlotState>,
}

#[derive(Default)]
struct SlotState {
    client: Option<Arc<dyn ClusterClient>>,
    released: bool,
}

impl ClientSlot {
    /// Store a fresh client; false if the watcher was already shut down
    fn install(&self, client: Arc<dyn ClusterClient>) -> bool {
        let accepted = match self.inner.lock() {
            Ok(mut state) if !state.released => {
                state.client = Some(client.clone());
                true
            }
            _ => false,
        };
        if !accepted {
            client.close();
        }
        accepted
    }

    /// Close the current client ahead of a reconnect
    fn close_current(&self) {
        let stale = self.inner.lock().ok().and_then(|mut s| s.client.take());
        if let Some(client) = stale {
            client.close();
        }
    }

    /// Close the current client and refuse any later one
    fn release(&self) {
        let client = self.inner.lock().ok().and_then(|mut s| {
            s.released = true;
            s.client.take()
        });
        if let Some(client) = client {
            client.close();
        }
    }
}

struct Running {
    id: String,
    task: JoinHandle<()>,
    client: Arc<ClientSlot>,
}

/// Owns the subscription task and the client behind it
pub struct ClusterWatcher {
    descriptor: Arc<ClusterDescriptor>,
    ctx: Arc<WatchContext>,
    running: Mutex<Option<Running>>,
}

impl ClusterWatcher {
    pub fn new(descriptor: ClusterDescriptor, ctx: Arc<WatchContext>) -> Self {
        Self {
            descriptor: Arc::new(descriptor),
            ctx,
            running: Mutex::new(None),
        }
    }

    pub fn project(&self) -> &str {
        &self.descriptor.project
    }

    pub fn cluster(&self) -> &str {
        &self.descriptor.name
    }

    /// Connect and start consuming events
    ///
    /// A watcher that is already running is closed first, so at most one
    /// subscription exists per cluster.
    pub async fn init(&self) -> Result<()> {
        let mut running = self.running.lock().await;
        if let Some(previous) = running.take() {
            shutdown(previous);
        }

        let id = format!("w{:05}", NEXT_WATCHER_ID.fetch_add(1, Ordering::Relaxed));
        let slot = Arc::new(ClientSlot::default());
        let (stream, started_at) = open(&self.ctx, &self.descriptor, &slot).await?;

        self.ctx
            .logger
            .log_watcher_started(self.project(), self.cluster(), &id);

        let task = tokio::spawn(consume(
            self.ctx.clone(),
            self.descriptor.clone(),
            id.clone(),
            slot.clone(),
            stream,
            started_at,
        ));

        *running = Some(Running {
            id,
            task,
            client: slot,
        });
        Ok(())
    }

    /// Stop the subscription, then release the client; safe to repeat
    pub async fn close(&self) {
        if let Some(previous) = self.running.lock().await.take() {
            debug!(
                project = %self.project(),
                cluster = %self.cluster(),
                watcher_id = %previous.id,
                "Closing watcher"
            );
            shutdown(previous);
        }
    }

    /// Whether a subscription task is alive
    pub async fn is_running(&self) -> bool {
        self.running
            .lock()
            .await
            .as_ref()
            .map(|r| !r.task.is_finished())
            .unwrap_or(false)
    }
}

fn shutdown(running: Running) {
    running.task.abort();
    running.client.release();
}

/// Connect, record the start instant and open the subscription
///
/// The client lands in the slot before the subscription is awaited, so a
/// shutdown in between still closes it.
async fn open(
    ctx: &WatchContext,
    descriptor: &ClusterDescriptor,
    slot: &ClientSlot,
) -> Result<(EventStream, DateTime<Utc>)> {
    let client = ctx.connector.connect(descriptor).await?;
    if !slot.install(client.clone()) {
        return Err(MonitorError::client("watcher closed while connecting"));
    }
    // Event timestamps carry whole seconds
    let started_at = Utc::now().trunc_subsecs(0);

    match client.watch_events().await {
        Ok(stream) => Ok((stream, started_at)),
        Err(e) => {
            slot.close_current();
            Err(e)
        }
    }
}

/// Consume events until the subscription ends, reconnecting on stale
/// resource versions
async fn consume(
    ctx: Arc<WatchContext>,
    descriptor: Arc<ClusterDescriptor>,
    id: String,
    slot: Arc<ClientSlot>,
    mut stream: EventStream,
    mut started_at: DateTime<Utc>,
) {
    loop {
        let closed_with = drain(&ctx, &descriptor, &id, stream, started_at).await;

        match closed_with {
            None => {
                debug!(project = %descriptor.project, cluster = %descriptor.name, watcher_id = %id, "Watch closed");
                return;
            }
            Some(MonitorError::WatchInvalidated(reason)) => {
                debug!(
                    project = %descriptor.project,
                    watcher_id = %id,
                    reason = %reason,
                    "resourceVersion too old for watch, reconnecting"
                );
                ctx.metrics.inc_watcher_reconnects();

                slot.close_current();

                match open(&ctx, &descriptor, &slot).await {
                    Ok((next, start)) => {
                        stream = next;
                        started_at = start;
                    }
                    Err(e) => {
                        warn!(
                            project = %descriptor.project,
                            cluster = %descriptor.name,
                            error = %e,
                            "Could not reconnect watcher, waiting for next refresh"
                        );
                        return;
                    }
                }
            }
            Some(e) => {
                error!(
                    project = %descriptor.project,
                    cluster = %descriptor.name,
                    watcher_id = %id,
                    error = %e,
                    "Unexpected error on watch close"
                );
                return;
            }
        }
    }
}

/// Handle events in subscription order; the stream is dropped on return
async fn drain(
    ctx: &WatchContext,
    descriptor: &ClusterDescriptor,
    id: &str,
    mut stream: EventStream,
    started_at: DateTime<Utc>,
) -> Option<MonitorError> {
    while let Some(item) = stream.next().await {
        match item {
            Ok(event) => handle_event(ctx, descriptor, id, &event, started_at).await,
            Err(e) => return Some(e),
        }
    }
    None
}

pub(crate) async fn handle_event(
    ctx: &WatchContext,
    descriptor: &ClusterDescriptor,
    id: &str,
    event: &ClusterEvent,
    started_at: DateTime<Utc>,
) {
    ctx.metrics.inc_events_received();

    if let Some(timestamp) = event.timestamp {
        if timestamp < started_at {
            ctx.metrics.inc_events_dropped();
            debug!(project = %descriptor.project, watcher_id = %id, uid = %event.uid, "Dropped event occurring before watch started");
            return;
        }
    }

    let project = descriptor.project.as_str();
    let cluster = descriptor.name.as_str();

    match classify(event) {
        EventAction::TrackDeployment => {
            ctx.tracker.add_deployment(project, cluster, &event.name).await;
        }
        EventAction::Alert(signal) => {
            if signal.deduplicated() && ctx.cache.has_cached(&event.uid).await {
                debug!(message = %event.message, "Event already cached, ignoring");
                return;
            }
            if !signal.enabled(&descriptor.events.types) {
                return;
            }

            ctx.logger.log_alert(project, cluster, &event.reason, &event.name);
            ctx.metrics.inc_alerts(&event.reason);
            ctx.notifications
                .notify_event(project, cluster, &signal.message(project, event))
                .await;
        }
        EventAction::Ignore => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::test_support::{FakeCluster, FakeCredentials, ScriptedWatch};
    use crate::config::test_support::descriptor;
    use crate::watcher::classify::event;
    use crate::watcher::test_support::{context, Fixture};
    use std::time::Duration;

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    #[tokio::test]
    async fn test_reconnects_once_on_stale_resource_version() {
        let first = Arc::new(FakeCluster::default());
        first.push_watch(ScriptedWatch::Finite(vec![Err(MonitorError::WatchInvalidated(
            "too old resourceVersion".to_string(),
        ))]));
        let second = Arc::new(FakeCluster::default());

        let fx = Fixture::new(vec![first.clone(), second.clone()]);
        let watcher = ClusterWatcher::new(descriptor("shop", "prod"), fx.ctx.clone());

        watcher.init().await.unwrap();
        settle().await;

        assert_eq!(fx.factory.created.load(Ordering::SeqCst), 2);
        assert_eq!(first.close_calls.load(Ordering::SeqCst), 1);
        assert_eq!(first.open_subscriptions.load(Ordering::SeqCst), 0);
        assert_eq!(second.open_subscriptions.load(Ordering::SeqCst), 1);
        assert!(watcher.is_running().await);

        watcher.close().await;
        settle().await;
        assert_eq!(second.open_subscriptions.load(Ordering::SeqCst), 0);
        assert_eq!(second.close_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_close_during_reconnect_releases_new_client() {
        let first = Arc::new(FakeCluster::default());
        first.push_watch(ScriptedWatch::Finite(vec![Err(MonitorError::WatchInvalidated(
            "too old resourceVersion".to_string(),
        ))]));
        let second = Arc::new(FakeCluster::default());
        *second.watch_delay.lock().unwrap() = Some(Duration::from_millis(500));

        let fx = Fixture::new(vec![first.clone(), second.clone()]);
        let watcher = ClusterWatcher::new(descriptor("shop", "prod"), fx.ctx.clone());

        watcher.init().await.unwrap();
        settle().await;
        assert_eq!(fx.factory.created.load(Ordering::SeqCst), 2);

        // Reconnected client is still waiting on its subscription
        watcher.close().await;
        settle().await;

        assert_eq!(second.close_calls.load(Ordering::SeqCst), 1);
        assert_eq!(second.open_subscriptions.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_released_slot_closes_late_clients() {
        let slot = ClientSlot::default();
        let early = Arc::new(FakeCluster::default());
        let late = Arc::new(FakeCluster::default());

        assert!(slot.install(early.clone()));
        slot.release();
        assert!(!slot.install(late.clone()));

        assert_eq!(early.close_calls.load(Ordering::SeqCst), 1);
        assert_eq!(late.close_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_normal_close_does_not_reconnect() {
        let cluster = Arc::new(FakeCluster::default());
        cluster.push_watch(ScriptedWatch::Finite(vec![]));

        let fx = Fixture::new(vec![cluster.clone()]);
        let watcher = ClusterWatcher::new(descriptor("shop", "prod"), fx.ctx.clone());

        watcher.init().await.unwrap();
        settle().await;

        assert_eq!(fx.factory.created.load(Ordering::SeqCst), 1);
        assert!(!watcher.is_running().await);
    }

    #[tokio::test]
    async fn test_other_errors_stop_the_watcher() {
        let cluster = Arc::new(FakeCluster::default());
        cluster.push_watch(ScriptedWatch::Finite(vec![Err(MonitorError::client(
            "forbidden",
        ))]));

        let fx = Fixture::new(vec![cluster.clone()]);
        let watcher = ClusterWatcher::new(descriptor("shop", "prod"), fx.ctx.clone());

        watcher.init().await.unwrap();
        settle().await;

        assert_eq!(fx.factory.created.load(Ordering::SeqCst), 1);
        assert!(!watcher.is_running().await);
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let cluster = Arc::new(FakeCluster::default());
        let fx = Fixture::new(vec![cluster.clone()]);
        let watcher = ClusterWatcher::new(descriptor("shop", "prod"), fx.ctx.clone());

        watcher.close().await;
        watcher.init().await.unwrap();
        watcher.close().await;
        watcher.close().await;

        assert_eq!(cluster.close_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_init_fails_for_unreachable_cluster() {
        let credentials = Arc::new(FakeCredentials::default());
        credentials.mark_missing("prod");
        let fx = Fixture::with_credentials(vec![Arc::new(FakeCluster::default())], credentials);
        let watcher = ClusterWatcher::new(descriptor("shop", "prod"), fx.ctx.clone());

        assert!(watcher.init().await.unwrap_err().is_unreachable());
        assert!(!watcher.is_running().await);
    }

    #[tokio::test]
    async fn test_events_before_start_are_dropped() {
        let mut old = event("Warning", "Node", "OOMKilling", "oom");
        old.uid = "old".to_string();
        old.timestamp = Some(Utc::now() - chrono::Duration::hours(1));
        let mut fresh = event("Warning", "Node", "OOMKilling", "oom");
        fresh.uid = "fresh".to_string();
        fresh.timestamp = Some(Utc::now() + chrono::Duration::hours(1));

        let cluster = Arc::new(FakeCluster::default());
        cluster.push_watch(ScriptedWatch::Open(vec![Ok(old), Ok(fresh)]));
        let fx = Fixture::new(vec![cluster]);
        let watcher = ClusterWatcher::new(descriptor("shop", "prod"), fx.ctx.clone());

        watcher.init().await.unwrap();
        settle().await;

        assert_eq!(fx.notifier.sent().len(), 1);
        watcher.close().await;
    }

    #[tokio::test]
    async fn test_unhealthy_events_are_deduplicated() {
        let (ctx, fx) = context();
        let d = descriptor("shop", "prod");
        let e = event("Warning", "Pod", "Unhealthy", "Readiness probe failed");
        let start = Utc::now();

        handle_event(&ctx, &d, "w1", &e, start).await;
        handle_event(&ctx, &d, "w1", &e, start).await;

        assert_eq!(fx.notifier.sent().len(), 1);
        assert_eq!(
            fx.notifier.sent()[0].text,
            "shop: Readiness probe failed - api-7d9f"
        );
    }

    #[tokio::test]
    async fn test_probe_kills_and_oom_are_not_deduplicated() {
        let (ctx, fx) = context();
        let d = descriptor("shop", "prod");
        let kill = event("Normal", "Pod", "Killing", "Container api failed liveness probe");
        let oom = event("Warning", "Node", "OOMKilling", "oom");
        let start = Utc::now();

        handle_event(&ctx, &d, "w1", &kill, start).await;
        handle_event(&ctx, &d, "w1", &kill, start).await;
        handle_event(&ctx, &d, "w1", &oom, start).await;
        handle_event(&ctx, &d, "w1", &oom, start).await;

        assert_eq!(fx.notifier.sent().len(), 4);
    }

    #[tokio::test]
    async fn test_disabled_alert_types_are_silent() {
        let (ctx, fx) = context();
        let mut d = descriptor("shop", "prod");
        d.events.types.liveness_probe = false;
        d.events.types.oom_kill = false;
        let start = Utc::now();

        let unhealthy = event("Warning", "Pod", "Unhealthy", "Liveness probe failed");
        handle_event(&ctx, &d, "w1", &unhealthy, start).await;
        handle_event(&ctx, &d, "w1", &event("Warning", "Node", "OOMKilling", "oom"), start).await;

        assert!(fx.notifier.sent().is_empty());
    }

    #[tokio::test]
    async fn test_rollout_event_reaches_tracker() {
        let (ctx, fx) = context();
        let d = descriptor("shop", "prod");
        let mut e = event("Normal", "Deployment", "ScalingReplicaSet", "Scaled up replica set");
        e.name = "api".to_string();

        handle_event(&ctx, &d, "w1", &e, Utc::now()).await;
        handle_event(&ctx, &d, "w1", &e, Utc::now()).await;

        assert_eq!(ctx.tracker.active("shop", "prod").await, vec!["api".to_string()]);
        assert_eq!(fx.notifier.count_containing("is being deployed"), 1);
    }
}
