//! kube-rs implementation of the cluster client port

use super::{ClientFactory, ClusterClient, ClusterEvent, EventStream, WorkloadInfo};
use crate::config::WorkloadKind;
use crate::error::{with_timeout, MonitorError, Result};
use async_trait::async_trait;
use futures::{StreamExt, TryStreamExt};
use k8s_openapi::api::apps::v1::{Deployment, StatefulSet};
use k8s_openapi::api::core::v1::Event;
use kube::api::{Api, ListParams, Patch, PatchParams, WatchEvent, WatchParams};
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Client, Config};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tracing::{debug, info};

/// Server-side watch timeout; the stream is resumed transparently after it
const WATCH_TIMEOUT_SECS: u32 = 290;

const GONE: u16 = 410;

/// Client bound to one kubeconfig context
pub struct KubeClusterClient {
    context: String,
    client: RwLock<Option<Client>>,
    timeout: Duration,
}

impl KubeClusterClient {
    pub fn new(context: impl Into<String>, client: Client, timeout: Duration) -> Self {
        Self {
            context: context.into(),
            client: RwLock::new(Some(client)),
            timeout,
        }
    }

    fn client(&self) -> Result<Client> {
        let guard = self
            .client
            .read()
            .map_err(|_| MonitorError::client("client lock poisoned"))?;
        guard
            .clone()
            .ok_or_else(|| MonitorError::client(format!("client for {} is closed", self.context)))
    }

    async fn list_deployments(&self, client: Client) -> Result<Vec<WorkloadInfo>> {
        let api: Api<Deployment> = Api::all(client);
        let list = api.list(&ListParams::default()).await?;

        Ok(list
            .items
            .into_iter()
            .map(|d| {
                let status = d.status.unwrap_or_default();
                WorkloadInfo {
                    kind: WorkloadKind::Deployment,
                    name: d.metadata.name.unwrap_or_default(),
                    namespace: d.metadata.namespace.unwrap_or_default(),
                    desired_replicas: status.replicas.unwrap_or(0),
                    ready_replicas: status.ready_replicas.unwrap_or(0),
                }
            })
            .collect())
    }

    async fn list_stateful_sets(&self, client: Client) -> Result<Vec<WorkloadInfo>> {
        let api: Api<StatefulSet> = Api::all(client);
        let list = api.list(&ListParams::default()).await?;

        Ok(list
            .items
            .into_iter()
            .map(|s| {
                let (desired, ready) = s
                    .status
                    .map(|st| (st.replicas, st.ready_replicas.unwrap_or(0)))
                    .unwrap_or((0, 0));
                WorkloadInfo {
                    kind: WorkloadKind::StatefulSet,
                    name: s.metadata.name.unwrap_or_default(),
                    namespace: s.metadata.namespace.unwrap_or_default(),
                    desired_replicas: desired,
                    ready_replicas: ready,
                }
            })
            .collect())
    }
}

#[async_trait]
impl ClusterClient for KubeClusterClient {
    async fn list_workloads(&self, kind: WorkloadKind) -> Result<Vec<WorkloadInfo>> {
        let client = self.client()?;
        match kind {
            WorkloadKind::Deployment => {
                with_timeout("list deployments", self.timeout, self.list_deployments(client)).await
            }
            WorkloadKind::StatefulSet => {
                with_timeout(
                    "list statefulsets",
                    self.timeout,
                    self.list_stateful_sets(client),
                )
                .await
            }
        }
    }

    async fn scale(
        &self,
        kind: WorkloadKind,
        namespace: &str,
        name: &str,
        replicas: i32,
    ) -> Result<()> {
        let client = self.client()?;
        let patch = Patch::Merge(serde_json::json!({ "spec": { "replicas": replicas } }));
        let params = PatchParams::default();

        let call = async {
            match kind {
                WorkloadKind::Deployment => {
                    let api: Api<Deployment> = Api::namespaced(client, namespace);
                    api.patch_scale(name, &params, &patch).await?;
                }
                WorkloadKind::StatefulSet => {
                    let api: Api<StatefulSet> = Api::namespaced(client, namespace);
                    api.patch_scale(name, &params, &patch).await?;
                }
            }
            Ok::<(), MonitorError>(())
        };
        with_timeout("scale workload", self.timeout, call).await?;

        info!(kind = %kind, namespace = %namespace, name = %name, replicas, "Scaled workload");
        Ok(())
    }

    async fn watch_events(&self) -> Result<EventStream> {
        let api: Api<Event> = Api::all(self.client()?);
        let state = WatchState {
            api,
            resource_version: "0".to_string(),
            inner: None,
            done: false,
        };
        Ok(futures::stream::unfold(state, next_event).boxed())
    }

    fn close(&self) {
        if let Ok(mut guard) = self.client.write() {
            if guard.take().is_some() {
                debug!(context = %self.context, "Closed cluster client");
            }
        }
    }
}

struct WatchState {
    api: Api<Event>,
    resource_version: String,
    inner: Option<futures::stream::BoxStream<'static, kube::Result<WatchEvent<Event>>>>,
    done: bool,
}

/// Pull the next mapped event, resuming the watch when the server ends it cleanly
async fn next_event(mut state: WatchState) -> Option<(Result<ClusterEvent>, WatchState)> {
    loop {
        if state.done {
            return None;
        }

        if state.inner.is_none() {
            let params = WatchParams::default().timeout(WATCH_TIMEOUT_SECS);
            match state.api.watch(&params, &state.resource_version).await {
                Ok(stream) => state.inner = Some(stream.boxed()),
                Err(e) => {
                    state.done = true;
                    return Some((Err(map_kube_error(e)), state));
                }
            }
        }

        let next = match state.inner.as_mut() {
            Some(stream) => stream.try_next().await,
            None => continue,
        };

        match next {
            Ok(None) => state.inner = None,
            Ok(Some(WatchEvent::Added(event))) | Ok(Some(WatchEvent::Modified(event))) => {
                if let Some(rv) = &event.metadata.resource_version {
                    state.resource_version = rv.clone();
                }
                return Some((Ok(to_cluster_event(event)), state));
            }
            Ok(Some(WatchEvent::Deleted(event))) => {
                if let Some(rv) = event.metadata.resource_version {
                    state.resource_version = rv;
                }
            }
            Ok(Some(WatchEvent::Bookmark(bookmark))) => {
                state.resource_version = bookmark.metadata.resource_version;
            }
            Ok(Some(WatchEvent::Error(e))) => {
                state.done = true;
                return Some((Err(watch_error(e.code, &e.message)), state));
            }
            Err(e) => {
                state.done = true;
                return Some((Err(map_kube_error(e)), state));
            }
        }
    }
}

fn map_kube_error(err: kube::Error) -> MonitorError {
    match err {
        kube::Error::Api(response) => watch_error(response.code, &response.message),
        other => MonitorError::from(other),
    }
}

/// Stale resource versions surface as 410 Gone or a "too old" message
pub(crate) fn watch_error(code: u16, message: &str) -> MonitorError {
    if code == GONE
        || message.contains("resourceVersion")
        || message.contains("too old resource version")
    {
        MonitorError::WatchInvalidated(message.to_string())
    } else {
        MonitorError::client(format!("watch failed ({}): {}", code, message))
    }
}

/// Reduce a core/v1 Event to what the classifier needs
pub(crate) fn to_cluster_event(event: Event) -> ClusterEvent {
    let timestamp = event
        .last_timestamp
        .map(|t| t.0)
        .or_else(|| event.event_time.map(|t| t.0))
        .or_else(|| event.first_timestamp.map(|t| t.0))
        .or_else(|| event.metadata.creation_timestamp.map(|t| t.0));

    ClusterEvent {
        uid: event.metadata.uid.unwrap_or_default(),
        event_type: event.type_.unwrap_or_default(),
        kind: event.involved_object.kind.unwrap_or_default(),
        name: event.involved_object.name.unwrap_or_default(),
        reason: event.reason.unwrap_or_default(),
        message: event.message.unwrap_or_default(),
        timestamp,
    }
}

/// Builds clients from the local kubeconfig written by the credential provider
pub struct KubeClientFactory {
    connect_timeout: Duration,
    request_timeout: Duration,
}

impl KubeClientFactory {
    pub fn new(connect_timeout: Duration, request_timeout: Duration) -> Self {
        Self {
            connect_timeout,
            request_timeout,
        }
    }
}

#[async_trait]
impl ClientFactory for KubeClientFactory {
    async fn new_client(&self, context: &str, token: &str) -> Result<Arc<dyn ClusterClient>> {
        let kubeconfig = Kubeconfig::read()
            .map_err(|e| MonitorError::client(format!("failed to read kubeconfig: {}", e)))?;
        let options = KubeConfigOptions {
            context: Some(context.to_string()),
            ..Default::default()
        };

        let mut config = Config::from_custom_kubeconfig(kubeconfig, &options)
            .await
            .map_err(|e| MonitorError::client(format!("context {}: {}", context, e)))?;

        // The freshly minted token replaces whatever auth plugin gcloud configured
        config.auth_info.token = token.parse().ok();
        config.auth_info.exec = None;
        config.auth_info.auth_provider = None;
        config.connect_timeout = Some(self.connect_timeout);
        // Watches are long-lived; per-request bounds come from `with_timeout`
        config.read_timeout = None;

        let client = Client::try_from(config)?;
        debug!(context = %context, "Created cluster client");

        Ok(Arc::new(KubeClusterClient::new(
            context,
            client,
            self.request_timeout,
        )))
    }
}
