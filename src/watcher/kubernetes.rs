use async_trait::async_trait;
use futures::StreamExt;
use k8s_openapi::api::core::v1::Pod;
use kube::api::{Api, ListParams};
use kube::runtime::{watcher, WatchStreamExt};
use kube::{Client, ResourceExt};
use parking_lot::{Mutex, RwLock};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use super::{CallbackRegistry, NodeCallback, NodeWatcher, StatusCache};
use crate::config::KubernetesConfig;
use crate::error::MemberlistError;
use crate::memberlist::{NodeId, NodeStatus};

/// Health of a pod as derived from its `Ready` condition
pub(crate) fn pod_status(pod: &Pod) -> NodeStatus {
    if pod.metadata.deletion_timestamp.is_some() {
        return NodeStatus::NotReady;
    }
    let ready = pod
        .status
        .as_ref()
        .and_then(|status| status.conditions.as_ref())
        .map(|conditions| {
            conditions
                .iter()
                .any(|c| c.type_ == "Ready" && c.status == "True")
        })
        .unwrap_or(false);
    if ready {
        NodeStatus::Ready
    } else {
        NodeStatus::NotReady
    }
}

fn pod_ip(pod: &Pod) -> Option<NodeId> {
    pod.status
        .as_ref()
        .and_then(|status| status.pod_ip.clone())
        .filter(|ip| !ip.is_empty())
}

#[derive(Default)]
pub(crate) struct PodState {
    callbacks: CallbackRegistry,
    cache: StatusCache,
    /// Pod name to the IP it was last seen with
    pods: RwLock<HashMap<String, NodeId>>,
    /// Pod names seen since the last `Init`, while a (re)list is running
    relist: Mutex<Option<HashSet<String>>>,
}

impl PodState {
    pub(crate) fn handle_event(&self, event: watcher::Event<Pod>) {
        match event {
            watcher::Event::Apply(pod) => self.apply(&pod),
            watcher::Event::InitApply(pod) => {
                if let Some(seen) = self.relist.lock().as_mut() {
                    seen.insert(pod.name_any());
                }
                self.apply(&pod);
            }
            watcher::Event::Delete(pod) => self.delete(&pod),
            watcher::Event::Init => {
                debug!("Pod watch (re)list started");
                *self.relist.lock() = Some(HashSet::new());
            }
            watcher::Event::InitDone => {
                let seen = self.relist.lock().take();
                if let Some(seen) = seen {
                    self.evict_unlisted(&seen);
                }
                debug!("Pod watch (re)list complete");
            }
        }
    }

    /// Drop pods that a completed (re)list no longer returned
    fn evict_unlisted(&self, seen: &HashSet<String>) {
        let mut gone = Vec::new();
        self.pods.write().retain(|name, ip| {
            let listed = seen.contains(name);
            if !listed {
                gone.push((name.clone(), ip.clone()));
            }
            listed
        });
        for (name, ip) in gone {
            debug!(pod = %name, node = %ip, "Pod missing from relist");
            self.cache.remove(&ip);
            self.callbacks.dispatch(&ip);
        }
    }

    fn apply(&self, pod: &Pod) {
        let name = pod.name_any();
        let Some(ip) = pod_ip(pod) else {
            debug!(pod = %name, "Ignoring pod without an IP");
            return;
        };
        let status = pod_status(pod);

        let previous = self.pods.write().insert(name.clone(), ip.clone());
        if let Some(old_ip) = previous.filter(|old| *old != ip) {
            // Pod came back with a new address; the old one is gone
            self.cache.remove(&old_ip);
            self.callbacks.dispatch(&old_ip);
        }

        debug!(pod = %name, node = %ip, %status, "Pod updated");
        self.cache.set(&ip, status);
        self.callbacks.dispatch(&ip);
    }

    fn delete(&self, pod: &Pod) {
        let name = pod.name_any();
        let ip = self.pods.write().remove(&name).or_else(|| pod_ip(pod));
        if let Some(ip) = ip {
            debug!(pod = %name, node = %ip, "Pod deleted");
            self.cache.remove(&ip);
            self.callbacks.dispatch(&ip);
        }
    }
}

/// Watches worker pods of one namespace selected by the role label
pub struct KubernetesWatcher {
    client: Client,
    namespace: String,
    label_selector: String,
    state: Arc<PodState>,
    task: Mutex<Option<(CancellationToken, JoinHandle<()>)>>,
}

impl KubernetesWatcher {
    pub fn new(client: Client, namespace: impl Into<String>, label_selector: impl Into<String>) -> Self {
        Self {
            client,
            namespace: namespace.into(),
            label_selector: label_selector.into(),
            state: Arc::new(PodState::default()),
            task: Mutex::new(None),
        }
    }

    pub fn from_config(client: Client, config: &KubernetesConfig) -> Self {
        Self::new(client, config.namespace.clone(), config.label_selector())
    }

    async fn watch_pods(api: Api<Pod>, config: watcher::Config, state: Arc<PodState>, token: CancellationToken) {
        let stream = watcher(api, config).default_backoff();
        futures::pin_mut!(stream);
        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                event = stream.next() => match event {
                    Some(Ok(event)) => state.handle_event(event),
                    Some(Err(e)) => warn!(error = %e, "Pod watch error, retrying"),
                    None => break,
                },
            }
        }
        debug!("Pod watch loop exited");
    }
}

#[async_trait]
impl NodeWatcher for KubernetesWatcher {
    async fn start(&self) -> Result<(), MemberlistError> {
        if self.task.lock().is_some() {
            return Err(MemberlistError::state("watcher already started"));
        }

        let api: Api<Pod> = Api::namespaced(self.client.clone(), &self.namespace);
        // The watch stream is lazy; list once so access problems fail start
        api.list(&ListParams::default().labels(&self.label_selector).limit(1))
            .await
            .map_err(|e| {
                MemberlistError::watch_init(format!(
                    "cannot list pods in {} with selector {}: {}",
                    self.namespace, self.label_selector, e
                ))
            })?;

        info!(namespace = %self.namespace, selector = %self.label_selector, "Starting pod watcher");
        let token = CancellationToken::new();
        let config = watcher::Config::default().labels(&self.label_selector);
        self.state.callbacks.activate();
        let handle = tokio::spawn(Self::watch_pods(api, config, self.state.clone(), token.clone()));
        *self.task.lock() = Some((token, handle));
        Ok(())
    }

    async fn stop(&self) -> Result<(), MemberlistError> {
        self.state.callbacks.deactivate();
        let task = self.task.lock().take();
        if let Some((token, handle)) = task {
            info!("Stopping pod watcher");
            token.cancel();
            if let Err(e) = handle.await {
                warn!(error = %e, "Pod watch task ended abnormally");
            }
        }
        // Statuses stay readable for a reconcile still in flight; the next
        // start relists and evicts whatever went away meanwhile
        Ok(())
    }

    fn register_callback(&self, callback: NodeCallback) {
        self.state.callbacks.register(callback);
    }

    fn get_status(&self, node: &str) -> NodeStatus {
        self.state.cache.get(node)
    }
}
