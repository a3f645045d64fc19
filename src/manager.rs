//! Memberlist Manager
//!
//! Handles:
//! - Subscribing to node notifications
//! - Coalescing them through the work queue
//! - Read-reconcile-write cycles against the memberlist store
//!
//! A single worker drains the queue, so every store write from this process is
//! serialized. Conflicts can only come from other writers and are resolved by
//! the store's version check.

use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use crate::config::{Config, MissingMemberlistPolicy, QueueConfig};
use crate::error::MemberlistError;
use crate::memberlist::{Memberlist, NodeId, NodeStatus};
use crate::queue::WorkQueue;
use crate::store::MemberlistStore;
use crate::watcher::NodeWatcher;

/// Lifecycle of a manager
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManagerState {
    Stopped,
    Starting,
    Running,
    Stopping,
}

/// Outcome of one successful reconciliation cycle
#[derive(Debug, Clone, PartialEq)]
pub enum CycleOutcome {
    /// The memberlist was written back
    Updated(Memberlist),
    /// The record was created under `MissingMemberlistPolicy::Create`
    Created(Memberlist),
    /// Nothing to write
    Skipped,
}

#[derive(Debug, Clone)]
pub struct ManagerOptions {
    pub max_retries: u32,
    pub missing_memberlist: MissingMemberlistPolicy,
}

impl Default for ManagerOptions {
    fn default() -> Self {
        Self {
            max_retries: QueueConfig::default().max_retries,
            missing_memberlist: MissingMemberlistPolicy::default(),
        }
    }
}

struct Reconciler {
    watcher: Arc<dyn NodeWatcher>,
    store: Arc<dyn MemberlistStore>,
    options: ManagerOptions,
}

impl Reconciler {
    async fn run(self: Arc<Self>, queue: WorkQueue<NodeId>) {
        while let Some(node) = queue.get().await {
            match self.reconcile(&node).await {
                Ok(outcome) => {
                    debug!(%node, ?outcome, "Reconciled");
                    queue.forget(&node);
                }
                Err(e) => {
                    let attempt = queue.num_requeues(&node);
                    if e.is_retryable() && attempt < self.options.max_retries {
                        warn!(%node, attempt, error = %e, "Reconcile failed, retrying");
                        queue.add_rate_limited(node.clone());
                    } else {
                        error!(%node, attempt, error = %e, "Reconcile failed, giving up");
                        queue.forget(&node);
                    }
                }
            }
            queue.done(&node);
        }
        info!("Shutting down memberlist manager");
    }

    async fn reconcile(&self, node: &str) -> Result<CycleOutcome, MemberlistError> {
        let status = self.watcher.get_status(node);

        let (memberlist, version) = match self.store.get_memberlist().await {
            Ok(current) => current,
            Err(MemberlistError::NotFound(resource))
                if self.options.missing_memberlist == MissingMemberlistPolicy::Create =>
            {
                return self.create(node, status, &resource).await;
            }
            Err(e) => return Err(e),
        };

        let updated = memberlist.reconcile(node, status);
        let new_version = self.store.update_memberlist(&updated, &version).await?;
        debug!(%node, %status, from = %version, to = %new_version, members = %updated, "Memberlist written");
        Ok(CycleOutcome::Updated(updated))
    }

    async fn create(&self, node: &str, status: NodeStatus, resource: &str) -> Result<CycleOutcome, MemberlistError> {
        if !status.is_ready() {
            debug!(%node, %status, resource, "Memberlist missing and node not ready, nothing to create");
            return Ok(CycleOutcome::Skipped);
        }
        let memberlist = Memberlist::new().reconcile(node, status);
        let version = self.store.create_memberlist(&memberlist).await?;
        info!(%node, %version, resource, "Created memberlist");
        Ok(CycleOutcome::Created(memberlist))
    }
}

/// Keeps the persisted memberlist in line with watcher health reports
pub struct MemberlistManager {
    queue: WorkQueue<NodeId>,
    reconciler: Arc<Reconciler>,
    state: RwLock<ManagerState>,
    worker: Mutex<Option<JoinHandle<()>>>,
    /// Set once the queue callback is registered with the watcher
    subscribed: AtomicBool,
}

impl MemberlistManager {
    pub fn new(watcher: Arc<dyn NodeWatcher>, store: Arc<dyn MemberlistStore>, config: &Config) -> Self {
        let options = ManagerOptions {
            max_retries: config.queue.max_retries,
            missing_memberlist: config.missing_memberlist,
        };
        let queue = WorkQueue::new(config.queue.base_delay(), config.queue.max_delay());
        Self::with_queue(watcher, store, queue, options)
    }

    pub fn with_queue(
        watcher: Arc<dyn NodeWatcher>,
        store: Arc<dyn MemberlistStore>,
        queue: WorkQueue<NodeId>,
        options: ManagerOptions,
    ) -> Self {
        Self {
            queue,
            reconciler: Arc::new(Reconciler { watcher, store, options }),
            state: RwLock::new(ManagerState::Stopped),
            worker: Mutex::new(None),
            subscribed: AtomicBool::new(false),
        }
    }

    pub fn state(&self) -> ManagerState {
        *self.state.read()
    }

    fn transition(&self, from: ManagerState, to: ManagerState) -> Result<(), MemberlistError> {
        let mut state = self.state.write();
        if *state != from {
            return Err(MemberlistError::state(format!(
                "cannot move to {:?} while {:?}",
                to, *state
            )));
        }
        *state = to;
        Ok(())
    }

    /// Register with the watcher, start it and launch the worker
    pub async fn start(&self) -> Result<(), MemberlistError> {
        if self.queue.is_shutting_down() {
            return Err(MemberlistError::state("manager was stopped and cannot be restarted"));
        }
        self.transition(ManagerState::Stopped, ManagerState::Starting)?;
        info!("Starting memberlist manager");

        // Registrations are permanent, so a start retried after a failed
        // watcher start must not subscribe the queue a second time
        if !self.subscribed.swap(true, Ordering::SeqCst) {
            let queue = self.queue.clone();
            self.reconciler
                .watcher
                .register_callback(Arc::new(move |node: &str| queue.add(node.to_string())));
        }

        if let Err(e) = self.reconciler.watcher.start().await {
            error!(error = %e, "Failed to start node watcher");
            *self.state.write() = ManagerState::Stopped;
            return Err(e);
        }

        let handle = tokio::spawn(self.reconciler.clone().run(self.queue.clone()));
        *self.worker.lock() = Some(handle);
        *self.state.write() = ManagerState::Running;
        Ok(())
    }

    /// Shut the queue down, wait for the in-flight cycle, then stop the watcher
    pub async fn stop(&self) -> Result<(), MemberlistError> {
        self.transition(ManagerState::Running, ManagerState::Stopping)?;
        info!("Stopping memberlist manager");

        // A shut-down queue drops notifications, so the watcher can keep
        // serving statuses to the in-flight cycle until the worker exits
        self.queue.shut_down();
        let worker = self.worker.lock().take();
        if let Some(handle) = worker {
            if let Err(e) = handle.await {
                error!(error = %e, "Reconciliation worker ended abnormally");
            }
        }

        let watcher_result = self.reconciler.watcher.stop().await;
        *self.state.write() = ManagerState::Stopped;
        watcher_result
    }

    /// Run one reconciliation cycle for `node` outside the queue
    pub async fn reconcile_now(&self, node: &str) -> Result<CycleOutcome, MemberlistError> {
        self.reconciler.reconcile(node).await
    }

    /// Number of nodes waiting for reconciliation
    pub fn pending(&self) -> usize {
        self.queue.len()
    }
}
