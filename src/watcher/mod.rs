//! Node watchers
//!
//! A watcher translates platform events into node identity notifications and
//! keeps a cached view of node health. It never interprets transitions.

mod kubernetes;
mod memory;

pub use kubernetes::KubernetesWatcher;
pub use memory::InMemoryNodeWatcher;

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use crate::error::MemberlistError;
use crate::memberlist::{NodeId, NodeStatus};

/// Listener invoked with the node identity of every observed event.
/// Must not block.
pub type NodeCallback = Arc<dyn Fn(&str) + Send + Sync>;

#[async_trait]
pub trait NodeWatcher: Send + Sync {
    /// Begin observing. Fails with `WatchInit` if the subscription cannot be
    /// established.
    async fn start(&self) -> Result<(), MemberlistError>;

    /// Tear down the subscription. No callback fires once this returns.
    async fn stop(&self) -> Result<(), MemberlistError>;

    fn register_callback(&self, callback: NodeCallback);

    /// Cached health of `node`, `Unknown` if the node is not known
    fn get_status(&self, node: &str) -> NodeStatus;
}

/// Append-only callback list with a dispatch gate
#[derive(Default)]
pub(crate) struct CallbackRegistry {
    callbacks: RwLock<Vec<NodeCallback>>,
    active: AtomicBool,
}

impl CallbackRegistry {
    pub(crate) fn register(&self, callback: NodeCallback) {
        self.callbacks.write().push(callback);
    }

    pub(crate) fn activate(&self) {
        self.active.store(true, Ordering::SeqCst);
    }

    pub(crate) fn deactivate(&self) {
        self.active.store(false, Ordering::SeqCst);
    }

    pub(crate) fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    pub(crate) fn dispatch(&self, node: &str) {
        if !self.is_active() {
            return;
        }
        // Clone out so a callback may register further listeners
        let callbacks: Vec<NodeCallback> = self.callbacks.read().clone();
        for callback in callbacks {
            callback(node);
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.callbacks.read().len()
    }
}

/// Latest known health per node
#[derive(Default)]
pub(crate) struct StatusCache {
    statuses: RwLock<HashMap<NodeId, NodeStatus>>,
}

impl StatusCache {
    pub(crate) fn set(&self, node: &str, status: NodeStatus) {
        self.statuses.write().insert(node.to_string(), status);
    }

    pub(crate) fn remove(&self, node: &str) {
        self.statuses.write().remove(node);
    }

    pub(crate) fn get(&self, node: &str) -> NodeStatus {
        self.statuses
            .read()
            .get(node)
            .copied()
            .unwrap_or(NodeStatus::Unknown)
    }

    pub(crate) fn clear(&self) {
        self.statuses.write().clear();
    }
}
