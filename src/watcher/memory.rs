use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::debug;
use super::{CallbackRegistry, NodeCallback, NodeWatcher, StatusCache};
use crate::error::MemberlistError;
use crate::memberlist::NodeStatus;

/// Watcher driven by explicit status updates instead of a platform stream
#[derive(Default)]
pub struct InMemoryNodeWatcher {
    callbacks: CallbackRegistry,
    cache: StatusCache,
    fail_start: AtomicBool,
}

impl InMemoryNodeWatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `start` fail as if the subscription were refused
    pub fn fail_next_start(&self) {
        self.fail_start.store(true, Ordering::SeqCst);
    }

    /// Record a transition and notify listeners
    pub fn set_status(&self, node: &str, status: NodeStatus) {
        self.cache.set(node, status);
        self.callbacks.dispatch(node);
    }

    /// Update the cached health without notifying
    pub fn set_status_silently(&self, node: &str, status: NodeStatus) {
        self.cache.set(node, status);
    }

    /// Forget the node, as if its pod were deleted, and notify listeners
    pub fn remove(&self, node: &str) {
        self.cache.remove(node);
        self.callbacks.dispatch(node);
    }

    pub fn is_running(&self) -> bool {
        self.callbacks.is_active()
    }

    pub fn callback_count(&self) -> usize {
        self.callbacks.len()
    }
}

#[async_trait]
impl NodeWatcher for InMemoryNodeWatcher {
    async fn start(&self) -> Result<(), MemberlistError> {
        if self.fail_start.swap(false, Ordering::SeqCst) {
            return Err(MemberlistError::watch_init("in-memory watcher refused to start"));
        }
        debug!("Starting in-memory node watcher");
        self.callbacks.activate();
        Ok(())
    }

    async fn stop(&self) -> Result<(), MemberlistError> {
        debug!("Stopping in-memory node watcher");
        self.callbacks.deactivate();
        Ok(())
    }

    fn register_callback(&self, callback: NodeCallback) {
        self.callbacks.register(callback);
    }

    fn get_status(&self, node: &str) -> NodeStatus {
        self.cache.get(node)
    }
}
