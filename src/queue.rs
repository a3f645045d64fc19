//! Coalescing work queue
//!
//! Holds at most one pending entry per key. A key added while it is being
//! processed is marked dirty and re-queued once when `done` is called, so a
//! burst of notifications for one key costs at most two cycles. Failed keys
//! can be re-added after a per-key exponential backoff.

use parking_lot::Mutex;
use std::collections::{HashMap, HashSet, VecDeque};
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tracing::debug;

/// Per-key exponential backoff: `base * 2^failures`, capped at `max`
#[derive(Debug)]
pub struct ExponentialBackoff<K> {
    base: Duration,
    max: Duration,
    failures: Mutex<HashMap<K, u32>>,
}

impl<K: Eq + Hash + Clone> ExponentialBackoff<K> {
    pub fn new(base: Duration, max: Duration) -> Self {
        Self {
            base,
            max,
            failures: Mutex::new(HashMap::new()),
        }
    }

    /// Delay before the next attempt for `key`, counting this as a failure
    pub fn when(&self, key: &K) -> Duration {
        let mut failures = self.failures.lock();
        let count = failures.entry(key.clone()).or_insert(0);
        let exp = *count;
        *count = count.saturating_add(1);

        // 2^31 already overflows any sane cap
        let factor = 1u32.checked_shl(exp.min(31)).unwrap_or(u32::MAX);
        self.base.saturating_mul(factor).min(self.max)
    }

    pub fn num_requeues(&self, key: &K) -> u32 {
        self.failures.lock().get(key).copied().unwrap_or(0)
    }

    pub fn forget(&self, key: &K) {
        self.failures.lock().remove(key);
    }
}

#[derive(Debug)]
struct QueueState<K> {
    queue: VecDeque<K>,
    dirty: HashSet<K>,
    processing: HashSet<K>,
    shutting_down: bool,
}

#[derive(Debug)]
struct Shared<K> {
    state: Mutex<QueueState<K>>,
    notify: Notify,
    backoff: ExponentialBackoff<K>,
}

/// Deduplicating, rate-limited queue shared between producers and one worker
#[derive(Debug)]
pub struct WorkQueue<K> {
    shared: Arc<Shared<K>>,
}

impl<K> Clone for WorkQueue<K> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
        }
    }
}

impl<K> WorkQueue<K>
where
    K: Eq + Hash + Clone + Send + Sync + std::fmt::Debug + 'static,
{
    pub fn new(base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(QueueState {
                    queue: VecDeque::new(),
                    dirty: HashSet::new(),
                    processing: HashSet::new(),
                    shutting_down: false,
                }),
                notify: Notify::new(),
                backoff: ExponentialBackoff::new(base_delay, max_delay),
            }),
        }
    }

    /// Enqueue `key` unless it is already pending. Never blocks on I/O.
    pub fn add(&self, key: K) {
        {
            let mut state = self.shared.state.lock();
            if state.shutting_down || state.dirty.contains(&key) {
                return;
            }
            state.dirty.insert(key.clone());
            if state.processing.contains(&key) {
                return;
            }
            state.queue.push_back(key);
        }
        self.shared.notify.notify_one();
    }

    /// Re-add `key` after its backoff delay
    pub fn add_rate_limited(&self, key: K) {
        let delay = self.shared.backoff.when(&key);
        debug!(?key, ?delay, "Scheduling retry");
        let queue = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            queue.add(key);
        });
    }

    /// Wait for the next key. Returns `None` once the queue is shut down.
    pub async fn get(&self) -> Option<K> {
        loop {
            let notified = self.shared.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut state = self.shared.state.lock();
                if state.shutting_down {
                    return None;
                }
                if let Some(key) = state.queue.pop_front() {
                    state.dirty.remove(&key);
                    state.processing.insert(key.clone());
                    return Some(key);
                }
            }

            notified.await;
        }
    }

    /// Mark `key` as processed, re-queueing it if it was added meanwhile
    pub fn done(&self, key: &K) {
        let requeued = {
            let mut state = self.shared.state.lock();
            state.processing.remove(key);
            if state.dirty.contains(key) && !state.shutting_down {
                state.queue.push_back(key.clone());
                true
            } else {
                false
            }
        };
        if requeued {
            self.shared.notify.notify_one();
        }
    }

    /// Clear the failure history of `key`
    pub fn forget(&self, key: &K) {
        self.shared.backoff.forget(key);
    }

    pub fn num_requeues(&self, key: &K) -> u32 {
        self.shared.backoff.num_requeues(key)
    }

    pub fn len(&self) -> usize {
        self.shared.state.lock().queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn shut_down(&self) {
        self.shared.state.lock().shutting_down = true;
        self.shared.notify.notify_waiters();
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shared.state.lock().shutting_down
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::timeout;

    fn queue() -> WorkQueue<String> {
        WorkQueue::new(Duration::from_millis(5), Duration::from_secs(1))
    }

    #[tokio::test]
    async fn test_pending_adds_coalesce() {
        let q = queue();
        q.add("10.0.0.1".to_string());
        q.add("10.0.0.1".to_string());
        q.add("10.0.0.2".to_string());
        q.add("10.0.0.1".to_string());
        assert_eq!(q.len(), 2);

        assert_eq!(q.get().await.as_deref(), Some("10.0.0.1"));
        assert_eq!(q.get().await.as_deref(), Some("10.0.0.2"));
        assert!(q.is_empty());
    }

    #[tokio::test]
    async fn test_add_during_processing_requeues_once_on_done() {
        let q = queue();
        q.add("a".to_string());
        let key = q.get().await.unwrap();

        q.add("a".to_string());
        q.add("a".to_string());
        assert!(q.is_empty(), "key in flight must not be queued twice");

        q.done(&key);
        assert_eq!(q.len(), 1);
        assert_eq!(q.get().await.as_deref(), Some("a"));
        q.done(&"a".to_string());
        assert!(q.is_empty());
    }

    #[tokio::test]
    async fn test_get_waits_for_add() {
        let q = queue();
        let worker = q.clone();
        let handle = tokio::spawn(async move { worker.get().await });
        tokio::task::yield_now().await;
        q.add("late".to_string());
        let key = timeout(Duration::from_secs(1), handle).await.unwrap().unwrap();
        assert_eq!(key.as_deref(), Some("late"));
    }

    #[tokio::test]
    async fn test_shutdown_wakes_waiting_worker() {
        let q = queue();
        let worker = q.clone();
        let handle = tokio::spawn(async move { worker.get().await });
        tokio::task::yield_now().await;
        q.shut_down();
        let result = timeout(Duration::from_secs(1), handle).await.unwrap().unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_shutdown_discards_pending_and_new_items() {
        let q = queue();
        q.add("a".to_string());
        q.shut_down();
        q.add("b".to_string());
        assert!(q.get().await.is_none());
        assert!(q.is_shutting_down());
    }

    #[tokio::test]
    async fn test_rate_limited_add_is_delayed_and_counted() {
        let q = queue();
        q.add_rate_limited("a".to_string());
        assert_eq!(q.num_requeues(&"a".to_string()), 1);
        let key = timeout(Duration::from_secs(1), q.get()).await.unwrap();
        assert_eq!(key.as_deref(), Some("a"));

        q.forget(&"a".to_string());
        assert_eq!(q.num_requeues(&"a".to_string()), 0);
    }

    #[test]
    fn test_backoff_grows_exponentially_and_caps() {
        let backoff = ExponentialBackoff::new(Duration::from_millis(5), Duration::from_millis(100));
        let key = "a".to_string();
        assert_eq!(backoff.when(&key), Duration::from_millis(5));
        assert_eq!(backoff.when(&key), Duration::from_millis(10));
        assert_eq!(backoff.when(&key), Duration::from_millis(20));
        assert_eq!(backoff.when(&key), Duration::from_millis(40));
        assert_eq!(backoff.when(&key), Duration::from_millis(80));
        assert_eq!(backoff.when(&key), Duration::from_millis(100));
        for _ in 0..64 {
            assert_eq!(backoff.when(&key), Duration::from_millis(100));
        }
        assert_eq!(backoff.when(&"b".to_string()), Duration::from_millis(5));
    }
}
