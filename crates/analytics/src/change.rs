use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::{broadcast, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use claimlens_core::domain::claim::ClaimId;
use claimlens_core::domain::employee::EmployeeId;

const DEFAULT_FEED_CAPACITY: usize = 256;

/// Signal that underlying records changed. Consumers treat every variant as
/// "derived data may be stale".
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DataChanged {
    Claim(ClaimId),
    ApprovalEvent(ClaimId),
    Employee(EmployeeId),
    Budget(String),
    All,
}

/// Push-style change notification. The engine also works with no feed at all.
#[derive(Clone, Debug)]
pub struct ChangeFeed {
    sender: broadcast::Sender<DataChanged>,
}

impl Default for ChangeFeed {
    fn default() -> Self {
        Self::new(DEFAULT_FEED_CAPACITY)
    }
}

impl ChangeFeed {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Returns how many subscribers saw the signal; zero when nobody listens.
    pub fn publish(&self, change: DataChanged) -> usize {
        self.sender.send(change).unwrap_or(0)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DataChanged> {
        self.sender.subscribe()
    }
}

/// Insight strings memoised per (claim id, data version).
///
/// Every invalidation bumps the version, so entries computed against older
/// data can never be served again.
#[derive(Debug, Default)]
pub struct InsightCache {
    version: AtomicU64,
    entries: RwLock<HashMap<(ClaimId, u64), Vec<String>>>,
}

impl InsightCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn version(&self) -> u64 {
        self.version.load(Ordering::Acquire)
    }

    pub async fn get(&self, claim_id: &ClaimId) -> Option<Vec<String>> {
        let key = (claim_id.clone(), self.version());
        self.entries.read().await.get(&key).cloned()
    }

    /// Stores `messages` computed at `version`; dropped if the data moved on
    /// while they were being computed.
    pub async fn put(&self, claim_id: &ClaimId, version: u64, messages: Vec<String>) -> bool {
        let mut entries = self.entries.write().await;
        if version != self.version() {
            return false;
        }
        entries.insert((claim_id.clone(), version), messages);
        true
    }

    pub async fn invalidate(&self) -> u64 {
        let mut entries = self.entries.write().await;
        let next = self.version.fetch_add(1, Ordering::AcqRel) + 1;
        entries.clear();
        next
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    /// Spawns a task that invalidates the cache on every change signal until
    /// the feed is dropped.
    pub fn listen(self: &Arc<Self>, feed: &ChangeFeed) -> JoinHandle<()> {
        let cache = Arc::clone(self);
        let mut receiver = feed.subscribe();
        tokio::spawn(async move {
            loop {
                match receiver.recv().await {
                    Ok(change) => {
                        let version = cache.invalidate().await;
                        debug!(
                            event_name = "analytics.cache.invalidated",
                            version,
                            change = ?change,
                            "insight cache invalidated"
                        );
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        let version = cache.invalidate().await;
                        warn!(
                            event_name = "analytics.cache.lagged",
                            skipped,
                            version,
                            "change feed lagged; insight cache invalidated"
                        );
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use claimlens_core::domain::claim::ClaimId;

    use super::{ChangeFeed, DataChanged, InsightCache};

    #[test]
    fn publish_without_subscribers_is_harmless() {
        let feed = ChangeFeed::default();
        assert_eq!(feed.publish(DataChanged::All), 0);
    }

    #[tokio::test]
    async fn cache_serves_only_current_version() {
        let cache = InsightCache::new();
        let claim = ClaimId("CLM-1".to_owned());

        let version = cache.version();
        assert!(cache.put(&claim, version, vec!["insight".to_owned()]).await);
        assert_eq!(cache.get(&claim).await, Some(vec!["insight".to_owned()]));

        cache.invalidate().await;
        assert_eq!(cache.get(&claim).await, None);
        assert!(!cache.put(&claim, version, vec!["stale".to_owned()]).await);
        assert!(cache.is_empty().await);
    }

    #[tokio::test]
    async fn listener_invalidates_on_change_signal() {
        let cache = Arc::new(InsightCache::new());
        let feed = ChangeFeed::new(8);
        let handle = cache.listen(&feed);
        let claim = ClaimId("CLM-1".to_owned());

        assert!(cache.put(&claim, cache.version(), vec!["insight".to_owned()]).await);
        assert_eq!(feed.publish(DataChanged::Claim(claim.clone())), 1);

        tokio::time::timeout(Duration::from_secs(2), async {
            while cache.version() == 0 {
                tokio::task::yield_now().await;
            }
        })
        .await
        .expect("listener bumps version");
        assert_eq!(cache.get(&claim).await, None);

        drop(feed);
        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("listener exits once the feed closes")
            .expect("listener task completes");
    }
}
