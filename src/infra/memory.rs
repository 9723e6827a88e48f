//! Process-local `FeedStore` used when no database is configured.

use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use time::{Duration, OffsetDateTime};
use tracing::warn;

use crate::application::clock::Clock;
use crate::application::repos::{FeedStore, StoreError};
use crate::domain::feed::Feed;

#[derive(Debug, Clone, Copy)]
struct LastHit {
    at: OffsetDateTime,
    expires_at: OffsetDateTime,
}

#[derive(Default)]
struct MemoryState {
    feeds: HashMap<String, Feed>,
    last_hits: HashMap<String, LastHit>,
    /// Pop order; `queued` holds the same keywords for dedup.
    queue: VecDeque<String>,
    queued: HashSet<String>,
}

/// Every operation runs under one mutex, which is what makes
/// `queue_pop_any` atomic with respect to concurrent pushers and poppers.
pub struct InMemoryFeedStore {
    state: Mutex<MemoryState>,
    clock: Arc<dyn Clock>,
    last_hit_ttl: Duration,
}

impl InMemoryFeedStore {
    pub fn new(clock: Arc<dyn Clock>, last_hit_ttl: Duration) -> Self {
        Self {
            state: Mutex::new(MemoryState::default()),
            clock,
            last_hit_ttl,
        }
    }

    /// Number of keywords currently queued.
    pub fn queue_len(&self) -> usize {
        self.lock().queue.len()
    }

    pub fn queue_contains(&self, keyword: &str) -> bool {
        self.lock().queued.contains(keyword)
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(|poisoned| {
            warn!(
                target_module = "infra::memory",
                result = "poisoned_recovered",
                "Recovered from poisoned store lock"
            );
            poisoned.into_inner()
        })
    }
}

#[async_trait]
impl FeedStore for InMemoryFeedStore {
    async fn put_feed(&self, feed: &Feed) -> Result<(), StoreError> {
        self.lock().feeds.insert(feed.keyword.clone(), feed.clone());
        Ok(())
    }

    async fn get_feed(&self, keyword: &str) -> Result<Option<Feed>, StoreError> {
        Ok(self.lock().feeds.get(keyword).cloned())
    }

    async fn delete_feed(&self, keyword: &str) -> Result<(), StoreError> {
        self.lock().feeds.remove(keyword);
        Ok(())
    }

    async fn all_keywords(&self) -> Result<BTreeSet<String>, StoreError> {
        Ok(self.lock().feeds.keys().cloned().collect())
    }

    async fn set_last_hit(&self, keyword: &str, at: OffsetDateTime) -> Result<(), StoreError> {
        let hit = LastHit {
            at,
            expires_at: self.clock.now() + self.last_hit_ttl,
        };
        self.lock().last_hits.insert(keyword.to_string(), hit);
        Ok(())
    }

    async fn get_last_hit(&self, keyword: &str) -> Result<Option<OffsetDateTime>, StoreError> {
        let now = self.clock.now();
        let mut state = self.lock();

        match state.last_hits.get(keyword).copied() {
            Some(hit) if hit.expires_at > now => Ok(Some(hit.at)),
            Some(_) => {
                state.last_hits.remove(keyword);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn queue_push(&self, keyword: &str) -> Result<(), StoreError> {
        let mut state = self.lock();
        if state.queued.insert(keyword.to_string()) {
            state.queue.push_back(keyword.to_string());
        }
        Ok(())
    }

    async fn queue_pop_any(&self) -> Result<Option<String>, StoreError> {
        let mut state = self.lock();
        let Some(keyword) = state.queue.pop_front() else {
            return Ok(None);
        };
        state.queued.remove(&keyword);
        Ok(Some(keyword))
    }

    async fn health_check(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use time::macros::datetime;

    use super::*;
    use crate::application::clock::ManualClock;
    use crate::domain::feed::FeedContent;

    fn store() -> (Arc<InMemoryFeedStore>, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(datetime!(2024-06-01 00:00 UTC)));
        let store = Arc::new(InMemoryFeedStore::new(clock.clone(), Duration::hours(25)));
        (store, clock)
    }

    fn feed(keyword: &str, title: &str) -> Feed {
        Feed {
            keyword: keyword.to_string(),
            title: title.to_string(),
            url: format!("https://eksisozluk.com/{keyword}"),
            content: FeedContent::default(),
            last_update: datetime!(2024-06-01 00:00 UTC),
        }
    }

    #[tokio::test]
    async fn put_feed_replaces_wholesale() {
        let (store, _) = store();
        store.put_feed(&feed("golang", "first")).await.unwrap();
        store.put_feed(&feed("golang", "second")).await.unwrap();

        let stored = store.get_feed("golang").await.unwrap().expect("stored feed");
        assert_eq!(stored.title, "second");
        assert_eq!(store.all_keywords().await.unwrap().len(), 1);

        store.delete_feed("golang").await.unwrap();
        assert!(store.get_feed("golang").await.unwrap().is_none());
        assert!(store.all_keywords().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn repeated_pushes_pop_once() {
        let (store, _) = store();
        for _ in 0..5 {
            store.queue_push("golang").await.unwrap();
        }

        assert_eq!(store.queue_pop_any().await.unwrap().as_deref(), Some("golang"));
        assert!(store.queue_pop_any().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn pushed_back_keyword_goes_behind_the_others() {
        let (store, _) = store();
        for keyword in ["golang", "rust", "zig"] {
            store.queue_push(keyword).await.unwrap();
        }

        let first = store.queue_pop_any().await.unwrap().expect("queued");
        store.queue_push(&first).await.unwrap();

        let mut rest = Vec::new();
        while let Some(keyword) = store.queue_pop_any().await.unwrap() {
            rest.push(keyword);
        }
        assert_eq!(rest.len(), 3);
        assert_eq!(rest.last(), Some(&first));
    }

    #[tokio::test]
    async fn last_hit_expires_after_horizon() {
        let (store, clock) = store();
        let at = clock.now();
        store.set_last_hit("golang", at).await.unwrap();

        clock.advance(Duration::hours(24));
        assert_eq!(store.get_last_hit("golang").await.unwrap(), Some(at));

        clock.advance(Duration::hours(1));
        assert!(store.get_last_hit("golang").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn renewing_a_hit_extends_its_expiry() {
        let (store, clock) = store();
        store.set_last_hit("golang", clock.now()).await.unwrap();

        clock.advance(Duration::hours(20));
        let renewed = clock.now();
        store.set_last_hit("golang", renewed).await.unwrap();

        clock.advance(Duration::hours(20));
        assert_eq!(store.get_last_hit("golang").await.unwrap(), Some(renewed));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_pops_never_hand_out_a_keyword_twice() {
        let (store, _) = store();
        for i in 0..200 {
            store.queue_push(&format!("topic-{i}")).await.unwrap();
        }

        let poppers = (0..8).map(|_| {
            let store = store.clone();
            tokio::spawn(async move {
                let mut popped = Vec::new();
                while let Some(keyword) = store.queue_pop_any().await.unwrap() {
                    popped.push(keyword);
                }
                popped
            })
        });

        let mut seen = HashSet::new();
        for result in futures::future::join_all(poppers).await {
            for keyword in result.expect("popper task") {
                assert!(seen.insert(keyword), "keyword popped twice");
            }
        }

        assert_eq!(seen.len(), 200);
        assert_eq!(store.queue_len(), 0);
    }
}
