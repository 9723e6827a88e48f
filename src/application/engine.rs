//! Refresh engine: the read path over the render cache, the store and the
//! fetcher, plus the refresh step the background worker drives.

use std::sync::Arc;
use std::time::Instant;

use metrics::{counter, histogram};
use thiserror::Error;
use time::Duration;
use tracing::{debug, info, instrument};

use crate::application::clock::Clock;
use crate::application::fetcher::{FetchError, TopicFetcher};
use crate::application::repos::{FeedStore, StoreError};
use crate::application::syndication::FeedRenderer;
use crate::cache::{CachedFeed, RenderCache};
use crate::config::RefreshSettings;
use crate::domain::error::DomainError;
use crate::domain::feed::Feed;
use crate::domain::keyword::normalize_keyword;

const METRIC_RENDER_CACHE_HIT: &str = "eksirss_render_cache_hit_total";
const METRIC_RENDER_CACHE_MISS: &str = "eksirss_render_cache_miss_total";
const METRIC_FETCH: &str = "eksirss_fetch_total";
const METRIC_FETCH_MS: &str = "eksirss_fetch_ms";

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Domain(#[from] DomainError),
}

#[derive(Debug, Clone, Copy)]
pub struct RefreshPolicy {
    /// Age after which a stored feed is handed to the background worker.
    pub stale_after: Duration,
}

impl Default for RefreshPolicy {
    fn default() -> Self {
        Self {
            stale_after: Duration::hours(24),
        }
    }
}

impl TryFrom<&RefreshSettings> for RefreshPolicy {
    type Error = time::error::ConversionRange;

    fn try_from(settings: &RefreshSettings) -> Result<Self, Self::Error> {
        Ok(Self {
            stale_after: Duration::try_from(settings.stale_after)?,
        })
    }
}

/// Where a served response came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadSource {
    RenderCache,
    Store,
    ColdFetch,
}

impl ReadSource {
    fn as_str(self) -> &'static str {
        match self {
            ReadSource::RenderCache => "render_cache",
            ReadSource::Store => "store",
            ReadSource::ColdFetch => "cold_fetch",
        }
    }
}

#[derive(Clone)]
pub struct RefreshEngine {
    store: Arc<dyn FeedStore>,
    fetcher: Arc<dyn TopicFetcher>,
    renderer: FeedRenderer,
    cache: Arc<RenderCache>,
    clock: Arc<dyn Clock>,
    policy: RefreshPolicy,
}

impl RefreshEngine {
    pub fn new(
        store: Arc<dyn FeedStore>,
        fetcher: Arc<dyn TopicFetcher>,
        cache: Arc<RenderCache>,
        clock: Arc<dyn Clock>,
        policy: RefreshPolicy,
    ) -> Self {
        Self {
            store,
            fetcher,
            renderer: FeedRenderer::new(),
            cache,
            clock,
            policy,
        }
    }

    pub fn store(&self) -> &Arc<dyn FeedStore> {
        &self.store
    }

    pub fn cache(&self) -> &Arc<RenderCache> {
        &self.cache
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub fn policy(&self) -> RefreshPolicy {
        self.policy
    }

    /// Serve the rendered feed for `raw_keyword`.
    ///
    /// Only a keyword with no stored feed causes a network fetch; a stored
    /// feed, stale or not, is always served as is.
    #[instrument(skip(self))]
    pub async fn get_or_fetch(&self, raw_keyword: &str) -> Result<CachedFeed, EngineError> {
        let keyword = normalize_keyword(raw_keyword)?;

        let (response, source) = self.read_through(&keyword).await?;
        self.record_hit(&keyword).await?;

        debug!(keyword = %keyword, source = source.as_str(), "served feed");
        Ok(response)
    }

    /// A rendered entry is served only while it matches the stored feed: a
    /// worker in another process refreshes the store but not this cache.
    async fn read_through(&self, keyword: &str) -> Result<(CachedFeed, ReadSource), EngineError> {
        let cached = self.cache.get(keyword);
        let stored = self.store.get_feed(keyword).await?;

        if let (Some(hit), Some(feed)) = (&cached, &stored)
            && hit.last_modified >= feed.last_update
        {
            counter!(METRIC_RENDER_CACHE_HIT).increment(1);
            return Ok((hit.clone(), ReadSource::RenderCache));
        }
        counter!(METRIC_RENDER_CACHE_MISS).increment(1);
        if cached.is_some() {
            debug!(
                keyword,
                stored = stored.is_some(),
                "rendered feed is behind the store; dropping it"
            );
            self.cache.invalidate(keyword);
        }

        if let Some(feed) = stored {
            let response = self.render_and_cache(&feed);
            if feed.is_stale(self.clock.now(), self.policy.stale_after) {
                self.store.queue_push(keyword).await?;
                debug!(keyword, "stored feed is stale; queued for refresh");
            }
            return Ok((response, ReadSource::Store));
        }

        let feed = self.fetch_feed(keyword, None).await?;
        self.store.put_feed(&feed).await?;
        let response = self.render_and_cache(&feed);
        self.store.queue_push(keyword).await?;

        info!(
            keyword,
            entries = feed.content.len(),
            "cold fetch stored and scheduled"
        );
        Ok((response, ReadSource::ColdFetch))
    }

    /// Drop the rendered response for one keyword. Stored data is untouched.
    pub fn drop_one(&self, raw_keyword: &str) -> Result<bool, EngineError> {
        let keyword = normalize_keyword(raw_keyword)?;
        let dropped = self.cache.invalidate(&keyword);
        info!(keyword = %keyword, dropped, "render cache entry dropped");
        Ok(dropped)
    }

    pub fn drop_all(&self) {
        self.cache.invalidate_all();
        info!("render cache cleared");
    }

    /// Renew the read signal for `keyword`.
    pub async fn record_hit(&self, keyword: &str) -> Result<(), EngineError> {
        self.store.set_last_hit(keyword, self.clock.now()).await?;
        Ok(())
    }

    /// Add `keyword` to the refresh queue.
    pub async fn enqueue(&self, raw_keyword: &str) -> Result<(), EngineError> {
        let keyword = normalize_keyword(raw_keyword)?;
        self.store.queue_push(&keyword).await?;
        Ok(())
    }

    /// Fetch `keyword` again from its resume point, replace the stored feed
    /// and the rendered response.
    ///
    /// Nothing is written when the fetch fails.
    pub(crate) async fn refresh(&self, keyword: &str) -> Result<Feed, EngineError> {
        let previous = self.store.get_feed(keyword).await?;
        let resume_url = previous.as_ref().map(|feed| feed.url.as_str());

        let feed = self.fetch_feed(keyword, resume_url).await?;
        self.store.put_feed(&feed).await?;
        self.render_and_cache(&feed);
        Ok(feed)
    }

    async fn fetch_feed(&self, keyword: &str, resume_url: Option<&str>) -> Result<Feed, EngineError> {
        let started = Instant::now();
        let result = self.fetcher.fetch_topic(keyword, resume_url).await;
        histogram!(METRIC_FETCH_MS).record(started.elapsed().as_secs_f64() * 1_000.0);

        match result {
            Ok(mut topic) => {
                counter!(METRIC_FETCH, "outcome" => "success").increment(1);
                topic.content.sort_oldest_first();
                Ok(Feed::from_fetch(keyword, topic, self.clock.now()))
            }
            Err(err) => {
                counter!(METRIC_FETCH, "outcome" => "error").increment(1);
                Err(err.into())
            }
        }
    }

    fn render_and_cache(&self, feed: &Feed) -> CachedFeed {
        let rendered = self.renderer.render(feed);
        self.cache
            .set(&feed.keyword, rendered, self.cache.default_ttl())
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use time::OffsetDateTime;

    use super::*;
    use crate::domain::feed::{FeedContent, FetchedTopic};

    /// Fetcher that replays scripted answers and records its calls.
    #[derive(Default)]
    pub(crate) struct ScriptedFetcher {
        script: Mutex<VecDeque<Result<FetchedTopic, FetchError>>>,
        calls: Mutex<Vec<(String, Option<String>)>>,
    }

    impl ScriptedFetcher {
        pub(crate) fn push_ok(&self, topic: FetchedTopic) {
            self.script.lock().unwrap().push_back(Ok(topic));
        }

        pub(crate) fn push_err(&self, url: &str) {
            self.script.lock().unwrap().push_back(Err(FetchError::Status {
                url: url.to_string(),
                status: 503,
            }));
        }

        pub(crate) fn calls(&self) -> Vec<(String, Option<String>)> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl TopicFetcher for ScriptedFetcher {
        async fn fetch_topic(
            &self,
            keyword: &str,
            resume_url: Option<&str>,
        ) -> Result<FetchedTopic, FetchError> {
            self.calls
                .lock()
                .unwrap()
                .push((keyword.to_string(), resume_url.map(str::to_string)));
            self.script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| {
                    Err(FetchError::Transport {
                        url: keyword.to_string(),
                        message: "no scripted response".into(),
                    })
                })
        }
    }

    pub(crate) fn topic(title: &str, url: &str, entries: usize, start: OffsetDateTime) -> FetchedTopic {
        let content = FeedContent::new(
            (0..entries).map(|i| format!("entry {i}")).collect(),
            (0..entries)
                .map(|i| format!("https://eksisozluk.com/entry/{i}"))
                .collect(),
            (0..entries).map(|i| format!("author{i}")).collect(),
            (0..entries)
                .map(|i| start + Duration::minutes(i as i64))
                .collect(),
        )
        .expect("equal lengths");

        FetchedTopic {
            title: title.to_string(),
            url: url.to_string(),
            content,
        }
    }
}
