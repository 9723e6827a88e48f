//! Persistence port for feeds, read signals and the refresh queue.

use std::collections::BTreeSet;

use async_trait::async_trait;
use thiserror::Error;
use time::OffsetDateTime;

use crate::domain::feed::Feed;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("failed to (de)serialize stored record: {0}")]
    Serialization(String),
    #[error("stored record for `{keyword}` is corrupt: {message}")]
    Corrupt { keyword: String, message: String },
}

impl StoreError {
    pub fn unavailable(err: impl std::fmt::Display) -> Self {
        Self::Unavailable(err.to_string())
    }
}

/// Durable state shared by the read path and the background worker.
///
/// Absence is always `Ok(None)`; errors only describe a store that could not
/// answer. Implementations never retry on their own.
#[async_trait]
pub trait FeedStore: Send + Sync {
    /// Insert or wholesale replace the feed stored under `feed.keyword`.
    async fn put_feed(&self, feed: &Feed) -> Result<(), StoreError>;

    async fn get_feed(&self, keyword: &str) -> Result<Option<Feed>, StoreError>;

    async fn delete_feed(&self, keyword: &str) -> Result<(), StoreError>;

    async fn all_keywords(&self) -> Result<BTreeSet<String>, StoreError>;

    /// Record a read. The record expires on its own after the store's
    /// configured horizon unless renewed.
    async fn set_last_hit(&self, keyword: &str, at: OffsetDateTime) -> Result<(), StoreError>;

    async fn get_last_hit(&self, keyword: &str) -> Result<Option<OffsetDateTime>, StoreError>;

    /// Add `keyword` to the refresh queue. Pushing a member is a no-op.
    async fn queue_push(&self, keyword: &str) -> Result<(), StoreError>;

    /// Atomically remove and return one arbitrary queue member.
    async fn queue_pop_any(&self) -> Result<Option<String>, StoreError>;

    async fn health_check(&self) -> Result<(), StoreError>;
}
