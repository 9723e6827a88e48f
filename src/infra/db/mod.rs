//! Postgres-backed `FeedStore`.

mod util;

pub use util::map_sqlx_error;

use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use sqlx::{
    FromRow,
    postgres::{PgPool, PgPoolOptions},
    query, query_as, query_scalar,
    types::Json,
};
use time::{Duration, OffsetDateTime};

use crate::application::clock::Clock;
use crate::application::repos::{FeedStore, StoreError};
use crate::domain::feed::{Feed, FeedContent};

use util::map_row_error;

#[derive(Clone)]
pub struct PostgresFeedStore {
    pool: Arc<PgPool>,
    clock: Arc<dyn Clock>,
    last_hit_ttl: Duration,
}

#[derive(FromRow)]
struct FeedRow {
    keyword: String,
    title: String,
    url: String,
    content: Json<FeedContent>,
    last_update: OffsetDateTime,
}

impl From<FeedRow> for Feed {
    fn from(row: FeedRow) -> Self {
        Self {
            keyword: row.keyword,
            title: row.title,
            url: row.url,
            content: row.content.0,
            last_update: row.last_update,
        }
    }
}

impl PostgresFeedStore {
    pub fn new(pool: PgPool, clock: Arc<dyn Clock>, last_hit_ttl: Duration) -> Self {
        Self {
            pool: Arc::new(pool),
            clock,
            last_hit_ttl,
        }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn connect(url: &str, max_connections: u32) -> Result<PgPool, sqlx::Error> {
        PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await
    }

    pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::Error> {
        sqlx::migrate!("./migrations")
            .run(pool)
            .await
            .map_err(Into::into)
    }

    /// Remove read signals whose expiry has passed.
    pub async fn purge_expired_hits(&self) -> Result<u64, StoreError> {
        let result = query("DELETE FROM last_hits WHERE expires_at <= $1")
            .bind(self.clock.now())
            .execute(self.pool())
            .await
            .map_err(map_sqlx_error)?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl FeedStore for PostgresFeedStore {
    async fn put_feed(&self, feed: &Feed) -> Result<(), StoreError> {
        query(
            "INSERT INTO feeds (keyword, title, url, content, last_update) \
             VALUES ($1, $2, $3, $4, $5) \
             ON CONFLICT (keyword) DO UPDATE SET \
                 title = EXCLUDED.title, \
                 url = EXCLUDED.url, \
                 content = EXCLUDED.content, \
                 last_update = EXCLUDED.last_update",
        )
        .bind(&feed.keyword)
        .bind(&feed.title)
        .bind(&feed.url)
        .bind(Json(&feed.content))
        .bind(feed.last_update)
        .execute(self.pool())
        .await
        .map_err(map_sqlx_error)?;
        Ok(())
    }

    async fn get_feed(&self, keyword: &str) -> Result<Option<Feed>, StoreError> {
        let row = query_as::<_, FeedRow>(
            "SELECT keyword, title, url, content, last_update FROM feeds WHERE keyword = $1",
        )
        .bind(keyword)
        .fetch_optional(self.pool())
        .await
        .map_err(|err| map_row_error(err, keyword))?;
        Ok(row.map(Feed::from))
    }

    async fn delete_feed(&self, keyword: &str) -> Result<(), StoreError> {
        query("DELETE FROM feeds WHERE keyword = $1")
            .bind(keyword)
            .execute(self.pool())
            .await
            .map_err(map_sqlx_error)?;
        Ok(())
    }

    async fn all_keywords(&self) -> Result<BTreeSet<String>, StoreError> {
        let keywords: Vec<String> = query_scalar("SELECT keyword FROM feeds")
            .fetch_all(self.pool())
            .await
            .map_err(map_sqlx_error)?;
        Ok(keywords.into_iter().collect())
    }

    async fn set_last_hit(&self, keyword: &str, at: OffsetDateTime) -> Result<(), StoreError> {
        query(
            "INSERT INTO last_hits (keyword, hit_at, expires_at) VALUES ($1, $2, $3) \
             ON CONFLICT (keyword) DO UPDATE SET \
                 hit_at = EXCLUDED.hit_at, \
                 expires_at = EXCLUDED.expires_at",
        )
        .bind(keyword)
        .bind(at)
        .bind(self.clock.now() + self.last_hit_ttl)
        .execute(self.pool())
        .await
        .map_err(map_sqlx_error)?;
        Ok(())
    }

    async fn get_last_hit(&self, keyword: &str) -> Result<Option<OffsetDateTime>, StoreError> {
        query_scalar("SELECT hit_at FROM last_hits WHERE keyword = $1 AND expires_at > $2")
            .bind(keyword)
            .bind(self.clock.now())
            .fetch_optional(self.pool())
            .await
            .map_err(map_sqlx_error)
    }

    async fn queue_push(&self, keyword: &str) -> Result<(), StoreError> {
        query("INSERT INTO refresh_queue (keyword) VALUES ($1) ON CONFLICT (keyword) DO NOTHING")
            .bind(keyword)
            .execute(self.pool())
            .await
            .map_err(map_sqlx_error)?;
        Ok(())
    }

    async fn queue_pop_any(&self) -> Result<Option<String>, StoreError> {
        query_scalar(
            "DELETE FROM refresh_queue WHERE keyword = ( \
                 SELECT keyword FROM refresh_queue \
                 ORDER BY queued_at \
                 FOR UPDATE SKIP LOCKED \
                 LIMIT 1 \
             ) RETURNING keyword",
        )
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)
    }

    async fn health_check(&self) -> Result<(), StoreError> {
        query("SELECT 1")
            .execute(self.pool())
            .await
            .map(|_| ())
            .map_err(map_sqlx_error)
    }
}
