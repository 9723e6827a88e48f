mod feed;
mod middleware;

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    middleware as axum_middleware,
    response::{IntoResponse, Response},
    routing::{delete, get},
};
use serde_json::json;

use crate::application::{engine::RefreshEngine, error::ErrorReport};

#[derive(Clone)]
pub struct HttpState {
    pub engine: Arc<RefreshEngine>,
}

/// Routes served by the `serve` command.
pub fn build_router(state: HttpState) -> Router {
    Router::new()
        .route("/feed", get(feed::get_feed).delete(feed::drop_feed))
        .route("/feed/", get(feed::get_feed).delete(feed::drop_feed))
        .route("/cache", delete(feed::drop_cache))
        .route("/health", get(health))
        .with_state(state)
        .layer(axum_middleware::from_fn(middleware::log_responses))
        .layer(axum_middleware::from_fn(middleware::set_request_context))
}

/// Health endpoint only, for the standalone worker process.
pub fn build_health_router(state: HttpState) -> Router {
    Router::new()
        .route("/health", get(health))
        .with_state(state)
        .layer(axum_middleware::from_fn(middleware::log_responses))
        .layer(axum_middleware::from_fn(middleware::set_request_context))
}

async fn health(State(state): State<HttpState>) -> Response {
    match state.engine.store().health_check().await {
        Ok(()) => (StatusCode::OK, Json(json!({ "status": "ok" }))).into_response(),
        Err(err) => {
            let mut response =
                (StatusCode::SERVICE_UNAVAILABLE, Json(json!({ "status": "error" })))
                    .into_response();
            ErrorReport::from_error(
                "infra::http::health",
                StatusCode::SERVICE_UNAVAILABLE,
                &err,
            )
            .attach(&mut response);
            response
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use async_trait::async_trait;
    use axum::{
        body::{Body, to_bytes},
        http::{
            Request,
            header::{CONTENT_TYPE, EXPIRES, LAST_MODIFIED},
        },
    };
    use time::{Duration, OffsetDateTime, macros::datetime};
    use tower::ServiceExt;

    use super::*;
    use crate::{
        application::{
            clock::ManualClock,
            engine::{
                RefreshPolicy,
                testing::{ScriptedFetcher, topic},
            },
            repos::{FeedStore, StoreError},
            syndication::RSS_CONTENT_TYPE,
        },
        cache::{CacheConfig, RenderCache},
        domain::feed::Feed,
        infra::memory::InMemoryFeedStore,
    };

    struct Harness {
        router: Router,
        engine: Arc<RefreshEngine>,
        fetcher: Arc<ScriptedFetcher>,
    }

    fn harness_with(store: Arc<dyn FeedStore>, clock: Arc<ManualClock>) -> Harness {
        let fetcher = Arc::new(ScriptedFetcher::default());
        let cache = Arc::new(RenderCache::new(CacheConfig::default(), clock.clone()));
        let engine = Arc::new(RefreshEngine::new(
            store,
            fetcher.clone(),
            cache,
            clock,
            RefreshPolicy::default(),
        ));
        let router = build_router(HttpState {
            engine: engine.clone(),
        });
        Harness {
            router,
            engine,
            fetcher,
        }
    }

    fn harness() -> Harness {
        let clock = Arc::new(ManualClock::new(datetime!(2024-06-01 12:00 UTC)));
        let store = Arc::new(InMemoryFeedStore::new(clock.clone(), Duration::hours(25)));
        harness_with(store, clock)
    }

    fn request(method: &str, uri: &str) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .body(Body::empty())
            .expect("request")
    }

    async fn body_string(response: Response) -> String {
        let bytes = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body");
        String::from_utf8(bytes.to_vec()).expect("utf-8 body")
    }

    struct DownStore;

    #[async_trait]
    impl FeedStore for DownStore {
        async fn put_feed(&self, _: &Feed) -> Result<(), StoreError> {
            Err(StoreError::unavailable("down"))
        }
        async fn get_feed(&self, _: &str) -> Result<Option<Feed>, StoreError> {
            Err(StoreError::unavailable("down"))
        }
        async fn delete_feed(&self, _: &str) -> Result<(), StoreError> {
            Err(StoreError::unavailable("down"))
        }
        async fn all_keywords(&self) -> Result<BTreeSet<String>, StoreError> {
            Err(StoreError::unavailable("down"))
        }
        async fn set_last_hit(&self, _: &str, _: OffsetDateTime) -> Result<(), StoreError> {
            Err(StoreError::unavailable("down"))
        }
        async fn get_last_hit(&self, _: &str) -> Result<Option<OffsetDateTime>, StoreError> {
            Err(StoreError::unavailable("down"))
        }
        async fn queue_push(&self, _: &str) -> Result<(), StoreError> {
            Err(StoreError::unavailable("down"))
        }
        async fn queue_pop_any(&self) -> Result<Option<String>, StoreError> {
            Err(StoreError::unavailable("down"))
        }
        async fn health_check(&self) -> Result<(), StoreError> {
            Err(StoreError::unavailable("down"))
        }
    }

    #[tokio::test]
    async fn feed_is_served_with_cache_headers() {
        let h = harness();
        h.fetcher.push_ok(topic(
            "golang",
            "https://eksisozluk.com/golang--123",
            2,
            datetime!(2024-06-01 09:00 +03:00),
        ));

        let response = h
            .router
            .clone()
            .oneshot(request("GET", "/feed/?t=golang"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[CONTENT_TYPE], RSS_CONTENT_TYPE);
        assert_eq!(
            response.headers()[LAST_MODIFIED],
            "Sat, 01 Jun 2024 12:00:00 GMT"
        );
        assert_eq!(response.headers()[EXPIRES], "Sun, 02 Jun 2024 00:00:00 GMT");
        let body = body_string(response).await;
        assert!(body.contains("<rss"));
        assert!(body.contains("entry 1"));

        let again = h
            .router
            .oneshot(request("GET", "/feed?t=golang"))
            .await
            .unwrap();
        assert_eq!(again.status(), StatusCode::OK);
        assert_eq!(h.fetcher.calls().len(), 1);
    }

    #[tokio::test]
    async fn missing_or_blank_keyword_is_bad_request() {
        let h = harness();

        let missing = h
            .router
            .clone()
            .oneshot(request("GET", "/feed/"))
            .await
            .unwrap();
        assert_eq!(missing.status(), StatusCode::BAD_REQUEST);

        let blank = h
            .router
            .oneshot(request("GET", "/feed/?t=%20%20"))
            .await
            .unwrap();
        assert_eq!(blank.status(), StatusCode::BAD_REQUEST);
        assert!(h.fetcher.calls().is_empty());
    }

    #[tokio::test]
    async fn upstream_failure_is_bad_gateway() {
        let h = harness();
        h.fetcher.push_err("https://eksisozluk.com/?q=golang");

        let response = h
            .router
            .oneshot(request("GET", "/feed/?t=golang"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        let report = response.extensions().get::<ErrorReport>();
        assert!(report.is_none(), "report is consumed by the logging layer");
    }

    #[tokio::test]
    async fn store_failure_is_service_unavailable() {
        let clock = Arc::new(ManualClock::new(datetime!(2024-06-01 12:00 UTC)));
        let h = harness_with(Arc::new(DownStore), clock);

        let response = h
            .router
            .oneshot(request("GET", "/feed/?t=golang"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn deletes_invalidate_rendered_feeds() {
        let h = harness();
        for keyword in ["golang", "rust"] {
            h.fetcher.push_ok(topic(
                keyword,
                &format!("https://eksisozluk.com/{keyword}--1"),
                1,
                datetime!(2024-06-01 09:00 +03:00),
            ));
            h.engine.get_or_fetch(keyword).await.unwrap();
        }
        assert_eq!(h.engine.cache().len(), 2);

        let dropped = h
            .router
            .clone()
            .oneshot(request("DELETE", "/feed/?t=golang"))
            .await
            .unwrap();
        assert_eq!(dropped.status(), StatusCode::NO_CONTENT);
        assert!(h.engine.cache().get("golang").is_none());
        assert!(h.engine.cache().get("rust").is_some());

        let cleared = h
            .router
            .oneshot(request("DELETE", "/cache"))
            .await
            .unwrap();
        assert_eq!(cleared.status(), StatusCode::NO_CONTENT);
        assert!(h.engine.cache().is_empty());
    }

    #[tokio::test]
    async fn health_reports_store_state() {
        let ok = harness()
            .router
            .oneshot(request("GET", "/health"))
            .await
            .unwrap();
        assert_eq!(ok.status(), StatusCode::OK);
        assert_eq!(body_string(ok).await, r#"{"status":"ok"}"#);

        let clock = Arc::new(ManualClock::new(datetime!(2024-06-01 12:00 UTC)));
        let h = harness_with(Arc::new(DownStore), clock);
        let router = build_health_router(HttpState { engine: h.engine });
        let down = router.oneshot(request("GET", "/health")).await.unwrap();
        assert_eq!(down.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body_string(down).await, r#"{"status":"error"}"#);
    }
}
