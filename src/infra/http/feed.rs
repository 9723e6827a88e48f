use axum::{
    extract::{Query, State},
    http::{
        HeaderMap, HeaderValue, StatusCode,
        header::{CONTENT_TYPE, EXPIRES, LAST_MODIFIED},
    },
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use time::{OffsetDateTime, UtcOffset, macros::format_description};

use crate::{application::error::HttpError, cache::CachedFeed};

use super::HttpState;

const SOURCE: &str = "infra::http::feed";

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(super) struct TopicQuery {
    t: Option<String>,
}

impl TopicQuery {
    fn keyword(&self) -> Result<&str, HttpError> {
        self.t.as_deref().ok_or_else(|| {
            HttpError::new(
                SOURCE,
                StatusCode::BAD_REQUEST,
                "Missing topic keyword",
                "query parameter `t` is required",
            )
        })
    }
}

pub(super) async fn get_feed(
    State(state): State<HttpState>,
    Query(query): Query<TopicQuery>,
) -> Result<Response, HttpError> {
    let keyword = query.keyword()?;
    let feed = state.engine.get_or_fetch(keyword).await?;
    Ok(feed_response(feed))
}

pub(super) async fn drop_feed(
    State(state): State<HttpState>,
    Query(query): Query<TopicQuery>,
) -> Result<StatusCode, HttpError> {
    let keyword = query.keyword()?;
    state.engine.drop_one(keyword)?;
    Ok(StatusCode::NO_CONTENT)
}

pub(super) async fn drop_cache(State(state): State<HttpState>) -> StatusCode {
    state.engine.drop_all();
    StatusCode::NO_CONTENT
}

fn feed_response(feed: CachedFeed) -> Response {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static(feed.content_type));
    if let Some(value) = http_date(feed.last_modified) {
        headers.insert(LAST_MODIFIED, value);
    }
    if let Some(value) = http_date(feed.expires) {
        headers.insert(EXPIRES, value);
    }
    (StatusCode::OK, headers, feed.body).into_response()
}

/// Format an instant as an IMF-fixdate header value.
pub(super) fn http_date(at: OffsetDateTime) -> Option<HeaderValue> {
    let format = format_description!(
        "[weekday repr:short], [day] [month repr:short] [year] [hour]:[minute]:[second] GMT"
    );
    let formatted = at.to_offset(UtcOffset::UTC).format(format).ok()?;
    HeaderValue::from_str(&formatted).ok()
}
