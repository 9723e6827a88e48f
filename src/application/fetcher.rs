//! Port for retrieving a topic page from the upstream site.

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::feed::FetchedTopic;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request to `{url}` failed: {message}")]
    Transport { url: String, message: String },
    #[error("`{url}` answered with HTTP {status}")]
    Status { url: String, status: u16 },
    #[error("unexpected markup at `{url}`: {message}")]
    Markup { url: String, message: String },
}

/// Retrieves the newest page of a topic.
///
/// Postconditions on success:
/// - entries are ordered oldest-first;
/// - `url` is the value to pass as `resume_url` on the next call;
/// - an empty entry list is valid and still carries `title` and `url`.
#[async_trait]
pub trait TopicFetcher: Send + Sync {
    async fn fetch_topic(
        &self,
        keyword: &str,
        resume_url: Option<&str>,
    ) -> Result<FetchedTopic, FetchError>;
}
