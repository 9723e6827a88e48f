//! Feed records: the persisted snapshot of one syndicated topic.

use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime};

use super::error::DomainError;

/// Entry collections of a topic page, kept as parallel vectors.
///
/// All four vectors have the same length and index `i` of each describes the
/// same entry. Deserialization checks this as well.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawFeedContent")]
pub struct FeedContent {
    entries: Vec<String>,
    links: Vec<String>,
    authors: Vec<String>,
    dates: Vec<OffsetDateTime>,
}

/// Borrowed view of a single entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntryView<'a> {
    pub body: &'a str,
    pub link: &'a str,
    pub author: &'a str,
    pub date: OffsetDateTime,
}

impl FeedContent {
    pub fn new(
        entries: Vec<String>,
        links: Vec<String>,
        authors: Vec<String>,
        dates: Vec<OffsetDateTime>,
    ) -> Result<Self, DomainError> {
        let len = entries.len();
        if links.len() != len || authors.len() != len || dates.len() != len {
            return Err(DomainError::invariant(format!(
                "entry collections differ in length (entries={}, links={}, authors={}, dates={})",
                len,
                links.len(),
                authors.len(),
                dates.len()
            )));
        }

        Ok(Self {
            entries,
            links,
            authors,
            dates,
        })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[String] {
        &self.entries
    }

    pub fn links(&self) -> &[String] {
        &self.links
    }

    pub fn authors(&self) -> &[String] {
        &self.authors
    }

    pub fn dates(&self) -> &[OffsetDateTime] {
        &self.dates
    }

    pub fn iter(&self) -> impl Iterator<Item = EntryView<'_>> {
        self.entries
            .iter()
            .zip(&self.links)
            .zip(&self.authors)
            .zip(&self.dates)
            .map(|(((body, link), author), date)| EntryView {
                body,
                link,
                author,
                date: *date,
            })
    }

    /// Reorder all collections together so that `dates` is non-decreasing.
    ///
    /// Entries sharing a timestamp keep their relative order.
    pub fn sort_oldest_first(&mut self) {
        let mut order: Vec<usize> = (0..self.len()).collect();
        order.sort_by_key(|&index| self.dates[index]);

        if order.iter().enumerate().all(|(pos, &index)| pos == index) {
            return;
        }

        self.entries = permute(&self.entries, &order);
        self.links = permute(&self.links, &order);
        self.authors = permute(&self.authors, &order);
        self.dates = permute(&self.dates, &order);
    }
}

#[derive(Deserialize)]
struct RawFeedContent {
    entries: Vec<String>,
    links: Vec<String>,
    authors: Vec<String>,
    dates: Vec<OffsetDateTime>,
}

impl TryFrom<RawFeedContent> for FeedContent {
    type Error = DomainError;

    fn try_from(raw: RawFeedContent) -> Result<Self, Self::Error> {
        FeedContent::new(raw.entries, raw.links, raw.authors, raw.dates)
    }
}

fn permute<T: Clone>(values: &[T], order: &[usize]) -> Vec<T> {
    order.iter().map(|&index| values[index].clone()).collect()
}

/// What the fetcher hands back for one topic page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedTopic {
    pub title: String,
    /// URL to resume from on the next fetch of this topic.
    pub url: String,
    pub content: FeedContent,
}

/// Persisted snapshot of a topic, keyed by its keyword.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Feed {
    pub keyword: String,
    pub title: String,
    pub url: String,
    pub content: FeedContent,
    pub last_update: OffsetDateTime,
}

impl Feed {
    /// Build the record that replaces whatever was stored for `keyword`.
    pub fn from_fetch(keyword: impl Into<String>, topic: FetchedTopic, now: OffsetDateTime) -> Self {
        Self {
            keyword: keyword.into(),
            title: topic.title,
            url: topic.url,
            content: topic.content,
            last_update: now,
        }
    }

    pub fn is_stale(&self, now: OffsetDateTime, horizon: Duration) -> bool {
        now - self.last_update > horizon
    }
}
