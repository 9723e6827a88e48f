//! `TopicFetcher` backed by the live site.

mod page;

use std::time::Instant;

use async_trait::async_trait;
use reqwest::{Client, header};
use tracing::{debug, warn};
use url::Url;

use crate::application::fetcher::{FetchError, TopicFetcher};
use crate::config::FetcherSettings;
use crate::domain::feed::{FeedContent, FetchedTopic};
use crate::infra::error::InfraError;

use page::{TopicPage, page_url, parse_topic_page};

const ACCEPT_HTML: &str = "text/html,application/xhtml+xml;q=0.9,*/*;q=0.8";

#[derive(Clone)]
pub struct EksiFetcher {
    client: Client,
    base_url: Url,
}

impl EksiFetcher {
    pub fn new(settings: &FetcherSettings) -> Result<Self, InfraError> {
        let client = Client::builder()
            .user_agent(settings.user_agent.clone())
            .timeout(settings.timeout)
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()
            .map_err(|err| InfraError::http_client(err.to_string()))?;

        Ok(Self {
            client,
            base_url: settings.base_url.clone(),
        })
    }

    /// URL of the search that redirects to the topic named `keyword`.
    pub fn search_url(&self, keyword: &str) -> Url {
        let mut url = self.base_url.clone();
        url.query_pairs_mut().clear().append_pair("q", keyword);
        url
    }

    fn start_url(&self, keyword: &str, resume_url: Option<&str>) -> Url {
        match resume_url.map(Url::parse) {
            Some(Ok(url)) => url,
            Some(Err(err)) => {
                warn!(keyword, error = %err, "stored topic URL is invalid; searching again");
                self.search_url(keyword)
            }
            None => self.search_url(keyword),
        }
    }

    /// Fetch `url` and return the address the response was served from
    /// along with its body.
    async fn get(&self, url: Url) -> Result<(Url, String), FetchError> {
        let started = Instant::now();
        let response = self
            .client
            .get(url.clone())
            .header(header::ACCEPT, ACCEPT_HTML)
            .send()
            .await
            .map_err(|err| FetchError::Transport {
                url: url.to_string(),
                message: err.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let final_url = response.url().clone();
        let body = response.text().await.map_err(|err| FetchError::Transport {
            url: final_url.to_string(),
            message: err.to_string(),
        })?;

        debug!(
            url = %final_url,
            bytes = body.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "fetched topic page"
        );
        Ok((final_url, body))
    }
}

#[async_trait]
impl TopicFetcher for EksiFetcher {
    async fn fetch_topic(
        &self,
        keyword: &str,
        resume_url: Option<&str>,
    ) -> Result<FetchedTopic, FetchError> {
        let (mut url, body) = self.get(self.start_url(keyword, resume_url)).await?;
        let mut page = parse_topic_page(&body, &url)?;

        if let Some(pager) = page.pager
            && !pager.is_last_page()
        {
            let (last_url, body) = self.get(page_url(&url, pager.count)).await?;
            page = parse_topic_page(&body, &last_url)?;
            url = last_url;
        }

        into_topic(keyword, url, page)
    }
}

fn into_topic(keyword: &str, url: Url, page: TopicPage) -> Result<FetchedTopic, FetchError> {
    let title = page.title.unwrap_or_else(|| keyword.to_string());

    let len = page.entries.len();
    let mut entries = Vec::with_capacity(len);
    let mut links = Vec::with_capacity(len);
    let mut authors = Vec::with_capacity(len);
    let mut dates = Vec::with_capacity(len);
    for entry in page.entries {
        entries.push(entry.body);
        links.push(entry.link);
        authors.push(entry.author);
        dates.push(entry.date);
    }

    let mut content =
        FeedContent::new(entries, links, authors, dates).map_err(|err| FetchError::Markup {
            url: url.to_string(),
            message: err.to_string(),
        })?;
    content.sort_oldest_first();

    Ok(FetchedTopic {
        title,
        url: url.to_string(),
        content,
    })
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use time::macros::datetime;

    use super::*;
    use super::page::ParsedEntry;

    fn fetcher() -> EksiFetcher {
        EksiFetcher::new(&FetcherSettings {
            base_url: Url::parse("https://eksisozluk.com/").unwrap(),
            user_agent: "eksirss-test".to_string(),
            timeout: Duration::from_secs(5),
        })
        .expect("client")
    }

    #[test]
    fn search_url_carries_keyword() {
        let url = fetcher().search_url("çay bahçesi");
        assert_eq!(url.as_str(), "https://eksisozluk.com/?q=%C3%A7ay+bah%C3%A7esi");
    }

    #[test]
    fn invalid_resume_url_falls_back_to_search() {
        let fetcher = fetcher();
        assert_eq!(
            fetcher.start_url("golang", Some("not a url")),
            fetcher.search_url("golang")
        );
        assert_eq!(
            fetcher
                .start_url("golang", Some("https://eksisozluk.com/golang--1?p=3"))
                .as_str(),
            "https://eksisozluk.com/golang--1?p=3"
        );
    }

    #[test]
    fn topic_is_sorted_oldest_first_and_titled() {
        let url = Url::parse("https://eksisozluk.com/golang--1?p=2").unwrap();
        let entry = |body: &str, date| ParsedEntry {
            body: body.to_string(),
            link: format!("https://eksisozluk.com/entry/{body}"),
            author: "ssg".to_string(),
            date,
        };
        let page = TopicPage {
            title: None,
            pager: None,
            entries: vec![
                entry("newer", datetime!(2024-03-02 10:00 +03:00)),
                entry("older", datetime!(2024-03-01 10:00 +03:00)),
            ],
        };

        let topic = into_topic("golang", url, page).expect("topic");

        assert_eq!(topic.title, "golang");
        assert_eq!(topic.url, "https://eksisozluk.com/golang--1?p=2");
        let bodies: Vec<_> = topic.content.iter().map(|view| view.body).collect();
        assert_eq!(bodies, ["older", "newer"]);
    }
}
