//! RSS rendering for stored feeds.
//!
//! Rendering is a pure function of the `Feed` record; the result is what the
//! render cache keeps, so it is produced once per refresh rather than once per
//! read.

use bytes::Bytes;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc2822;
use time::macros::format_description;

use crate::domain::feed::Feed;

pub const RSS_CONTENT_TYPE: &str = "application/rss+xml; charset=utf-8";

const SITE_NAME: &str = "ekşi sözlük";

/// A rendered feed document and the metadata the front end turns into headers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedFeed {
    pub body: Bytes,
    pub content_type: &'static str,
    pub last_modified: OffsetDateTime,
}

#[derive(Debug, Clone, Default)]
pub struct FeedRenderer;

impl FeedRenderer {
    pub fn new() -> Self {
        Self
    }

    /// Generate an RSS 2.0 document for the feed.
    pub fn render(&self, feed: &Feed) -> RenderedFeed {
        let mut items = String::new();
        for entry in feed.content.iter() {
            let pub_date = rfc2822(entry.date);
            let title = format!("{} - {}", entry.author, entry_stamp(entry.date));
            items.push_str(&format!(
                "    <item>\n      <title>{}</title>\n      <link>{}</link>\n      <guid isPermaLink=\"true\">{}</guid>\n      <pubDate>{}</pubDate>\n      <dc:creator>{}</dc:creator>\n      <description><![CDATA[{}]]></description>\n    </item>\n",
                xml_escape(&title),
                xml_escape(entry.link),
                xml_escape(entry.link),
                pub_date,
                xml_escape(entry.author),
                cdata_safe(entry.body),
            ));
        }

        let channel_title = format!("{} - {SITE_NAME}", feed.title);
        let description = format!("{SITE_NAME}: {}", feed.title);
        let document = format!(
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<rss version=\"2.0\" xmlns:dc=\"http://purl.org/dc/elements/1.1/\">\n  <channel>\n    <title>{}</title>\n    <link>{}</link>\n    <description>{}</description>\n    <language>tr</language>\n    <lastBuildDate>{}</lastBuildDate>\n{}  </channel>\n</rss>\n",
            xml_escape(&channel_title),
            xml_escape(&feed.url),
            xml_escape(&description),
            rfc2822(feed.last_update),
            items
        );

        RenderedFeed {
            body: Bytes::from(document),
            content_type: RSS_CONTENT_TYPE,
            last_modified: feed.last_update,
        }
    }
}

fn rfc2822(value: OffsetDateTime) -> String {
    value
        .format(&Rfc2822)
        .unwrap_or_else(|_| value.to_string())
}

fn entry_stamp(value: OffsetDateTime) -> String {
    value
        .format(format_description!("[day].[month].[year] [hour]:[minute]"))
        .unwrap_or_else(|_| value.to_string())
}

fn xml_escape(input: &str) -> String {
    input
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

/// A CDATA section ends at the first `]]>`, so split any occurrence across two
/// sections.
fn cdata_safe(input: &str) -> String {
    input.replace("]]>", "]]]]><![CDATA[>")
}

#[cfg(test)]
mod tests {
    use time::macros::datetime;

    use super::*;
    use crate::domain::feed::FeedContent;

    fn sample_feed() -> Feed {
        Feed {
            keyword: "golang".into(),
            title: "golang & <rust>".into(),
            url: "https://eksisozluk.com/golang--123?p=4".into(),
            content: FeedContent::new(
                vec!["first<br/>line".into(), "closing ]]> marker".into()],
                vec![
                    "https://eksisozluk.com/entry/1".into(),
                    "https://eksisozluk.com/entry/2".into(),
                ],
                vec!["ssg".into(), "o'neil".into()],
                vec![
                    datetime!(2024-03-01 09:30 +03:00),
                    datetime!(2024-03-01 10:45 +03:00),
                ],
            )
            .expect("valid content"),
            last_update: datetime!(2024-03-01 08:00 UTC),
        }
    }

    fn body(rendered: &RenderedFeed) -> String {
        String::from_utf8(rendered.body.to_vec()).expect("utf-8 document")
    }

    #[test]
    fn renders_one_item_per_entry() {
        let rendered = FeedRenderer::new().render(&sample_feed());
        let xml = body(&rendered);

        assert_eq!(xml.matches("<item>").count(), 2);
        assert!(xml.contains("<title>ssg - 01.03.2024 09:30</title>"));
        assert!(xml.contains("<dc:creator>o&apos;neil</dc:creator>"));
        assert!(xml.contains("<pubDate>Fri, 01 Mar 2024 09:30:00 +0300</pubDate>"));
        assert_eq!(rendered.content_type, RSS_CONTENT_TYPE);
        assert_eq!(rendered.last_modified, datetime!(2024-03-01 08:00 UTC));
    }

    #[test]
    fn escapes_channel_metadata() {
        let xml = body(&FeedRenderer::new().render(&sample_feed()));

        assert!(xml.contains("<title>golang &amp; &lt;rust&gt; - ekşi sözlük</title>"));
        assert!(xml.contains("<link>https://eksisozluk.com/golang--123?p=4</link>"));
    }

    #[test]
    fn entry_bodies_cannot_close_cdata_early() {
        let xml = body(&FeedRenderer::new().render(&sample_feed()));

        assert!(xml.contains("<![CDATA[first<br/>line]]>"));
        assert!(xml.contains("<![CDATA[closing ]]]]><![CDATA[> marker]]>"));
    }

    #[test]
    fn empty_feed_still_renders_channel() {
        let mut feed = sample_feed();
        feed.content = FeedContent::default();

        let xml = body(&FeedRenderer::new().render(&feed));
        assert!(xml.contains("<channel>"));
        assert!(!xml.contains("<item>"));
    }
}
