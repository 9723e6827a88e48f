//! Extraction of a single topic page.

use std::cell::RefCell;
use std::rc::Rc;

use lol_html::{RewriteStrSettings, element, rewrite_str, text};
use time::macros::{format_description, offset};
use time::{Date, OffsetDateTime, PrimitiveDateTime, UtcOffset};
use tracing::warn;
use url::Url;

use crate::application::fetcher::FetchError;

/// Timestamps on the site are written in Turkey time.
const SITE_OFFSET: UtcOffset = offset!(+3);

const TITLE: &str = "h1#title";
const PAGER: &str = ".pager";
const ENTRY_LIST: &str = "#entry-item-list, #entry-list";
const ENTRY: &str = "#entry-item-list > li, #entry-list > li";
const ENTRY_CONTENT: &str = "#entry-item-list > li .content, #entry-list > li .content";
const ENTRY_CONTENT_BREAK: &str = "#entry-item-list > li .content br, #entry-list > li .content br";
const ENTRY_AUTHOR: &str = "#entry-item-list > li .entry-author, #entry-list > li .entry-author";
const ENTRY_DATE: &str = "#entry-item-list > li .entry-date, #entry-list > li .entry-date";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Pager {
    pub current: u32,
    pub count: u32,
}

impl Pager {
    pub fn is_last_page(&self) -> bool {
        self.current >= self.count
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ParsedEntry {
    pub body: String,
    pub link: String,
    pub author: String,
    pub date: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct TopicPage {
    pub title: Option<String>,
    pub pager: Option<Pager>,
    /// Entries in page order.
    pub entries: Vec<ParsedEntry>,
}

#[derive(Debug, Default)]
struct EntryDraft {
    body: String,
    author: String,
    author_attr: Option<String>,
    date_text: String,
    link: Option<String>,
}

#[derive(Debug, Default)]
struct PageScan {
    title_attr: Option<String>,
    title_text: String,
    pager: Option<Pager>,
    saw_entry_list: bool,
    drafts: Vec<EntryDraft>,
}

impl PageScan {
    fn current(&mut self) -> Option<&mut EntryDraft> {
        self.drafts.last_mut()
    }
}

/// Extract the title, pager and entries of a topic page.
pub(crate) fn parse_topic_page(html: &str, page_url: &Url) -> Result<TopicPage, FetchError> {
    let scan = Rc::new(RefCell::new(PageScan::default()));

    rewrite_str(
        html,
        RewriteStrSettings {
            element_content_handlers: vec![
                element!(TITLE, {
                    let scan = Rc::clone(&scan);
                    move |el| {
                        scan.borrow_mut().title_attr = el.get_attribute("data-title");
                        Ok(())
                    }
                }),
                text!(TITLE, {
                    let scan = Rc::clone(&scan);
                    move |t| {
                        scan.borrow_mut().title_text.push_str(t.as_str());
                        Ok(())
                    }
                }),
                element!(PAGER, {
                    let scan = Rc::clone(&scan);
                    move |el| {
                        let count = el
                            .get_attribute("data-pagecount")
                            .and_then(|value| value.trim().parse::<u32>().ok());
                        let current = el
                            .get_attribute("data-currentpage")
                            .and_then(|value| value.trim().parse::<u32>().ok())
                            .unwrap_or(1);
                        if let Some(count) = count {
                            scan.borrow_mut().pager = Some(Pager { current, count });
                        }
                        Ok(())
                    }
                }),
                element!(ENTRY_LIST, {
                    let scan = Rc::clone(&scan);
                    move |_| {
                        scan.borrow_mut().saw_entry_list = true;
                        Ok(())
                    }
                }),
                element!(ENTRY, {
                    let scan = Rc::clone(&scan);
                    move |el| {
                        scan.borrow_mut().drafts.push(EntryDraft {
                            author_attr: el.get_attribute("data-author"),
                            ..EntryDraft::default()
                        });
                        Ok(())
                    }
                }),
                text!(ENTRY_CONTENT, {
                    let scan = Rc::clone(&scan);
                    move |t| {
                        if let Some(draft) = scan.borrow_mut().current() {
                            draft.body.push_str(t.as_str());
                        }
                        Ok(())
                    }
                }),
                element!(ENTRY_CONTENT_BREAK, {
                    let scan = Rc::clone(&scan);
                    move |_| {
                        if let Some(draft) = scan.borrow_mut().current() {
                            draft.body.push_str("<br/>");
                        }
                        Ok(())
                    }
                }),
                text!(ENTRY_AUTHOR, {
                    let scan = Rc::clone(&scan);
                    move |t| {
                        if let Some(draft) = scan.borrow_mut().current() {
                            draft.author.push_str(t.as_str());
                        }
                        Ok(())
                    }
                }),
                element!(ENTRY_DATE, {
                    let scan = Rc::clone(&scan);
                    move |el| {
                        if let Some(draft) = scan.borrow_mut().current() {
                            draft.link = el.get_attribute("href");
                        }
                        Ok(())
                    }
                }),
                text!(ENTRY_DATE, {
                    let scan = Rc::clone(&scan);
                    move |t| {
                        if let Some(draft) = scan.borrow_mut().current() {
                            draft.date_text.push_str(t.as_str());
                        }
                        Ok(())
                    }
                }),
            ],
            ..RewriteStrSettings::default()
        },
    )
    .map_err(|err| markup(page_url, err.to_string()))?;

    let scan = Rc::try_unwrap(scan)
        .map(RefCell::into_inner)
        .unwrap_or_else(|rc| std::mem::take(&mut *rc.borrow_mut()));

    let title = scan
        .title_attr
        .as_deref()
        .map(decode_entities)
        .filter(|value| !value.trim().is_empty())
        .or_else(|| {
            let text = collapse_whitespace(&decode_entities(&scan.title_text));
            (!text.is_empty()).then_some(text)
        })
        .map(|value| value.trim().to_string());

    if title.is_none() && !scan.saw_entry_list {
        return Err(markup(page_url, "page has neither a topic title nor an entry list"));
    }

    let mut entries = Vec::with_capacity(scan.drafts.len());
    for (index, draft) in scan.drafts.into_iter().enumerate() {
        match finish_entry(draft, page_url) {
            Ok(entry) => entries.push(entry),
            Err(reason) => warn!(url = %page_url, index, reason, "skipping malformed entry"),
        }
    }

    Ok(TopicPage {
        title,
        pager: scan.pager,
        entries,
    })
}

fn finish_entry(draft: EntryDraft, page_url: &Url) -> Result<ParsedEntry, &'static str> {
    let href = draft.link.ok_or("entry has no permalink")?;
    let link = page_url
        .join(href.trim())
        .map_err(|_| "entry permalink is not a valid URL")?;
    let date = parse_entry_date(&draft.date_text).ok_or("entry date is not recognised")?;

    let author = collapse_whitespace(&decode_entities(&draft.author));
    let author = if author.is_empty() {
        draft
            .author_attr
            .map(|value| decode_entities(&value).trim().to_string())
            .unwrap_or_default()
    } else {
        author
    };

    Ok(ParsedEntry {
        body: draft.body.trim().to_string(),
        link: link.to_string(),
        author,
        date,
    })
}

/// Parse the posting time out of an entry footer such as
/// `01.03.2024 09:30 ~ 10:15`. Edit times after `~` are ignored.
pub(crate) fn parse_entry_date(raw: &str) -> Option<OffsetDateTime> {
    let posted = raw.split('~').next()?.trim();

    if let Ok(datetime) =
        PrimitiveDateTime::parse(posted, format_description!("[day].[month].[year] [hour]:[minute]"))
    {
        return Some(datetime.assume_offset(SITE_OFFSET));
    }

    Date::parse(posted, format_description!("[day].[month].[year]"))
        .ok()
        .map(|date| date.midnight().assume_offset(SITE_OFFSET))
}

/// URL of page `page` of the topic at `topic_url`.
pub(crate) fn page_url(topic_url: &Url, page: u32) -> Url {
    let mut url = topic_url.clone();
    let retained: Vec<(String, String)> = topic_url
        .query_pairs()
        .filter(|(key, _)| key != "p")
        .map(|(key, value)| (key.into_owned(), value.into_owned()))
        .collect();

    {
        let mut pairs = url.query_pairs_mut();
        pairs.clear();
        for (key, value) in &retained {
            pairs.append_pair(key, value);
        }
        pairs.append_pair("p", &page.to_string());
    }
    url
}

fn markup(url: &Url, message: impl Into<String>) -> FetchError {
    FetchError::Markup {
        url: url.to_string(),
        message: message.into(),
    }
}

fn collapse_whitespace(value: &str) -> String {
    value.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Decode the character references that show up in titles and nicknames.
pub(crate) fn decode_entities(input: &str) -> String {
    if !input.contains('&') {
        return input.to_string();
    }

    let mut out = String::with_capacity(input.len());
    let mut rest = input;
    while let Some(start) = rest.find('&') {
        out.push_str(&rest[..start]);
        let candidate = &rest[start..];
        let decoded = candidate.find(';').and_then(|end| {
            let name = &candidate[1..end];
            decode_reference(name).map(|ch| (ch, end + 1))
        });
        match decoded {
            Some((ch, consumed)) => {
                out.push(ch);
                rest = &candidate[consumed..];
            }
            None => {
                out.push('&');
                rest = &candidate[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

fn decode_reference(name: &str) -> Option<char> {
    match name {
        "amp" => Some('&'),
        "lt" => Some('<'),
        "gt" => Some('>'),
        "quot" => Some('"'),
        "apos" => Some('\''),
        "nbsp" => Some('\u{a0}'),
        _ => {
            let number = name.strip_prefix('#')?;
            let code = match number.strip_prefix(['x', 'X']) {
                Some(hex) => u32::from_str_radix(hex, 16).ok()?,
                None => number.parse::<u32>().ok()?,
            };
            char::from_u32(code)
        }
    }
}
