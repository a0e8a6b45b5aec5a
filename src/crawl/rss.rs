// src/crawl/rss.rs
//! Generic RSS 2.0 source: fetch over HTTP, map channel items to
//! `NewsItem`s. Site-specific scraping beyond RSS stays outside the
//! core; anything speaking RSS plugs in through this one type.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use quick_xml::de::from_str;
use serde::Deserialize;
use std::time::Duration;

use crate::crawl::types::{FetchError, NewsSource};
use crate::model::NewsItem;

#[derive(Debug, Deserialize)]
struct Rss {
    channel: Channel,
}

#[derive(Debug, Deserialize)]
struct Channel {
    #[serde(rename = "item", default)]
    item: Vec<Item>,
}

#[derive(Debug, Deserialize)]
struct Item {
    title: Option<String>,
    link: Option<String>,
    guid: Option<String>,
    #[serde(rename = "pubDate")]
    pub_date: Option<String>,
    description: Option<String>,
}

pub struct RssSource {
    id: String,
    url: String,
    client: reqwest::Client,
}

impl RssSource {
    pub fn new(id: impl Into<String>, url: impl Into<String>, user_agent: &str, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .build()
            .unwrap_or_default();
        Self {
            id: id.into(),
            url: url.into(),
            client,
        }
    }
}

#[async_trait]
impl NewsSource for RssSource {
    async fn fetch_latest(&self) -> Result<Vec<NewsItem>, FetchError> {
        let resp = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(FetchError::from_reqwest)?;
        if !resp.status().is_success() {
            return Err(FetchError::Status {
                status: resp.status().as_u16(),
            });
        }
        let body = resp.text().await.map_err(FetchError::from_reqwest)?;
        parse_feed(&body, &self.id)
    }

    fn name(&self) -> &str {
        &self.id
    }
}

/// Parse an RSS document into items attributed to `source`.
/// Items without a usable title are skipped.
pub fn parse_feed(xml: &str, source: &str) -> Result<Vec<NewsItem>, FetchError> {
    let rss: Rss = from_str(xml).map_err(|e| FetchError::Parse(e.to_string()))?;

    let mut out = Vec::with_capacity(rss.channel.item.len());
    for it in rss.channel.item {
        let title = crate::crawl::normalize_text(it.title.as_deref().unwrap_or_default());
        if title.is_empty() {
            continue;
        }
        let body = crate::crawl::normalize_text(it.description.as_deref().unwrap_or_default());
        out.push(NewsItem {
            source: source.to_string(),
            title,
            body,
            url: it.link.unwrap_or_default(),
            guid: it.guid.filter(|g| !g.is_empty()),
            published_at: it.pub_date.as_deref().and_then(parse_rfc2822),
        });
    }
    Ok(out)
}

fn parse_rfc2822(ts: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc2822(ts)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;

    const FEED: &str = r#"<?xml version="1.0"?>
<rss version="2.0"><channel>
  <title>Example</title>
  <item>
    <title>Markets tumble after surprise announcement</title>
    <link>https://example.com/a</link>
    <guid>example-a</guid>
    <pubDate>Mon, 03 Aug 2026 09:30:00 GMT</pubDate>
    <description>Stocks fell sharply&#8230; details inside.</description>
  </item>
  <item>
    <title></title>
    <link>https://example.com/untitled</link>
  </item>
</channel></rss>"#;

    #[test]
    fn parses_items_and_skips_untitled() {
        let items = parse_feed(FEED, "example").unwrap();
        assert_eq!(items.len(), 1);
        let it = &items[0];
        assert_eq!(it.source, "example");
        assert_eq!(it.guid.as_deref(), Some("example-a"));
        assert_eq!(it.fingerprint(), Some("example-a"));
        assert!(it.published_at.is_some());
    }

    #[test]
    fn garbage_is_a_parse_error() {
        let err = parse_feed("not xml at all", "example").unwrap_err();
        assert!(matches!(err, FetchError::Parse(_)));
        assert!(!err.is_retryable());
    }
}
