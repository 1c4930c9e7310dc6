//! Syndication feed parsing (RSS 2.0 and Atom) via quick-xml.

use quick_xml::de::from_str;
use serde::Deserialize;
use url::Url;

use crate::fetch::dates::parse_date;
use crate::fetch::readability::html_to_markdown;

/// One normalized feed item.
#[derive(Debug, Clone)]
pub struct FeedItem {
    pub title: Option<String>,
    pub url: Option<String>,
    pub summary: Option<String>,
    pub author: Option<String>,
    pub published_at: Option<chrono::DateTime<chrono::Utc>>,
}

// --- RSS 2.0 ---

#[derive(Debug, Deserialize)]
struct Rss {
    channel: Channel,
}

#[derive(Debug, Deserialize)]
struct Channel {
    #[serde(rename = "item", default)]
    items: Vec<RssItem>,
}

#[derive(Debug, Deserialize)]
struct RssItem {
    title: Option<String>,
    link: Option<String>,
    #[serde(rename = "pubDate")]
    pub_date: Option<String>,
    description: Option<String>,
    #[serde(rename = "dc:creator")]
    creator: Option<String>,
    author: Option<String>,
}

// --- Atom ---

#[derive(Debug, Deserialize)]
struct AtomFeed {
    #[serde(rename = "entry", default)]
    entries: Vec<AtomEntry>,
}

#[derive(Debug, Deserialize)]
struct AtomEntry {
    title: Option<String>,
    #[serde(rename = "link", default)]
    links: Vec<AtomLink>,
    summary: Option<String>,
    published: Option<String>,
    updated: Option<String>,
    author: Option<AtomAuthor>,
}

#[derive(Debug, Deserialize)]
struct AtomLink {
    #[serde(rename = "@href")]
    href: Option<String>,
    #[serde(rename = "@rel")]
    rel: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AtomAuthor {
    name: Option<String>,
}

/// Parse a feed document, dispatching on the root element.
///
/// The root element is checked up front because serde ignores unknown
/// fields: without the check, arbitrary HTML would "parse" as an empty
/// Atom feed instead of failing the tier.
pub fn parse_feed(xml: &str) -> Result<Vec<FeedItem>, String> {
    match root_element(xml).as_deref() {
        Some("rss") | Some("rdf:RDF") => from_str::<Rss>(xml)
            .map(|rss| rss.channel.items.into_iter().map(FeedItem::from).collect())
            .map_err(|e| format!("invalid RSS: {e}")),
        Some("feed") => from_str::<AtomFeed>(xml)
            .map(|feed| feed.entries.into_iter().map(FeedItem::from).collect())
            .map_err(|e| format!("invalid Atom: {e}")),
        Some(other) => Err(format!("not a feed document (root element <{other}>)")),
        None => Err("empty or unparseable document".to_string()),
    }
}

/// Name of the first real element, skipping declarations and comments.
fn root_element(xml: &str) -> Option<String> {
    let mut rest = xml.trim_start();
    loop {
        let start = rest.find('<')?;
        let tail = &rest[start + 1..];
        if tail.starts_with('?') || tail.starts_with('!') {
            rest = &tail[tail.find('>')? + 1..];
            continue;
        }
        let name: String = tail
            .chars()
            .take_while(|c| !c.is_whitespace() && *c != '>' && *c != '/')
            .collect();
        return if name.is_empty() { None } else { Some(name) };
    }
}

impl From<RssItem> for FeedItem {
    fn from(item: RssItem) -> Self {
        Self {
            title: item.title.map(|t| t.trim().to_string()),
            url: item.link.map(|l| l.trim().to_string()),
            summary: item
                .description
                .map(|d| html_to_markdown(&d))
                .filter(|d| !d.is_empty()),
            author: item.creator.or(item.author),
            published_at: item.pub_date.as_deref().and_then(parse_date),
        }
    }
}

impl From<AtomEntry> for FeedItem {
    fn from(entry: AtomEntry) -> Self {
        // Prefer the alternate link; fall back to the first with an href.
        let url = entry
            .links
            .iter()
            .find(|l| l.rel.as_deref() == Some("alternate") && l.href.is_some())
            .or_else(|| entry.links.iter().find(|l| l.href.is_some()))
            .and_then(|l| l.href.clone());

        Self {
            title: entry.title.map(|t| t.trim().to_string()),
            url,
            summary: entry
                .summary
                .map(|s| html_to_markdown(&s))
                .filter(|s| !s.is_empty()),
            author: entry.author.and_then(|a| a.name),
            published_at: entry
                .published
                .as_deref()
                .or(entry.updated.as_deref())
                .and_then(parse_date),
        }
    }
}

/// Feed URLs advertised by an HTML page through
/// `<link rel="alternate" type="application/rss+xml|atom+xml">`.
pub fn discover_feed_links(base_url: &Url, html: &str) -> Vec<String> {
    use scraper::{Html, Selector};

    let Ok(sel) = Selector::parse(r#"link[rel="alternate"][href]"#) else {
        return Vec::new();
    };
    let doc = Html::parse_document(html);

    doc.select(&sel)
        .filter(|el| {
            el.value()
                .attr("type")
                .map(|t| t.contains("rss") || t.contains("atom"))
                .unwrap_or(false)
        })
        .filter_map(|el| el.value().attr("href"))
        .filter_map(|href| base_url.join(href).ok())
        .map(|u| u.to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const RSS_FIXTURE: &str = r#"<?xml version="1.0"?>
<rss version="2.0">
  <channel>
    <title>Example</title>
    <item>
      <title>First story</title>
      <link>https://example.com/1</link>
      <pubDate>Mon, 06 Jan 2025 10:00:00 +0000</pubDate>
      <description><![CDATA[<p>Lead paragraph.</p>]]></description>
    </item>
    <item>
      <title>Second story</title>
      <link>https://example.com/2</link>
    </item>
  </channel>
</rss>"#;

    const ATOM_FIXTURE: &str = r#"<?xml version="1.0"?>
<feed xmlns="http://www.w3.org/2005/Atom">
  <title>Example</title>
  <entry>
    <title>Atom entry</title>
    <link rel="alternate" href="https://example.com/atom-1"/>
    <link rel="self" href="https://example.com/self"/>
    <published>2025-01-06T10:00:00Z</published>
    <author><name>Jo Writer</name></author>
  </entry>
</feed>"#;

    #[test]
    fn test_parse_rss() {
        let items = parse_feed(RSS_FIXTURE).unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].title.as_deref(), Some("First story"));
        assert_eq!(items[0].url.as_deref(), Some("https://example.com/1"));
        assert!(items[0].published_at.is_some());
        assert_eq!(items[0].summary.as_deref(), Some("Lead paragraph."));
        assert!(items[1].published_at.is_none());
    }

    #[test]
    fn test_parse_atom() {
        let items = parse_feed(ATOM_FIXTURE).unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].url.as_deref(), Some("https://example.com/atom-1"));
        assert_eq!(items[0].author.as_deref(), Some("Jo Writer"));
        assert!(items[0].published_at.is_some());
    }

    #[test]
    fn test_parse_garbage_fails() {
        assert!(parse_feed("<html><body>not a feed</body></html>").is_err());
    }

    #[test]
    fn test_discover_feed_links() {
        let base = Url::parse("https://example.com").unwrap();
        let html = r#"
            <link rel="alternate" type="application/rss+xml" href="/feed.xml">
            <link rel="alternate" type="application/atom+xml" href="https://example.com/atom">
            <link rel="stylesheet" href="/style.css">
        "#;
        let feeds = discover_feed_links(&base, html);
        assert_eq!(feeds.len(), 2);
        assert_eq!(feeds[0], "https://example.com/feed.xml");
    }
}
