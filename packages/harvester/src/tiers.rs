//! Extraction tiers and the fixed tier-ordering policy.
//!
//! Tiers form a closed set with a uniform contract: source in,
//! normalized articles or a typed error out. The ordering policy is
//! strict by declared type — a feed source without a usable feed is a
//! configuration error, never something to paper over with HTML
//! scraping, and a site source must have an installed skill before
//! extraction is attempted. The skill tier itself lives with the
//! orchestrator because it needs the agent machinery.

use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::{HarvestError, TierError, TierResult};
use crate::fetch::feed::parse_feed;
use crate::fetch::readability::extract_readable;
use crate::fetch::{FetchOptions, PageFetcher};
use crate::types::{NewArticle, Source, SourceKind, Tier};

/// Tier order for a source under the strict declared-type policy.
///
/// - `Feed` sources try `[Feed]` only.
/// - `Site` sources with an installed skill try `[Skill]`.
/// - `Site` sources without a skill are a precondition failure; the
///   caller must run discovery first, it is never invoked implicitly.
pub fn tier_order(source: &Source) -> Result<Vec<Tier>, HarvestError> {
    match source.kind {
        SourceKind::Feed => Ok(vec![Tier::Feed]),
        SourceKind::Site if source.has_skill => Ok(vec![Tier::Skill]),
        SourceKind::Site => Err(HarvestError::Precondition {
            reason: format!(
                "site source {} has no installed skill; run skill discovery first",
                source.id
            ),
        }),
    }
}

/// Feed tier: one fetch of a syndication feed yields many items.
pub async fn feed_tier(
    fetcher: &dyn PageFetcher,
    source: &Source,
    cancel: &CancellationToken,
) -> TierResult<Vec<NewArticle>> {
    let page = fetcher
        .fetch(&source.url, &FetchOptions::static_html(), cancel)
        .await?;

    let items = parse_feed(&page.body).map_err(|reason| TierError::Parse { reason })?;
    debug!(source_id = %source.id, items = items.len(), "Feed parsed");

    let articles = items
        .into_iter()
        .filter_map(|item| {
            // Items without a link cannot be deduplicated; drop them.
            let url = item.url.filter(|u| !u.is_empty())?;
            let title = item
                .title
                .filter(|t| !t.is_empty())
                .unwrap_or_else(|| url.clone());
            let content = item.summary.clone().unwrap_or_else(|| title.clone());

            let mut article = NewArticle::new(source.id, url, title, content);
            if let Some(summary) = item.summary {
                article = article.with_excerpt(summary);
            }
            if let Some(author) = item.author {
                article = article.with_author(author);
            }
            if let Some(published) = item.published_at {
                article = article.with_published_at(published);
            }
            Some(article)
        })
        .collect();

    Ok(articles)
}

/// Static tier: single fetch plus readability extraction of the page
/// itself.
pub async fn static_tier(
    fetcher: &dyn PageFetcher,
    source: &Source,
    cancel: &CancellationToken,
) -> TierResult<Vec<NewArticle>> {
    page_tier(fetcher, source, FetchOptions::static_html(), cancel).await
}

/// Rendered tier: the same extraction over a browser-rendered page.
pub async fn rendered_tier(
    fetcher: &dyn PageFetcher,
    source: &Source,
    cancel: &CancellationToken,
) -> TierResult<Vec<NewArticle>> {
    page_tier(fetcher, source, FetchOptions::rendered(), cancel).await
}

async fn page_tier(
    fetcher: &dyn PageFetcher,
    source: &Source,
    options: FetchOptions,
    cancel: &CancellationToken,
) -> TierResult<Vec<NewArticle>> {
    let page = fetcher.fetch(&source.url, &options, cancel).await?;

    let readable = extract_readable(&page).ok_or_else(|| TierError::NoContent {
        url: page.final_url.clone(),
    })?;

    let title = readable.title.unwrap_or_else(|| source.name.clone());
    Ok(vec![NewArticle::new(
        source.id,
        page.final_url,
        title,
        readable.text,
    )])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockFetcher;
    use uuid::Uuid;

    const FEED: &str = r#"<?xml version="1.0"?>
<rss version="2.0"><channel>
  <item>
    <title>First</title>
    <link>https://e.com/1</link>
    <description>Lead one.</description>
    <pubDate>Mon, 06 Jan 2025 10:00:00 +0000</pubDate>
  </item>
  <item>
    <description>No link, dropped.</description>
  </item>
  <item>
    <title>Second</title>
    <link>https://e.com/2</link>
  </item>
</channel></rss>"#;

    fn feed_source() -> Source {
        Source::new("https://e.com/feed.xml", "Example", SourceKind::Feed)
    }

    #[test]
    fn test_tier_order_policy() {
        let feed = feed_source();
        assert_eq!(tier_order(&feed).unwrap(), vec![Tier::Feed]);

        let mut site = Source::new("https://e.com", "Example", SourceKind::Site);
        let err = tier_order(&site).unwrap_err();
        assert!(matches!(err, HarvestError::Precondition { .. }));

        site.has_skill = true;
        assert_eq!(tier_order(&site).unwrap(), vec![Tier::Skill]);
    }

    #[tokio::test]
    async fn test_feed_tier_normalizes_items() {
        let source = feed_source();
        let fetcher = MockFetcher::new().with_page(&source.url, FEED);

        let articles = feed_tier(&fetcher, &source, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(articles.len(), 2);
        assert_eq!(articles[0].url, "https://e.com/1");
        assert_eq!(articles[0].title, "First");
        assert_eq!(articles[0].content, "Lead one.");
        assert!(articles[0].published_at.is_some());
        assert!(articles[1].published_at.is_none());
    }

    #[tokio::test]
    async fn test_feed_tier_rejects_html() {
        let source = feed_source();
        let fetcher = MockFetcher::new().with_page(&source.url, "<html><body>nope</body></html>");

        let err = feed_tier(&fetcher, &source, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, TierError::Parse { .. }));
    }

    #[tokio::test]
    async fn test_feed_tier_propagates_fetch_failure() {
        let source = feed_source();
        let fetcher = MockFetcher::new().with_failure(&source.url);

        let err = feed_tier(&fetcher, &source, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, TierError::Fetch(_)));
    }

    #[tokio::test]
    async fn test_static_tier_extracts_one_article() {
        let mut source = Source::new("https://e.com/post", "Example", SourceKind::Site);
        source.id = Uuid::new_v4();
        let fetcher = MockFetcher::new().with_page(
            &source.url,
            r#"<html><head><title>Post</title></head><body><article>
               <p>A body paragraph long enough to win the region scoring
               pass and come back as readable content.</p>
               <p>And one more for good measure.</p>
               </article></body></html>"#,
        );

        let articles = static_tier(&fetcher, &source, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(articles.len(), 1);
        assert_eq!(articles[0].title, "Post");
        assert!(articles[0].content.contains("body paragraph"));
    }

    #[tokio::test]
    async fn test_static_tier_empty_page_is_no_content() {
        let source = Source::new("https://e.com/post", "Example", SourceKind::Site);
        let fetcher =
            MockFetcher::new().with_page(&source.url, "<html><body></body></html>");

        let err = static_tier(&fetcher, &source, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, TierError::NoContent { .. }));
    }
}
