//! Article records and per-run counters.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::source::Tier;

/// A harvested article candidate, before it has been assigned a row id.
///
/// This is what tier functions and the extraction agent's
/// `report_articles` capability produce.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewArticle {
    pub source_id: Uuid,
    /// Canonical URL; the deduplication key.
    pub url: String,
    pub title: String,
    pub content: String,
    pub excerpt: Option<String>,
    pub author: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
}

impl NewArticle {
    pub fn new(
        source_id: Uuid,
        url: impl Into<String>,
        title: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            source_id,
            url: url.into(),
            title: title.into(),
            content: content.into(),
            excerpt: None,
            author: None,
            published_at: None,
        }
    }

    pub fn with_excerpt(mut self, excerpt: impl Into<String>) -> Self {
        self.excerpt = Some(excerpt.into());
        self
    }

    pub fn with_author(mut self, author: impl Into<String>) -> Self {
        self.author = Some(author.into());
        self
    }

    pub fn with_published_at(mut self, published_at: DateTime<Utc>) -> Self {
        self.published_at = Some(published_at);
        self
    }
}

/// A stored article row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Article {
    pub id: Uuid,
    pub source_id: Uuid,
    pub url: String,
    pub title: String,
    pub content: String,
    pub excerpt: Option<String>,
    pub author: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
    pub fetched_at: DateTime<Utc>,
    pub is_read: bool,
}

impl From<NewArticle> for Article {
    fn from(new: NewArticle) -> Self {
        Self {
            id: Uuid::new_v4(),
            source_id: new.source_id,
            url: new.url,
            title: new.title,
            content: new.content,
            excerpt: new.excerpt,
            author: new.author,
            published_at: new.published_at,
            fetched_at: Utc::now(),
            is_read: false,
        }
    }
}

/// Per-run extraction counters, scoped to one orchestrator invocation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExtractionStats {
    pub inserted: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl ExtractionStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_inserted(&mut self) {
        self.inserted += 1;
    }

    pub fn record_skipped(&mut self) {
        self.skipped += 1;
    }

    pub fn record_failed(&mut self) {
        self.failed += 1;
    }

    pub fn merge(&mut self, other: ExtractionStats) {
        self.inserted += other.inserted;
        self.skipped += other.skipped;
        self.failed += other.failed;
    }
}

/// Outcome of one `scrape_source` invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScrapeResult {
    pub inserted: usize,
    pub skipped: usize,
    /// The tier that produced the result.
    pub tier: Tier,
}

/// Outcome of one `extract_articles` invocation.
#[derive(Debug, Clone)]
pub struct ExtractionOutcome {
    /// Every candidate the agent reported, inserted or not.
    pub articles: Vec<NewArticle>,
    pub inserted: usize,
    pub skipped: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_article_from_new_defaults() {
        let new = NewArticle::new(Uuid::new_v4(), "https://example.com/a", "Title", "Body")
            .with_excerpt("lead-in");
        let article = Article::from(new.clone());

        assert_eq!(article.url, new.url);
        assert_eq!(article.excerpt.as_deref(), Some("lead-in"));
        assert!(!article.is_read);
    }

    #[test]
    fn test_stats_merge() {
        let mut a = ExtractionStats {
            inserted: 2,
            skipped: 1,
            failed: 0,
        };
        a.merge(ExtractionStats {
            inserted: 1,
            skipped: 0,
            failed: 3,
        });
        assert_eq!(a.inserted, 3);
        assert_eq!(a.skipped, 1);
        assert_eq!(a.failed, 3);
    }
}
