//! In-memory storage implementation for testing and development.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::RwLock;
use uuid::Uuid;

use crate::error::Result;
use crate::store::{ArticleStore, SourceStore};
use crate::types::{Article, Source};

/// In-memory storage for sources and articles.
///
/// Useful for testing and development. Not suitable for production
/// as data is lost on restart. URL uniqueness is enforced globally,
/// matching the persistence contract.
#[derive(Default)]
pub struct MemoryStore {
    sources: RwLock<HashMap<Uuid, Source>>,
    articles: RwLock<Vec<Article>>,
    urls: RwLock<HashMap<String, Uuid>>,
}

impl MemoryStore {
    /// Create a new empty memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a source, returning its id.
    pub fn seed_source(&self, source: Source) -> Uuid {
        let id = source.id;
        self.sources.write().unwrap().insert(id, source);
        id
    }

    /// Seed an article directly, bypassing dedup (for fixtures).
    pub fn seed_article(&self, article: Article) {
        self.urls
            .write()
            .unwrap()
            .insert(article.url.clone(), article.id);
        self.articles.write().unwrap().push(article);
    }

    /// Number of stored articles.
    pub fn article_count(&self) -> usize {
        self.articles.read().unwrap().len()
    }

    /// Clear all stored data.
    pub fn clear(&self) {
        self.sources.write().unwrap().clear();
        self.articles.write().unwrap().clear();
        self.urls.write().unwrap().clear();
    }
}

#[async_trait]
impl SourceStore for MemoryStore {
    async fn get_source(&self, id: Uuid) -> Result<Option<Source>> {
        Ok(self.sources.read().unwrap().get(&id).cloned())
    }

    async fn put_source(&self, source: &Source) -> Result<()> {
        self.sources
            .write()
            .unwrap()
            .insert(source.id, source.clone());
        Ok(())
    }

    async fn list_sources(&self) -> Result<Vec<Source>> {
        Ok(self.sources.read().unwrap().values().cloned().collect())
    }
}

#[async_trait]
impl ArticleStore for MemoryStore {
    async fn insert_if_new(&self, article: &Article) -> Result<bool> {
        let mut urls = self.urls.write().unwrap();
        if urls.contains_key(&article.url) {
            return Ok(false);
        }
        urls.insert(article.url.clone(), article.id);
        self.articles.write().unwrap().push(article.clone());
        Ok(true)
    }

    async fn latest_published_at(&self, source_id: Uuid) -> Result<Option<DateTime<Utc>>> {
        Ok(self
            .articles
            .read()
            .unwrap()
            .iter()
            .filter(|a| a.source_id == source_id)
            .filter_map(|a| a.published_at)
            .max())
    }

    async fn articles_for_source(&self, source_id: Uuid) -> Result<Vec<Article>> {
        Ok(self
            .articles
            .read()
            .unwrap()
            .iter()
            .filter(|a| a.source_id == source_id)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{NewArticle, SourceKind};

    #[tokio::test]
    async fn test_insert_dedups_by_url() {
        let store = MemoryStore::new();
        let source_id = Uuid::new_v4();

        let first = Article::from(NewArticle::new(source_id, "https://e.com/a", "A", "body"));
        let second = Article::from(NewArticle::new(source_id, "https://e.com/a", "A again", "x"));

        assert!(store.insert_if_new(&first).await.unwrap());
        assert!(!store.insert_if_new(&second).await.unwrap());
        assert_eq!(store.article_count(), 1);
    }

    #[tokio::test]
    async fn test_latest_published_at() {
        let store = MemoryStore::new();
        let source = Source::new("https://e.com", "E", SourceKind::Feed);
        let id = store.seed_source(source);

        assert_eq!(store.latest_published_at(id).await.unwrap(), None);

        let older = Utc::now() - chrono::Duration::days(10);
        let newer = Utc::now() - chrono::Duration::days(2);
        store.seed_article(Article::from(
            NewArticle::new(id, "https://e.com/1", "1", "x").with_published_at(older),
        ));
        store.seed_article(Article::from(
            NewArticle::new(id, "https://e.com/2", "2", "x").with_published_at(newer),
        ));

        assert_eq!(store.latest_published_at(id).await.unwrap(), Some(newer));
    }
}
