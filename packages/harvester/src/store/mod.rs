//! Storage traits consumed by the engine.
//!
//! The persistence layer is external; the engine talks to it through
//! two focused traits plus a composite alias:
//! - [`SourceStore`]: source rows (health, strategy, skill linkage)
//! - [`ArticleStore`]: idempotent article insertion keyed by URL
//! - [`Store`]: anything implementing both
//!
//! Mutations use plain read-modify-write under the store's own
//! transactional semantics; concurrent writers for the same source are
//! last-writer-wins by design.

pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::Result;
use crate::types::{Article, Source};

pub use memory::MemoryStore;

/// Source rows keyed by id.
#[async_trait]
pub trait SourceStore: Send + Sync {
    /// Get a source by id.
    async fn get_source(&self, id: Uuid) -> Result<Option<Source>>;

    /// Insert or replace a source row.
    async fn put_source(&self, source: &Source) -> Result<()>;

    /// List all sources (used by schedulers and batch callers).
    async fn list_sources(&self) -> Result<Vec<Source>>;
}

/// Article rows with URL-keyed idempotent insertion.
#[async_trait]
pub trait ArticleStore: Send + Sync {
    /// Insert an article unless one with the same URL already exists.
    ///
    /// Returns `true` when a row landed, `false` for a duplicate.
    /// Duplicate insertion is a no-op, never an error.
    async fn insert_if_new(&self, article: &Article) -> Result<bool>;

    /// Newest published timestamp among a source's articles.
    async fn latest_published_at(&self, source_id: Uuid) -> Result<Option<DateTime<Utc>>>;

    /// All articles belonging to a source.
    async fn articles_for_source(&self, source_id: Uuid) -> Result<Vec<Article>>;

    /// Count articles belonging to a source.
    async fn count_articles(&self, source_id: Uuid) -> Result<usize> {
        Ok(self.articles_for_source(source_id).await?.len())
    }
}

/// Composite storage trait used by the orchestrator.
pub trait Store: SourceStore + ArticleStore {}

// Blanket implementation: anything implementing both traits is a Store.
impl<T: SourceStore + ArticleStore> Store for T {}
