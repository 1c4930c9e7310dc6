//! Page fetching: plain HTTP, render-service, and the parsing helpers
//! shared by tiers and agent tools.

pub mod dates;
pub mod feed;
pub mod http;
pub mod readability;
pub mod render;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio_util::sync::CancellationToken;

use crate::error::FetchResult;
use crate::types::FetchMode;

pub use http::{HttpFetcher, WebFetcher};
pub use render::RenderClient;

/// Options for a single fetch.
#[derive(Debug, Clone)]
pub struct FetchOptions {
    /// Static HTTP or render-service fetch.
    pub mode: FetchMode,

    /// Send an Accept header preferring text/markdown, with HTML as the
    /// fallback. Servers that speak markdown save a conversion pass.
    pub prefer_markdown: bool,
}

impl FetchOptions {
    pub fn static_html() -> Self {
        Self {
            mode: FetchMode::Static,
            prefer_markdown: false,
        }
    }

    pub fn rendered() -> Self {
        Self {
            mode: FetchMode::Rendered,
            prefer_markdown: false,
        }
    }

    pub fn for_mode(mode: FetchMode) -> Self {
        Self {
            mode,
            prefer_markdown: false,
        }
    }

    pub fn with_markdown_preferred(mut self) -> Self {
        self.prefer_markdown = true;
        self
    }
}

/// A fetched document plus enough metadata to reason about it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchedPage {
    /// URL as requested.
    pub url: String,

    /// Final URL after redirects.
    pub final_url: String,

    /// HTTP status (200 for render-service results).
    pub status: u16,

    /// Content type reported by the server, if any.
    pub content_type: Option<String>,

    /// Raw body: HTML, or markdown when the server returned it directly.
    pub body: String,

    /// True when `body` is already markdown/plain text.
    pub is_markdown: bool,

    /// SHA-256 of the body, for change detection.
    pub content_hash: String,

    pub fetched_at: DateTime<Utc>,
}

impl FetchedPage {
    pub fn new(url: impl Into<String>, body: impl Into<String>) -> Self {
        let url = url.into();
        let body = body.into();
        let content_hash = hash_content(&body);
        Self {
            final_url: url.clone(),
            url,
            status: 200,
            content_type: None,
            body,
            is_markdown: false,
            content_hash,
            fetched_at: Utc::now(),
        }
    }

    pub fn with_final_url(mut self, final_url: impl Into<String>) -> Self {
        self.final_url = final_url.into();
        self
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    pub fn as_markdown(mut self) -> Self {
        self.is_markdown = true;
        self
    }

    /// Page title: `<title>` for HTML, first heading for markdown.
    pub fn title(&self) -> Option<String> {
        if self.is_markdown {
            self.body
                .lines()
                .find_map(|l| l.strip_prefix("# "))
                .map(|t| t.trim().to_string())
        } else {
            readability::extract_title(&self.body)
        }
    }

    pub fn content_length(&self) -> usize {
        self.body.len()
    }
}

/// SHA-256 hex digest of page content.
pub fn hash_content(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Fetches pages on behalf of tiers and agent tools.
///
/// Implementations must honor the cancellation token promptly: an
/// in-flight request is abandoned, not merely the next one skipped.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch(
        &self,
        url: &str,
        options: &FetchOptions,
        cancel: &CancellationToken,
    ) -> FetchResult<FetchedPage>;

    /// Fetcher name (for logging/debugging).
    fn name(&self) -> &str {
        "unknown"
    }
}
