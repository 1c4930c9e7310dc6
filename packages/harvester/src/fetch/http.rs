//! HTTP-based page fetching.
//!
//! `HttpFetcher` does plain GET fetches with an explicit timeout and
//! optional markdown-preferring content negotiation. `WebFetcher`
//! composes it with an optional [`RenderClient`] so one `PageFetcher`
//! covers both static and rendered fetch modes.

use async_trait::async_trait;
use chrono::Utc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::{FetchError, FetchResult};
use crate::fetch::{hash_content, FetchOptions, FetchedPage, PageFetcher, RenderClient};
use crate::types::FetchMode;

const MARKDOWN_ACCEPT: &str = "text/markdown, text/plain;q=0.9, text/html;q=0.8";

/// Plain HTTP fetcher backed by reqwest.
pub struct HttpFetcher {
    client: reqwest::Client,
    user_agent: String,
}

impl Default for HttpFetcher {
    fn default() -> Self {
        Self::new(Duration::from_secs(30))
    }
}

impl HttpFetcher {
    /// Create a fetcher with the given request timeout.
    pub fn new(timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(timeout)
                .build()
                .expect("Failed to create HTTP client"),
            user_agent: "HarvesterBot/1.0".to_string(),
        }
    }

    /// Create a fetcher from the engine config's timeout and user agent.
    pub fn from_config(config: &crate::config::EngineConfig) -> Self {
        Self::new(config.fetch_timeout).with_user_agent(&config.user_agent)
    }

    /// Set a custom user agent.
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Set a custom HTTP client.
    pub fn with_client(mut self, client: reqwest::Client) -> Self {
        self.client = client;
        self
    }

    async fn fetch_static(
        &self,
        url: &str,
        options: &FetchOptions,
        cancel: &CancellationToken,
    ) -> FetchResult<FetchedPage> {
        debug!(url = %url, prefer_markdown = options.prefer_markdown, "HTTP fetch starting");

        let mut request = self.client.get(url).header("User-Agent", &self.user_agent);
        if options.prefer_markdown {
            request = request.header("Accept", MARKDOWN_ACCEPT);
        }

        let response = tokio::select! {
            _ = cancel.cancelled() => return Err(FetchError::Cancelled),
            result = request.send() => result.map_err(|e| {
                if e.is_timeout() {
                    FetchError::Timeout { url: url.to_string() }
                } else {
                    warn!(url = %url, error = %e, "HTTP request failed");
                    FetchError::Http {
                        url: url.to_string(),
                        source: Box::new(e),
                    }
                }
            })?,
        };

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let final_url = response.url().to_string();
        let content_type = response
            .headers()
            .get("content-type")
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string());

        let body = tokio::select! {
            _ = cancel.cancelled() => return Err(FetchError::Cancelled),
            result = response.text() => result.map_err(|e| FetchError::Http {
                url: url.to_string(),
                source: Box::new(e),
            })?,
        };

        let is_markdown = content_type
            .as_deref()
            .map(|ct| ct.starts_with("text/markdown") || ct.starts_with("text/plain"))
            .unwrap_or(false);

        let mut page = FetchedPage {
            url: url.to_string(),
            final_url,
            status: status.as_u16(),
            content_type,
            content_hash: hash_content(&body),
            body,
            is_markdown,
            fetched_at: Utc::now(),
        };
        if is_markdown {
            page = page.as_markdown();
        }

        debug!(
            url = %url,
            status = page.status,
            content_length = page.content_length(),
            "HTTP fetch complete"
        );

        Ok(page)
    }
}

#[async_trait]
impl PageFetcher for HttpFetcher {
    async fn fetch(
        &self,
        url: &str,
        options: &FetchOptions,
        cancel: &CancellationToken,
    ) -> FetchResult<FetchedPage> {
        match options.mode {
            FetchMode::Static => self.fetch_static(url, options, cancel).await,
            FetchMode::Rendered => Err(FetchError::Render {
                url: url.to_string(),
                reason: "no render service configured".into(),
            }),
        }
    }

    fn name(&self) -> &str {
        "http"
    }
}

/// The standard fetcher: static fetches over HTTP, rendered fetches
/// through the render service when one is configured.
pub struct WebFetcher {
    http: HttpFetcher,
    render: Option<RenderClient>,
}

impl WebFetcher {
    pub fn new(http: HttpFetcher) -> Self {
        Self { http, render: None }
    }

    pub fn with_render(mut self, render: RenderClient) -> Self {
        self.render = Some(render);
        self
    }
}

#[async_trait]
impl PageFetcher for WebFetcher {
    async fn fetch(
        &self,
        url: &str,
        options: &FetchOptions,
        cancel: &CancellationToken,
    ) -> FetchResult<FetchedPage> {
        match options.mode {
            FetchMode::Static => self.http.fetch_static(url, options, cancel).await,
            FetchMode::Rendered => match &self.render {
                Some(render) => render.render_page(url, cancel).await,
                None => Err(FetchError::Render {
                    url: url.to_string(),
                    reason: "no render service configured".into(),
                }),
            },
        }
    }

    fn name(&self) -> &str {
        "web"
    }
}
