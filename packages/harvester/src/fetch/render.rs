//! Render-service client for script-driven pages.
//!
//! Rendering runs out of process: the client posts a URL to an HTTP
//! render service (a headless-browser farm) and gets back the settled
//! DOM, optionally alongside a markdown conversion. This keeps browser
//! lifecycle problems out of the engine while still covering sites
//! that serve nothing useful without script execution.

use chrono::Utc;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::{FetchError, FetchResult};
use crate::fetch::{hash_content, FetchedPage};

#[derive(Serialize)]
struct RenderRequest<'a> {
    url: &'a str,
    formats: Vec<&'static str>,
    #[serde(rename = "timeoutMs")]
    timeout_ms: u64,
}

#[derive(Deserialize)]
struct RenderResponse {
    success: bool,
    data: Option<RenderData>,
    error: Option<String>,
}

#[derive(Deserialize)]
struct RenderData {
    html: Option<String>,
    markdown: Option<String>,
    metadata: Option<RenderMetadata>,
}

#[derive(Deserialize)]
struct RenderMetadata {
    #[serde(rename = "sourceURL")]
    source_url: Option<String>,
}

/// Client for an HTTP render service.
pub struct RenderClient {
    client: Client,
    endpoint: String,
    api_key: Option<SecretString>,
    render_timeout: Duration,
}

impl RenderClient {
    /// Create a client for the given service endpoint.
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            client: Client::builder()
                .timeout(Duration::from_secs(60))
                .build()
                .expect("Failed to create HTTP client"),
            endpoint: endpoint.into(),
            api_key: None,
            render_timeout: Duration::from_secs(30),
        }
    }

    /// Set the bearer token for the render service.
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(SecretString::from(api_key.into()));
        self
    }

    /// Set the per-page render timeout.
    pub fn with_render_timeout(mut self, timeout: Duration) -> Self {
        self.render_timeout = timeout;
        self
    }

    /// Render a page and return it as a [`FetchedPage`].
    pub async fn render_page(
        &self,
        url: &str,
        cancel: &CancellationToken,
    ) -> FetchResult<FetchedPage> {
        debug!(url = %url, "Render fetch starting");

        let request = RenderRequest {
            url,
            formats: vec!["html", "markdown"],
            timeout_ms: self.render_timeout.as_millis() as u64,
        };

        let mut builder = self
            .client
            .post(format!("{}/render", self.endpoint))
            .json(&request);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key.expose_secret());
        }

        let response = tokio::select! {
            _ = cancel.cancelled() => return Err(FetchError::Cancelled),
            result = builder.send() => result.map_err(|e| {
                if e.is_timeout() {
                    FetchError::Timeout { url: url.to_string() }
                } else {
                    FetchError::Render {
                        url: url.to_string(),
                        reason: e.to_string(),
                    }
                }
            })?,
        };

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Render {
                url: url.to_string(),
                reason: format!("service returned HTTP {}", status.as_u16()),
            });
        }

        let parsed: RenderResponse = tokio::select! {
            _ = cancel.cancelled() => return Err(FetchError::Cancelled),
            result = response.json() => result.map_err(|e| FetchError::Render {
                url: url.to_string(),
                reason: format!("unparseable response: {e}"),
            })?,
        };

        if !parsed.success {
            return Err(FetchError::Render {
                url: url.to_string(),
                reason: parsed.error.unwrap_or_else(|| "render failed".into()),
            });
        }

        let data = parsed.data.ok_or_else(|| FetchError::Render {
            url: url.to_string(),
            reason: "response carried no data".into(),
        })?;

        let final_url = data
            .metadata
            .and_then(|m| m.source_url)
            .unwrap_or_else(|| url.to_string());

        // Prefer the service's markdown; fall back to the rendered DOM.
        let (body, is_markdown) = match (data.markdown, data.html) {
            (Some(md), _) if !md.trim().is_empty() => (md, true),
            (_, Some(html)) if !html.trim().is_empty() => (html, false),
            _ => {
                return Err(FetchError::Render {
                    url: url.to_string(),
                    reason: "response carried neither markdown nor html".into(),
                })
            }
        };

        Ok(FetchedPage {
            url: url.to_string(),
            final_url,
            status: 200,
            content_type: None,
            content_hash: hash_content(&body),
            body,
            is_markdown,
            fetched_at: Utc::now(),
        })
    }
}
