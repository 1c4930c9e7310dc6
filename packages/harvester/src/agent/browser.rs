//! Browser session control for agent tool use.
//!
//! The browser runs out of process behind an HTTP automation service,
//! the same shape as the render client: the engine never manages a
//! local headless browser. Sessions are opened lazily by the tool
//! context on first browser tool use and closed at run end on every
//! exit path.

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::{ToolError, ToolResult};

/// Opens browser sessions on demand.
#[async_trait]
pub trait BrowserProvider: Send + Sync {
    async fn open(&self, cancel: &CancellationToken) -> ToolResult<Box<dyn BrowserSession>>;
}

/// One live browser session, owned by a single agent run.
#[async_trait]
pub trait BrowserSession: Send {
    async fn navigate(&mut self, url: &str) -> ToolResult<()>;
    async fn click(&mut self, selector: &str) -> ToolResult<()>;
    async fn type_text(&mut self, selector: &str, text: &str) -> ToolResult<()>;
    async fn scroll(&mut self, dx: i64, dy: i64) -> ToolResult<()>;
    /// Wait for a selector to appear; `false` on timeout.
    async fn wait_for(&mut self, selector: &str, timeout: Duration) -> ToolResult<bool>;
    /// Capture a screenshot of the current viewport.
    async fn screenshot(&mut self) -> ToolResult<Vec<u8>>;
    /// Evaluate a script in the page and return its JSON result.
    async fn eval(&mut self, script: &str) -> ToolResult<Value>;
    /// Serialize the live DOM.
    async fn dom(&mut self) -> ToolResult<String>;
    async fn close(&mut self) -> ToolResult<()>;
}

#[derive(serde::Deserialize)]
struct SessionResponse {
    id: String,
}

#[derive(serde::Deserialize)]
struct ActionResponse {
    success: bool,
    #[serde(default)]
    data: Option<Value>,
    #[serde(default)]
    error: Option<String>,
}

/// Client for an HTTP browser-automation service.
pub struct RemoteBrowserProvider {
    client: Client,
    endpoint: String,
    // Arc because each opened session carries the key.
    api_key: Option<Arc<SecretString>>,
}

impl RemoteBrowserProvider {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            client: Client::builder()
                .timeout(Duration::from_secs(60))
                .build()
                .expect("Failed to create HTTP client"),
            endpoint: endpoint.into(),
            api_key: None,
        }
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(Arc::new(SecretString::from(api_key.into())));
        self
    }
}

#[async_trait]
impl BrowserProvider for RemoteBrowserProvider {
    async fn open(&self, cancel: &CancellationToken) -> ToolResult<Box<dyn BrowserSession>> {
        let mut builder = self.client.post(format!("{}/sessions", self.endpoint));
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key.expose_secret());
        }

        let response = tokio::select! {
            _ = cancel.cancelled() => return Err(ToolError::Cancelled),
            result = builder.send() => result.map_err(|e| ToolError::Browser {
                reason: format!("session open failed: {e}"),
            })?,
        };
        if !response.status().is_success() {
            return Err(ToolError::Browser {
                reason: format!("session open returned HTTP {}", response.status().as_u16()),
            });
        }

        let session: SessionResponse = response.json().await.map_err(|e| ToolError::Browser {
            reason: format!("unparseable session response: {e}"),
        })?;

        debug!(session_id = %session.id, "Browser session opened");
        Ok(Box::new(RemoteBrowserSession {
            client: self.client.clone(),
            endpoint: self.endpoint.clone(),
            api_key: self.api_key.clone(),
            id: session.id,
            cancel: cancel.clone(),
        }))
    }
}

struct RemoteBrowserSession {
    client: Client,
    endpoint: String,
    api_key: Option<Arc<SecretString>>,
    id: String,
    cancel: CancellationToken,
}

impl RemoteBrowserSession {
    async fn action(&self, action: &str, params: Value) -> ToolResult<Value> {
        let mut body = params;
        body["action"] = json!(action);

        let mut builder = self
            .client
            .post(format!("{}/sessions/{}/actions", self.endpoint, self.id))
            .json(&body);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key.expose_secret());
        }

        let response = tokio::select! {
            _ = self.cancel.cancelled() => return Err(ToolError::Cancelled),
            result = builder.send() => result.map_err(|e| ToolError::Browser {
                reason: format!("{action} failed: {e}"),
            })?,
        };
        if !response.status().is_success() {
            return Err(ToolError::Browser {
                reason: format!("{action} returned HTTP {}", response.status().as_u16()),
            });
        }

        let parsed: ActionResponse = response.json().await.map_err(|e| ToolError::Browser {
            reason: format!("unparseable {action} response: {e}"),
        })?;
        if !parsed.success {
            return Err(ToolError::Browser {
                reason: parsed.error.unwrap_or_else(|| format!("{action} failed")),
            });
        }
        Ok(parsed.data.unwrap_or(Value::Null))
    }
}

#[async_trait]
impl BrowserSession for RemoteBrowserSession {
    async fn navigate(&mut self, url: &str) -> ToolResult<()> {
        self.action("navigate", json!({ "url": url })).await?;
        Ok(())
    }

    async fn click(&mut self, selector: &str) -> ToolResult<()> {
        self.action("click", json!({ "selector": selector })).await?;
        Ok(())
    }

    async fn type_text(&mut self, selector: &str, text: &str) -> ToolResult<()> {
        self.action("type", json!({ "selector": selector, "text": text }))
            .await?;
        Ok(())
    }

    async fn scroll(&mut self, dx: i64, dy: i64) -> ToolResult<()> {
        self.action("scroll", json!({ "dx": dx, "dy": dy })).await?;
        Ok(())
    }

    async fn wait_for(&mut self, selector: &str, timeout: Duration) -> ToolResult<bool> {
        let data = self
            .action(
                "wait_for",
                json!({ "selector": selector, "timeoutMs": timeout.as_millis() as u64 }),
            )
            .await?;
        Ok(data.get("found").and_then(Value::as_bool).unwrap_or(false))
    }

    async fn screenshot(&mut self) -> ToolResult<Vec<u8>> {
        use base64::engine::general_purpose::STANDARD;
        use base64::Engine;

        let data = self.action("screenshot", json!({})).await?;
        let encoded = data
            .get("image")
            .and_then(Value::as_str)
            .ok_or_else(|| ToolError::Browser {
                reason: "screenshot response carried no image".into(),
            })?;
        STANDARD.decode(encoded).map_err(|e| ToolError::Browser {
            reason: format!("screenshot image was not valid base64: {e}"),
        })
    }

    async fn eval(&mut self, script: &str) -> ToolResult<Value> {
        self.action("eval", json!({ "script": script })).await
    }

    async fn dom(&mut self) -> ToolResult<String> {
        let data = self.action("dom", json!({})).await?;
        data.get("html")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| ToolError::Browser {
                reason: "dom response carried no html".into(),
            })
    }

    async fn close(&mut self) -> ToolResult<()> {
        let mut builder = self
            .client
            .delete(format!("{}/sessions/{}", self.endpoint, self.id));
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key.expose_secret());
        }

        // Closing races with cancellation; the service reaps abandoned
        // sessions, so a failed close is logged and swallowed here.
        match builder.send().await {
            Ok(response) if response.status().is_success() => Ok(()),
            Ok(response) => {
                warn!(
                    session_id = %self.id,
                    status = response.status().as_u16(),
                    "Browser session close returned an error status"
                );
                Ok(())
            }
            Err(e) => {
                warn!(session_id = %self.id, error = %e, "Browser session close failed");
                Ok(())
            }
        }
    }
}
