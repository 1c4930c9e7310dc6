//! Testing utilities including mock implementations.
//!
//! Deterministic, call-tracked stand-ins for the planner, the fetcher,
//! the browser, and the downstream processor, so applications (and this
//! crate's own tests) can exercise the engine without network or model
//! calls.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::agent::browser::{BrowserProvider, BrowserSession};
use crate::agent::planner::{Planner, PlannerAction, Transcript};
use crate::error::{AgentError, FetchError, FetchResult, ToolError, ToolResult};
use crate::fetch::{FetchOptions, FetchedPage, PageFetcher};
use crate::pipeline::ArticleProcessor;
use crate::types::FetchMode;

/// Planner that replays a fixed sequence of actions.
///
/// Running out of scripted actions is an error; tests should script
/// exactly the steps they expect the loop to take.
pub struct ScriptedPlanner {
    actions: Mutex<VecDeque<PlannerAction>>,
    /// Transcript length at each plan call, for cadence assertions.
    calls: Mutex<Vec<usize>>,
}

impl ScriptedPlanner {
    pub fn new(actions: Vec<PlannerAction>) -> Self {
        Self {
            actions: Mutex::new(actions.into()),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Planner that immediately invokes the terminal action.
    pub fn finishing(payload: serde_json::Value) -> Self {
        Self::new(vec![PlannerAction::finish(payload)])
    }

    pub fn calls(&self) -> Vec<usize> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Planner for ScriptedPlanner {
    async fn plan(&self, transcript: &Transcript) -> Result<PlannerAction, AgentError> {
        self.calls.lock().unwrap().push(transcript.len());
        self.actions
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| AgentError::Planner("scripted planner ran out of actions".into()))
    }
}

/// Fetcher serving canned pages without network access.
#[derive(Default)]
pub struct MockFetcher {
    pages: RwLock<HashMap<String, FetchedPage>>,
    failures: RwLock<HashMap<String, String>>,
    latency: Option<Duration>,
    calls: Arc<RwLock<Vec<(String, FetchMode)>>>,
}

impl MockFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve an HTML page for a URL.
    pub fn with_page(self, url: impl Into<String>, html: impl Into<String>) -> Self {
        let url = url.into();
        let page = FetchedPage::new(url.clone(), html.into());
        self.pages.write().unwrap().insert(url, page);
        self
    }

    /// Serve an already-built page (markdown, redirects, ...).
    pub fn with_fetched(self, page: FetchedPage) -> Self {
        self.pages.write().unwrap().insert(page.url.clone(), page);
        self
    }

    /// Make a URL fail with a connection error.
    pub fn with_failure(self, url: impl Into<String>) -> Self {
        self.failures
            .write()
            .unwrap()
            .insert(url.into(), "mock connection refused".into());
        self
    }

    /// Delay every fetch, for queue and cancellation tests.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Replace a page in place (for refetch-sees-new-content tests).
    pub fn set_page(&self, url: impl Into<String>, html: impl Into<String>) {
        let url = url.into();
        let page = FetchedPage::new(url.clone(), html.into());
        self.pages.write().unwrap().insert(url, page);
    }

    pub fn calls(&self) -> Vec<(String, FetchMode)> {
        self.calls.read().unwrap().clone()
    }
}

#[async_trait]
impl PageFetcher for MockFetcher {
    async fn fetch(
        &self,
        url: &str,
        options: &FetchOptions,
        cancel: &CancellationToken,
    ) -> FetchResult<FetchedPage> {
        self.calls
            .write()
            .unwrap()
            .push((url.to_string(), options.mode));

        if let Some(latency) = self.latency {
            tokio::select! {
                _ = cancel.cancelled() => return Err(FetchError::Cancelled),
                _ = tokio::time::sleep(latency) => {}
            }
        }
        if cancel.is_cancelled() {
            return Err(FetchError::Cancelled);
        }

        if let Some(reason) = self.failures.read().unwrap().get(url) {
            return Err(FetchError::Http {
                url: url.to_string(),
                source: Box::new(std::io::Error::new(
                    std::io::ErrorKind::ConnectionRefused,
                    reason.clone(),
                )),
            });
        }

        self.pages
            .read()
            .unwrap()
            .get(url)
            .cloned()
            .map(|mut page| {
                page.fetched_at = Utc::now();
                page
            })
            .ok_or_else(|| FetchError::Status {
                url: url.to_string(),
                status: 404,
            })
    }

    fn name(&self) -> &str {
        "mock"
    }
}

/// One recorded browser command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BrowserCommand {
    Navigate(String),
    Click(String),
    Type(String, String),
    Scroll(i64, i64),
    WaitFor(String),
    Screenshot,
    Eval(String),
    Dom,
}

/// Browser provider handing out recording sessions over a fixed DOM.
#[derive(Default)]
pub struct MockBrowser {
    dom: RwLock<String>,
    commands: Arc<Mutex<Vec<BrowserCommand>>>,
    opened: Arc<AtomicUsize>,
    closed: Arc<AtomicUsize>,
}

impl MockBrowser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_dom(self, html: impl Into<String>) -> Self {
        *self.dom.write().unwrap() = html.into();
        self
    }

    pub fn commands(&self) -> Vec<BrowserCommand> {
        self.commands.lock().unwrap().clone()
    }

    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    /// Sessions closed so far; tests assert this equals `opened` to
    /// prove cleanup ran on every exit path.
    pub fn closed(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BrowserProvider for MockBrowser {
    async fn open(&self, cancel: &CancellationToken) -> ToolResult<Box<dyn BrowserSession>> {
        if cancel.is_cancelled() {
            return Err(ToolError::Cancelled);
        }
        self.opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MockBrowserSession {
            dom: self.dom.read().unwrap().clone(),
            commands: self.commands.clone(),
            closed: self.closed.clone(),
        }))
    }
}

struct MockBrowserSession {
    dom: String,
    commands: Arc<Mutex<Vec<BrowserCommand>>>,
    closed: Arc<AtomicUsize>,
}

impl MockBrowserSession {
    fn record(&self, command: BrowserCommand) {
        self.commands.lock().unwrap().push(command);
    }
}

#[async_trait]
impl BrowserSession for MockBrowserSession {
    async fn navigate(&mut self, url: &str) -> ToolResult<()> {
        self.record(BrowserCommand::Navigate(url.to_string()));
        Ok(())
    }

    async fn click(&mut self, selector: &str) -> ToolResult<()> {
        self.record(BrowserCommand::Click(selector.to_string()));
        Ok(())
    }

    async fn type_text(&mut self, selector: &str, text: &str) -> ToolResult<()> {
        self.record(BrowserCommand::Type(selector.to_string(), text.to_string()));
        Ok(())
    }

    async fn scroll(&mut self, dx: i64, dy: i64) -> ToolResult<()> {
        self.record(BrowserCommand::Scroll(dx, dy));
        Ok(())
    }

    async fn wait_for(&mut self, selector: &str, _timeout: Duration) -> ToolResult<bool> {
        self.record(BrowserCommand::WaitFor(selector.to_string()));
        Ok(true)
    }

    async fn screenshot(&mut self) -> ToolResult<Vec<u8>> {
        self.record(BrowserCommand::Screenshot);
        Ok(vec![0u8; 8])
    }

    async fn eval(&mut self, script: &str) -> ToolResult<serde_json::Value> {
        self.record(BrowserCommand::Eval(script.to_string()));
        Ok(serde_json::Value::Null)
    }

    async fn dom(&mut self) -> ToolResult<String> {
        self.record(BrowserCommand::Dom);
        Ok(self.dom.clone())
    }

    async fn close(&mut self) -> ToolResult<()> {
        self.closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Processor that records handed-off article ids.
#[derive(Default)]
pub struct RecordingProcessor {
    processed: Mutex<Vec<Uuid>>,
}

impl RecordingProcessor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn processed(&self) -> Vec<Uuid> {
        self.processed.lock().unwrap().clone()
    }
}

#[async_trait]
impl ArticleProcessor for RecordingProcessor {
    async fn process(
        &self,
        article_id: Uuid,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.processed.lock().unwrap().push(article_id);
        Ok(())
    }
}

/// Processor that drops everything on the floor.
pub struct NoopProcessor;

#[async_trait]
impl ArticleProcessor for NoopProcessor {
    async fn process(
        &self,
        _article_id: Uuid,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        Ok(())
    }
}

/// A feed fixture with the given item links.
pub fn rss_fixture(items: &[(&str, &str)]) -> String {
    let body: String = items
        .iter()
        .map(|(url, title)| {
            format!(
                "<item><title>{title}</title><link>{url}</link>\
                 <pubDate>Mon, 06 Jan 2025 10:00:00 +0000</pubDate>\
                 <description>Summary of {title}.</description></item>"
            )
        })
        .collect();
    format!(
        "<?xml version=\"1.0\"?><rss version=\"2.0\"><channel>\
         <title>Fixture</title>{body}</channel></rss>"
    )
}
