//! The shared agent capability set.
//!
//! A [`ToolContext`] is owned by exactly one agent run. It holds the
//! run's page cache, the source's base URL, the cancellation token, and
//! a lazily-opened browser session that is closed at run end on every
//! exit path. Every capability is independently fallible; under
//! `continue_on_error` a failure is folded into an `{"error": ...}`
//! payload for the model instead of aborting the loop.

use indexmap::IndexMap;
use scraper::{Html, Selector};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use url::Url;

use crate::agent::browser::{BrowserProvider, BrowserSession};
use crate::agent::planner::ToolSpec;
use crate::error::{FetchError, ToolError, ToolResult};
use crate::fetch::readability::{extract_readable, inspect_structure};
use crate::fetch::{dates, FetchOptions, FetchedPage, PageFetcher};
use crate::types::FetchMode;

/// Longest body preview returned to the model from a fetch.
const PREVIEW_CHARS: usize = 4000;

/// Longest single match text returned by the query tools.
const MATCH_CHARS: usize = 400;

const DEFAULT_QUERY_LIMIT: usize = 20;

/// Per-run context shared by every tool call in one agent loop.
pub struct ToolContext {
    fetcher: Arc<dyn PageFetcher>,
    browser_provider: Option<Arc<dyn BrowserProvider>>,
    browser: Option<Box<dyn BrowserSession>>,
    /// URL the browser last navigated to, for caching its DOM.
    last_browser_url: Option<String>,
    /// Fetched pages for this run only; never persisted.
    pub pages: IndexMap<String, FetchedPage>,
    pub base_url: Url,
    /// Fold tool failures into error payloads instead of aborting.
    pub continue_on_error: bool,
    pub cancel: CancellationToken,
    /// Timeout for browser wait-for-selector, shorter than fetches.
    pub wait_for_timeout: Duration,
}

impl ToolContext {
    pub fn new(fetcher: Arc<dyn PageFetcher>, base_url: Url) -> Self {
        Self {
            fetcher,
            browser_provider: None,
            browser: None,
            last_browser_url: None,
            pages: IndexMap::new(),
            base_url,
            continue_on_error: false,
            cancel: CancellationToken::new(),
            wait_for_timeout: Duration::from_secs(10),
        }
    }

    pub fn with_browser_provider(mut self, provider: Arc<dyn BrowserProvider>) -> Self {
        self.browser_provider = Some(provider);
        self
    }

    pub fn with_continue_on_error(mut self, continue_on_error: bool) -> Self {
        self.continue_on_error = continue_on_error;
        self
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_wait_for_timeout(mut self, timeout: Duration) -> Self {
        self.wait_for_timeout = timeout;
        self
    }

    /// Execute a tool, folding failures per `continue_on_error`.
    ///
    /// Cancellation always aborts, error folding notwithstanding.
    pub async fn run_tool(&mut self, name: &str, args: &Value) -> ToolResult<Value> {
        match self.execute(name, args).await {
            Ok(observation) => Ok(observation),
            Err(e) if e.is_cancelled() => Err(e),
            Err(e) if self.continue_on_error => {
                warn!(tool = name, error = %e, "Tool failed; error payload returned to the model");
                Ok(json!({ "error": e.to_string() }))
            }
            Err(e) => Err(e),
        }
    }

    /// Execute a tool by name.
    pub async fn execute(&mut self, name: &str, args: &Value) -> ToolResult<Value> {
        if self.cancel.is_cancelled() {
            return Err(ToolError::Cancelled);
        }
        debug!(tool = name, "Executing tool");

        match name {
            "fetch_page" => self.tool_fetch_page(args).await,
            "inspect_structure" => self.tool_inspect_structure(args),
            "query_selector" => self.tool_query_selector(args),
            "query_xpath" => self.tool_query_xpath(args),
            "query_regex" => self.tool_query_regex(args),
            "extract_readable" => self.tool_extract_readable(args),
            "parse_date" => self.tool_parse_date(args),
            name if name.starts_with("browser_") => self.tool_browser(name, args).await,
            _ => Err(ToolError::UnknownTool { name: name.into() }),
        }
    }

    /// Fetch a page and add it to the run's cache.
    pub async fn fetch(&mut self, url: &str, options: &FetchOptions) -> ToolResult<FetchedPage> {
        let resolved = self.resolve(url)?;
        let page = self.fetcher.fetch(&resolved, options, &self.cancel).await?;
        self.pages.insert(resolved, page.clone());
        Ok(page)
    }

    /// Look up an already-fetched page; the empty string means the base URL.
    pub fn cached(&self, url: &str) -> ToolResult<&FetchedPage> {
        let resolved = self.resolve(url)?;
        self.pages
            .get(&resolved)
            .ok_or(ToolError::PageNotCached { url: resolved })
    }

    /// Close the run's browser session if one was opened.
    ///
    /// Must be called on every exit path; failures are logged, never
    /// propagated, so cleanup cannot mask the run's real outcome.
    pub async fn close(&mut self) {
        if let Some(mut session) = self.browser.take() {
            if let Err(e) = session.close().await {
                warn!(error = %e, "Browser session close failed");
            } else {
                debug!("Browser session closed");
            }
        }
    }

    fn resolve(&self, url: &str) -> ToolResult<String> {
        let trimmed = url.trim();
        if trimmed.is_empty() {
            return Ok(self.base_url.to_string());
        }
        self.base_url
            .join(trimmed)
            .map(|u| u.to_string())
            .map_err(|_| {
                ToolError::Fetch(FetchError::InvalidUrl {
                    url: trimmed.to_string(),
                })
            })
    }

    fn cached_html(&self, tool: &str, args: &Value) -> ToolResult<&FetchedPage> {
        let page = self.cached(opt_str(args, "url").unwrap_or_default())?;
        if page.is_markdown {
            return Err(ToolError::BadArgs {
                tool: tool.to_string(),
                reason: format!("page {} is markdown, not HTML", page.url),
            });
        }
        Ok(page)
    }

    // --- capabilities ---

    async fn tool_fetch_page(&mut self, args: &Value) -> ToolResult<Value> {
        let url = opt_str(args, "url").unwrap_or_default().to_string();
        let mode = match opt_str(args, "mode") {
            None | Some("static") => FetchMode::Static,
            Some("rendered") => FetchMode::Rendered,
            Some(other) => {
                return Err(ToolError::BadArgs {
                    tool: "fetch_page".into(),
                    reason: format!("unknown mode '{other}' (static or rendered)"),
                })
            }
        };
        let mut options = FetchOptions::for_mode(mode);
        if args
            .get("prefer_markdown")
            .and_then(Value::as_bool)
            .unwrap_or(false)
        {
            options = options.with_markdown_preferred();
        }

        let page = self.fetch(&url, &options).await?;
        let title = page.title();
        let chars = page.content_length();
        let preview = clip(&page.body, PREVIEW_CHARS);
        Ok(json!({
            "url": page.url,
            "final_url": page.final_url,
            "status": page.status,
            "is_markdown": page.is_markdown,
            "content_hash": page.content_hash,
            "chars": chars,
            "title": title,
            "preview": preview,
        }))
    }

    fn tool_inspect_structure(&self, args: &Value) -> ToolResult<Value> {
        let page = self.cached_html("inspect_structure", args)?;
        let report = inspect_structure(&page.body);
        serde_json::to_value(&report).map_err(|e| ToolError::BadArgs {
            tool: "inspect_structure".into(),
            reason: e.to_string(),
        })
    }

    fn tool_query_selector(&self, args: &Value) -> ToolResult<Value> {
        let selector = arg_str("query_selector", args, "selector")?;
        self.select_matches("query_selector", args, selector)
    }

    fn tool_query_xpath(&self, args: &Value) -> ToolResult<Value> {
        let expr = arg_str("query_xpath", args, "expr")?;
        let selector = xpath_to_css(expr)?;
        let mut result = self.select_matches("query_xpath", args, &selector)?;
        result["css_equivalent"] = json!(selector);
        Ok(result)
    }

    fn select_matches(&self, tool: &str, args: &Value, selector: &str) -> ToolResult<Value> {
        let page = self.cached_html(tool, args)?;
        let limit = opt_usize(args, "limit").unwrap_or(DEFAULT_QUERY_LIMIT);

        let sel = Selector::parse(selector).map_err(|_| ToolError::Selector {
            selector: selector.to_string(),
        })?;
        let link_sel = Selector::parse("a[href]").ok();
        let page_base = Url::parse(&page.final_url).unwrap_or_else(|_| self.base_url.clone());

        let doc = Html::parse_document(&page.body);
        let count = doc.select(&sel).count();
        let matches: Vec<Value> = doc
            .select(&sel)
            .take(limit)
            .map(|el| {
                let text = el.text().collect::<String>().trim().to_string();
                let href = el
                    .value()
                    .attr("href")
                    .map(str::to_string)
                    .or_else(|| {
                        link_sel.as_ref().and_then(|ls| {
                            el.select(ls)
                                .next()
                                .and_then(|a| a.value().attr("href"))
                                .map(str::to_string)
                        })
                    })
                    .and_then(|href| page_base.join(&href).ok())
                    .map(|u| u.to_string());
                json!({
                    "tag": el.value().name(),
                    "text": clip(&text, MATCH_CHARS),
                    "href": href,
                })
            })
            .collect();

        Ok(json!({ "count": count, "matches": matches }))
    }

    fn tool_query_regex(&self, args: &Value) -> ToolResult<Value> {
        let pattern = arg_str("query_regex", args, "pattern")?;
        let page = self.cached(opt_str(args, "url").unwrap_or_default())?;
        let limit = opt_usize(args, "limit").unwrap_or(DEFAULT_QUERY_LIMIT);

        let haystack = match opt_str(args, "target") {
            None | Some("html") => page.body.clone(),
            Some("text") => extract_readable(page)
                .map(|r| r.text)
                .unwrap_or_else(|| page.body.clone()),
            Some(other) => {
                return Err(ToolError::BadArgs {
                    tool: "query_regex".into(),
                    reason: format!("unknown target '{other}' (html or text)"),
                })
            }
        };

        let re = regex::Regex::new(pattern).map_err(|e| ToolError::Regex {
            reason: e.to_string(),
        })?;
        let matches: Vec<Value> = re
            .captures_iter(&haystack)
            .take(limit)
            .map(|cap| {
                let groups: Vec<String> = cap
                    .iter()
                    .skip(1)
                    .map(|g| clip(g.map(|m| m.as_str()).unwrap_or_default(), MATCH_CHARS))
                    .collect();
                json!({
                    "match": clip(&cap[0], MATCH_CHARS),
                    "groups": groups,
                })
            })
            .collect();

        Ok(json!({ "count": matches.len(), "matches": matches }))
    }

    fn tool_extract_readable(&self, args: &Value) -> ToolResult<Value> {
        let page = self.cached(opt_str(args, "url").unwrap_or_default())?;
        let readable = extract_readable(page).ok_or_else(|| ToolError::NoContent {
            url: page.url.clone(),
        })?;
        Ok(json!({
            "title": readable.title,
            "text": clip(&readable.text, PREVIEW_CHARS * 2),
        }))
    }

    fn tool_parse_date(&self, args: &Value) -> ToolResult<Value> {
        let text = arg_str("parse_date", args, "text")?;
        let parsed = dates::parse_date(text).ok_or_else(|| ToolError::DateParse {
            text: text.to_string(),
        })?;
        Ok(json!({ "timestamp": parsed.to_rfc3339() }))
    }

    async fn tool_browser(&mut self, name: &str, args: &Value) -> ToolResult<Value> {
        if self.browser.is_none() {
            let provider =
                self.browser_provider
                    .clone()
                    .ok_or_else(|| ToolError::Browser {
                        reason: "no browser provider configured for this run".into(),
                    })?;
            self.browser = Some(provider.open(&self.cancel).await?);
        }
        let Some(session) = self.browser.as_mut() else {
            return Err(ToolError::Browser {
                reason: "browser session unavailable".into(),
            });
        };

        match name {
            "browser_navigate" => {
                let url = {
                    let raw = arg_str("browser_navigate", args, "url")?;
                    self.base_url
                        .join(raw.trim())
                        .map_err(|_| {
                            ToolError::Fetch(FetchError::InvalidUrl {
                                url: raw.to_string(),
                            })
                        })?
                        .to_string()
                };
                session.navigate(&url).await?;
                self.last_browser_url = Some(url.clone());
                Ok(json!({ "navigated": url }))
            }
            "browser_click" => {
                let selector = arg_str("browser_click", args, "selector")?;
                session.click(selector).await?;
                Ok(json!({ "clicked": selector }))
            }
            "browser_type" => {
                let selector = arg_str("browser_type", args, "selector")?;
                let text = arg_str("browser_type", args, "text")?;
                session.type_text(selector, text).await?;
                Ok(json!({ "typed": text.len() }))
            }
            "browser_scroll" => {
                let dx = args.get("dx").and_then(Value::as_i64).unwrap_or(0);
                let dy = args.get("dy").and_then(Value::as_i64).unwrap_or(0);
                session.scroll(dx, dy).await?;
                Ok(json!({ "scrolled": [dx, dy] }))
            }
            "browser_wait_for" => {
                let selector = arg_str("browser_wait_for", args, "selector")?;
                let found = session.wait_for(selector, self.wait_for_timeout).await?;
                Ok(json!({ "found": found }))
            }
            "browser_screenshot" => {
                let image = session.screenshot().await?;
                Ok(json!({ "captured": true, "bytes": image.len() }))
            }
            "browser_eval" => {
                let script = arg_str("browser_eval", args, "script")?;
                let value = session.eval(script).await?;
                Ok(json!({ "result": value }))
            }
            "browser_dom" => {
                let html = session.dom().await?;
                let url = self
                    .last_browser_url
                    .clone()
                    .unwrap_or_else(|| self.base_url.to_string());
                let page = FetchedPage::new(url.clone(), html);
                let summary = json!({
                    "url": url.clone(),
                    "chars": page.content_length(),
                    "content_hash": page.content_hash.clone(),
                    "cached": true,
                    "preview": clip(&page.body, PREVIEW_CHARS),
                });
                self.pages.insert(url, page);
                Ok(summary)
            }
            _ => Err(ToolError::UnknownTool { name: name.into() }),
        }
    }
}

/// Translate an abbreviated-syntax XPath subset onto a CSS selector.
///
/// Supported: `//tag`, `/a/b` child paths, `*`, `[@attr]`,
/// `[@attr='value']`, and positional `[n]`. Everything else (axes,
/// functions, unions) is a structured error, which under
/// `continue_on_error` steers the model toward `query_selector`.
pub fn xpath_to_css(expr: &str) -> ToolResult<String> {
    let unsupported = || ToolError::XPathUnsupported {
        expr: expr.to_string(),
    };

    let trimmed = expr.trim();
    if trimmed.is_empty()
        || !trimmed.starts_with('/')
        || trimmed.contains("::")
        || trimmed.contains('(')
        || trimmed.contains('|')
        || trimmed.contains("..")
    {
        return Err(unsupported());
    }

    let mut css = String::new();
    let mut descendant = false;
    for segment in trimmed.split('/') {
        if segment.is_empty() {
            descendant = true;
            continue;
        }
        let step = step_to_css(segment).ok_or_else(unsupported)?;
        if !css.is_empty() {
            css.push_str(if descendant { " " } else { " > " });
        }
        css.push_str(&step);
        descendant = false;
    }

    if css.is_empty() {
        return Err(unsupported());
    }
    Ok(css)
}

/// One XPath step (`name[predicate]...`) to its CSS equivalent.
fn step_to_css(segment: &str) -> Option<String> {
    let bracket = segment.find('[').unwrap_or(segment.len());
    let (name, mut rest) = segment.split_at(bracket);
    if name.is_empty() || !(name == "*" || name.chars().all(|c| c.is_alphanumeric() || c == '-')) {
        return None;
    }

    let mut css = name.to_string();
    while let Some(stripped) = rest.strip_prefix('[') {
        let end = stripped.find(']')?;
        let predicate = &stripped[..end];
        rest = &stripped[end + 1..];

        if let Some(attr) = predicate.strip_prefix('@') {
            match attr.split_once('=') {
                Some((key, value)) => {
                    let value = value
                        .trim_matches('\'')
                        .trim_matches('"');
                    css.push_str(&format!("[{key}=\"{value}\"]"));
                }
                None => css.push_str(&format!("[{attr}]")),
            }
        } else if predicate.chars().all(|c| c.is_ascii_digit()) && !predicate.is_empty() {
            css.push_str(&format!(":nth-of-type({predicate})"));
        } else {
            return None;
        }
    }

    if rest.is_empty() {
        Some(css)
    } else {
        None
    }
}

/// Truncate text for model consumption, marking the cut.
fn clip(text: &str, max: usize) -> String {
    if text.len() <= max {
        return text.to_string();
    }
    let mut end = max;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    format!(
        "{}...[truncated {} chars]",
        &text[..end],
        text.len() - end
    )
}

fn arg_str<'a>(tool: &str, args: &'a Value, key: &str) -> ToolResult<&'a str> {
    args.get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| ToolError::BadArgs {
            tool: tool.to_string(),
            reason: format!("missing required string argument '{key}'"),
        })
}

fn opt_str<'a>(args: &'a Value, key: &str) -> Option<&'a str> {
    args.get(key).and_then(Value::as_str)
}

fn opt_usize(args: &Value, key: &str) -> Option<usize> {
    args.get(key).and_then(Value::as_u64).map(|n| n as usize)
}

/// The capability catalog shared by both agents.
pub fn shared_tool_specs() -> Vec<ToolSpec> {
    let url_param = json!({
        "type": "string",
        "description": "Page URL, absolute or relative to the homepage; omit for the homepage"
    });

    vec![
        ToolSpec::new(
            "fetch_page",
            "Fetch a URL into the page cache and return a preview",
            json!({
                "type": "object",
                "properties": {
                    "url": url_param.clone(),
                    "mode": { "type": "string", "enum": ["static", "rendered"] },
                    "prefer_markdown": { "type": "boolean" }
                }
            }),
        ),
        ToolSpec::new(
            "inspect_structure",
            "Element counts and candidate content regions of a cached page",
            json!({
                "type": "object",
                "properties": { "url": url_param.clone() }
            }),
        ),
        ToolSpec::new(
            "query_selector",
            "Run a CSS selector over a cached page; returns text and hrefs",
            json!({
                "type": "object",
                "properties": {
                    "url": url_param.clone(),
                    "selector": { "type": "string" },
                    "limit": { "type": "integer" }
                },
                "required": ["selector"]
            }),
        ),
        ToolSpec::new(
            "query_xpath",
            "Run an abbreviated XPath expression over a cached page",
            json!({
                "type": "object",
                "properties": {
                    "url": url_param.clone(),
                    "expr": { "type": "string" },
                    "limit": { "type": "integer" }
                },
                "required": ["expr"]
            }),
        ),
        ToolSpec::new(
            "query_regex",
            "Run a regular expression over a cached page's HTML or extracted text",
            json!({
                "type": "object",
                "properties": {
                    "url": url_param.clone(),
                    "pattern": { "type": "string" },
                    "target": { "type": "string", "enum": ["html", "text"] },
                    "limit": { "type": "integer" }
                },
                "required": ["pattern"]
            }),
        ),
        ToolSpec::new(
            "extract_readable",
            "Extract the main readable content of a cached page",
            json!({
                "type": "object",
                "properties": { "url": url_param.clone() }
            }),
        ),
        ToolSpec::new(
            "parse_date",
            "Parse a free-text date into a normalized UTC timestamp",
            json!({
                "type": "object",
                "properties": { "text": { "type": "string" } },
                "required": ["text"]
            }),
        ),
        ToolSpec::new(
            "browser_navigate",
            "Navigate the browser session to a URL",
            json!({
                "type": "object",
                "properties": { "url": url_param.clone() },
                "required": ["url"]
            }),
        ),
        ToolSpec::new(
            "browser_click",
            "Click the first element matching a selector",
            json!({
                "type": "object",
                "properties": { "selector": { "type": "string" } },
                "required": ["selector"]
            }),
        ),
        ToolSpec::new(
            "browser_type",
            "Type text into the element matching a selector",
            json!({
                "type": "object",
                "properties": {
                    "selector": { "type": "string" },
                    "text": { "type": "string" }
                },
                "required": ["selector", "text"]
            }),
        ),
        ToolSpec::new(
            "browser_scroll",
            "Scroll the page by pixel offsets",
            json!({
                "type": "object",
                "properties": {
                    "dx": { "type": "integer" },
                    "dy": { "type": "integer" }
                }
            }),
        ),
        ToolSpec::new(
            "browser_wait_for",
            "Wait for a selector to appear in the live page",
            json!({
                "type": "object",
                "properties": { "selector": { "type": "string" } },
                "required": ["selector"]
            }),
        ),
        ToolSpec::new(
            "browser_screenshot",
            "Capture a screenshot of the current viewport",
            json!({ "type": "object", "properties": {} }),
        ),
        ToolSpec::new(
            "browser_eval",
            "Evaluate a script in the live page and return its result",
            json!({
                "type": "object",
                "properties": { "script": { "type": "string" } },
                "required": ["script"]
            }),
        ),
        ToolSpec::new(
            "browser_dom",
            "Fetch the live DOM into the page cache",
            json!({ "type": "object", "properties": {} }),
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockFetcher;

    const HOMEPAGE: &str = r#"
        <html><head><title>Gazette</title></head><body>
        <article class="teaser"><h2><a href="/story-1">First story</a></h2></article>
        <article class="teaser"><h2><a href="/story-2">Second story</a></h2></article>
        <p>Published 2025-01-06</p>
        </body></html>
    "#;

    fn context() -> ToolContext {
        let fetcher = MockFetcher::new().with_page("https://gazette.example.com/", HOMEPAGE);
        ToolContext::new(
            Arc::new(fetcher),
            Url::parse("https://gazette.example.com").unwrap(),
        )
    }

    #[tokio::test]
    async fn test_fetch_then_query_selector() {
        let mut ctx = context();

        let fetched = ctx.execute("fetch_page", &json!({})).await.unwrap();
        assert_eq!(fetched["status"], 200);
        assert_eq!(fetched["title"], "Gazette");

        let result = ctx
            .execute(
                "query_selector",
                &json!({"selector": "article.teaser h2 a"}),
            )
            .await
            .unwrap();
        assert_eq!(result["count"], 2);
        assert_eq!(
            result["matches"][0]["href"],
            "https://gazette.example.com/story-1"
        );
        assert_eq!(result["matches"][0]["text"], "First story");
    }

    #[tokio::test]
    async fn test_query_before_fetch_is_an_error() {
        let mut ctx = context();
        let err = ctx
            .execute("query_selector", &json!({"selector": "a"}))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::PageNotCached { .. }));
    }

    #[tokio::test]
    async fn test_continue_on_error_folds_failures() {
        let mut ctx = context().with_continue_on_error(true);
        let observation = ctx
            .run_tool("query_selector", &json!({"selector": "a"}))
            .await
            .unwrap();
        assert!(observation["error"]
            .as_str()
            .unwrap()
            .contains("not fetched"));
    }

    #[tokio::test]
    async fn test_cancellation_is_never_folded() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let mut ctx = context()
            .with_continue_on_error(true)
            .with_cancel(cancel);

        let err = ctx.run_tool("fetch_page", &json!({})).await.unwrap_err();
        assert!(matches!(err, ToolError::Cancelled));
    }

    #[tokio::test]
    async fn test_query_regex_over_html() {
        let mut ctx = context();
        ctx.execute("fetch_page", &json!({})).await.unwrap();

        let result = ctx
            .execute(
                "query_regex",
                &json!({"pattern": r"Published (\d{4}-\d{2}-\d{2})"}),
            )
            .await
            .unwrap();
        assert_eq!(result["count"], 1);
        assert_eq!(result["matches"][0]["groups"][0], "2025-01-06");
    }

    #[tokio::test]
    async fn test_parse_date_tool() {
        let mut ctx = context();
        let result = ctx
            .execute("parse_date", &json!({"text": "January 6, 2025"}))
            .await
            .unwrap();
        assert!(result["timestamp"].as_str().unwrap().starts_with("2025-01-06"));

        let err = ctx
            .execute("parse_date", &json!({"text": "no date here"}))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::DateParse { .. }));
    }

    #[tokio::test]
    async fn test_unknown_tool() {
        let mut ctx = context();
        let err = ctx.execute("teleport", &json!({})).await.unwrap_err();
        assert!(matches!(err, ToolError::UnknownTool { .. }));
    }

    #[tokio::test]
    async fn test_browser_without_provider() {
        let mut ctx = context();
        let err = ctx
            .execute("browser_navigate", &json!({"url": "/"}))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::Browser { .. }));
    }

    #[test]
    fn test_xpath_translation() {
        assert_eq!(xpath_to_css("//article").unwrap(), "article");
        assert_eq!(xpath_to_css("//div//a").unwrap(), "div a");
        assert_eq!(xpath_to_css("/html/body/div").unwrap(), "html > body > div");
        assert_eq!(
            xpath_to_css("//a[@class='headline']").unwrap(),
            "a[class=\"headline\"]"
        );
        assert_eq!(xpath_to_css("//ul/li[2]").unwrap(), "ul > li:nth-of-type(2)");
        assert_eq!(xpath_to_css("//*[@id='main']").unwrap(), "*[id=\"main\"]");
    }

    #[test]
    fn test_xpath_unsupported_forms() {
        for expr in [
            "",
            "article",
            "//a[contains(@href, 'x')]",
            "//a/text()",
            "//a | //b",
            "//ancestor::div",
            "//../div",
        ] {
            assert!(
                matches!(xpath_to_css(expr), Err(ToolError::XPathUnsupported { .. })),
                "expected {expr:?} to be unsupported"
            );
        }
    }

    #[test]
    fn test_clip_marks_truncation() {
        assert_eq!(clip("short", 10), "short");
        let clipped = clip(&"x".repeat(50), 10);
        assert!(clipped.starts_with("xxxxxxxxxx..."));
        assert!(clipped.contains("truncated 40 chars"));
    }
}
