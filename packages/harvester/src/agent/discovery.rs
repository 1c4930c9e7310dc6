//! Discovery agent: explores a homepage and emits a skill document.
//!
//! A bounded loop in which the planner explores the site with the
//! shared tool set and terminates by invoking `finish` with a tier
//! classification and free-form extraction instructions. Budget
//! exhaustion without a finish call is a terminal failure for the
//! attempt; there is no implicit retry. A freshly generated document
//! must pass [`validate_skill`] before it may be installed.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::agent::planner::{Planner, PlannerAction, ToolSpec, Transcript};
use crate::agent::tools::{shared_tool_specs, ToolContext};
use crate::error::AgentError;
use crate::fetch::readability::{extract_links, extract_readable, select_content};
use crate::fetch::FetchOptions;
use crate::types::{FetchMode, SkillDocument};

const DISCOVERY_SYSTEM_PROMPT: &str = "\
You are configuring an article extractor for a news-like website. \
Explore the homepage with the tools provided and work out how to find \
article links and article content. Prefer a static fetch; use the \
rendered mode or browser tools only if the static page is missing the \
content. When you understand the site, call `finish` with:
- tier: \"static\" if plain fetches suffice, \"rendered\" if the site \
needs script execution,
- link_selector: a CSS selector matching article links on the homepage \
(or url_pattern: a regex matching article URLs),
- content_selector: a CSS selector for the main content of an article \
page, when one exists,
- instructions: precise steps a later agent will follow to harvest \
articles, including where the links live, how to read titles, dates, \
and body text, and anything unusual about the site.
Verify your selectors with query_selector before finishing.";

/// Payload shape of the discovery agent's terminal action.
#[derive(Debug, Deserialize)]
struct FinishPayload {
    tier: FetchMode,
    instructions: String,
    #[serde(default)]
    link_selector: Option<String>,
    #[serde(default)]
    url_pattern: Option<String>,
    #[serde(default)]
    content_selector: Option<String>,
}

fn discovery_tool_specs() -> Vec<ToolSpec> {
    let mut specs = shared_tool_specs();
    specs.push(
        ToolSpec::new(
            "finish",
            "Emit the extraction configuration for this site",
            json!({
                "type": "object",
                "properties": {
                    "tier": { "type": "string", "enum": ["static", "rendered"] },
                    "instructions": { "type": "string" },
                    "link_selector": { "type": "string" },
                    "url_pattern": { "type": "string" },
                    "content_selector": { "type": "string" }
                },
                "required": ["tier", "instructions"]
            }),
        )
        .terminal(),
    );
    specs
}

/// Run the discovery loop for a source's homepage.
///
/// Returns the generated (not yet validated, not yet installed) skill
/// document. The caller owns browser cleanup via [`ToolContext::close`].
pub async fn run_discovery(
    planner: &dyn Planner,
    ctx: &mut ToolContext,
    source_id: Uuid,
    name: &str,
    homepage: &str,
    version: u32,
    max_steps: usize,
) -> Result<SkillDocument, AgentError> {
    let task = format!("Site: {name}\nHomepage: {homepage}");
    let mut transcript = Transcript::new(DISCOVERY_SYSTEM_PROMPT, task, discovery_tool_specs());

    info!(%source_id, homepage, max_steps, "Discovery agent starting");

    for step in 0..max_steps {
        if ctx.cancel.is_cancelled() {
            return Err(AgentError::Cancelled);
        }

        let action = planner.plan(&transcript).await?;
        match action {
            PlannerAction::Finish { payload } => {
                info!(%source_id, steps = step + 1, "Discovery agent finished");
                return build_document(source_id, name, homepage, version, payload);
            }
            PlannerAction::Tool { name: tool, args } if tool == "finish" => {
                info!(%source_id, steps = step + 1, "Discovery agent finished");
                return build_document(source_id, name, homepage, version, args);
            }
            PlannerAction::Tool { name: tool, args } => {
                let observation = match ctx.run_tool(&tool, &args).await {
                    Ok(observation) => observation,
                    Err(e) if e.is_cancelled() => return Err(AgentError::Cancelled),
                    Err(e) => return Err(e.into()),
                };
                debug!(%source_id, step, tool = %tool, "Discovery step executed");
                transcript.record(tool, args, observation);
            }
        }
    }

    warn!(%source_id, max_steps, "Discovery agent exhausted its step budget");
    Err(AgentError::BudgetExhausted { steps: max_steps })
}

fn build_document(
    source_id: Uuid,
    name: &str,
    homepage: &str,
    version: u32,
    payload: Value,
) -> Result<SkillDocument, AgentError> {
    let finish: FinishPayload =
        serde_json::from_value(payload).map_err(|e| AgentError::BadFinish {
            reason: e.to_string(),
        })?;

    if finish.instructions.trim().is_empty() {
        return Err(AgentError::BadFinish {
            reason: "empty instruction body".into(),
        });
    }

    Ok(SkillDocument {
        source_id,
        name: name.to_string(),
        homepage: homepage.to_string(),
        tier: finish.tier,
        version,
        generated_at: Utc::now(),
        link_selector: finish.link_selector.filter(|s| !s.trim().is_empty()),
        url_pattern: finish.url_pattern.filter(|s| !s.trim().is_empty()),
        content_selector: finish.content_selector.filter(|s| !s.trim().is_empty()),
        instructions: finish.instructions.trim().to_string(),
    })
}

/// Outcome of validating a freshly generated skill document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationReport {
    /// The rendered document reparses.
    pub reparse_ok: bool,
    /// Candidate article links found on the re-fetched homepage.
    pub candidate_links: usize,
    /// The candidate article that was fetched for the content check.
    pub candidate_url: Option<String>,
    /// Content extraction on the candidate succeeded.
    pub content_ok: bool,
    /// Human-readable reason for the first failed check, if any.
    pub failure: Option<String>,
}

impl ValidationReport {
    pub fn passed(&self) -> bool {
        self.failure.is_none()
    }

    fn failed(self, reason: impl Into<String>) -> Self {
        Self {
            failure: Some(reason.into()),
            ..self
        }
    }
}

/// Validate a generated skill against the live site.
///
/// Checks, in order: the rendered document reparses; the declared link
/// selector or URL pattern yields at least one candidate link with an
/// href and non-empty text on a re-fetched homepage; content extraction
/// succeeds on one candidate article. The first failure is reported
/// with a specific reason and the skill must not be installed.
pub async fn validate_skill(ctx: &mut ToolContext, doc: &SkillDocument) -> ValidationReport {
    let report = ValidationReport {
        reparse_ok: false,
        candidate_links: 0,
        candidate_url: None,
        content_ok: false,
        failure: None,
    };

    // 1. Syntactic round-trip.
    if let Err(e) = SkillDocument::parse(&doc.render()) {
        return report.failed(format!("generated document does not reparse: {e}"));
    }
    let mut report = ValidationReport {
        reparse_ok: true,
        ..report
    };

    if doc.link_selector.is_none() && doc.url_pattern.is_none() {
        return report.failed("skill declares neither a link selector nor a URL pattern");
    }

    // 2. The homepage must yield at least one candidate link.
    let options = FetchOptions::for_mode(doc.tier);
    let homepage = match ctx.fetch(&doc.homepage, &options).await {
        Ok(page) => page,
        Err(e) => return report.failed(format!("homepage re-fetch failed: {e}")),
    };

    let candidates = candidate_links(ctx, doc, &homepage.body, &homepage.final_url);
    report.candidate_links = candidates.len();
    let Some(candidate) = candidates.first().cloned() else {
        let hint = doc
            .link_selector
            .as_deref()
            .map(|s| format!("link selector '{s}'"))
            .or_else(|| {
                doc.url_pattern
                    .as_deref()
                    .map(|p| format!("URL pattern '{p}'"))
            })
            .unwrap_or_default();
        return report.failed(format!(
            "{hint} matched no link with an href and non-empty text on the homepage"
        ));
    };
    report.candidate_url = Some(candidate.clone());

    // 3. One candidate article must yield content.
    let article = match ctx.fetch(&candidate, &options).await {
        Ok(page) => page,
        Err(e) => return report.failed(format!("candidate article fetch failed: {e}")),
    };

    let content = doc
        .content_selector
        .as_deref()
        .and_then(|selector| select_content(&article.body, selector).ok().flatten())
        .filter(|text| !text.trim().is_empty())
        .or_else(|| extract_readable(&article).map(|r| r.text));

    match content {
        Some(text) if !text.trim().is_empty() => {
            report.content_ok = true;
            report
        }
        _ => report.failed(format!(
            "content extraction produced no text for {candidate}"
        )),
    }
}

/// Candidate article URLs per the skill's selector or pattern.
fn candidate_links(
    ctx: &ToolContext,
    doc: &SkillDocument,
    html: &str,
    final_url: &str,
) -> Vec<String> {
    use scraper::{Html, Selector};

    let base = url::Url::parse(final_url).unwrap_or_else(|_| ctx.base_url.clone());

    if let Some(selector) = doc.link_selector.as_deref() {
        let Ok(sel) = Selector::parse(selector) else {
            return Vec::new();
        };
        let link_sel = Selector::parse("a[href]").ok();
        let document = Html::parse_document(html);

        return document
            .select(&sel)
            .filter_map(|el| {
                let text = el.text().collect::<String>().trim().to_string();
                if text.is_empty() {
                    return None;
                }
                let href = el.value().attr("href").map(str::to_string).or_else(|| {
                    link_sel.as_ref().and_then(|ls| {
                        el.select(ls)
                            .next()
                            .and_then(|a| a.value().attr("href"))
                            .map(str::to_string)
                    })
                })?;
                base.join(&href).ok().map(|u| u.to_string())
            })
            .collect();
    }

    if let Some(pattern) = doc.url_pattern.as_deref() {
        let Ok(re) = regex::Regex::new(pattern) else {
            return Vec::new();
        };
        return extract_links(&base, html)
            .into_iter()
            .filter(|link| !link.text.is_empty() && re.is_match(&link.url))
            .map(|link| link.url)
            .collect();
    }

    Vec::new()
}
