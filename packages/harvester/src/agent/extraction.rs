//! Extraction agent: follows an installed skill and harvests articles.
//!
//! The skill body is supplied verbatim as part of the prompt. The
//! model commits work incrementally through `report_articles` — the
//! prompt and the harness both state the every-2-3-items cadence rule,
//! because the step budget may cut the loop at any point and unreported
//! work is lost. Budget exhaustion is therefore a partial success, not
//! an error; everything already reported is retained.

use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::agent::planner::{Planner, PlannerAction, ToolSpec, Transcript};
use crate::agent::tools::{shared_tool_specs, ToolContext};
use crate::error::AgentError;
use crate::fetch::dates::parse_date;
use crate::store::ArticleStore;
use crate::types::{Article, ExtractionOutcome, NewArticle, SkillDocument, Source};

const EXTRACTION_SYSTEM_PROMPT: &str = "\
You are harvesting articles from a website by following the extraction \
instructions below. Fetch pages with the tools provided, locate article \
links, and for each article collect its URL, title, full body text, and \
when available an excerpt, author, and published date. Report what you \
have collected with `report_articles` after every 2-3 articles — the run \
can be cut off at any step and unreported articles are lost. Call \
`finish` once the listed articles are exhausted.";

/// Result of one extraction agent run.
#[derive(Debug)]
pub struct ExtractionRun {
    pub outcome: ExtractionOutcome,
    /// Steps consumed by the loop.
    pub steps: usize,
    /// The loop was cut by the step budget rather than `finish`.
    pub budget_exhausted: bool,
}

/// One article as reported by the model.
#[derive(Debug, Deserialize)]
struct ReportedArticle {
    url: String,
    title: String,
    content: String,
    #[serde(default)]
    excerpt: Option<String>,
    #[serde(default)]
    author: Option<String>,
    #[serde(default)]
    published_date: Option<String>,
}

fn extraction_tool_specs() -> Vec<ToolSpec> {
    let mut specs = shared_tool_specs();
    specs.push(ToolSpec::new(
        "report_articles",
        "Commit a batch of extracted articles; call every 2-3 articles",
        json!({
            "type": "object",
            "properties": {
                "articles": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "properties": {
                            "url": { "type": "string" },
                            "title": { "type": "string" },
                            "content": { "type": "string" },
                            "excerpt": { "type": "string" },
                            "author": { "type": "string" },
                            "published_date": { "type": "string" }
                        },
                        "required": ["url", "title", "content"]
                    }
                }
            },
            "required": ["articles"]
        }),
    ));
    specs.push(
        ToolSpec::new(
            "finish",
            "End the run once every listed article has been reported",
            json!({
                "type": "object",
                "properties": {
                    "summary": { "type": "string" }
                }
            }),
        )
        .terminal(),
    );
    specs
}

/// Run the skill-guided extraction loop for a source.
///
/// `on_inserted` is invoked once per newly inserted article id; the
/// engine uses it for the fire-and-forget downstream handoff. The
/// caller owns browser cleanup via [`ToolContext::close`].
pub async fn run_extraction<S>(
    planner: &dyn Planner,
    ctx: &mut ToolContext,
    store: &S,
    source: &Source,
    skill: &SkillDocument,
    max_steps: usize,
    on_inserted: &(dyn Fn(Uuid) + Send + Sync),
) -> Result<ExtractionRun, AgentError>
where
    S: ArticleStore + ?Sized,
{
    let task = format!(
        "Site: {name}\nHomepage: {homepage}\n\nExtraction instructions (version {version}):\n\n{instructions}",
        name = skill.name,
        homepage = skill.homepage,
        version = skill.version,
        instructions = skill.instructions,
    );
    let mut transcript = Transcript::new(EXTRACTION_SYSTEM_PROMPT, task, extraction_tool_specs());

    let mut outcome = ExtractionOutcome {
        articles: Vec::new(),
        inserted: 0,
        skipped: 0,
    };

    info!(
        source_id = %source.id,
        skill_version = skill.version,
        max_steps,
        "Extraction agent starting"
    );

    for step in 0..max_steps {
        if ctx.cancel.is_cancelled() {
            return Err(AgentError::Cancelled);
        }

        let action = planner.plan(&transcript).await?;
        let action = match action {
            PlannerAction::Tool { name, args } if name == "finish" => {
                PlannerAction::Finish { payload: args }
            }
            other => other,
        };
        match action {
            PlannerAction::Finish { .. } => {
                info!(
                    source_id = %source.id,
                    steps = step + 1,
                    inserted = outcome.inserted,
                    skipped = outcome.skipped,
                    "Extraction agent finished"
                );
                return Ok(ExtractionRun {
                    outcome,
                    steps: step + 1,
                    budget_exhausted: false,
                });
            }
            PlannerAction::Tool { name, args } if name == "report_articles" => {
                let observation =
                    commit_batch(store, source, &args, &mut outcome, on_inserted).await?;
                transcript.record(name, args, observation);
            }
            PlannerAction::Tool { name, args } => {
                let observation = match ctx.run_tool(&name, &args).await {
                    Ok(observation) => observation,
                    Err(e) if e.is_cancelled() => return Err(AgentError::Cancelled),
                    Err(e) => return Err(e.into()),
                };
                debug!(source_id = %source.id, step, tool = %name, "Extraction step executed");
                transcript.record(name, args, observation);
            }
        }
    }

    // Budget cut the loop: whatever was reported is already committed.
    info!(
        source_id = %source.id,
        max_steps,
        inserted = outcome.inserted,
        skipped = outcome.skipped,
        "Extraction agent hit its step budget; keeping partial results"
    );
    Ok(ExtractionRun {
        outcome,
        steps: max_steps,
        budget_exhausted: true,
    })
}

/// Dedup and insert one reported batch, observation back to the model.
async fn commit_batch<S>(
    store: &S,
    source: &Source,
    args: &Value,
    outcome: &mut ExtractionOutcome,
    on_inserted: &(dyn Fn(Uuid) + Send + Sync),
) -> Result<Value, AgentError>
where
    S: ArticleStore + ?Sized,
{
    // A malformed batch goes back to the model as an error payload so
    // it can correct itself; only storage failures abort the loop.
    let reported: Vec<ReportedArticle> = match args
        .get("articles")
        .cloned()
        .map(serde_json::from_value)
        .transpose()
    {
        Ok(reported) => reported.unwrap_or_default(),
        Err(e) => {
            warn!(error = %e, "Unparseable report_articles payload");
            return Ok(json!({ "error": format!("report_articles payload: {e}") }));
        }
    };

    let mut inserted = 0usize;
    let mut skipped = 0usize;
    let mut invalid = 0usize;

    for item in reported {
        if item.url.trim().is_empty() || item.title.trim().is_empty() || item.content.trim().is_empty()
        {
            invalid += 1;
            continue;
        }

        let mut new = NewArticle::new(source.id, item.url.trim(), item.title.trim(), item.content);
        if let Some(excerpt) = item.excerpt.filter(|e| !e.trim().is_empty()) {
            new = new.with_excerpt(excerpt);
        }
        if let Some(author) = item.author.filter(|a| !a.trim().is_empty()) {
            new = new.with_author(author);
        }
        if let Some(published) = item.published_date.as_deref().and_then(parse_date) {
            new = new.with_published_at(published);
        }

        let article = Article::from(new.clone());
        let landed = store
            .insert_if_new(&article)
            .await
            .map_err(|e| AgentError::Store(Box::new(e)))?;

        if landed {
            inserted += 1;
            on_inserted(article.id);
        } else {
            skipped += 1;
            debug!(url = %article.url, "Duplicate article skipped");
        }
        outcome.articles.push(new);
    }

    outcome.inserted += inserted;
    outcome.skipped += skipped;

    if invalid > 0 {
        warn!(invalid, "Reported articles missing url, title, or content");
    }

    Ok(json!({
        "inserted": inserted,
        "skipped": skipped,
        "invalid": invalid,
        "total_inserted": outcome.inserted,
        "total_skipped": outcome.skipped,
    }))
}
