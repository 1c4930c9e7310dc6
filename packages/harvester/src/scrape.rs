//! The fallback orchestrator and the engine's invocation surface.
//!
//! [`HarvestEngine`] composes the tiers, agents, skill store, health
//! tracker, queue, and task-run registry behind the operations external
//! callers use: `scrape_source`, `enqueue_scrape`, `generate_skill`,
//! `regenerate_skill`, and `extract_articles`. Side effects — article
//! rows, health updates, skill files — commit incrementally and are
//! never rolled back by a later failure in the same run.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use url::Url;
use uuid::Uuid;

use crate::agent::browser::BrowserProvider;
use crate::agent::discovery::{run_discovery, validate_skill, ValidationReport};
use crate::agent::extraction::{run_extraction, ExtractionRun};
use crate::agent::planner::Planner;
use crate::agent::tools::ToolContext;
use crate::config::EngineConfig;
use crate::error::{FetchError, HarvestError, Result, TierAttempt, TierError};
use crate::fetch::PageFetcher;
use crate::health;
use crate::pipeline::{self, ArticleProcessor};
use crate::queue::ScrapeQueue;
use crate::runs::{RunKind, RunStatus, TaskRunRegistry};
use crate::skills::SkillStore;
use crate::store::Store;
use crate::tiers::{feed_tier, rendered_tier, static_tier, tier_order};
use crate::types::{
    Article, ExtractionOutcome, ExtractionStats, NewArticle, ScrapeResult, Source, Tier,
};

/// Outcome of a skill generation attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkillGeneration {
    pub success: bool,
    pub skill_path: Option<PathBuf>,
    pub error: Option<String>,
    pub validation: Option<ValidationReport>,
}

/// Future handed back by [`HarvestEngine::enqueue_scrape`].
pub struct ScrapeTicket {
    receiver: oneshot::Receiver<Result<ScrapeResult>>,
}

impl ScrapeTicket {
    /// Wait for the queued scrape to produce its result.
    pub async fn outcome(self) -> Result<ScrapeResult> {
        self.receiver.await.unwrap_or_else(|_| {
            Err(HarvestError::Aborted {
                reason: "scrape task dropped before completing".into(),
            })
        })
    }
}

/// The adaptive source-extraction engine.
///
/// Explicitly constructed and dependency-injected; there are no global
/// instances. Construct once at startup and share behind an [`Arc`].
pub struct HarvestEngine {
    config: EngineConfig,
    store: Arc<dyn Store>,
    fetcher: Arc<dyn PageFetcher>,
    planner: Arc<dyn Planner>,
    browser: Option<Arc<dyn BrowserProvider>>,
    processor: Option<Arc<dyn ArticleProcessor>>,
    skills: SkillStore,
    queue: ScrapeQueue,
    runs: Arc<TaskRunRegistry>,
}

impl HarvestEngine {
    pub fn new(
        config: EngineConfig,
        store: Arc<dyn Store>,
        fetcher: Arc<dyn PageFetcher>,
        planner: Arc<dyn Planner>,
    ) -> Self {
        let skills = SkillStore::new(config.skills_dir.clone());
        let queue = ScrapeQueue::new(config.queue_concurrency);
        let runs = Arc::new(TaskRunRegistry::new(config.run_capacity));
        Self {
            config,
            store,
            fetcher,
            planner,
            browser: None,
            processor: None,
            skills,
            queue,
            runs,
        }
    }

    pub fn with_browser(mut self, browser: Arc<dyn BrowserProvider>) -> Self {
        self.browser = Some(browser);
        self
    }

    pub fn with_processor(mut self, processor: Arc<dyn ArticleProcessor>) -> Self {
        self.processor = Some(processor);
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn queue(&self) -> &ScrapeQueue {
        &self.queue
    }

    pub fn runs(&self) -> Arc<TaskRunRegistry> {
        self.runs.clone()
    }

    pub fn skills(&self) -> &SkillStore {
        &self.skills
    }

    /// True if the source's newest article is older than the
    /// configured staleness threshold, or it has no articles at all.
    pub async fn is_stale(&self, id: Uuid) -> Result<bool> {
        health::is_stale(self.store.as_ref(), id, self.config.stale_threshold_days).await
    }

    /// Scrape one source through its tier order.
    ///
    /// On a tier's success the winning tier is cached on the source,
    /// health is reset, and `last_fetched_at` stamped. On exhaustion a
    /// failure is recorded and the aggregate error names every
    /// attempted tier with its cause.
    pub async fn scrape_source(&self, id: Uuid) -> Result<ScrapeResult> {
        let source = self.load_source(id).await?;
        if !source.is_active {
            return Err(HarvestError::Precondition {
                reason: format!("source {id} is inactive"),
            });
        }
        let order = tier_order(&source)?;

        let run_id = self.runs.start(
            RunKind::FetchSource,
            source.name.clone(),
            [
                ("source_id".to_string(), json!(id)),
                ("url".to_string(), json!(source.url)),
            ],
        );
        let cancel = CancellationToken::new();
        self.runs.register_cancel(run_id, cancel.clone());

        info!(source_id = %id, tiers = ?order, "Scrape starting");

        let mut attempts: Vec<TierAttempt> = Vec::new();
        for tier in order {
            match self.run_tier(tier, &source, &cancel).await {
                Ok(stats) => {
                    let mut updated = source.clone();
                    health::apply_success(&mut updated);
                    updated.strategy = Some(tier);
                    updated.last_fetched_at = Some(Utc::now());
                    self.store.put_source(&updated).await?;

                    info!(
                        source_id = %id,
                        tier = %tier,
                        inserted = stats.inserted,
                        skipped = stats.skipped,
                        "Scrape succeeded"
                    );
                    self.runs.finish(
                        run_id,
                        RunStatus::Success,
                        [
                            ("tier".to_string(), json!(tier.as_str())),
                            ("inserted".to_string(), json!(stats.inserted)),
                            ("skipped".to_string(), json!(stats.skipped)),
                        ],
                    );
                    return Ok(ScrapeResult {
                        inserted: stats.inserted,
                        skipped: stats.skipped,
                        tier,
                    });
                }
                Err(e) if e.is_cancelled() => {
                    // stop() already marked the run; cancellation is not
                    // a source failure.
                    return Err(HarvestError::Cancelled);
                }
                Err(e) => {
                    warn!(source_id = %id, tier = %tier, error = %e, "Tier failed; falling through");
                    attempts.push(TierAttempt {
                        tier,
                        error: e.to_string(),
                    });
                }
            }
        }

        let failed = health::record_failure(self.store.as_ref(), id).await?;
        self.runs.finish(
            run_id,
            RunStatus::Error,
            [
                ("attempts".to_string(), json!(attempts.len())),
                (
                    "health".to_string(),
                    json!(failed.consecutive_failures),
                ),
            ],
        );
        Err(HarvestError::AllTiersFailed {
            source_id: id,
            attempts,
        })
    }

    /// Queue a scrape behind the concurrency gate.
    pub fn enqueue_scrape(self: &Arc<Self>, id: Uuid) -> ScrapeTicket {
        let engine = self.clone();
        let (sender, receiver) = oneshot::channel();
        tokio::spawn(async move {
            let result = engine.queue.admit(engine.scrape_source(id)).await;
            let _ = sender.send(result);
        });
        ScrapeTicket { receiver }
    }

    /// Queue every active source, one ticket each.
    pub async fn enqueue_active(self: &Arc<Self>) -> Result<Vec<(Uuid, ScrapeTicket)>> {
        let sources = self.store.list_sources().await?;
        let active: Vec<Source> = sources.into_iter().filter(|s| s.is_active).collect();

        let run_id = self.runs.start(
            RunKind::FetchBatch,
            format!("{} active sources", active.len()),
            [],
        );
        let tickets = active
            .iter()
            .map(|source| (source.id, self.enqueue_scrape(source.id)))
            .collect();
        self.runs.finish(
            run_id,
            RunStatus::Success,
            [("enqueued".to_string(), json!(active.len()))],
        );

        Ok(tickets)
    }

    /// Queue every active source and wait for all of them.
    ///
    /// Outcomes are isolated: one source failing does not disturb the
    /// others' results.
    pub async fn scrape_active(self: &Arc<Self>) -> Result<Vec<(Uuid, Result<ScrapeResult>)>> {
        let tickets = self.enqueue_active().await?;
        let results = futures::future::join_all(
            tickets
                .into_iter()
                .map(|(id, ticket)| async move { (id, ticket.outcome().await) }),
        )
        .await;
        Ok(results)
    }

    /// Run the discovery agent for a site and install the skill if it
    /// validates.
    ///
    /// A document that fails validation is discarded, never installed;
    /// the caller sees the specific reason. Discovery is only ever run
    /// through this operation, never implicitly during a scrape.
    pub async fn generate_skill(
        &self,
        id: Uuid,
        homepage_url: &str,
        name: &str,
    ) -> Result<SkillGeneration> {
        let source = self.load_source(id).await?;
        let base = Url::parse(homepage_url).map_err(|_| HarvestError::Precondition {
            reason: format!("invalid homepage URL: {homepage_url}"),
        })?;

        let run_id = self.runs.start(
            RunKind::Skill,
            format!("skill: {name}"),
            [("source_id".to_string(), json!(id))],
        );
        let cancel = CancellationToken::new();
        self.runs.register_cancel(run_id, cancel.clone());

        let version = source.skill_version + 1;
        let mut ctx = self.tool_context(base, &cancel);

        let discovery = run_discovery(
            self.planner.as_ref(),
            &mut ctx,
            id,
            name,
            homepage_url,
            version,
            self.config.discovery_max_steps,
        )
        .await;

        let mut fatal: Option<HarvestError> = None;
        let generation = match discovery {
            Err(e) => SkillGeneration {
                success: false,
                skill_path: None,
                error: Some(e.to_string()),
                validation: None,
            },
            Ok(doc) => {
                let report = validate_skill(&mut ctx, &doc).await;
                if report.passed() {
                    match self.skills.install(&doc, &source, self.store.as_ref()).await {
                        Ok(path) => SkillGeneration {
                            success: true,
                            skill_path: Some(path),
                            error: None,
                            validation: Some(report),
                        },
                        Err(e) => {
                            fatal = Some(e);
                            SkillGeneration {
                                success: false,
                                skill_path: None,
                                error: None,
                                validation: Some(report),
                            }
                        }
                    }
                } else {
                    info!(
                        source_id = %id,
                        reason = report.failure.as_deref().unwrap_or_default(),
                        "Generated skill failed validation; discarding"
                    );
                    SkillGeneration {
                        success: false,
                        skill_path: None,
                        error: report.failure.clone(),
                        validation: Some(report),
                    }
                }
            }
        };

        ctx.close().await;

        if let Some(e) = fatal {
            self.runs.finish(run_id, RunStatus::Error, []);
            return Err(e);
        }
        self.runs.finish(
            run_id,
            if generation.success {
                RunStatus::Success
            } else {
                RunStatus::Error
            },
            [("version".to_string(), json!(version))],
        );
        Ok(generation)
    }

    /// Regenerate the skill for a source from its stored URL and name.
    ///
    /// The new document gets the next version and overwrites the old
    /// one on install.
    pub async fn regenerate_skill(&self, id: Uuid) -> Result<SkillGeneration> {
        let source = self.load_source(id).await?;
        let homepage = source.url.clone();
        let name = source.name.clone();
        self.generate_skill(id, &homepage, &name).await
    }

    /// Run the extraction agent for a source with an installed skill.
    ///
    /// Budget exhaustion is a partial success: everything the agent
    /// reported before the cut is retained and returned.
    pub async fn extract_articles(&self, id: Uuid) -> Result<ExtractionOutcome> {
        let source = self.load_source(id).await?;
        if !source.has_skill {
            return Err(HarvestError::Precondition {
                reason: format!(
                    "site source {id} has no installed skill; run skill discovery first"
                ),
            });
        }

        let run_id = self.runs.start(
            RunKind::FetchSource,
            format!("extract: {}", source.name),
            [("source_id".to_string(), json!(id))],
        );
        let cancel = CancellationToken::new();
        self.runs.register_cancel(run_id, cancel.clone());

        match self.skill_extraction(&source, &cancel).await {
            Ok(run) => {
                let status = if run.budget_exhausted {
                    RunStatus::Warning
                } else {
                    RunStatus::Success
                };
                self.runs.finish(
                    run_id,
                    status,
                    [
                        ("inserted".to_string(), json!(run.outcome.inserted)),
                        ("skipped".to_string(), json!(run.outcome.skipped)),
                        ("steps".to_string(), json!(run.steps)),
                    ],
                );
                Ok(run.outcome)
            }
            Err(e) if e.is_cancelled() => Err(HarvestError::Cancelled),
            Err(e) => {
                self.runs.finish(
                    run_id,
                    RunStatus::Error,
                    [("error".to_string(), json!(e.to_string()))],
                );
                Err(tier_to_harvest(id, e))
            }
        }
    }

    /// Dispatch one tier with the uniform contract.
    async fn run_tier(
        &self,
        tier: Tier,
        source: &Source,
        cancel: &CancellationToken,
    ) -> std::result::Result<ExtractionStats, TierError> {
        match tier {
            Tier::Feed => {
                let articles = feed_tier(self.fetcher.as_ref(), source, cancel).await?;
                self.commit_articles(articles).await
            }
            Tier::Static => {
                let articles = static_tier(self.fetcher.as_ref(), source, cancel).await?;
                self.commit_articles(articles).await
            }
            Tier::Rendered => {
                let articles = rendered_tier(self.fetcher.as_ref(), source, cancel).await?;
                self.commit_articles(articles).await
            }
            Tier::Skill => {
                let run = self.skill_extraction(source, cancel).await?;
                Ok(ExtractionStats {
                    inserted: run.outcome.inserted,
                    skipped: run.outcome.skipped,
                    failed: 0,
                })
            }
        }
    }

    /// Insert tier output with URL dedup and downstream handoff.
    async fn commit_articles(
        &self,
        articles: Vec<NewArticle>,
    ) -> std::result::Result<ExtractionStats, TierError> {
        let mut stats = ExtractionStats::new();
        for new in articles {
            let article = Article::from(new);
            let landed = self
                .store
                .insert_if_new(&article)
                .await
                .map_err(|e| TierError::Store(Box::new(e)))?;
            if landed {
                stats.record_inserted();
                self.handoff(article.id);
            } else {
                stats.record_skipped();
            }
        }
        Ok(stats)
    }

    /// The skill tier: load the document, run the extraction agent.
    async fn skill_extraction(
        &self,
        source: &Source,
        cancel: &CancellationToken,
    ) -> std::result::Result<ExtractionRun, TierError> {
        let skill = self.skills.load(source.id).await?;
        let base = Url::parse(&source.url).map_err(|_| {
            TierError::Fetch(FetchError::InvalidUrl {
                url: source.url.clone(),
            })
        })?;

        let mut ctx = self.tool_context(base, cancel);
        let result = run_extraction(
            self.planner.as_ref(),
            &mut ctx,
            self.store.as_ref(),
            source,
            &skill,
            self.config.extraction_max_steps,
            &|article_id| self.handoff(article_id),
        )
        .await;
        ctx.close().await;

        match result {
            Ok(run) => Ok(run),
            Err(crate::error::AgentError::Cancelled) => Err(TierError::Cancelled),
            Err(e) => Err(TierError::Agent(Box::new(e))),
        }
    }

    fn tool_context(&self, base: Url, cancel: &CancellationToken) -> ToolContext {
        let mut ctx = ToolContext::new(self.fetcher.clone(), base)
            .with_continue_on_error(true)
            .with_cancel(cancel.clone())
            .with_wait_for_timeout(self.config.wait_for_timeout);
        if let Some(browser) = &self.browser {
            ctx = ctx.with_browser_provider(browser.clone());
        }
        ctx
    }

    fn handoff(&self, article_id: Uuid) {
        if !self.config.analysis_enabled {
            return;
        }
        if let Some(processor) = &self.processor {
            pipeline::dispatch(processor.clone(), self.runs.clone(), article_id);
        }
    }

    async fn load_source(&self, id: Uuid) -> Result<Source> {
        self.store
            .get_source(id)
            .await?
            .ok_or(HarvestError::SourceNotFound { id })
    }
}

fn tier_to_harvest(source_id: Uuid, error: TierError) -> HarvestError {
    match error {
        TierError::Agent(e) => HarvestError::Agent(*e),
        TierError::Skill(e) => HarvestError::Skill(e),
        TierError::Cancelled => HarvestError::Cancelled,
        other => HarvestError::AllTiersFailed {
            source_id,
            attempts: vec![TierAttempt {
                tier: Tier::Skill,
                error: other.to_string(),
            }],
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use crate::testing::{MockFetcher, ScriptedPlanner};
    use crate::types::SourceKind;

    fn engine(store: Arc<MemoryStore>, fetcher: MockFetcher) -> HarvestEngine {
        HarvestEngine::new(
            EngineConfig::default().with_skills_dir(std::env::temp_dir().join("harvester-test")),
            store,
            Arc::new(fetcher),
            Arc::new(ScriptedPlanner::new(Vec::new())),
        )
    }

    #[tokio::test]
    async fn test_unknown_source() {
        let engine = engine(Arc::new(MemoryStore::new()), MockFetcher::new());
        let err = engine.scrape_source(Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, HarvestError::SourceNotFound { .. }));
    }

    #[tokio::test]
    async fn test_inactive_source_is_a_precondition_failure() {
        let store = Arc::new(MemoryStore::new());
        let mut source = Source::new("https://e.com/feed.xml", "E", SourceKind::Feed);
        source.is_active = false;
        let id = store.seed_source(source);

        let engine = engine(store, MockFetcher::new());
        let err = engine.scrape_source(id).await.unwrap_err();
        assert!(matches!(err, HarvestError::Precondition { .. }));
    }

    #[tokio::test]
    async fn test_site_without_skill_never_scrapes() {
        let store = Arc::new(MemoryStore::new());
        let id = store.seed_source(Source::new("https://e.com", "E", SourceKind::Site));

        let engine = engine(store, MockFetcher::new());
        let err = engine.scrape_source(id).await.unwrap_err();
        assert!(matches!(err, HarvestError::Precondition { .. }));
        // No run was started for a precondition failure.
        assert!(engine.runs().list(None, 10).is_empty());
    }
}
