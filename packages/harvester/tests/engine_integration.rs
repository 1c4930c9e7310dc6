//! Integration tests for the extraction engine.
//!
//! These drive the public surface end-to-end with mocked network,
//! planner, and browser:
//! 1. Tier ordering and precondition policy
//! 2. URL dedup and idempotent re-scrapes
//! 3. Health circuit breaker over repeated failures
//! 4. Queue admission bound
//! 5. Skill discovery, validation, install, and extraction
//! 6. Partial progress under a cut step budget
//! 7. Cooperative cancellation through the task-run registry

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;

use harvester::agent::{run_extraction, PlannerAction, ToolContext};
use harvester::testing::{rss_fixture, MockBrowser, MockFetcher, RecordingProcessor, ScriptedPlanner};
use harvester::{
    AgentError, Article, EngineConfig, FetchMode, HarvestEngine, HarvestError, HealthStatus,
    MemoryStore, NewArticle, RunKind, RunStatus, SkillDocument, Source, SourceKind, SourceStore,
    Tier,
};

const FEED_URL: &str = "https://gazette.example.com/feed.xml";
const HOMEPAGE_URL: &str = "https://gazette.example.com/";

const HOMEPAGE_HTML: &str = r#"
    <html><head><title>Gazette</title></head><body>
    <article class="teaser"><h2><a href="/story-1">First story</a></h2></article>
    <article class="teaser"><h2><a href="/story-2">Second story</a></h2></article>
    </body></html>
"#;

const ARTICLE_HTML: &str = r#"
    <html><head><title>First story</title></head><body>
    <article><p>A body paragraph long enough to pass the readability
    region scoring, because validation refuses empty extractions.</p>
    <p>A second paragraph keeps it comfortably readable.</p></article>
    </body></html>
"#;

struct Harness {
    engine: Arc<HarvestEngine>,
    store: Arc<MemoryStore>,
    processor: Arc<RecordingProcessor>,
    _skills_dir: tempfile::TempDir,
}

fn harness(fetcher: MockFetcher, planner: ScriptedPlanner, config: EngineConfig) -> Harness {
    let store = Arc::new(MemoryStore::new());
    let processor = Arc::new(RecordingProcessor::new());
    let skills_dir = tempfile::tempdir().unwrap();

    let engine = HarvestEngine::new(
        config.with_skills_dir(skills_dir.path()),
        store.clone(),
        Arc::new(fetcher),
        Arc::new(planner),
    )
    .with_processor(processor.clone());

    Harness {
        engine: Arc::new(engine),
        store,
        processor,
        _skills_dir: skills_dir,
    }
}

fn five_item_feed() -> String {
    rss_fixture(&[
        ("https://gazette.example.com/1", "One"),
        ("https://gazette.example.com/2", "Two"),
        ("https://gazette.example.com/3", "Three"),
        ("https://gazette.example.com/4", "Four"),
        ("https://gazette.example.com/5", "Five"),
    ])
}

fn installed_skill(source: &Source) -> SkillDocument {
    SkillDocument {
        source_id: source.id,
        name: source.name.clone(),
        homepage: source.url.clone(),
        tier: FetchMode::Static,
        version: 1,
        generated_at: chrono::Utc::now(),
        link_selector: Some("article.teaser h2 a".into()),
        url_pattern: None,
        content_selector: Some("article".into()),
        instructions: "Open the homepage and follow the teaser links.".into(),
    }
}

// --- tier ordering and feed scrapes ---

#[tokio::test]
async fn test_feed_scrape_inserts_and_skips_by_url() {
    let fetcher = MockFetcher::new().with_page(FEED_URL, five_item_feed());
    let h = harness(fetcher, ScriptedPlanner::new(Vec::new()), EngineConfig::default());

    let id = h
        .store
        .seed_source(Source::new(FEED_URL, "Gazette", SourceKind::Feed));
    // Two of the five feed URLs already have rows.
    h.store.seed_article(Article::from(NewArticle::new(
        id,
        "https://gazette.example.com/1",
        "One",
        "existing",
    )));
    h.store.seed_article(Article::from(NewArticle::new(
        id,
        "https://gazette.example.com/2",
        "Two",
        "existing",
    )));

    let result = h.engine.scrape_source(id).await.unwrap();
    assert_eq!(result.inserted, 3);
    assert_eq!(result.skipped, 2);
    assert_eq!(result.tier, Tier::Feed);

    // Winning tier cached, health reset, fetch stamped.
    let row = h.store.get_source(id).await.unwrap().unwrap();
    assert_eq!(row.strategy, Some(Tier::Feed));
    assert_eq!(row.health, HealthStatus::Healthy);
    assert_eq!(row.consecutive_failures, 0);
    assert!(row.last_fetched_at.is_some());

    // Each newly inserted article is handed downstream, none twice.
    tokio::time::sleep(Duration::from_millis(30)).await;
    assert_eq!(h.processor.processed().len(), 3);

    let listed = h.engine.runs().list(Some(RunKind::FetchSource), 1);
    assert_eq!(listed[0].status, RunStatus::Success);
}

#[tokio::test]
async fn test_rescrape_of_unchanged_feed_inserts_nothing() {
    let fetcher = MockFetcher::new().with_page(FEED_URL, five_item_feed());
    let h = harness(fetcher, ScriptedPlanner::new(Vec::new()), EngineConfig::default());
    let id = h
        .store
        .seed_source(Source::new(FEED_URL, "Gazette", SourceKind::Feed));

    let first = h.engine.scrape_source(id).await.unwrap();
    assert_eq!(first.inserted, 5);

    let second = h.engine.scrape_source(id).await.unwrap();
    assert_eq!(second.inserted, 0);
    assert_eq!(second.skipped, 5);
    assert_eq!(h.store.article_count(), 5);
}

#[tokio::test]
async fn test_site_without_skill_is_rejected_not_scraped() {
    let h = harness(
        MockFetcher::new(),
        ScriptedPlanner::new(Vec::new()),
        EngineConfig::default(),
    );
    let id = h
        .store
        .seed_source(Source::new(HOMEPAGE_URL, "Gazette", SourceKind::Site));

    let err = h.engine.scrape_source(id).await.unwrap_err();
    let HarvestError::Precondition { reason } = err else {
        panic!("expected precondition failure, got {err}");
    };
    assert!(reason.contains("skill"));
    assert_eq!(h.store.article_count(), 0);
}

// --- health circuit breaker ---

#[tokio::test]
async fn test_repeated_feed_failures_degrade_then_kill_the_source() {
    let fetcher = MockFetcher::new().with_failure(FEED_URL);
    let h = harness(fetcher, ScriptedPlanner::new(Vec::new()), EngineConfig::default());
    let id = h
        .store
        .seed_source(Source::new(FEED_URL, "Gazette", SourceKind::Feed));

    for attempt in 1..=7u32 {
        let err = h.engine.scrape_source(id).await.unwrap_err();
        // The aggregate error names the tier and its cause.
        let message = err.to_string();
        assert!(message.contains("feed:"), "message: {message}");

        let row = h.store.get_source(id).await.unwrap().unwrap();
        assert_eq!(row.consecutive_failures, attempt);
        match attempt {
            1 | 2 => assert_eq!(row.health, HealthStatus::Healthy),
            3..=6 => {
                assert_eq!(row.health, HealthStatus::Degraded);
                assert!(row.is_active);
            }
            _ => {
                assert_eq!(row.health, HealthStatus::Dead);
                assert!(!row.is_active);
            }
        }
    }

    // A dead source refuses further scrapes outright.
    let err = h.engine.scrape_source(id).await.unwrap_err();
    assert!(matches!(err, HarvestError::Precondition { .. }));
}

#[tokio::test]
async fn test_one_success_resets_the_breaker() {
    let failing = MockFetcher::new().with_failure(FEED_URL);
    let h = harness(failing, ScriptedPlanner::new(Vec::new()), EngineConfig::default());
    let id = h
        .store
        .seed_source(Source::new(FEED_URL, "Gazette", SourceKind::Feed));

    for _ in 0..5 {
        h.engine.scrape_source(id).await.unwrap_err();
    }
    let row = h.store.get_source(id).await.unwrap().unwrap();
    assert_eq!(row.health, HealthStatus::Degraded);
    assert!(row.last_error_at.is_some());

    // The remote recovers: a fresh engine over the same store, with a
    // working feed, resets the breaker in one success.
    let skills_dir = tempfile::tempdir().unwrap();
    let engine = HarvestEngine::new(
        EngineConfig::default().with_skills_dir(skills_dir.path()),
        h.store.clone(),
        Arc::new(MockFetcher::new().with_page(FEED_URL, five_item_feed())),
        Arc::new(ScriptedPlanner::new(Vec::new())),
    );
    engine.scrape_source(id).await.unwrap();

    let row = h.store.get_source(id).await.unwrap().unwrap();
    assert_eq!(row.consecutive_failures, 0);
    assert_eq!(row.health, HealthStatus::Healthy);
    assert!(row.last_error_at.is_none());
}

// --- queue bound ---

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_queue_never_exceeds_its_concurrency_limit() {
    let mut fetcher = MockFetcher::new().with_latency(Duration::from_millis(25));
    let store = Arc::new(MemoryStore::new());
    let mut ids = Vec::new();

    for n in 0..6 {
        let url = format!("https://feeds.example.com/{n}.xml");
        fetcher = fetcher.with_page(
            &url,
            rss_fixture(&[(&format!("https://feeds.example.com/{n}/story"), "Story")]),
        );
        ids.push(store.seed_source(Source::new(url, format!("Feed {n}"), SourceKind::Feed)));
    }

    let skills_dir = tempfile::tempdir().unwrap();
    let engine = Arc::new(HarvestEngine::new(
        EngineConfig::default()
            .with_queue_concurrency(2)
            .with_skills_dir(skills_dir.path()),
        store.clone(),
        Arc::new(fetcher),
        Arc::new(ScriptedPlanner::new(Vec::new())),
    ));

    // Six concurrent enqueues against limit 2; outcomes are isolated
    // and the in-flight count never exceeds the configured limit.
    let tickets: Vec<_> = ids.iter().map(|id| engine.enqueue_scrape(*id)).collect();
    for ticket in tickets {
        let result = ticket.outcome().await.unwrap();
        assert_eq!(result.inserted, 1);
    }

    assert!(engine.queue().high_water() <= 2, "high water {}", engine.queue().high_water());
    assert_eq!(engine.queue().in_flight(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_scrape_active_covers_every_active_source() {
    let fetcher = MockFetcher::new()
        .with_page(
            "https://a.example.com/feed.xml",
            rss_fixture(&[("https://a.example.com/1", "A")]),
        )
        .with_page(
            "https://b.example.com/feed.xml",
            rss_fixture(&[("https://b.example.com/1", "B")]),
        );
    let h = harness(fetcher, ScriptedPlanner::new(Vec::new()), EngineConfig::default());

    h.store.seed_source(Source::new(
        "https://a.example.com/feed.xml",
        "A",
        SourceKind::Feed,
    ));
    h.store.seed_source(Source::new(
        "https://b.example.com/feed.xml",
        "B",
        SourceKind::Feed,
    ));
    let mut inactive = Source::new("https://c.example.com/feed.xml", "C", SourceKind::Feed);
    inactive.is_active = false;
    h.store.seed_source(inactive);

    let results = h.engine.scrape_active().await.unwrap();
    assert_eq!(results.len(), 2);
    assert!(results.iter().all(|(_, outcome)| outcome.is_ok()));

    let batch_runs = h.engine.runs().list(Some(RunKind::FetchBatch), 10);
    assert_eq!(batch_runs.len(), 1);
}

// --- skill pipeline ---

#[tokio::test]
async fn test_generate_skill_discovers_validates_and_installs() {
    let fetcher = MockFetcher::new()
        .with_page(HOMEPAGE_URL, HOMEPAGE_HTML)
        .with_page("https://gazette.example.com/story-1", ARTICLE_HTML);
    let planner = ScriptedPlanner::new(vec![
        PlannerAction::tool("fetch_page", json!({})),
        PlannerAction::tool("query_selector", json!({"selector": "article.teaser h2 a"})),
        PlannerAction::finish(json!({
            "tier": "static",
            "instructions": "Follow the teaser links under each article heading.",
            "link_selector": "article.teaser h2 a",
            "content_selector": "article",
        })),
    ]);
    let h = harness(fetcher, planner, EngineConfig::default());
    let id = h
        .store
        .seed_source(Source::new(HOMEPAGE_URL, "Gazette", SourceKind::Site));

    let generation = h
        .engine
        .generate_skill(id, HOMEPAGE_URL, "Gazette")
        .await
        .unwrap();

    assert!(generation.success, "error: {:?}", generation.error);
    assert!(generation.skill_path.is_some());
    let validation = generation.validation.unwrap();
    assert!(validation.passed());
    assert_eq!(validation.candidate_links, 2);

    assert!(h.engine.skills().exists(id));
    let row = h.store.get_source(id).await.unwrap().unwrap();
    assert!(row.has_skill);
    assert_eq!(row.skill_version, 1);
    assert!(row.skill_generated_at.is_some());

    let listed = h.engine.runs().list(Some(RunKind::Skill), 1);
    assert_eq!(listed[0].status, RunStatus::Success);
}

#[tokio::test]
async fn test_generate_skill_discards_selector_matching_nothing() {
    let fetcher = MockFetcher::new().with_page(HOMEPAGE_URL, HOMEPAGE_HTML);
    let planner = ScriptedPlanner::finishing(json!({
        "tier": "static",
        "instructions": "Use the sidebar links.",
        "link_selector": "div.no-such-list a",
    }));
    let h = harness(fetcher, planner, EngineConfig::default());
    let id = h
        .store
        .seed_source(Source::new(HOMEPAGE_URL, "Gazette", SourceKind::Site));

    let generation = h
        .engine
        .generate_skill(id, HOMEPAGE_URL, "Gazette")
        .await
        .unwrap();

    assert!(!generation.success);
    assert!(generation
        .error
        .as_deref()
        .unwrap()
        .contains("div.no-such-list a"));
    assert!(!generation.validation.unwrap().passed());

    // The skill was discarded, not installed.
    assert!(!h.engine.skills().exists(id));
    let row = h.store.get_source(id).await.unwrap().unwrap();
    assert!(!row.has_skill);
    assert_eq!(row.skill_version, 0);
}

#[tokio::test]
async fn test_discovery_budget_exhaustion_reports_no_configuration() {
    let fetcher = MockFetcher::new().with_page(HOMEPAGE_URL, HOMEPAGE_HTML);
    // The planner keeps exploring and never finishes.
    let planner = ScriptedPlanner::new(vec![
        PlannerAction::tool("fetch_page", json!({})),
        PlannerAction::tool("inspect_structure", json!({})),
        PlannerAction::tool("query_selector", json!({"selector": "a"})),
    ]);
    let h = harness(
        fetcher,
        planner,
        EngineConfig::default().with_discovery_max_steps(3),
    );
    let id = h
        .store
        .seed_source(Source::new(HOMEPAGE_URL, "Gazette", SourceKind::Site));

    let generation = h
        .engine
        .generate_skill(id, HOMEPAGE_URL, "Gazette")
        .await
        .unwrap();

    assert!(!generation.success);
    assert!(generation
        .error
        .as_deref()
        .unwrap()
        .contains("did not produce a configuration"));
    assert!(!h.engine.skills().exists(id));
}

#[tokio::test]
async fn test_regenerate_skill_bumps_the_version() {
    let fetcher = MockFetcher::new()
        .with_page(HOMEPAGE_URL, HOMEPAGE_HTML)
        .with_page("https://gazette.example.com/story-1", ARTICLE_HTML);
    let finish = json!({
        "tier": "static",
        "instructions": "Follow the teaser links.",
        "link_selector": "article.teaser h2 a",
    });
    // One scripted sequence per generation.
    let planner = ScriptedPlanner::new(vec![
        PlannerAction::finish(finish.clone()),
        PlannerAction::finish(finish),
    ]);
    let h = harness(fetcher, planner, EngineConfig::default());
    let id = h
        .store
        .seed_source(Source::new(HOMEPAGE_URL, "Gazette", SourceKind::Site));

    assert!(h
        .engine
        .generate_skill(id, HOMEPAGE_URL, "Gazette")
        .await
        .unwrap()
        .success);
    assert!(h.engine.regenerate_skill(id).await.unwrap().success);

    let row = h.store.get_source(id).await.unwrap().unwrap();
    assert_eq!(row.skill_version, 2);
}

// --- extraction agent through the engine ---

#[tokio::test]
async fn test_skill_scrape_commits_reported_articles() {
    let fetcher = MockFetcher::new().with_page(HOMEPAGE_URL, HOMEPAGE_HTML);
    let planner = ScriptedPlanner::new(vec![
        PlannerAction::tool("fetch_page", json!({})),
        PlannerAction::tool(
            "report_articles",
            json!({"articles": [
                {"url": "https://gazette.example.com/story-1", "title": "First story",
                 "content": "Body one.", "published_date": "2025-01-06"},
                {"url": "https://gazette.example.com/story-2", "title": "Second story",
                 "content": "Body two."},
            ]}),
        ),
        PlannerAction::finish(json!({"summary": "front page done"})),
    ]);
    let h = harness(fetcher, planner, EngineConfig::default());

    let mut source = Source::new(HOMEPAGE_URL, "Gazette", SourceKind::Site);
    source.has_skill = true;
    source.skill_version = 1;
    let skill = installed_skill(&source);
    let id = h.store.seed_source(source.clone());
    h.engine
        .skills()
        .install(&skill, &source, h.store.as_ref())
        .await
        .unwrap();

    let result = h.engine.scrape_source(id).await.unwrap();
    assert_eq!(result.tier, Tier::Skill);
    assert_eq!(result.inserted, 2);
    assert_eq!(h.store.article_count(), 2);

    let row = h.store.get_source(id).await.unwrap().unwrap();
    assert_eq!(row.strategy, Some(Tier::Skill));
}

#[tokio::test]
async fn test_extraction_budget_cut_keeps_partial_results() {
    let batch = |a: &str, b: &str| {
        json!({"articles": [
            {"url": a, "title": a, "content": "Body."},
            {"url": b, "title": b, "content": "Body."},
        ]})
    };
    let planner = ScriptedPlanner::new(vec![
        PlannerAction::tool(
            "report_articles",
            batch("https://gazette.example.com/a", "https://gazette.example.com/b"),
        ),
        PlannerAction::tool(
            "report_articles",
            batch("https://gazette.example.com/c", "https://gazette.example.com/d"),
        ),
    ]);
    let h = harness(
        MockFetcher::new(),
        planner,
        EngineConfig::default().with_extraction_max_steps(2),
    );

    let mut source = Source::new(HOMEPAGE_URL, "Gazette", SourceKind::Site);
    source.has_skill = true;
    let skill = installed_skill(&source);
    let id = h.store.seed_source(source.clone());
    h.engine
        .skills()
        .install(&skill, &source, h.store.as_ref())
        .await
        .unwrap();

    // Two reports of two articles each, never a terminal action: the
    // budget cuts the loop and exactly four rows survive.
    let outcome = h.engine.extract_articles(id).await.unwrap();
    assert_eq!(outcome.inserted, 4);
    assert_eq!(h.store.article_count(), 4);

    // An incomplete run is a warning, not an error.
    let listed = h.engine.runs().list(Some(RunKind::FetchSource), 1);
    assert_eq!(listed[0].status, RunStatus::Warning);
}

#[tokio::test]
async fn test_broken_skill_surfaces_error_payload_without_crashing() {
    let fetcher = MockFetcher::new().with_page(HOMEPAGE_URL, HOMEPAGE_HTML);
    let planner = ScriptedPlanner::new(vec![
        PlannerAction::tool("fetch_page", json!({})),
        // Invalid selector: the failure comes back as an error payload
        // under continue_on_error and the loop carries on.
        PlannerAction::tool("query_selector", json!({"selector": "div[["})),
        PlannerAction::finish(json!({"summary": "nothing extractable"})),
    ]);
    let h = harness(fetcher, planner, EngineConfig::default());

    let mut source = Source::new(HOMEPAGE_URL, "Gazette", SourceKind::Site);
    source.has_skill = true;
    let mut skill = installed_skill(&source);
    skill.link_selector = Some("div.matches-nothing a".into());
    let id = h.store.seed_source(source.clone());
    h.engine
        .skills()
        .install(&skill, &source, h.store.as_ref())
        .await
        .unwrap();

    let outcome = h.engine.extract_articles(id).await.unwrap();
    assert_eq!(outcome.inserted, 0);
    assert!(outcome.articles.is_empty());
}

#[tokio::test]
async fn test_strict_tool_errors_abort_the_run() {
    // With continue_on_error off the same failure is fatal and typed.
    let store = MemoryStore::new();
    let source = Source::new(HOMEPAGE_URL, "Gazette", SourceKind::Site);
    store.seed_source(source.clone());
    let skill = installed_skill(&source);

    let planner = ScriptedPlanner::new(vec![PlannerAction::tool(
        "query_selector",
        json!({"selector": "a"}),
    )]);
    let mut ctx = ToolContext::new(
        Arc::new(MockFetcher::new()),
        url::Url::parse(HOMEPAGE_URL).unwrap(),
    );

    let err = run_extraction(&planner, &mut ctx, &store, &source, &skill, 5, &|_| {})
        .await
        .unwrap_err();
    assert!(matches!(err, AgentError::Tool(_)));
}

#[tokio::test]
async fn test_browser_session_closed_after_extraction() {
    let browser = Arc::new(MockBrowser::new().with_dom(HOMEPAGE_HTML));
    let fetcher = MockFetcher::new();
    let planner = ScriptedPlanner::new(vec![
        PlannerAction::tool("browser_navigate", json!({"url": "/"})),
        PlannerAction::tool("browser_dom", json!({})),
        PlannerAction::finish(json!({"summary": "done"})),
    ]);

    let store = Arc::new(MemoryStore::new());
    let skills_dir = tempfile::tempdir().unwrap();
    let engine = Arc::new(
        HarvestEngine::new(
            EngineConfig::default().with_skills_dir(skills_dir.path()),
            store.clone(),
            Arc::new(fetcher),
            Arc::new(planner),
        )
        .with_browser(browser.clone()),
    );

    let mut source = Source::new(HOMEPAGE_URL, "Gazette", SourceKind::Site);
    source.has_skill = true;
    let skill = installed_skill(&source);
    let id = store.seed_source(source.clone());
    engine
        .skills()
        .install(&skill, &source, store.as_ref())
        .await
        .unwrap();

    engine.extract_articles(id).await.unwrap();

    // Lazily opened on first browser tool use, closed at run end.
    assert_eq!(browser.opened(), 1);
    assert_eq!(browser.closed(), 1);
}

// --- cancellation ---

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_stop_interrupts_a_running_scrape() {
    let fetcher = MockFetcher::new()
        .with_latency(Duration::from_millis(300))
        .with_page(FEED_URL, five_item_feed());
    let h = harness(fetcher, ScriptedPlanner::new(Vec::new()), EngineConfig::default());
    let id = h
        .store
        .seed_source(Source::new(FEED_URL, "Gazette", SourceKind::Feed));

    let ticket = h.engine.enqueue_scrape(id);
    tokio::time::sleep(Duration::from_millis(50)).await;

    let runs = h.engine.runs();
    let running = runs
        .list(Some(RunKind::FetchSource), 1)
        .into_iter()
        .next()
        .expect("scrape run should have started");
    assert!(runs.stop(running.id));

    let err = ticket.outcome().await.unwrap_err();
    assert!(matches!(err, HarvestError::Cancelled), "got {err}");
    assert_eq!(runs.get(running.id).unwrap().status, RunStatus::Stopped);

    // A stop is not a source failure.
    let row = h.store.get_source(id).await.unwrap().unwrap();
    assert_eq!(row.consecutive_failures, 0);
}
