//! Adaptive source-extraction engine for article ingestion.
//!
//! Turns heterogeneous web sources — RSS/Atom feeds and arbitrary
//! websites — into structured, deduplicated article records. The engine
//! decides *how* to pull content from each source, escalates through
//! extraction tiers on failure, remembers which tier works, tracks
//! long-term source health, and for feedless sites drives an
//! LLM-directed tool-use agent that discovers extraction rules (a
//! "skill") and re-uses them on later harvests.
//!
//! # Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use harvester::{EngineConfig, HarvestEngine, HttpFetcher, WebFetcher};
//! use harvester::store::MemoryStore;
//! use harvester::agent::ChatPlanner;
//!
//! let engine = Arc::new(HarvestEngine::new(
//!     EngineConfig::from_env(),
//!     Arc::new(MemoryStore::new()),
//!     Arc::new(WebFetcher::new(HttpFetcher::default())),
//!     Arc::new(ChatPlanner::new(api_key, "gpt-4o")),
//! ));
//!
//! // Feed sources parse the feed; site sources follow their skill.
//! let result = engine.scrape_source(source_id).await?;
//! println!("{} inserted, {} skipped via {}", result.inserted, result.skipped, result.tier);
//!
//! // Sites need a validated skill first:
//! let generated = engine.generate_skill(source_id, "https://example.com", "Example").await?;
//! ```
//!
//! # Modules
//!
//! - [`scrape`] - Fallback orchestrator and the public operations
//! - [`tiers`] - Tier functions and the fixed ordering policy
//! - [`agent`] - Discovery/extraction loops, planner, tool library
//! - [`fetch`] - HTTP/render fetching, feeds, readability, dates
//! - [`health`] - Failure-count circuit breaker over sources
//! - [`skills`] - Versioned skill documents on disk
//! - [`store`] - Persistence traits plus an in-memory implementation
//! - [`queue`] - Bounded-parallelism admission gate
//! - [`runs`] - Task-run registry (bounded ring, cooperative stop)
//! - [`pipeline`] - Fire-and-forget downstream handoff
//! - [`testing`] - Deterministic mocks for applications and tests

pub mod agent;
pub mod config;
pub mod error;
pub mod fetch;
pub mod health;
pub mod pipeline;
pub mod queue;
pub mod runs;
pub mod scrape;
pub mod skills;
pub mod store;
pub mod testing;
pub mod tiers;
pub mod types;

// Re-export core types at crate root
pub use config::EngineConfig;
pub use error::{AgentError, FetchError, HarvestError, SkillError, TierError, ToolError};
pub use fetch::{FetchOptions, FetchedPage, HttpFetcher, PageFetcher, RenderClient, WebFetcher};
pub use pipeline::ArticleProcessor;
pub use queue::ScrapeQueue;
pub use runs::{RunKind, RunStatus, TaskRun, TaskRunRegistry};
pub use scrape::{HarvestEngine, ScrapeTicket, SkillGeneration};
pub use skills::SkillStore;
pub use store::{ArticleStore, MemoryStore, SourceStore, Store};
pub use types::{
    Article, ExtractionOutcome, ExtractionStats, FetchMode, HealthStatus, NewArticle,
    ScrapeResult, SkillDocument, Source, SourceKind, Tier,
};
