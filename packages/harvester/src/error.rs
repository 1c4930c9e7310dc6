//! Typed errors for the harvesting engine.
//!
//! Uses `thiserror` for library errors (not `anyhow`) to provide
//! strongly-typed, composable error handling. Each layer has its own
//! error enum; tier failures aggregate into a single
//! [`HarvestError::AllTiersFailed`] once every applicable tier has been
//! exhausted.

use thiserror::Error;
use uuid::Uuid;

use crate::types::source::Tier;

/// Top-level errors surfaced by the engine's public operations.
#[derive(Debug, Error)]
pub enum HarvestError {
    /// Storage operation failed
    #[error("storage error: {0}")]
    Store(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// No source row for the given id
    #[error("source not found: {id}")]
    SourceNotFound { id: Uuid },

    /// A hard precondition was not met (e.g. site source without a skill)
    #[error("precondition failed: {reason}")]
    Precondition { reason: String },

    /// Every applicable tier failed for this source
    #[error("all tiers failed for source {source_id}: {}", format_attempts(.attempts))]
    AllTiersFailed {
        source_id: Uuid,
        attempts: Vec<TierAttempt>,
    },

    /// Agent loop failed
    #[error("agent error: {0}")]
    Agent(#[from] AgentError),

    /// Skill document could not be loaded, parsed, or installed
    #[error("skill error: {0}")]
    Skill(#[from] SkillError),

    /// A queued task was lost before producing a result
    #[error("queued scrape aborted: {reason}")]
    Aborted { reason: String },

    /// Operation was cancelled
    #[error("operation cancelled")]
    Cancelled,
}

/// One tier's failure, kept for the aggregated exhaustion report.
#[derive(Debug, Clone)]
pub struct TierAttempt {
    pub tier: Tier,
    pub error: String,
}

fn format_attempts(attempts: &[TierAttempt]) -> String {
    attempts
        .iter()
        .map(|a| format!("{}: {}", a.tier, a.error))
        .collect::<Vec<_>>()
        .join("; ")
}

/// Failure of a single extraction tier. Drives fallback, not escalation.
#[derive(Debug, Error)]
pub enum TierError {
    /// Fetch of the source URL failed
    #[error("fetch failed: {0}")]
    Fetch(#[from] FetchError),

    /// Feed or document could not be parsed
    #[error("parse failed: {reason}")]
    Parse { reason: String },

    /// The page yielded no extractable content
    #[error("no extractable content at {url}")]
    NoContent { url: String },

    /// The skill-guided agent run failed outright
    #[error("agent run failed: {0}")]
    Agent(#[source] Box<AgentError>),

    /// The tier's skill document could not be loaded
    #[error("skill error: {0}")]
    Skill(#[from] SkillError),

    /// Storage operation failed mid-tier
    #[error("storage error: {0}")]
    Store(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// Tier was cancelled
    #[error("tier cancelled")]
    Cancelled,
}

impl TierError {
    /// True when the failure is a cancellation, however it surfaced.
    pub fn is_cancelled(&self) -> bool {
        matches!(
            self,
            TierError::Cancelled | TierError::Fetch(FetchError::Cancelled)
        )
    }
}

/// Errors from fetching a page over HTTP or through the render service.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Underlying HTTP request failed
    #[error("HTTP error fetching {url}: {source}")]
    Http {
        url: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Non-success status code
    #[error("HTTP {status} fetching {url}")]
    Status { url: String, status: u16 },

    /// Request exceeded its deadline
    #[error("timeout fetching {url}")]
    Timeout { url: String },

    /// URL failed to parse
    #[error("invalid URL: {url}")]
    InvalidUrl { url: String },

    /// Render service unavailable or returned an unusable payload
    #[error("render failed for {url}: {reason}")]
    Render { url: String, reason: String },

    /// Fetch was cancelled
    #[error("fetch cancelled")]
    Cancelled,
}

/// Errors from individual agent tools.
///
/// Under `continue_on_error` these are folded into structured error
/// payloads and handed back to the model instead of aborting the loop.
#[derive(Debug, Error)]
pub enum ToolError {
    /// The model asked for a tool that does not exist
    #[error("unknown tool: {name}")]
    UnknownTool { name: String },

    /// Tool arguments did not match the expected shape
    #[error("bad arguments for {tool}: {reason}")]
    BadArgs { tool: String, reason: String },

    /// Fetch-backed tool failed
    #[error("fetch failed: {0}")]
    Fetch(#[from] FetchError),

    /// Tool requires a page that is not in the run's page cache
    #[error("page not fetched yet: {url}")]
    PageNotCached { url: String },

    /// CSS selector failed to parse
    #[error("invalid selector: {selector}")]
    Selector { selector: String },

    /// XPath expression outside the supported subset
    #[error("unsupported xpath expression: {expr}")]
    XPathUnsupported { expr: String },

    /// Regular expression failed to compile
    #[error("invalid regex: {reason}")]
    Regex { reason: String },

    /// Readable extraction yielded nothing
    #[error("no readable content at {url}")]
    NoContent { url: String },

    /// Browser session operation failed
    #[error("browser error: {reason}")]
    Browser { reason: String },

    /// Date text could not be parsed
    #[error("unparseable date: {text}")]
    DateParse { text: String },

    /// Tool call was cancelled
    #[error("tool cancelled")]
    Cancelled,
}

impl ToolError {
    /// True when the failure is a cancellation, however it surfaced.
    pub fn is_cancelled(&self) -> bool {
        matches!(
            self,
            ToolError::Cancelled | ToolError::Fetch(FetchError::Cancelled)
        )
    }
}

/// Errors from an agent loop as a whole.
#[derive(Debug, Error)]
pub enum AgentError {
    /// The planner (LLM adapter) failed
    #[error("planner error: {0}")]
    Planner(String),

    /// A tool failed with `continue_on_error` disabled
    #[error("tool failed: {0}")]
    Tool(#[from] ToolError),

    /// The step budget ran out before a terminal action
    #[error("agent did not produce a configuration within {steps} steps")]
    BudgetExhausted { steps: usize },

    /// The terminal payload did not match the expected shape
    #[error("malformed terminal action: {reason}")]
    BadFinish { reason: String },

    /// Storage failed while committing reported work
    #[error("storage error: {0}")]
    Store(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// The loop was cancelled
    #[error("agent cancelled")]
    Cancelled,
}

/// Errors from the skill store and skill document parsing.
#[derive(Debug, Error)]
pub enum SkillError {
    /// Filesystem operation failed
    #[error("skill io error: {0}")]
    Io(#[from] std::io::Error),

    /// Document did not match the expected frontmatter + body shape
    #[error("malformed skill document: {reason}")]
    Malformed { reason: String },

    /// No skill installed for this source
    #[error("no skill installed for source {source_id}")]
    NotFound { source_id: Uuid },

    /// Source row update failed after the file write; the file was removed
    #[error("skill install failed: {0}")]
    Install(#[source] Box<dyn std::error::Error + Send + Sync>),
}

/// Result type alias for engine operations.
pub type Result<T> = std::result::Result<T, HarvestError>;

/// Result type alias for tier functions.
pub type TierResult<T> = std::result::Result<T, TierError>;

/// Result type alias for fetch operations.
pub type FetchResult<T> = std::result::Result<T, FetchError>;

/// Result type alias for tool calls.
pub type ToolResult<T> = std::result::Result<T, ToolError>;
