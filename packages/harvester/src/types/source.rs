//! Source records and the closed set of extraction tiers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Declared type of a source, fixed at registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    /// A syndication feed (RSS or Atom). Never falls back to HTML scraping.
    Feed,
    /// An arbitrary website. Requires an installed skill to extract.
    Site,
}

/// Circuit-breaker state derived from consecutive failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Dead,
}

/// One concrete extraction strategy.
///
/// The set is closed by design: each variant's contract is uniform
/// (source in, normalized articles or a typed error out), which keeps
/// tier dispatch an ordered list rather than an open plugin surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Feed,
    Static,
    Rendered,
    Skill,
}

impl Tier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Feed => "feed",
            Tier::Static => "static",
            Tier::Rendered => "rendered",
            Tier::Skill => "skill",
        }
    }
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A registered content source with health and strategy bookkeeping.
///
/// Invariants maintained by the engine:
/// - `health == Dead` implies `is_active == false`
/// - `consecutive_failures` is reset to 0 only by a recorded success
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Source {
    pub id: Uuid,
    pub url: String,
    pub name: String,
    pub kind: SourceKind,
    pub is_active: bool,
    pub consecutive_failures: u32,
    pub health: HealthStatus,
    pub last_error_at: Option<DateTime<Utc>>,
    pub last_fetched_at: Option<DateTime<Utc>>,
    /// The tier that last succeeded for this source, if any.
    pub strategy: Option<Tier>,
    pub has_skill: bool,
    pub skill_version: u32,
    pub skill_generated_at: Option<DateTime<Utc>>,
}

impl Source {
    /// Create a new active, healthy source.
    pub fn new(url: impl Into<String>, name: impl Into<String>, kind: SourceKind) -> Self {
        Self {
            id: Uuid::new_v4(),
            url: url.into(),
            name: name.into(),
            kind,
            is_active: true,
            consecutive_failures: 0,
            health: HealthStatus::Healthy,
            last_error_at: None,
            last_fetched_at: None,
            strategy: None,
            has_skill: false,
            skill_version: 0,
            skill_generated_at: None,
        }
    }

    /// Set an explicit id (useful when mirroring an external row).
    pub fn with_id(mut self, id: Uuid) -> Self {
        self.id = id;
        self
    }

    /// Set the cached strategy.
    pub fn with_strategy(mut self, tier: Tier) -> Self {
        self.strategy = Some(tier);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_source_defaults() {
        let source = Source::new("https://example.com/feed.xml", "Example", SourceKind::Feed);
        assert!(source.is_active);
        assert_eq!(source.consecutive_failures, 0);
        assert_eq!(source.health, HealthStatus::Healthy);
        assert!(source.strategy.is_none());
        assert!(!source.has_skill);
    }

    #[test]
    fn test_tier_display() {
        assert_eq!(Tier::Feed.to_string(), "feed");
        assert_eq!(Tier::Rendered.to_string(), "rendered");
    }
}
