//! Engine configuration.
//!
//! All knobs are plain struct fields with builder setters; `from_env`
//! layers the `HARVESTER_*` environment variables over the defaults so
//! deployments can tune the engine without recompiling.

use std::path::PathBuf;
use std::time::Duration;

/// Tunable knobs for the extraction engine.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Maximum scrapes in flight system-wide.
    pub queue_concurrency: usize,

    /// Step budget for the discovery agent loop.
    pub discovery_max_steps: usize,

    /// Step budget for the extraction agent loop.
    pub extraction_max_steps: usize,

    /// Timeout applied to every network fetch and browser navigation.
    pub fetch_timeout: Duration,

    /// Shorter timeout for wait-for-selector inside a render.
    pub wait_for_timeout: Duration,

    /// Capacity of the task-run ring.
    pub run_capacity: usize,

    /// Hand newly inserted articles to the downstream processor.
    pub analysis_enabled: bool,

    /// Root directory for skill documents.
    pub skills_dir: PathBuf,

    /// Days after which a source with no newer article counts as stale.
    pub stale_threshold_days: i64,

    /// User agent for outbound fetches.
    pub user_agent: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            queue_concurrency: 3,
            discovery_max_steps: 100,
            extraction_max_steps: 100,
            fetch_timeout: Duration::from_secs(30),
            wait_for_timeout: Duration::from_secs(10),
            run_capacity: 200,
            analysis_enabled: true,
            skills_dir: PathBuf::from("skills"),
            stale_threshold_days: 30,
            user_agent: "HarvesterBot/1.0".to_string(),
        }
    }
}

impl EngineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a config from `HARVESTER_*` environment variables,
    /// falling back to defaults for anything unset or unparseable.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Some(n) = env_usize("HARVESTER_QUEUE_CONCURRENCY") {
            config.queue_concurrency = n.max(1);
        }
        if let Some(n) = env_usize("HARVESTER_DISCOVERY_MAX_STEPS") {
            config.discovery_max_steps = n;
        }
        if let Some(n) = env_usize("HARVESTER_EXTRACTION_MAX_STEPS") {
            config.extraction_max_steps = n;
        }
        if let Some(n) = env_usize("HARVESTER_FETCH_TIMEOUT_SECS") {
            config.fetch_timeout = Duration::from_secs(n as u64);
        }
        if let Ok(v) = std::env::var("HARVESTER_DISABLE_ANALYSIS") {
            config.analysis_enabled = !matches!(v.as_str(), "1" | "true" | "yes");
        }
        if let Ok(dir) = std::env::var("HARVESTER_SKILLS_DIR") {
            if !dir.is_empty() {
                config.skills_dir = PathBuf::from(dir);
            }
        }

        config
    }

    pub fn with_queue_concurrency(mut self, n: usize) -> Self {
        self.queue_concurrency = n.max(1);
        self
    }

    pub fn with_discovery_max_steps(mut self, n: usize) -> Self {
        self.discovery_max_steps = n;
        self
    }

    pub fn with_extraction_max_steps(mut self, n: usize) -> Self {
        self.extraction_max_steps = n;
        self
    }

    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = timeout;
        self
    }

    pub fn with_skills_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.skills_dir = dir.into();
        self
    }

    pub fn with_analysis_enabled(mut self, enabled: bool) -> Self {
        self.analysis_enabled = enabled;
        self
    }

    pub fn with_run_capacity(mut self, capacity: usize) -> Self {
        self.run_capacity = capacity.max(1);
        self
    }
}

fn env_usize(key: &str) -> Option<usize> {
    std::env::var(key).ok()?.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.queue_concurrency, 3);
        assert_eq!(config.discovery_max_steps, 100);
        assert!(config.analysis_enabled);
    }

    #[test]
    fn test_builder_clamps_concurrency() {
        let config = EngineConfig::new().with_queue_concurrency(0);
        assert_eq!(config.queue_concurrency, 1);
    }
}
