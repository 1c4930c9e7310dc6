//! Domain types for sources, articles, and skills.

pub mod article;
pub mod skill;
pub mod source;

pub use article::{Article, ExtractionOutcome, ExtractionStats, NewArticle, ScrapeResult};
pub use skill::{FetchMode, SkillDocument};
pub use source::{HealthStatus, Source, SourceKind, Tier};
