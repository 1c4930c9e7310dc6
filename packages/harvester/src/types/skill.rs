//! Skill documents: versioned, model-authored extraction instructions.
//!
//! A skill document is a markdown file with system-generated YAML
//! frontmatter followed by a free-form instruction body written by the
//! discovery agent. The frontmatter is never model-authored, so the
//! metadata in it stays trustworthy; the body is fed verbatim to the
//! extraction agent as a prompt fragment.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::SkillError;

const FRONTMATTER_DELIMITER: &str = "---";

/// How pages should be fetched when following this skill.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FetchMode {
    /// Plain HTTP fetch; the site serves usable HTML directly.
    Static,
    /// Render-service fetch; the site needs script execution first.
    Rendered,
}

impl std::fmt::Display for FetchMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FetchMode::Static => f.write_str("static"),
            FetchMode::Rendered => f.write_str("rendered"),
        }
    }
}

/// System-authored metadata stored in the document header.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct Frontmatter {
    source_id: Uuid,
    name: String,
    homepage: String,
    tier: FetchMode,
    version: u32,
    generated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    link_selector: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    url_pattern: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    content_selector: Option<String>,
}

/// A complete skill document for one source.
#[derive(Debug, Clone, PartialEq)]
pub struct SkillDocument {
    pub source_id: Uuid,
    pub name: String,
    pub homepage: String,
    pub tier: FetchMode,
    pub version: u32,
    pub generated_at: DateTime<Utc>,
    /// Primary article-link selector, used for automated validation.
    pub link_selector: Option<String>,
    /// URL-matching pattern, alternative to the link selector.
    pub url_pattern: Option<String>,
    /// Selector for the main content region of an article page.
    pub content_selector: Option<String>,
    /// Model-authored extraction instructions.
    pub instructions: String,
}

impl SkillDocument {
    /// Render the document as frontmatter + body.
    pub fn render(&self) -> String {
        let frontmatter = Frontmatter {
            source_id: self.source_id,
            name: self.name.clone(),
            homepage: self.homepage.clone(),
            tier: self.tier,
            version: self.version,
            generated_at: self.generated_at,
            link_selector: self.link_selector.clone(),
            url_pattern: self.url_pattern.clone(),
            content_selector: self.content_selector.clone(),
        };

        // serde_yaml always serializes a struct to valid YAML; a failure
        // here would be a programming error, so fall back to empty.
        let yaml = serde_yaml::to_string(&frontmatter).unwrap_or_default();

        format!(
            "{delim}\n{yaml}{delim}\n\n{body}\n",
            delim = FRONTMATTER_DELIMITER,
            yaml = yaml,
            body = self.instructions.trim_end()
        )
    }

    /// Parse a rendered document back into its parts.
    pub fn parse(text: &str) -> Result<Self, SkillError> {
        let rest = text
            .strip_prefix(FRONTMATTER_DELIMITER)
            .ok_or_else(|| SkillError::Malformed {
                reason: "missing frontmatter delimiter".into(),
            })?;

        let (yaml, body) =
            rest.split_once(&format!("\n{FRONTMATTER_DELIMITER}"))
                .ok_or_else(|| SkillError::Malformed {
                    reason: "unterminated frontmatter".into(),
                })?;

        let frontmatter: Frontmatter =
            serde_yaml::from_str(yaml).map_err(|e| SkillError::Malformed {
                reason: format!("frontmatter: {e}"),
            })?;

        let instructions = body.trim_start_matches('\n').trim().to_string();
        if instructions.is_empty() {
            return Err(SkillError::Malformed {
                reason: "empty instruction body".into(),
            });
        }

        Ok(Self {
            source_id: frontmatter.source_id,
            name: frontmatter.name,
            homepage: frontmatter.homepage,
            tier: frontmatter.tier,
            version: frontmatter.version,
            generated_at: frontmatter.generated_at,
            link_selector: frontmatter.link_selector,
            url_pattern: frontmatter.url_pattern,
            content_selector: frontmatter.content_selector,
            instructions,
        })
    }
}
