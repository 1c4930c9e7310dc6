//! Durable, versioned skill documents on disk.
//!
//! Layout: one directory per source under the configured root, holding
//! a single `SKILL.md` that is overwritten on regeneration. Installing
//! a skill is atomic with respect to the source row: the file is
//! written first, and if the row update fails the file is removed so a
//! half-installed skill never exists.

use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::{HarvestError, Result, SkillError};
use crate::store::SourceStore;
use crate::types::{SkillDocument, Source};

const SKILL_FILE: &str = "SKILL.md";

/// Filesystem-backed store for skill documents.
#[derive(Debug, Clone)]
pub struct SkillStore {
    root: PathBuf,
}

impl SkillStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of the skill document for a source.
    pub fn path_for(&self, source_id: Uuid) -> PathBuf {
        self.root.join(source_id.to_string()).join(SKILL_FILE)
    }

    /// Whether a skill document exists on disk for this source.
    pub fn exists(&self, source_id: Uuid) -> bool {
        self.path_for(source_id).is_file()
    }

    /// Load and parse the skill document for a source.
    pub async fn load(&self, source_id: Uuid) -> std::result::Result<SkillDocument, SkillError> {
        let path = self.path_for(source_id);
        if !path.is_file() {
            return Err(SkillError::NotFound { source_id });
        }
        let text = fs::read_to_string(&path).await?;
        SkillDocument::parse(&text)
    }

    /// Install a skill document and flip the source's skill linkage.
    ///
    /// Both the file write and the source row update commit, or
    /// neither does. Returns the installed path.
    pub async fn install<S>(
        &self,
        doc: &SkillDocument,
        source: &Source,
        store: &S,
    ) -> Result<PathBuf>
    where
        S: SourceStore + ?Sized,
    {
        let path = self.path_for(doc.source_id);
        let dir = path.parent().expect("skill path always has a parent");

        fs::create_dir_all(dir)
            .await
            .map_err(|e| HarvestError::Skill(SkillError::Io(e)))?;

        // Write to a temp name then rename, so a crash mid-write never
        // leaves a truncated document behind.
        let tmp = dir.join(format!("{SKILL_FILE}.tmp"));
        fs::write(&tmp, doc.render())
            .await
            .map_err(|e| HarvestError::Skill(SkillError::Io(e)))?;
        fs::rename(&tmp, &path)
            .await
            .map_err(|e| HarvestError::Skill(SkillError::Io(e)))?;

        let mut updated = source.clone();
        updated.has_skill = true;
        updated.skill_version = doc.version;
        updated.skill_generated_at = Some(doc.generated_at);

        if let Err(e) = store.put_source(&updated).await {
            warn!(
                source_id = %doc.source_id,
                error = %e,
                "Source row update failed after skill write; removing file"
            );
            if let Err(io) = fs::remove_file(&path).await {
                warn!(path = %path.display(), error = %io, "Failed to remove orphaned skill file");
            }
            return Err(HarvestError::Skill(SkillError::Install(Box::new(e))));
        }

        info!(
            source_id = %doc.source_id,
            version = doc.version,
            path = %path.display(),
            "Skill installed"
        );

        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use crate::types::{FetchMode, SourceKind};
    use chrono::Utc;

    fn doc_for(source: &Source, version: u32) -> SkillDocument {
        SkillDocument {
            source_id: source.id,
            name: source.name.clone(),
            homepage: source.url.clone(),
            tier: FetchMode::Static,
            version,
            generated_at: Utc::now(),
            link_selector: Some("article a".into()),
            url_pattern: None,
            content_selector: None,
            instructions: "Collect links from the front page.".into(),
        }
    }

    #[tokio::test]
    async fn test_install_and_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let skills = SkillStore::new(dir.path());
        let store = MemoryStore::new();
        let source = Source::new("https://example.com", "Example", SourceKind::Site);
        store.seed_source(source.clone());

        assert!(!skills.exists(source.id));

        let doc = doc_for(&source, 1);
        let path = skills.install(&doc, &source, &store).await.unwrap();
        assert!(path.is_file());
        assert!(skills.exists(source.id));

        let loaded = skills.load(source.id).await.unwrap();
        assert_eq!(loaded.version, 1);
        assert_eq!(loaded.link_selector.as_deref(), Some("article a"));

        let row = store.get_source(source.id).await.unwrap().unwrap();
        assert!(row.has_skill);
        assert_eq!(row.skill_version, 1);
        assert!(row.skill_generated_at.is_some());
    }

    #[tokio::test]
    async fn test_regeneration_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let skills = SkillStore::new(dir.path());
        let store = MemoryStore::new();
        let source = Source::new("https://example.com", "Example", SourceKind::Site);
        store.seed_source(source.clone());

        skills
            .install(&doc_for(&source, 1), &source, &store)
            .await
            .unwrap();
        let mut v2 = doc_for(&source, 2);
        v2.instructions = "Use the archive page instead.".into();
        skills.install(&v2, &source, &store).await.unwrap();

        let loaded = skills.load(source.id).await.unwrap();
        assert_eq!(loaded.version, 2);
        assert!(loaded.instructions.contains("archive"));
    }

    #[tokio::test]
    async fn test_load_missing() {
        let dir = tempfile::tempdir().unwrap();
        let skills = SkillStore::new(dir.path());
        let err = skills.load(Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, SkillError::NotFound { .. }));
    }
}
