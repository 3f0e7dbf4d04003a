//! services/api/src/adapters/snapshot.rs
//!
//! Implements the `SnapshotStore` port on the local filesystem. Each failed run
//! leaves one pretty-printed JSON file that can be downloaded and inspected.

use async_trait::async_trait;
use regex::Regex;
use std::path::PathBuf;
use textbook_forge_core::{
    domain::{Snapshot, SnapshotRef},
    export::file_slug,
    ports::{PortError, PortResult, SnapshotStore},
};
use tracing::{info, warn};

#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    #[error("Invalid snapshot file name: {0}")]
    InvalidName(String),
    #[error("Snapshot IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Snapshot encoding error: {0}")]
    Encoding(#[from] serde_json::Error),
    #[error("Snapshot name pattern error: {0}")]
    Pattern(#[from] regex::Error),
}

impl From<SnapshotError> for PortError {
    fn from(e: SnapshotError) -> Self {
        match e {
            SnapshotError::InvalidName(name) => PortError::NotFound(name),
            SnapshotError::Io(io) if io.kind() == std::io::ErrorKind::NotFound => {
                PortError::NotFound(io.to_string())
            }
            other => PortError::Unexpected(other.to_string()),
        }
    }
}

/// `<kind>_progress_<slug>_<timestamp>.json`, with an `untitled` slug for
/// documents that never got a title.
pub fn snapshot_file_name(snapshot: &Snapshot) -> String {
    let slug = file_slug(snapshot.title().trim());
    let slug = if slug.is_empty() { "untitled".to_string() } else { slug };
    format!(
        "{}_progress_{}_{}.json",
        snapshot.kind(),
        slug,
        snapshot.saved_at.format("%Y%m%dT%H%M%S%3fZ")
    )
}

#[derive(Clone)]
pub struct FileSnapshotStore {
    dir: PathBuf,
    valid_name: Regex,
}

impl FileSnapshotStore {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self, SnapshotError> {
        Ok(Self {
            dir: dir.into(),
            valid_name: Regex::new(r"^[A-Za-z0-9_\-]+\.json$")?,
        })
    }

    /// Resolves a client-supplied name inside the snapshot directory, refusing
    /// anything that could escape it.
    fn path_for(&self, name: &str) -> Result<PathBuf, SnapshotError> {
        if !self.valid_name.is_match(name) {
            return Err(SnapshotError::InvalidName(name.to_string()));
        }
        Ok(self.dir.join(name))
    }

    async fn write(&self, snapshot: &Snapshot) -> Result<SnapshotRef, SnapshotError> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let name = snapshot_file_name(snapshot);
        let path = self.path_for(&name)?;
        let json = serde_json::to_vec_pretty(snapshot)?;
        tokio::fs::write(&path, json).await?;
        info!("Snapshot written to {}", path.display());
        Ok(SnapshotRef { name })
    }
}

#[async_trait]
impl SnapshotStore for FileSnapshotStore {
    async fn save(&self, snapshot: &Snapshot) -> PortResult<SnapshotRef> {
        Ok(self.write(snapshot).await?)
    }

    async fn load(&self, name: &str) -> PortResult<Vec<u8>> {
        let path = self.path_for(name).map_err(|e| {
            warn!("Rejected snapshot request: {e}");
            e
        })?;
        Ok(tokio::fs::read(&path).await.map_err(SnapshotError::from)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use textbook_forge_core::domain::{Outline, OutlineSection, TextbookDocument};

    fn snapshot(title: &str) -> Snapshot {
        let outline = Outline {
            title: title.to_string(),
            sections: vec![OutlineSection {
                section_number: "§4.1".to_string(),
                title: "Surface Codes".to_string(),
                summary: "Why stabilizers matter.".to_string(),
            }],
        };
        let doc = TextbookDocument::from_outline(&outline).append_section_text(0, "Partial text");
        Snapshot::textbook(Arc::new(doc))
    }

    #[test]
    fn file_names_carry_kind_and_slug() {
        let name = snapshot_file_name(&snapshot("Chapter 4: Codes"));
        assert!(name.starts_with("textbook_progress_chapter_4__codes_"));
        assert!(name.ends_with(".json"));

        let untitled = snapshot_file_name(&snapshot("  "));
        assert!(untitled.starts_with("textbook_progress_untitled_"));
    }

    #[tokio::test]
    async fn saved_snapshots_can_be_loaded_back() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSnapshotStore::new(dir.path().join("nested")).unwrap();

        let reference = store.save(&snapshot("Chapter 4: Codes")).await.unwrap();
        let bytes = store.load(&reference.name).await.unwrap();
        let value: serde_json::Value = serde_json::from_slice(&bytes).unwrap();

        assert_eq!(value["kind"], "textbook");
        assert_eq!(value["document"]["title"], "Chapter 4: Codes");
        assert_eq!(
            value["document"]["sections"][0]["section_text"],
            "Partial text"
        );
        assert!(value["saved_at"].is_string());
        // Pretty-printed for humans.
        assert!(String::from_utf8(bytes).unwrap().contains("\n  "));
    }

    #[tokio::test]
    async fn traversal_and_missing_files_are_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSnapshotStore::new(dir.path()).unwrap();

        for name in ["../secrets.json", "a/b.json", "notes.txt", ""] {
            assert!(matches!(
                store.load(name).await,
                Err(PortError::NotFound(_))
            ));
        }
        assert!(matches!(
            store.load("story_progress_gone.json").await,
            Err(PortError::NotFound(_))
        ));
    }
}
