//! File-backed artifact store.
//!
//! Writes each artifact as pretty JSON to `<root>/<kind>/<id>.json`.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::Utc;
use pacekeeper_core::error::ToolError;
use pacekeeper_tools::ArtifactStore;
use tracing::info;

pub struct FsArtifactStore {
    root: PathBuf,
}

impl FsArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn path_for(&self, kind: &str, id: &str) -> PathBuf {
        self.root.join(kind).join(format!("{id}.json"))
    }

    fn new_id(kind: &str) -> String {
        let suffix = uuid::Uuid::new_v4().simple().to_string();
        format!("{kind}-{}-{}", Utc::now().format("%Y%m%d"), &suffix[..8])
    }
}

#[async_trait]
impl ArtifactStore for FsArtifactStore {
    async fn save(&self, kind: &str, document: &serde_json::Value) -> Result<String, ToolError> {
        let id = Self::new_id(kind);
        let path = self.path_for(kind, &id);
        let dir = path.parent().unwrap_or(Path::new("."));

        tokio::fs::create_dir_all(dir)
            .await
            .map_err(|e| ToolError::Collaborator(format!("cannot create {}: {e}", dir.display())))?;

        let body = serde_json::to_vec_pretty(document)
            .map_err(|e| ToolError::Collaborator(format!("cannot encode artifact: {e}")))?;
        tokio::fs::write(&path, body)
            .await
            .map_err(|e| ToolError::Collaborator(format!("cannot write {}: {e}", path.display())))?;

        info!(artifact_id = %id, path = %path.display(), "Artifact saved");
        Ok(id)
    }
}
