use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{Result, SyncError};

use super::Resource;

/// Snapshot of a crawl, persisted as JSON so a later run can mirror the same
/// file list without listing the remote tree again.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Manifest {
    pub total: usize,
    /// Remote URL path the crawl started from
    pub root_path: String,
    pub resources: Vec<Resource>,
}

impl Manifest {
    /// Builds a manifest from crawl output, dropping collections
    pub fn from_crawl(root_path: impl Into<String>, resources: Vec<Resource>) -> Self {
        let resources: Vec<Resource> = resources.into_iter().filter(Resource::is_file).collect();
        Self {
            total: resources.len(),
            root_path: root_path.into(),
            resources,
        }
    }

    pub async fn load(path: &Path) -> Result<Self> {
        let raw = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| SyncError::io(path, e))?;
        let manifest: Manifest = serde_json::from_str(&raw)
            .map_err(|e| SyncError::Manifest(format!("{}: {}", path.display(), e)))?;

        if manifest.total != manifest.resources.len() {
            return Err(SyncError::Manifest(format!(
                "{}: total is {} but {} resources are listed",
                path.display(),
                manifest.total,
                manifest.resources.len()
            )));
        }

        debug!("Loaded manifest {} with {} files rooted at '{}'", path.display(), manifest.total, manifest.root_path);
        Ok(manifest)
    }

    pub async fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string(self)
            .map_err(|e| SyncError::Manifest(format!("failed to serialize manifest: {}", e)))?;
        tokio::fs::write(path, json)
            .await
            .map_err(|e| SyncError::io(path, e))?;

        info!("📝 Wrote manifest with {} files to {}", self.total, path.display());
        Ok(())
    }
}
