use std::collections::HashSet;
use std::time::Instant;

use async_trait::async_trait;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::DEFAULT_MAX_DEPTH;
use crate::error::{Result, SyncError};
use crate::models::{DateWindow, Resource};
use crate::webdav_xml_parser::{parse_propfind_response, EntryOutcome};

use super::common::folder_key;

/// Source of raw PROPFIND (Depth: 1) bodies for a folder URL
#[async_trait]
pub trait FolderLister: Send + Sync {
    async fn list_folder(&self, folder_url: &str) -> Result<String>;
}

/// An entry the server listed but reported a non-success status for
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedEntry {
    pub path: String,
    pub status: String,
}

/// Outcome of a full tree walk
#[derive(Debug, Clone, Default)]
pub struct CrawlReport {
    /// Files only, each path at most once
    pub resources: Vec<Resource>,
    pub folders_scanned: usize,
    pub skipped_entries: Vec<SkippedEntry>,
    pub filtered_by_window: usize,
    /// Collections seen again after they were already queued or scanned
    pub duplicate_collections: usize,
}

/// Walks a remote folder tree with an explicit worklist.
///
/// Each folder is listed once: the folder echoing itself in its own listing
/// is ignored, and a visited set keyed by [`folder_key`] stops servers that
/// alias paths from sending the walk in circles. A depth limit guards
/// against trees that keep producing fresh paths.
pub struct TreeCrawler<'a> {
    lister: &'a dyn FolderLister,
    host_prefix: String,
    window: DateWindow,
    max_depth: usize,
}

impl<'a> TreeCrawler<'a> {
    pub fn new(lister: &'a dyn FolderLister, host_prefix: impl Into<String>, window: DateWindow) -> Self {
        Self {
            lister,
            host_prefix: host_prefix.into(),
            window,
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub async fn crawl(&self, folder_url: &str) -> Result<CrawlReport> {
        let crawl_id = Uuid::new_v4();
        let started = Instant::now();
        info!("[{}] 🔍 Crawling '{}' (window: {}, max depth: {})", crawl_id, folder_url, self.window, self.max_depth);

        let result = self.walk(crawl_id, folder_url).await;

        match &result {
            Ok(report) => info!(
                "[{}] ✅ Crawl of '{}' completed: {} files in {} folders, {} outside window, {} entries skipped in {:.2}s",
                crawl_id,
                folder_url,
                report.resources.len(),
                report.folders_scanned,
                report.filtered_by_window,
                report.skipped_entries.len(),
                started.elapsed().as_secs_f64()
            ),
            Err(e) => error!(
                "[{}] ❌ Crawl of '{}' failed after {:.2}s: {}",
                crawl_id,
                folder_url,
                started.elapsed().as_secs_f64(),
                e
            ),
        }

        result
    }

    async fn walk(&self, crawl_id: Uuid, folder_url: &str) -> Result<CrawlReport> {
        let root = folder_url.trim().trim_end_matches('/').to_string();
        let mut pending: Vec<(String, usize)> = vec![(root.clone(), 0)];
        let mut visited: HashSet<String> = HashSet::from([folder_key(&root)]);
        let mut seen_files: HashSet<String> = HashSet::new();
        let mut report = CrawlReport::default();

        while let Some((folder, depth)) = pending.pop() {
            if depth > self.max_depth {
                return Err(SyncError::DepthLimit {
                    url: folder,
                    max_depth: self.max_depth,
                });
            }

            debug!("[{}] Listing '{}' (depth {}, {} queued)", crawl_id, folder, depth, pending.len());
            let body = self.lister.list_folder(&folder).await?;
            let listing = parse_propfind_response(&body, &self.host_prefix, &self.window).map_err(|e| {
                SyncError::Parse {
                    url: folder.clone(),
                    message: e.to_string(),
                }
            })?;
            report.folders_scanned += 1;

            let current_key = folder_key(&folder);
            for entry in listing.entries {
                match entry {
                    EntryOutcome::Accepted(resource) if resource.is_collection() => {
                        let key = folder_key(&resource.path);
                        if key == current_key {
                            continue;
                        }
                        if !visited.insert(key) {
                            warn!("[{}] Collection '{}' listed again, not descending twice", crawl_id, resource.path);
                            report.duplicate_collections += 1;
                            continue;
                        }
                        debug!("[{}] Queued subfolder '{}'", crawl_id, resource.path);
                        pending.push((resource.path.trim_end_matches('/').to_string(), depth + 1));
                    }
                    EntryOutcome::Accepted(resource) => {
                        if seen_files.insert(resource.path.clone()) {
                            report.resources.push(resource);
                        } else {
                            debug!("[{}] Duplicate file entry '{}' ignored", crawl_id, resource.path);
                        }
                    }
                    EntryOutcome::Skipped { path, status } => {
                        debug!("[{}] Skipping '{}': {}", crawl_id, path, status);
                        report.skipped_entries.push(SkippedEntry { path, status });
                    }
                    EntryOutcome::FilteredByWindow(resource) => {
                        debug!("[{}] '{}' modified {} is outside {}", crawl_id, resource.path, resource.modified, self.window);
                        report.filtered_by_window += 1;
                    }
                }
            }
        }

        Ok(report)
    }
}
